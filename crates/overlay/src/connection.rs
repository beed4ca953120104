//! The overlay connection: owns every store, drives the event loop,
//! and is the public face of the crate.
//!
//! One spawned task per connection processes inbound stanzas. Public
//! operations that need a round trip park a oneshot in the
//! [`IqCorrelator`] and suspend under a timeout; the loop routes the
//! correlated result or error iq back to them. Capability resolution
//! runs in its own tasks for the same reason: the disco reply it waits
//! for arrives through the loop, so the loop must never await it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use yts_domain::{
    Config, ConfigSeverity, Error, ErrorType, LocalService, MessageError, Result, TimeoutConfig,
};
use yts_protocol::{
    caps, message, parse_document, stanza, status as wire, CapabilityDocument, CapsToken,
    Element, PresenceKind, PubsubEvent, PubsubEventItem,
};

use crate::caps_cache::{CapsCache, Resolution};
use crate::channel::{ChannelOutcome, ChannelRequest, InboundChannel, OutboundChannel};
use crate::contacts::{bare_jid, ContactPresence, ContactRegistry};
use crate::correlate::IqCorrelator;
use crate::discovery::{DiscoveryStore, ServiceDiff, ServiceSnapshot, ServiceTable};
use crate::events::OverlayEvent;
use crate::local::LocalServices;
use crate::status::{StatusChange, StatusSnapshot, StatusStore};
use crate::transport::{Transport, TransportEvent};

/// Broadcast buffer for [`OverlayEvent`]s; slow subscribers lag.
const EVENT_BUFFER: usize = 64;
/// Queue of inbound channels awaiting the consumer.
const INCOMING_BUFFER: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OverlayConnection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OverlayConnection {
    transport: Arc<dyn Transport>,
    /// Our bare jid; keys the local echo of status advertisements.
    identity_jid: String,
    timeouts: TimeoutConfig,
    locals: Arc<LocalServices>,
    contacts: Arc<ContactRegistry>,
    discovery: Arc<DiscoveryStore>,
    statuses: Arc<StatusStore>,
    correlator: Arc<IqCorrelator>,
    event_tx: broadcast::Sender<OverlayEvent>,
    incoming: Mutex<Option<mpsc::Receiver<InboundChannel>>>,
    stopped: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

// `dyn Transport` has no Debug bound, so this cannot be derived.
impl fmt::Debug for OverlayConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayConnection")
            .field("identity_jid", &self.identity_jid)
            .field("stopped", &self.stopped.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl OverlayConnection {
    /// Validate the config, announce our presence, and spawn the event
    /// loop over `events`. Config issues of error severity reject the
    /// start; warnings are logged and tolerated.
    pub async fn start(
        config: Config,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Result<Self> {
        let issues = config.validate();
        for issue in &issues {
            match issue.severity {
                ConfigSeverity::Error => tracing::error!(%issue, "config rejected"),
                ConfigSeverity::Warning => warn!(%issue, "config warning"),
            }
        }
        if let Some(bad) = issues
            .iter()
            .find(|i| i.severity == ConfigSeverity::Error)
        {
            return Err(Error::Config(bad.to_string()));
        }

        let locals = Arc::new(LocalServices::new(config.identity.clone()));
        let contacts = Arc::new(ContactRegistry::new());
        let discovery = Arc::new(DiscoveryStore::new());
        let statuses = Arc::new(StatusStore::new());
        let correlator = Arc::new(IqCorrelator::new(&config.channels));
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER);
        let stopped = CancellationToken::new();

        // announce before anyone can query us
        transport
            .send(caps::presence_with_caps(&locals.caps_token()))
            .await?;
        info!(jid = %config.identity.jid, "overlay connection started");

        let event_loop = EventLoop {
            transport: transport.clone(),
            locals: locals.clone(),
            contacts: contacts.clone(),
            discovery: discovery.clone(),
            statuses: statuses.clone(),
            cache: Arc::new(CapsCache::new()),
            correlator: correlator.clone(),
            event_tx: event_tx.clone(),
            incoming_tx,
            inbound_slots: Arc::new(Semaphore::new(config.channels.max_pending_global)),
            stopped: stopped.clone(),
            iq_timeout: config.timeouts.iq(),
        };
        let loop_handle = tokio::spawn(event_loop.run(events));

        Ok(Self {
            transport,
            identity_jid: bare_jid(&config.identity.jid).to_owned(),
            timeouts: config.timeouts,
            locals,
            contacts,
            discovery,
            statuses,
            correlator,
            event_tx,
            incoming: Mutex::new(Some(incoming_rx)),
            stopped,
            loop_handle: Mutex::new(Some(loop_handle)),
        })
    }

    /// Observe everything the overlay does.
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.event_tx.subscribe()
    }

    /// The feed of unsolicited inbound channels. There is one receiver;
    /// after the first call this returns `None`.
    pub fn take_incoming(&self) -> Option<mpsc::Receiver<InboundChannel>> {
        self.incoming.lock().take()
    }

    /// Snapshot of every discovered service, contact → id → descriptor.
    pub fn discovered_services(&self) -> ServiceSnapshot {
        self.discovery.snapshot()
    }

    /// Snapshot of the status aggregate, contact → capability →
    /// service → status.
    pub fn discovered_statuses(&self) -> StatusSnapshot {
        self.statuses.snapshot()
    }

    pub fn online_contacts(&self) -> Vec<ContactPresence> {
        self.contacts.list()
    }

    pub fn local_services(&self) -> Vec<LocalService> {
        self.locals.list()
    }

    // ── local publication ───────────────────────────────────────────

    /// Publish a local service and re-announce presence so peers pick
    /// up the new ver.
    pub async fn register_service(&self, service: LocalService) -> Result<()> {
        self.ensure_running()?;
        self.locals.register(service)?;
        self.announce().await
    }

    /// Withdraw a local service. Returns false when the id was not
    /// registered; presence is only re-announced when something
    /// actually changed.
    pub async fn unregister_service(&self, id: &str) -> Result<bool> {
        self.ensure_running()?;
        if !self.locals.unregister(id) {
            return Ok(false);
        }
        self.announce().await?;
        Ok(true)
    }

    async fn announce(&self) -> Result<()> {
        self.transport
            .send(caps::presence_with_caps(&self.locals.caps_token()))
            .await
    }

    // ── status ──────────────────────────────────────────────────────

    /// Publish our status under a capability node, or clear it when
    /// `payload` is absent or empty. Suspends until the server
    /// acknowledges; on success our own entry goes through the same
    /// aggregate a remote peer's would, so the snapshot and the
    /// `StatusChanged` event reflect it immediately.
    pub async fn advertise_status(
        &self,
        capability: &str,
        service: &str,
        payload: Option<&str>,
    ) -> Result<()> {
        self.ensure_running()?;
        if capability.is_empty() {
            return Err(Error::Validation("capability must not be empty".into()));
        }
        if service.is_empty() {
            return Err(Error::Validation("service name must not be empty".into()));
        }
        let payload = match payload {
            Some(raw) if !raw.is_empty() => Some(parse_document(raw)?),
            _ => None,
        };
        let status = wire::build_status_element(capability, service, payload.as_ref());
        let value = wire::status_value(&status);

        let id = stanza::new_id();
        let rx = self.correlator.register(&id, &self.identity_jid)?;
        if let Err(e) = self
            .transport
            .send(wire::publish_iq(&id, capability, status))
            .await
        {
            self.correlator.forget(&id);
            return Err(e);
        }

        let reply = match tokio::time::timeout(self.timeouts.iq(), rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(Error::NotConnected),
            Err(_) => {
                self.correlator.forget(&id);
                return Err(Error::Timeout(format!("status publish {id} timed out")));
            }
        };
        if let Some(error) = stanza::error_from_iq(&reply) {
            return Err(Error::Protocol(format!("status publish rejected: {error}")));
        }

        debug!(capability, service, cleared = value.is_empty(), "status published");
        let change = self
            .statuses
            .apply(&self.identity_jid, capability, service, &value);
        self.emit_status_change(change);
        Ok(())
    }

    fn emit_status_change(&self, change: StatusChange) {
        let _ = self.event_tx.send(OverlayEvent::StatusChanged {
            contact: change.contact,
            capability: change.capability,
            service: change.service,
            status: change.status,
        });
    }

    // ── channels ────────────────────────────────────────────────────

    /// Open an outbound channel. Everything is validated here, against
    /// the registry and the service-name grammar; nothing is sent until
    /// [`request`](Self::request).
    pub fn create_channel(&self, request: ChannelRequest) -> Result<OutboundChannel> {
        self.ensure_running()?;
        let contact = bare_jid(&request.contact).to_owned();
        let address = self
            .contacts
            .address_of(&contact)
            .ok_or_else(|| Error::ContactOffline(contact.clone()))?;
        OutboundChannel::create(
            stanza::new_id(),
            contact,
            address,
            request.request_type,
            &request.initiator_service,
            &request.target_service,
            request.attributes,
            request.body.as_deref(),
        )
    }

    /// Send the channel's request and suspend until its one terminal
    /// outcome: the reply, a remote error, a timeout, or disconnect.
    /// The outcome is recorded on the channel and broadcast.
    pub async fn request(&self, channel: &mut OutboundChannel) -> Result<ChannelOutcome> {
        self.ensure_running()?;
        channel.ensure_created()?;
        // a cap rejection here leaves the channel in Created
        let rx = self.correlator.register(channel.id(), channel.contact())?;
        channel.begin_request()?;

        if let Err(e) = self.transport.send(channel.request_iq()).await {
            warn!(channel = %channel.id(), error = %e, "request not sent");
            self.correlator.forget(channel.id());
            let error = MessageError::new(ErrorType::Cancel)
                .with_stanza_condition("gone")
                .with_text("connection closed");
            return Ok(self.finish(channel, ChannelOutcome::Failed(error)));
        }
        debug!(
            channel = %channel.id(),
            contact = %channel.contact(),
            target = %channel.target_service(),
            "request sent"
        );

        let outcome = match tokio::time::timeout(self.timeouts.request(), rx).await {
            Ok(Ok(reply)) => match stanza::error_from_iq(&reply) {
                Some(error) => ChannelOutcome::Failed(error),
                None => {
                    let (attributes, body) = message::parse_reply(&reply);
                    ChannelOutcome::Replied { attributes, body }
                }
            },
            // waiter dropped: our stream closed or the contact left
            Ok(Err(_)) => ChannelOutcome::Failed(
                MessageError::new(ErrorType::Cancel)
                    .with_stanza_condition("gone")
                    .with_text("connection closed"),
            ),
            Err(_) => {
                self.correlator.forget(channel.id());
                ChannelOutcome::Failed(
                    MessageError::new(ErrorType::Wait)
                        .with_stanza_condition("remote-server-timeout")
                        .with_text("request timed out"),
                )
            }
        };
        Ok(self.finish(channel, outcome))
    }

    fn finish(&self, channel: &mut OutboundChannel, outcome: ChannelOutcome) -> ChannelOutcome {
        channel.complete(outcome.clone());
        let event = match &outcome {
            ChannelOutcome::Replied { attributes, body } => {
                info!(channel = %channel.id(), contact = %channel.contact(), "channel replied");
                OverlayEvent::ChannelReplied {
                    contact: channel.contact().to_owned(),
                    id: channel.id().to_owned(),
                    attributes: attributes.clone(),
                    body: body.clone(),
                }
            }
            ChannelOutcome::Failed(error) => {
                info!(
                    channel = %channel.id(),
                    contact = %channel.contact(),
                    error = %error,
                    "channel failed"
                );
                OverlayEvent::ChannelFailed {
                    contact: channel.contact().to_owned(),
                    id: channel.id().to_owned(),
                    error: error.clone(),
                }
            }
        };
        let _ = self.event_tx.send(event);
        outcome
    }

    /// Answer an inbound channel. The wire layer swaps the service
    /// pair, so the reply reads from the service that was addressed.
    pub async fn reply(
        &self,
        channel: &mut InboundChannel,
        attributes: BTreeMap<String, String>,
        body: Option<&str>,
    ) -> Result<()> {
        self.ensure_running()?;
        channel.ensure_pending()?;
        let body = match body {
            Some(raw) => Some(message::validate_request_body(raw)?),
            None => None,
        };
        let iq = channel.reply_iq(&attributes, body.as_ref());
        let (view_attributes, view_body) = message::parse_reply(&iq);
        self.transport.send(iq).await?;
        info!(channel = %channel.id(), contact = %channel.contact(), "inbound channel replied");
        channel.mark_replied(view_attributes, view_body);
        Ok(())
    }

    /// Fail an inbound channel: the request is echoed back with the
    /// typed error attached.
    pub async fn fail(&self, channel: &mut InboundChannel, error: MessageError) -> Result<()> {
        self.ensure_running()?;
        channel.ensure_pending()?;
        self.transport.send(channel.fail_iq(&error)).await?;
        info!(
            channel = %channel.id(),
            contact = %channel.contact(),
            error = %error,
            "inbound channel failed"
        );
        channel.mark_failed(error);
        Ok(())
    }

    // ── lifecycle ───────────────────────────────────────────────────

    /// Stop the event loop, withdraw presence, and tear every store
    /// down. Pending operations fail; the connection stays stopped.
    pub async fn shutdown(&self) {
        if self.stopped.is_cancelled() {
            return;
        }
        self.stopped.cancel();
        let bye = Element::plain("presence").attr("type", "unavailable");
        if let Err(e) = self.transport.send(bye).await {
            debug!(error = %e, "unavailable presence not sent");
        }
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.is_cancelled() {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
struct EventLoop {
    transport: Arc<dyn Transport>,
    locals: Arc<LocalServices>,
    contacts: Arc<ContactRegistry>,
    discovery: Arc<DiscoveryStore>,
    statuses: Arc<StatusStore>,
    cache: Arc<CapsCache>,
    correlator: Arc<IqCorrelator>,
    event_tx: broadcast::Sender<OverlayEvent>,
    incoming_tx: mpsc::Sender<InboundChannel>,
    inbound_slots: Arc<Semaphore>,
    stopped: CancellationToken,
    iq_timeout: Duration,
}

impl EventLoop {
    async fn run(self, mut events: mpsc::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                _ = self.stopped.cancelled() => break,
                event = events.recv() => match event {
                    Some(TransportEvent::Stanza(stanza)) => self.dispatch(stanza).await,
                    Some(TransportEvent::Disconnected) | None => {
                        info!("transport disconnected");
                        break;
                    }
                },
            }
        }
        self.teardown();
    }

    /// Fail every suspended operation and forget everything we knew.
    /// Runs for shutdown and disconnect alike.
    fn teardown(&self) {
        self.stopped.cancel();
        let dropped = self.correlator.fail_all();
        if dropped > 0 {
            warn!(dropped, "dropped in-flight iqs on teardown");
        }
        let gone = self.contacts.clear();
        if !gone.is_empty() {
            info!(contacts = gone.len(), "contact registry cleared");
        }
        self.discovery.clear();
        self.statuses.clear();
        info!("overlay loop stopped");
    }

    async fn dispatch(&self, stanza: Element) {
        match stanza.name() {
            "presence" => self.on_presence(&stanza),
            "message" => self.on_message(&stanza),
            "iq" => self.on_iq(stanza).await,
            other => debug!(stanza = other, "ignoring stanza"),
        }
    }

    // ── presence ────────────────────────────────────────────────────

    fn on_presence(&self, stanza: &Element) {
        let Some(kind) = caps::presence_kind(stanza) else {
            debug!("ignoring non-availability presence");
            return;
        };
        let Some(from) = stanza.get_attr("from") else {
            warn!("presence without a sender");
            return;
        };
        match kind {
            PresenceKind::Available => {
                let token = caps::caps_from_presence(stanza);
                let (_, caps_changed) = self.contacts.observe_available(from, token.clone());
                if !caps_changed {
                    return;
                }
                let contact = bare_jid(from).to_owned();
                match token {
                    Some(token) => {
                        debug!(contact = %contact, ver = %token.ver, "capability change announced");
                        // resolution awaits a reply that arrives through
                        // this loop, so it must run elsewhere
                        let this = self.clone();
                        let address = from.to_owned();
                        tokio::spawn(async move {
                            this.resolve_caps(contact, address, token).await;
                        });
                    }
                    None => {
                        // caps withdrawn reads as the empty document
                        self.apply_services(&contact, ServiceTable::new());
                    }
                }
            }
            PresenceKind::Unavailable => self.contact_lost(from),
        }
    }

    fn contact_lost(&self, full_jid: &str) {
        let Some(removed) = self.contacts.observe_unavailable(full_jid) else {
            return;
        };
        let diff = self.discovery.remove_contact(&removed.jid);
        self.emit_diff(&removed.jid, diff);
        self.statuses.remove_contact(&removed.jid);
        self.correlator.fail_for_contact(&removed.jid);
    }

    // ── capability resolution ───────────────────────────────────────

    async fn resolve_caps(&self, contact: String, address: String, token: CapsToken) {
        let document = match self.cache.begin(&token.ver) {
            Resolution::Cached(doc) => Some(doc),
            Resolution::Pending(rx) => rx.await.unwrap_or(None),
            Resolution::MustResolve => self.query_caps(&contact, &address, &token).await,
        };
        let Some(document) = document else {
            warn!(contact = %contact, ver = %token.ver, "capability resolution failed");
            return;
        };

        // apply only if the contact still advertises this ver
        match self.contacts.get(&contact) {
            Some(current)
                if current.caps.as_ref().map(|c| c.ver.as_str())
                    == Some(token.ver.as_str()) =>
            {
                self.apply_services(&contact, document.services());
            }
            _ => debug!(contact = %contact, ver = %token.ver, "contact moved on before resolution"),
        }
    }

    /// Owner path of a resolution: send the disco query, await the
    /// correlated reply, then fulfill or fail the cache for everyone.
    async fn query_caps(
        &self,
        contact: &str,
        address: &str,
        token: &CapsToken,
    ) -> Option<Arc<CapabilityDocument>> {
        let id = stanza::new_id();
        let rx = match self.correlator.register(&id, contact) {
            Ok(rx) => rx,
            Err(e) => {
                warn!(contact, error = %e, "cannot track capability query");
                self.cache.fail(&token.ver);
                return None;
            }
        };
        let query = caps::disco_request(&id, address, &token.disco_node());
        if let Err(e) = self.transport.send(query).await {
            warn!(contact, error = %e, "disco query not sent");
            self.correlator.forget(&id);
            self.cache.fail(&token.ver);
            return None;
        }
        debug!(contact, ver = %token.ver, "disco query sent");

        let reply = match tokio::time::timeout(self.iq_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                self.cache.fail(&token.ver);
                return None;
            }
            Err(_) => {
                warn!(contact, ver = %token.ver, "disco query timed out");
                self.correlator.forget(&id);
                self.cache.fail(&token.ver);
                return None;
            }
        };

        if let Some(error) = stanza::error_from_iq(&reply) {
            warn!(contact, ver = %token.ver, error = %error, "disco query refused");
            self.cache.fail(&token.ver);
            return None;
        }
        match CapabilityDocument::from_disco_reply(token.ver.clone(), &reply) {
            Ok(document) => Some(self.cache.fulfill(&token.ver, document)),
            Err(e) => {
                warn!(contact, error = %e, "malformed disco reply");
                self.cache.fail(&token.ver);
                None
            }
        }
    }

    fn apply_services(&self, contact: &str, table: ServiceTable) {
        let diff = self.discovery.apply(contact, table);
        self.emit_diff(contact, diff);
    }

    fn emit_diff(&self, contact: &str, diff: ServiceDiff) {
        for (service_id, service) in diff.added {
            info!(contact, service = %service_id, "service discovered");
            let _ = self.event_tx.send(OverlayEvent::ServiceAdded {
                contact: contact.to_owned(),
                service_id,
                service,
            });
        }
        for service_id in diff.removed {
            info!(contact, service = %service_id, "service removed");
            let _ = self.event_tx.send(OverlayEvent::ServiceRemoved {
                contact: contact.to_owned(),
                service_id,
            });
        }
    }

    // ── status events ───────────────────────────────────────────────

    fn on_message(&self, stanza: &Element) {
        let Some(event) = wire::parse_pubsub_event(stanza) else {
            debug!("ignoring non-event message");
            return;
        };
        let Some(from) = stanza.get_attr("from") else {
            warn!("pubsub event without a sender");
            return;
        };
        self.apply_pubsub_event(bare_jid(from), event);
    }

    fn apply_pubsub_event(&self, contact: &str, event: PubsubEvent) {
        let PubsubEvent { node, items } = event;
        for item in items {
            match item {
                PubsubEventItem::Status(status) => {
                    let Some(service) = status.get_attr("from-service") else {
                        warn!(contact, node = %node, "status item without from-service");
                        continue;
                    };
                    let value = wire::status_value(&status);
                    let change = self.statuses.apply(contact, &node, service, &value);
                    self.emit_status_change(change);
                }
                PubsubEventItem::Retract => {
                    for change in self.statuses.clear_capability(contact, &node) {
                        self.emit_status_change(change);
                    }
                }
            }
        }
    }

    fn emit_status_change(&self, change: StatusChange) {
        debug!(
            contact = %change.contact,
            capability = %change.capability,
            service = %change.service,
            cleared = change.status.is_empty(),
            "status changed"
        );
        let _ = self.event_tx.send(OverlayEvent::StatusChanged {
            contact: change.contact,
            capability: change.capability,
            service: change.service,
            status: change.status,
        });
    }

    // ── iqs ─────────────────────────────────────────────────────────

    async fn on_iq(&self, stanza: Element) {
        match stanza::iq_type(&stanza) {
            Some("result") | Some("error") => {
                let Some(id) = stanza::iq_id(&stanza) else {
                    warn!("response iq without an id");
                    return;
                };
                let id = id.to_owned();
                self.correlator.complete(&id, stanza);
            }
            Some("get") | Some("set") => self.on_iq_request(stanza).await,
            other => debug!(iq_type = ?other, "ignoring iq"),
        }
    }

    async fn on_iq_request(&self, stanza: Element) {
        if let Some(node) = caps::parse_disco_request(&stanza) {
            let reply = self.locals.answer_disco(&stanza, &node);
            self.send_or_log(reply, "disco reply").await;
            return;
        }
        if message::message_child(&stanza).is_some() {
            self.on_channel_request(stanza).await;
            return;
        }
        debug!("ignoring unrecognized iq request");
    }

    async fn on_channel_request(&self, stanza: Element) {
        if stanza::iq_from(&stanza).is_none() {
            warn!("message request without a sender");
            return;
        }
        if stanza::iq_id(&stanza).is_none() {
            warn!("message request without an id");
            let reply = stanza::error_reply(
                &stanza,
                &MessageError::new(ErrorType::Modify).with_stanza_condition("bad-request"),
            );
            self.send_or_log(reply, "bad-request reply").await;
            return;
        }
        let Some(request) = message::parse_request_iq(&stanza) else {
            warn!("malformed message request");
            return;
        };

        let permit = match self.inbound_slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(contact = %request.contact, "inbound channel cap exceeded");
                let reply = request.fail_iq(
                    &MessageError::new(ErrorType::Wait)
                        .with_stanza_condition("resource-constraint"),
                );
                self.send_or_log(reply, "resource-constraint reply").await;
                return;
            }
        };

        info!(
            contact = %request.contact,
            initiator = %request.initiator_service,
            target = %request.target_service,
            "inbound channel"
        );
        let mut channel = InboundChannel::new(request);
        channel.attach_permit(permit);
        if let Err(e) = self.incoming_tx.try_send(channel) {
            let channel = match e {
                mpsc::error::TrySendError::Full(ch)
                | mpsc::error::TrySendError::Closed(ch) => ch,
            };
            warn!(contact = %channel.contact(), "no consumer for inbound channel");
            let reply = channel.fail_iq(
                &MessageError::new(ErrorType::Cancel)
                    .with_stanza_condition("service-unavailable"),
            );
            self.send_or_log(reply, "service-unavailable reply").await;
        }
    }

    async fn send_or_log(&self, stanza: Element, what: &'static str) {
        if let Err(e) = self.transport.send(stanza).await {
            warn!(error = %e, what, "reply not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel_transport;
    use yts_domain::RequestType;

    async fn started() -> (OverlayConnection, mpsc::Receiver<Element>, mpsc::Sender<TransportEvent>) {
        let (transport, mut wire_rx) = channel_transport(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let mut config = Config::default();
        config.identity.jid = "us@example.com".into();
        let conn = OverlayConnection::start(config, Arc::new(transport), events_rx)
            .await
            .unwrap();
        // swallow the startup presence
        let presence = wire_rx.recv().await.unwrap();
        assert_eq!(presence.name(), "presence");
        (conn, wire_rx, events_tx)
    }

    #[tokio::test]
    async fn start_rejects_bad_config() {
        let (transport, _wire_rx) = channel_transport(4);
        let (_events_tx, events_rx) = mpsc::channel(4);
        let mut config = Config::default();
        config.identity.caps_node = String::new();
        let err = OverlayConnection::start(config, Arc::new(transport), events_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn startup_presence_carries_caps() {
        let (transport, mut wire_rx) = channel_transport(4);
        let (_events_tx, events_rx) = mpsc::channel(4);
        let _conn = OverlayConnection::start(Config::default(), Arc::new(transport), events_rx)
            .await
            .unwrap();

        let presence = wire_rx.recv().await.unwrap();
        let token = caps::caps_from_presence(&presence).unwrap();
        assert_eq!(token.hash, caps::HASH_NAME);
        assert_eq!(token.ver.len(), 64);
    }

    #[tokio::test]
    async fn channel_to_unknown_contact_is_rejected() {
        let (conn, _wire_rx, _events_tx) = started().await;
        let err = conn
            .create_channel(ChannelRequest {
                contact: "stranger@example.com/r".into(),
                request_type: RequestType::Get,
                initiator_service: "com.example.A".into(),
                target_service: "com.example.B".into(),
                attributes: BTreeMap::new(),
                body: None,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "stranger@example.com is not online");
    }

    #[tokio::test]
    async fn empty_status_names_fail_without_io() {
        let (conn, mut wire_rx, _events_tx) = started().await;
        assert!(matches!(
            conn.advertise_status("", "a.b", None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            conn.advertise_status("urn:cap", "", None).await,
            Err(Error::Validation(_))
        ));
        // nothing went over the wire for either call
        assert!(wire_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn incoming_receiver_is_single_take() {
        let (conn, _wire_rx, _events_tx) = started().await;
        assert!(conn.take_incoming().is_some());
        assert!(conn.take_incoming().is_none());
    }

    #[tokio::test]
    async fn shutdown_withdraws_presence_and_stops() {
        let (conn, mut wire_rx, _events_tx) = started().await;
        conn.shutdown().await;

        let bye = wire_rx.recv().await.unwrap();
        assert_eq!(bye.get_attr("type"), Some("unavailable"));
        assert!(matches!(
            conn.advertise_status("urn:cap", "a.b", None).await,
            Err(Error::NotConnected)
        ));
        // idempotent
        conn.shutdown().await;
    }
}
