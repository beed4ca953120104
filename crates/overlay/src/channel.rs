//! One-shot request/reply channels.
//!
//! A channel models exactly one exchange between two named services
//! and reaches exactly one terminal outcome. The state machine is a
//! tagged enum; operations attempted from the wrong state fail with an
//! invalid-state error and never touch the wire. Outbound and inbound
//! channels are distinct types, so replying on an outbound channel is
//! not even expressible.

use std::collections::BTreeMap;

use tokio::sync::OwnedSemaphorePermit;
use yts_domain::{validate_service_name, Error, MessageError, RequestType, Result};
use yts_protocol::{message, Element, InboundRequest};

/// Parameters for opening an outbound channel.
#[derive(Debug, Clone)]
pub struct ChannelRequest {
    /// Contact to address; bare or full jid.
    pub contact: String,
    pub request_type: RequestType,
    /// Our service, the one asking.
    pub initiator_service: String,
    /// The remote service addressed.
    pub target_service: String,
    pub attributes: BTreeMap<String, String>,
    /// Optional request body; must be a ytstenut message document.
    pub body: Option<String>,
}

/// The single terminal event of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// The remote service answered.
    Replied {
        attributes: BTreeMap<String, String>,
        body: String,
    },
    /// The exchange failed, remotely or by timeout/disconnect.
    Failed(MessageError),
}

/// Lifecycle of a channel. `Created` exists only for outbound channels
/// before their request is sent; inbound channels start at `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Pending,
    Done(ChannelOutcome),
}

impl ChannelState {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelState::Created => "created",
            ChannelState::Pending => "pending",
            ChannelState::Done(ChannelOutcome::Replied { .. }) => "replied",
            ChannelState::Done(ChannelOutcome::Failed(_)) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Done(_))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A request we are about to send (or have sent) to a remote service.
#[derive(Debug)]
pub struct OutboundChannel {
    id: String,
    contact: String,
    address: String,
    request_type: RequestType,
    initiator_service: String,
    target_service: String,
    attributes: BTreeMap<String, String>,
    body: Option<Element>,
    state: ChannelState,
}

impl OutboundChannel {
    /// Validate parameters and build a channel in `Created`. Service
    /// names must fit the dotted-token grammar; a body, if given, must
    /// parse as a ytstenut message document. Nothing is sent here.
    pub(crate) fn create(
        id: String,
        contact: String,
        address: String,
        request_type: RequestType,
        initiator_service: &str,
        target_service: &str,
        attributes: BTreeMap<String, String>,
        body: Option<&str>,
    ) -> Result<Self> {
        validate_service_name(initiator_service)?;
        validate_service_name(target_service)?;
        let body = match body {
            Some(raw) => Some(message::validate_request_body(raw)?),
            None => None,
        };
        Ok(Self {
            id,
            contact,
            address,
            request_type,
            initiator_service: initiator_service.to_owned(),
            target_service: target_service.to_owned(),
            attributes,
            body,
            state: ChannelState::Created,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn initiator_service(&self) -> &str {
        &self.initiator_service
    }

    pub fn target_service(&self) -> &str {
        &self.target_service
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// A channel may only carry a request while still in `Created`.
    /// Anything else is the caller reusing a spent channel.
    pub(crate) fn ensure_created(&self) -> Result<()> {
        match self.state {
            ChannelState::Created => Ok(()),
            ref other => Err(Error::InvalidState(format!(
                "request() needs a fresh channel, this one is {}",
                other.name()
            ))),
        }
    }

    /// Move `Created → Pending`.
    pub(crate) fn begin_request(&mut self) -> Result<()> {
        self.ensure_created()?;
        self.state = ChannelState::Pending;
        Ok(())
    }

    /// Record the terminal outcome. The connection calls this exactly
    /// once per channel.
    pub(crate) fn complete(&mut self, outcome: ChannelOutcome) {
        debug_assert!(
            matches!(self.state, ChannelState::Pending),
            "second terminal on channel {}",
            self.id
        );
        self.state = ChannelState::Done(outcome);
    }

    pub(crate) fn request_iq(&self) -> Element {
        message::build_request_iq(
            &self.id,
            &self.address,
            self.request_type,
            &self.attributes,
            self.body.as_ref(),
            &self.initiator_service,
            &self.target_service,
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A request another service sent us; we owe it one reply or failure.
#[derive(Debug)]
pub struct InboundChannel {
    request: InboundRequest,
    state: ChannelState,
    // capacity slot, held until the channel terminates or is dropped
    permit: Option<OwnedSemaphorePermit>,
}

impl InboundChannel {
    pub(crate) fn new(request: InboundRequest) -> Self {
        Self {
            request,
            state: ChannelState::Pending,
            permit: None,
        }
    }

    pub(crate) fn attach_permit(&mut self, permit: OwnedSemaphorePermit) {
        self.permit = Some(permit);
    }

    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn contact(&self) -> &str {
        &self.request.contact
    }

    pub fn request_type(&self) -> RequestType {
        self.request.request_type
    }

    /// The remote service that asked.
    pub fn initiator_service(&self) -> &str {
        &self.request.initiator_service
    }

    /// The local service addressed.
    pub fn target_service(&self) -> &str {
        &self.request.target_service
    }

    /// Request attributes, minus the service addressing pair.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.request.attributes
    }

    /// The request body as a serialized document.
    pub fn body(&self) -> String {
        self.request.body()
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub(crate) fn ensure_pending(&self) -> Result<()> {
        match self.state {
            ChannelState::Pending => Ok(()),
            ref other => Err(Error::InvalidState(format!(
                "channel already {}",
                other.name()
            ))),
        }
    }

    pub(crate) fn mark_replied(&mut self, attributes: BTreeMap<String, String>, body: String) {
        debug_assert!(matches!(self.state, ChannelState::Pending));
        self.state = ChannelState::Done(ChannelOutcome::Replied { attributes, body });
        self.permit = None;
    }

    pub(crate) fn mark_failed(&mut self, error: MessageError) {
        debug_assert!(matches!(self.state, ChannelState::Pending));
        self.state = ChannelState::Done(ChannelOutcome::Failed(error));
        self.permit = None;
    }

    pub(crate) fn reply_iq(
        &self,
        attributes: &BTreeMap<String, String>,
        body: Option<&Element>,
    ) -> Element {
        self.request.reply_iq(attributes, body)
    }

    pub(crate) fn fail_iq(&self, error: &MessageError) -> Element {
        self.request.fail_iq(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yts_protocol::{parse_request_iq, stanza};

    fn outbound(body: Option<&str>) -> Result<OutboundChannel> {
        OutboundChannel::create(
            "c1".into(),
            "peer@x".into(),
            "peer@x/res".into(),
            RequestType::Get,
            "com.example.Initiator",
            "com.example.Target",
            BTreeMap::new(),
            body,
        )
    }

    #[test]
    fn create_validates_service_names() {
        let bad = OutboundChannel::create(
            "c1".into(),
            "peer@x".into(),
            "peer@x/res".into(),
            RequestType::Get,
            "lol/bags/what's this?!!!!",
            "com.example.Target",
            BTreeMap::new(),
            None,
        );
        assert!(matches!(bad, Err(Error::Validation(_))));
    }

    #[test]
    fn create_validates_the_body() {
        assert!(outbound(Some("<not-even-xml")).is_err());
        assert!(outbound(Some("<wrong xmlns=\"urn:ytstenut:message\"/>")).is_err());
        assert!(outbound(Some("<message xmlns=\"urn:ytstenut:message\"/>")).is_ok());
    }

    #[test]
    fn request_moves_created_to_pending_once() {
        let mut ch = outbound(None).unwrap();
        assert_eq!(ch.state().name(), "created");
        ch.begin_request().unwrap();
        assert_eq!(ch.state().name(), "pending");

        let again = ch.begin_request();
        assert!(matches!(again, Err(Error::InvalidState(_))));
        // rejected call left the state alone
        assert_eq!(ch.state().name(), "pending");
    }

    #[test]
    fn request_after_terminal_is_invalid() {
        let mut ch = outbound(None).unwrap();
        ch.begin_request().unwrap();
        ch.complete(ChannelOutcome::Replied {
            attributes: BTreeMap::new(),
            body: String::new(),
        });
        assert!(ch.state().is_terminal());
        assert!(matches!(
            ch.begin_request(),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn inbound_starts_pending_and_terminates_once() {
        let iq = message::build_request_iq(
            "c2",
            "us@x",
            RequestType::Set,
            &BTreeMap::new(),
            None,
            "remote.svc",
            "local.svc",
        )
        .attr("from", "peer@x/r");
        let mut ch = InboundChannel::new(parse_request_iq(&iq).unwrap());

        assert_eq!(ch.state().name(), "pending");
        ch.ensure_pending().unwrap();
        ch.mark_replied(BTreeMap::new(), String::new());
        assert_eq!(ch.state().name(), "replied");
        assert!(matches!(
            ch.ensure_pending(),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn request_iq_uses_the_stored_address() {
        let mut ch = outbound(None).unwrap();
        ch.begin_request().unwrap();
        let iq = ch.request_iq();
        assert_eq!(stanza::iq_to(&iq), Some("peer@x/res"));
        assert_eq!(stanza::iq_id(&iq), Some("c1"));
        assert_eq!(stanza::iq_type(&iq), Some("get"));
    }
}
