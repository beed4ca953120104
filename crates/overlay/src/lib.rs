//! `yts-overlay`: presence-driven peer discovery, status, and one-shot
//! messaging over an abstract stanza transport.
//!
//! The overlay watches contact presence for entity-capability tokens,
//! resolves them into service descriptors through cached disco#info
//! queries, aggregates per-service status advertisements, and carries
//! one-shot request/reply channels between named services. The XMPP
//! stream itself (TLS, SASL, roster) stays outside: whatever owns it
//! implements [`Transport`] and feeds stanzas in as [`TransportEvent`]s.
//!
//! # Flow
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Your stream layer (XMPP client, link-local, test harness) │
//! │                                                            │
//! │   let (transport, wire_rx) = …;   // impl Transport        │
//! │   let (events_tx, events_rx) = mpsc::channel(64);          │
//! │                                                            │
//! │   let conn = OverlayConnection::start(                     │
//! │       Config::load("overlay.toml")?,                       │
//! │       Arc::new(transport),                                 │
//! │       events_rx,                                           │
//! │   ).await?;                                                │
//! │                                                            │
//! │   conn.register_service(banshee)?;                         │
//! │   let mut events = conn.subscribe();                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Presence with a changed caps token starts a resolution: cache hit or
//! one shared disco#info round trip per ver. The resolved capability
//! document is diffed against the contact's previous service table and
//! surfaces as `ServiceAdded`/`ServiceRemoved` events plus the
//! [`discovered_services`](OverlayConnection::discovered_services)
//! snapshot. Status pubsub events and message channels ride alongside,
//! sharing contact identities and service names.

pub mod caps_cache;
pub mod channel;
pub mod connection;
pub mod contacts;
pub mod correlate;
pub mod discovery;
pub mod events;
pub mod local;
pub mod status;
pub mod transport;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use channel::{ChannelOutcome, ChannelRequest, ChannelState, InboundChannel, OutboundChannel};
pub use connection::OverlayConnection;
pub use contacts::{bare_jid, ContactPresence, ContactRegistry};
pub use discovery::{diff_services, ServiceDiff, ServiceSnapshot, ServiceTable};
pub use events::OverlayEvent;
pub use local::LocalServices;
pub use status::{StatusChange, StatusSnapshot};
pub use transport::{channel_transport, ChannelTransport, Transport, TransportEvent};

// Re-export the vocabulary types so embedders rarely need yts-domain directly.
pub use yts_domain::{
    Config, Error, ErrorType, LocalService, MessageError, RequestType, Result, ServiceDescriptor,
};
