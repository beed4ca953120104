//! Events the overlay pushes to observers.

use std::collections::BTreeMap;

use serde::Serialize;
use yts_domain::{MessageError, ServiceDescriptor};

/// Everything observable about the overlay, broadcast to every
/// subscriber. Lossy under backpressure like any broadcast channel;
/// the snapshot queries remain authoritative.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayEvent {
    /// A service appeared on a contact.
    ServiceAdded {
        contact: String,
        service_id: String,
        service: ServiceDescriptor,
    },
    /// A service left a contact's table.
    ServiceRemoved { contact: String, service_id: String },
    /// A status advertisement (or clear) was applied to the aggregate.
    StatusChanged {
        contact: String,
        capability: String,
        service: String,
        status: String,
    },
    /// An outbound channel reached its reply.
    ChannelReplied {
        contact: String,
        id: String,
        attributes: BTreeMap<String, String>,
        body: String,
    },
    /// An outbound channel failed.
    ChannelFailed {
        contact: String,
        id: String,
        error: MessageError,
    },
}
