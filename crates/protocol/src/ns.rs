//! Wire namespaces. These must match the protocol byte for byte.

/// One-shot request/reply message payloads.
pub const MESSAGE: &str = "urn:ytstenut:message";

/// Ephemeral per-service status elements.
pub const STATUS: &str = "urn:ytstenut:status";

/// Base URN for capability forms; a service's `FORM_TYPE` is
/// `{CAPABILITIES}#{service_id}`.
pub const CAPABILITIES: &str = "urn:ytstenut:capabilities";

/// `x` data forms.
pub const DATA_FORMS: &str = "jabber:x:data";

/// Service discovery queries and replies.
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";

/// The presence `c` capability token.
pub const CAPS: &str = "http://jabber.org/protocol/caps";

/// Outbound status publishes.
pub const PUBSUB: &str = "http://jabber.org/protocol/pubsub";

/// Inbound status event notifications.
pub const PUBSUB_EVENT: &str = "http://jabber.org/protocol/pubsub#event";

/// Defined stanza-error conditions and the `text` element.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// Build the capability-form `FORM_TYPE` value for a service id.
pub fn capability_form_type(service_id: &str) -> String {
    format!("{CAPABILITIES}#{service_id}")
}

/// The service id a capability-form `FORM_TYPE` names, if it is one.
pub fn service_id_from_form_type(form_type: &str) -> Option<&str> {
    let rest = form_type.strip_prefix(CAPABILITIES)?;
    let id = rest.strip_prefix('#')?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
