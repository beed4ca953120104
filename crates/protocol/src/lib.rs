//! Wire protocol for the ytstenut overlay: the XML element model, the
//! entity-capabilities handshake, status pubsub stanzas, and the
//! message channel iq family.
//!
//! Everything here is pure stanza construction and parsing. Nothing in
//! this crate touches a transport; the overlay crate owns delivery and
//! correlation.

pub mod caps;
pub mod element;
pub mod form;
pub mod message;
pub mod ns;
pub mod parse;
pub mod stanza;
pub mod status;

pub use caps::{
    caps_from_presence, compute_ver, disco_reply, disco_request, parse_disco_request,
    presence_kind, presence_with_caps, CapabilityDocument, CapsToken, DiscoIdentity,
    PresenceKind, HASH_NAME,
};
pub use element::{Element, XmlNode};
pub use form::{DataForm, FormBuilder, FormField};
pub use message::{
    build_request_iq, default_message_element, exposed_attributes, message_child,
    parse_reply, parse_request_iq, validate_request_body, InboundRequest,
};
pub use parse::parse_document;
pub use stanza::{error_from_iq, error_reply, iq, iq_from, iq_id, iq_to, iq_type, new_id, result_reply};
pub use status::{
    build_status_element, is_cleared, parse_pubsub_event, publish_iq, status_value,
    PubsubEvent, PubsubEventItem,
};
