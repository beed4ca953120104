//! The `urn:ytstenut:message` request/reply wire layer: request,
//! reply, and failure iqs, plus the attribute/body views channels
//! expose.

use std::collections::BTreeMap;

use yts_domain::{Error, MessageError, RequestType, Result};

use crate::element::Element;
use crate::ns;
use crate::stanza;

/// Attributes the wire layer owns. They are forced on outgoing
/// elements and stripped from the exposed attribute view.
const SERVICE_ATTRS: [&str; 2] = ["from-service", "to-service"];

/// Parse a caller-supplied request body. The root must be a `message`
/// element in the ytstenut namespace.
pub fn validate_request_body(body: &str) -> Result<Element> {
    let el = crate::parse::parse_document(body)?;
    if el.name() != "message" || el.ns() != ns::MESSAGE {
        return Err(Error::Validation(format!(
            "request body root must be message in {}, got {}",
            ns::MESSAGE,
            el.name()
        )));
    }
    Ok(el)
}

/// The bare message element used when no body is supplied.
pub fn default_message_element() -> Element {
    Element::new("message", ns::MESSAGE)
}

/// The ytstenut message child of an iq, if any.
pub fn message_child(iq: &Element) -> Option<&Element> {
    iq.child_in_ns("message", ns::MESSAGE)
}

/// The attribute view a channel exposes: every attribute except the
/// service addressing pair.
pub fn exposed_attributes(message: &Element) -> BTreeMap<String, String> {
    message
        .attrs()
        .filter(|(k, _)| !SERVICE_ATTRS.contains(k))
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// The body view a channel exposes: the full serialized document.
pub fn body_string(message: &Element) -> String {
    message.to_document()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the request iq an outbound channel sends. Request attributes
/// override same-named body attributes, then the service pair is
/// forced.
pub fn build_request_iq(
    id: &str,
    to: &str,
    request_type: RequestType,
    attributes: &BTreeMap<String, String>,
    body: Option<&Element>,
    initiator_service: &str,
    target_service: &str,
) -> Element {
    let mut message = body.cloned().unwrap_or_else(default_message_element);
    for (k, v) in attributes {
        message.set_attr(k.clone(), v.clone());
    }
    message.set_attr("from-service", initiator_service);
    message.set_attr("to-service", target_service);

    stanza::iq(request_type.as_str(), id)
        .attr("to", to)
        .child(message)
}

/// The attribute and body views of a correlated result iq. A result
/// without a message child reads as the empty message element.
pub fn parse_reply(iq: &Element) -> (BTreeMap<String, String>, String) {
    let message = message_child(iq)
        .cloned()
        .unwrap_or_else(default_message_element);
    (exposed_attributes(&message), body_string(&message))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An unsolicited request another service sent us, as handed to an
/// inbound channel. Missing service attributes read as empty strings.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub id: String,
    pub contact: String,
    pub request_type: RequestType,
    /// The remote service that sent the request (`from-service`).
    pub initiator_service: String,
    /// The local service addressed (`to-service`).
    pub target_service: String,
    pub attributes: BTreeMap<String, String>,
    /// The message element as received.
    pub message: Element,
    // original iq, kept for the failure echo
    stanza: Element,
}

/// Recognize an iq as a ytstenut request. Anything without an id, a
/// sender, a get/set type, and a ytstenut message child is not one.
pub fn parse_request_iq(iq: &Element) -> Option<InboundRequest> {
    let kind = stanza::iq_type(iq)?;
    let request_type = RequestType::from_wire(kind)?;
    let id = stanza::iq_id(iq)?.to_owned();
    let contact = stanza::iq_from(iq)?.to_owned();
    let message = message_child(iq)?.clone();

    let attr = |name: &str| message.get_attr(name).unwrap_or_default().to_owned();
    Some(InboundRequest {
        id,
        contact,
        request_type,
        initiator_service: attr("from-service"),
        target_service: attr("to-service"),
        attributes: exposed_attributes(&message),
        message,
        stanza: iq.clone(),
    })
}

impl InboundRequest {
    pub fn body(&self) -> String {
        body_string(&self.message)
    }

    /// The result iq answering this request. The service pair is
    /// swapped so the reply reads from the answering service.
    pub fn reply_iq(
        &self,
        attributes: &BTreeMap<String, String>,
        body: Option<&Element>,
    ) -> Element {
        let mut message = body.cloned().unwrap_or_else(default_message_element);
        for (k, v) in attributes {
            message.set_attr(k.clone(), v.clone());
        }
        message.set_attr("from-service", &self.target_service);
        message.set_attr("to-service", &self.initiator_service);
        stanza::result_reply(&self.stanza).child(message)
    }

    /// The error iq failing this request: the original request echoed
    /// back plus the error element.
    pub fn fail_iq(&self, error: &MessageError) -> Element {
        stanza::error_reply(&self.stanza, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yts_domain::ErrorType;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn body_must_be_a_ytstenut_message() {
        assert!(validate_request_body(r#"<message xmlns="urn:ytstenut:message"/>"#).is_ok());
        assert!(validate_request_body(r#"<message/>"#).is_err());
        assert!(validate_request_body(r#"<note xmlns="urn:ytstenut:message"/>"#).is_err());
        assert!(validate_request_body("<unclosed").is_err());
    }

    #[test]
    fn request_iq_forces_service_attributes() {
        let body = validate_request_body(concat!(
            r#"<message xmlns="urn:ytstenut:message" from-service="spoof.er" "#,
            r#"activity="chat">payload</message>"#,
        ))
        .unwrap();
        let iq = build_request_iq(
            "c1",
            "peer@example.com/res",
            RequestType::Get,
            &attrs(&[("activity", "game")]),
            Some(&body),
            "com.example.Initiator",
            "com.example.Target",
        );
        assert_eq!(
            iq.to_xml(),
            concat!(
                r#"<iq id="c1" to="peer@example.com/res" type="get">"#,
                r#"<message xmlns="urn:ytstenut:message" activity="game" "#,
                r#"from-service="com.example.Initiator" to-service="com.example.Target">"#,
                r#"payload</message></iq>"#,
            )
        );
    }

    #[test]
    fn no_body_yields_bare_message_element() {
        let iq = build_request_iq(
            "c2",
            "peer@x",
            RequestType::Set,
            &BTreeMap::new(),
            None,
            "a.b",
            "c.d",
        );
        let message = message_child(&iq).unwrap();
        assert!(!message.has_child_elements());
        assert_eq!(
            message.to_document(),
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
                "<message xmlns=\"urn:ytstenut:message\" from-service=\"a.b\" ",
                "to-service=\"c.d\"/>\n",
            )
        );
    }

    #[test]
    fn exposed_attributes_hide_the_service_pair() {
        let iq = build_request_iq(
            "c3",
            "peer@x",
            RequestType::Get,
            &attrs(&[("k", "v")]),
            None,
            "a.b",
            "c.d",
        );
        let view = exposed_attributes(message_child(&iq).unwrap());
        assert_eq!(view, attrs(&[("k", "v")]));
    }

    #[test]
    fn inbound_round_trip() {
        let iq = build_request_iq(
            "c4",
            "us@example.com",
            RequestType::Set,
            &attrs(&[("first", "1")]),
            None,
            "com.example.Remote",
            "com.example.Local",
        )
        .attr("from", "peer@example.com/res");

        let inbound = parse_request_iq(&iq).unwrap();
        assert_eq!(inbound.id, "c4");
        assert_eq!(inbound.contact, "peer@example.com/res");
        assert_eq!(inbound.request_type, RequestType::Set);
        assert_eq!(inbound.initiator_service, "com.example.Remote");
        assert_eq!(inbound.target_service, "com.example.Local");
        assert_eq!(inbound.attributes, attrs(&[("first", "1")]));
    }

    #[test]
    fn result_iqs_are_not_requests() {
        let iq = stanza::iq("result", "c5").attr("from", "peer@x");
        assert!(parse_request_iq(&iq).is_none());
    }

    #[test]
    fn reply_swaps_the_service_pair() {
        let request = build_request_iq(
            "c6",
            "us@x",
            RequestType::Get,
            &BTreeMap::new(),
            None,
            "com.example.Remote",
            "com.example.Local",
        )
        .attr("from", "peer@x/r");
        let inbound = parse_request_iq(&request).unwrap();

        let reply = inbound.reply_iq(&attrs(&[("answer", "42")]), None);
        assert_eq!(stanza::iq_type(&reply), Some("result"));
        assert_eq!(stanza::iq_id(&reply), Some("c6"));
        assert_eq!(stanza::iq_to(&reply), Some("peer@x/r"));
        let message = message_child(&reply).unwrap();
        assert_eq!(message.get_attr("from-service"), Some("com.example.Local"));
        assert_eq!(message.get_attr("to-service"), Some("com.example.Remote"));
        assert_eq!(message.get_attr("answer"), Some("42"));
    }

    #[test]
    fn fail_echoes_request_and_carries_error() {
        let request = build_request_iq(
            "c7",
            "us@x",
            RequestType::Get,
            &attrs(&[("a", "1")]),
            None,
            "r.s",
            "l.s",
        )
        .attr("from", "peer@x/r");
        let inbound = parse_request_iq(&request).unwrap();

        let error = MessageError::new(ErrorType::Auth)
            .with_stanza_condition("not-authorized")
            .with_ytstenut_condition("custom-condition")
            .with_text("denied");
        let fail = inbound.fail_iq(&error);

        assert_eq!(stanza::iq_type(&fail), Some("error"));
        assert_eq!(stanza::iq_id(&fail), Some("c7"));
        let echoed = message_child(&fail).unwrap();
        assert_eq!(echoed.get_attr("a"), Some("1"));
        let error_el = fail.child_named("error").unwrap();
        assert_eq!(error_el.get_attr("type"), Some("auth"));
        assert!(error_el
            .child_in_ns("not-authorized", ns::STANZAS)
            .is_some());
        assert!(error_el
            .child_in_ns("custom-condition", ns::MESSAGE)
            .is_some());
        assert_eq!(
            error_el
                .child_in_ns("text", ns::STANZAS)
                .map(|t| t.text_content()),
            Some("denied".to_owned())
        );
    }

    #[test]
    fn reply_without_message_child_reads_empty() {
        let bare = stanza::iq("result", "c8");
        let (attributes, body) = parse_reply(&bare);
        assert!(attributes.is_empty());
        assert_eq!(
            body,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<message xmlns=\"urn:ytstenut:message\"/>\n"
        );
    }
}
