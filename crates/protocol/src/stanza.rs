//! Stanza-level helpers: iq construction, addressing, and the mapping
//! between `<error/>` elements and [`MessageError`].
//!
//! Stanza elements (`iq`, `presence`, `message`) carry no namespace in
//! this model; the stream layer owns whatever stream namespace applies.

use tracing::warn;
use uuid::Uuid;
use yts_domain::{ErrorType, MessageError};

use crate::element::Element;
use crate::ns;

/// Fresh stanza id, unique per connection for the life of the request.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn iq(kind: &str, id: &str) -> Element {
    Element::plain("iq").attr("type", kind).attr("id", id)
}

pub fn is_iq(el: &Element) -> bool {
    el.name() == "iq"
}

pub fn iq_type(el: &Element) -> Option<&str> {
    el.get_attr("type")
}

pub fn iq_id(el: &Element) -> Option<&str> {
    el.get_attr("id")
}

pub fn iq_from(el: &Element) -> Option<&str> {
    el.get_attr("from")
}

pub fn iq_to(el: &Element) -> Option<&str> {
    el.get_attr("to")
}

/// Start a result iq answering `request`: id copied, addresses swapped.
pub fn result_reply(request: &Element) -> Element {
    let mut el = iq("result", request.get_attr("id").unwrap_or_default());
    if let Some(from) = request.get_attr("from") {
        el.set_attr("to", from);
    }
    if let Some(to) = request.get_attr("to") {
        el.set_attr("from", to);
    }
    el
}

/// An error iq answering `request`: the request's payload children are
/// echoed back, followed by an `<error/>` element.
pub fn error_reply(request: &Element, error: &MessageError) -> Element {
    let mut el = result_reply(request);
    el.set_attr("type", "error");
    for child in request.child_elements() {
        el.push_child(child.clone());
    }
    el.push_child(build_error_element(error));
    el
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error element mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build `<error type="…">` with the defined-condition child, the
/// ytstenut condition child, and optional text.
pub fn build_error_element(error: &MessageError) -> Element {
    let mut el = Element::plain("error").attr("type", error.error_type.as_str());
    if let Some(cond) = &error.stanza_condition {
        el.push_child(Element::new(cond.clone(), ns::STANZAS));
    }
    if let Some(cond) = &error.ytstenut_condition {
        el.push_child(Element::new(cond.clone(), ns::MESSAGE));
    }
    if let Some(text) = &error.text {
        el.push_child(Element::new("text", ns::STANZAS).text(text.clone()));
    }
    el
}

/// Translate an `<error/>` element into the typed tuple.
pub fn parse_error_element(el: &Element) -> MessageError {
    let error_type = match el.get_attr("type") {
        Some(nick) => ErrorType::from_wire(nick).unwrap_or_else(|| {
            warn!(nick, "unknown stanza error type, treating as cancel");
            ErrorType::Cancel
        }),
        None => ErrorType::Cancel,
    };

    let stanza_condition = el
        .child_elements()
        .find(|c| c.ns() == ns::STANZAS && c.name() != "text")
        .map(|c| c.name().to_owned());
    let ytstenut_condition = el
        .child_elements()
        .find(|c| c.ns() == ns::MESSAGE)
        .map(|c| c.name().to_owned());
    let text = el
        .child_in_ns("text", ns::STANZAS)
        .map(|c| c.text_content())
        .filter(|t| !t.is_empty());

    MessageError {
        error_type,
        stanza_condition,
        ytstenut_condition,
        text,
    }
}

/// The typed error of an `<iq type="error">`, when the stanza is one.
pub fn error_from_iq(iq_el: &Element) -> Option<MessageError> {
    if iq_type(iq_el) != Some("error") {
        return None;
    }
    match iq_el.child_named("error") {
        Some(err_el) => Some(parse_error_element(err_el)),
        // error iq with no error element still fails the exchange
        None => Some(MessageError::new(ErrorType::Cancel)),
    }
}
