//! Status broadcast: the `urn:ytstenut:status` element, the pubsub
//! publish iq, and inbound pubsub event notifications.

use crate::element::Element;
use crate::ns;

/// Build the status element published under a capability node. The
/// payload's attributes and children are carried over, then the
/// `from-service` and `capability` attributes are forced. No payload
/// yields the bare two-attribute element, which clears the status.
pub fn build_status_element(
    capability: &str,
    service: &str,
    payload: Option<&Element>,
) -> Element {
    let mut status = Element::new("status", ns::STATUS);
    if let Some(el) = payload {
        for (name, value) in el.attrs() {
            status.set_attr(name, value);
        }
        for node in el.nodes() {
            status.push_node(node.clone());
        }
    }
    status.set_attr("from-service", service);
    status.set_attr("capability", capability);
    status
}

/// A status element is cleared when it has no `activity` attribute and
/// no child elements. Its aggregate value is then the empty string.
pub fn is_cleared(status: &Element) -> bool {
    status.get_attr("activity").is_none() && !status.has_child_elements()
}

/// The value recorded in the aggregate for a status element.
pub fn status_value(status: &Element) -> String {
    if is_cleared(status) {
        String::new()
    } else {
        status.to_xml()
    }
}

/// The iq publishing a status item under the capability node.
pub fn publish_iq(id: &str, capability: &str, status: Element) -> Element {
    crate::stanza::iq("set", id).child(
        Element::new("pubsub", ns::PUBSUB).child(
            Element::new("publish", ns::PUBSUB)
                .attr("node", capability)
                .child(Element::new("item", ns::PUBSUB).child(status)),
        ),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubsubEventItem {
    /// A published status element.
    Status(Element),
    /// A retraction; carries no service, so it addresses every entry
    /// the contact holds under the node.
    Retract,
}

/// One pubsub event notification: the node it concerns and its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsubEvent {
    pub node: String,
    pub items: Vec<PubsubEventItem>,
}

/// Parse a message stanza as a pubsub event notification. Returns
/// `None` for anything else, including events without a node attribute.
pub fn parse_pubsub_event(message: &Element) -> Option<PubsubEvent> {
    if message.name() != "message" {
        return None;
    }
    let event = message.child_in_ns("event", ns::PUBSUB_EVENT)?;
    let items = event.child_named("items")?;
    let node = items.get_attr("node")?.to_owned();

    let mut parsed = Vec::new();
    for child in items.child_elements() {
        match child.name() {
            "item" => {
                if let Some(status) = child.child_in_ns("status", ns::STATUS) {
                    parsed.push(PubsubEventItem::Status(status.clone()));
                }
            }
            "retract" => parsed.push(PubsubEventItem::Retract),
            _ => {}
        }
    }
    Some(PubsubEvent {
        node,
        items: parsed,
    })
}
