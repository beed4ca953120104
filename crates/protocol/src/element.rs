//! The XML element tree stanzas are built from and parsed into.
//!
//! Namespaces are resolved: every element carries its namespace URI
//! directly, and prefixes from parsed input do not survive. Serialization
//! is deterministic: `xmlns` first (only where the namespace changes from
//! the parent context), remaining attributes in sorted order, empty
//! elements self-closed.

use std::collections::BTreeMap;
use std::fmt;

/// A child of an element: a nested element or character data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    ns: String,
    attrs: BTreeMap<String, String>,
    children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>, ns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ns: ns.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// An element with no namespace (stanza-level elements live here).
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    // ── attributes ──────────────────────────────────────────────────

    /// Builder-style attribute set.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        self.attrs.remove(key)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    // ── children ────────────────────────────────────────────────────

    /// Builder-style child element append.
    pub fn child(mut self, el: Element) -> Self {
        self.children.push(XmlNode::Element(el));
        self
    }

    /// Builder-style text append.
    pub fn text(mut self, s: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(s.into()));
        self
    }

    pub fn push_child(&mut self, el: Element) {
        self.children.push(XmlNode::Element(el));
    }

    pub fn push_text(&mut self, s: impl Into<String>) {
        self.children.push(XmlNode::Text(s.into()));
    }

    pub fn push_node(&mut self, node: XmlNode) {
        self.children.push(node);
    }

    pub fn nodes(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    pub fn first_child(&self) -> Option<&Element> {
        self.child_elements().next()
    }

    pub fn child_named(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    pub fn child_in_ns(&self, name: &str, ns: &str) -> Option<&Element> {
        self.child_elements()
            .find(|el| el.name == name && el.ns == ns)
    }

    pub fn has_child_elements(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated character data of the direct text children.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    // ── serialization ───────────────────────────────────────────────

    /// Serialize without a document declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, "");
        out
    }

    /// Serialize as a standalone document:
    /// `<?xml version="1.0" encoding="UTF-8"?>\n{element}\n`.
    pub fn to_document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write(&mut out, "");
        out.push('\n');
        out
    }

    fn write(&self, out: &mut String, parent_ns: &str) {
        out.push('<');
        out.push_str(&self.name);
        if self.ns != parent_ns {
            out.push_str(" xmlns=\"");
            escape_into(&self.ns, true, out);
            out.push('"');
        }
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                XmlNode::Element(el) => el.write(out, &self.ns),
                XmlNode::Text(t) => escape_into(t, false, out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

fn escape_into(s: &str, in_attr: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_element_self_closes() {
        let el = Element::new("message", "urn:ytstenut:message");
        assert_eq!(el.to_xml(), r#"<message xmlns="urn:ytstenut:message"/>"#);
    }

    #[test]
    fn document_form_has_declaration_and_newlines() {
        let el = Element::new("message", "urn:ytstenut:message");
        assert_eq!(
            el.to_document(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <message xmlns=\"urn:ytstenut:message\"/>\n"
        );
    }

    #[test]
    fn attributes_serialize_sorted_after_xmlns() {
        let el = Element::new("message", "urn:ytstenut:message")
            .attr("to-service", "b")
            .attr("from-service", "a");
        assert_eq!(
            el.to_xml(),
            r#"<message xmlns="urn:ytstenut:message" from-service="a" to-service="b"/>"#
        );
    }

    #[test]
    fn children_inherit_namespace_silently() {
        let el = Element::new("message", "urn:ytstenut:message")
            .child(Element::new("lol", "urn:ytstenut:message").text("hi"));
        assert_eq!(
            el.to_xml(),
            r#"<message xmlns="urn:ytstenut:message"><lol>hi</lol></message>"#
        );
    }

    #[test]
    fn namespace_change_emits_xmlns() {
        let el = Element::plain("error").child(
            Element::new("conflict", "urn:ietf:params:xml:ns:xmpp-stanzas"),
        );
        assert_eq!(
            el.to_xml(),
            r#"<error><conflict xmlns="urn:ietf:params:xml:ns:xmpp-stanzas"/></error>"#
        );
    }

    #[test]
    fn text_and_attr_escaping() {
        let el = Element::plain("t").attr("a", "x\"<&").text("a < b & c");
        assert_eq!(el.to_xml(), r#"<t a="x&quot;&lt;&amp;">a &lt; b &amp; c</t>"#);
    }

    #[test]
    fn text_content_concatenates() {
        let el = Element::plain("t")
            .text("one ")
            .child(Element::plain("sep"))
            .text("two");
        assert_eq!(el.text_content(), "one two");
    }

    #[test]
    fn child_lookup_by_name_and_ns() {
        let el = Element::plain("iq")
            .child(Element::new("message", "urn:ytstenut:message"))
            .child(Element::plain("error"));
        assert!(el.child_named("error").is_some());
        assert!(el.child_in_ns("message", "urn:ytstenut:message").is_some());
        assert!(el.child_in_ns("message", "urn:other").is_none());
    }
}
