//! Entity capabilities: the presence `c` token, disco#info queries and
//! replies, capability documents, and the ver digest.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use yts_domain::{Error, Result, ServiceDescriptor};

use crate::element::Element;
use crate::form::DataForm;
use crate::ns;

/// Digest name advertised in the caps `hash` attribute.
pub const HASH_NAME: &str = "sha-256";

/// The capability token a contact advertises in presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsToken {
    pub node: String,
    pub ver: String,
    pub hash: String,
}

impl CapsToken {
    /// The disco node a query for this token targets.
    pub fn disco_node(&self) -> String {
        format!("{}#{}", self.node, self.ver)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Presence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Available,
    Unavailable,
}

/// Classify a presence stanza. Subscription management and errors are
/// not presence in this sense and return `None`.
pub fn presence_kind(el: &Element) -> Option<PresenceKind> {
    if el.name() != "presence" {
        return None;
    }
    match el.get_attr("type") {
        None => Some(PresenceKind::Available),
        Some("unavailable") => Some(PresenceKind::Unavailable),
        Some(_) => None,
    }
}

/// The caps token carried by a presence stanza, if any.
pub fn caps_from_presence(el: &Element) -> Option<CapsToken> {
    let c = el.child_in_ns("c", ns::CAPS)?;
    Some(CapsToken {
        node: c.get_attr("node")?.to_owned(),
        ver: c.get_attr("ver")?.to_owned(),
        hash: c.get_attr("hash").unwrap_or_default().to_owned(),
    })
}

/// Available presence advertising our caps token.
pub fn presence_with_caps(token: &CapsToken) -> Element {
    Element::plain("presence").child(
        Element::new("c", ns::CAPS)
            .attr("hash", &token.hash)
            .attr("node", &token.node)
            .attr("ver", &token.ver),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Disco#info
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The identity element of our disco replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoIdentity {
    pub category: String,
    pub identity_type: String,
    pub lang: String,
    pub name: String,
}

pub fn disco_request(id: &str, to: &str, node: &str) -> Element {
    crate::stanza::iq("get", id)
        .attr("to", to)
        .child(Element::new("query", ns::DISCO_INFO).attr("node", node))
}

/// The node a disco#info get targets: `Some(node)` when the stanza is
/// such a query (node may be empty for a bare query).
pub fn parse_disco_request(iq_el: &Element) -> Option<String> {
    if crate::stanza::iq_type(iq_el) != Some("get") {
        return None;
    }
    let query = iq_el.child_in_ns("query", ns::DISCO_INFO)?;
    Some(query.get_attr("node").unwrap_or_default().to_owned())
}

/// Answer a disco#info query with our identity, features, and forms.
pub fn disco_reply(
    request: &Element,
    identity: &DiscoIdentity,
    features: &[String],
    forms: &[DataForm],
) -> Element {
    let mut query = Element::new("query", ns::DISCO_INFO);
    if let Some(node) = request
        .child_in_ns("query", ns::DISCO_INFO)
        .and_then(|q| q.get_attr("node"))
    {
        query.set_attr("node", node);
    }

    let mut id_el = Element::new("identity", ns::DISCO_INFO)
        .attr("category", &identity.category)
        .attr("type", &identity.identity_type)
        .attr("name", &identity.name);
    if !identity.lang.is_empty() {
        id_el.set_attr("xml:lang", &identity.lang);
    }
    query.push_child(id_el);

    for feature in features {
        query.push_child(Element::new("feature", ns::DISCO_INFO).attr("var", feature));
    }
    for form in forms {
        query.push_child(form.to_element());
    }

    crate::stanza::result_reply(request).child(query)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The resolved capabilities behind one ver hash: the data forms found
/// in the disco reply, deduplicated by `FORM_TYPE`. Immutable once
/// built; cached for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDocument {
    pub ver: String,
    pub forms: Vec<DataForm>,
}

impl CapabilityDocument {
    /// Parse a disco#info result. Forms sharing a `FORM_TYPE` value are
    /// all dropped (that fragment failed); forms without one cannot be
    /// keyed and are dropped too. A reply with no forms at all is a
    /// valid, empty document.
    pub fn from_disco_reply(ver: impl Into<String>, reply: &Element) -> Result<Self> {
        let query = reply
            .child_in_ns("query", ns::DISCO_INFO)
            .ok_or_else(|| Error::Protocol("disco reply without query element".into()))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut parsed = Vec::new();
        for x in query
            .child_elements()
            .filter(|c| c.name() == "x" && c.ns() == ns::DATA_FORMS)
        {
            let form = DataForm::from_element(x)?;
            if let Some(ft) = &form.form_type {
                *counts.entry(ft.clone()).or_default() += 1;
            }
            parsed.push(form);
        }
        let forms = parsed
            .into_iter()
            .filter(|f| match &f.form_type {
                Some(ft) => counts.get(ft) == Some(&1),
                None => false,
            })
            .collect();

        Ok(Self {
            ver: ver.into(),
            forms,
        })
    }

    /// An empty document (contact with no resolvable capabilities).
    pub fn empty(ver: impl Into<String>) -> Self {
        Self {
            ver: ver.into(),
            forms: Vec::new(),
        }
    }

    /// The service descriptors this document describes, keyed by id.
    /// Forms whose `FORM_TYPE` is not a ytstenut capability form are
    /// not services and yield nothing.
    pub fn services(&self) -> BTreeMap<String, ServiceDescriptor> {
        let mut out = BTreeMap::new();
        for form in &self.forms {
            let Some(ft) = &form.form_type else { continue };
            let Some(id) = ns::service_id_from_form_type(ft) else {
                continue;
            };
            let mut descriptor = ServiceDescriptor::new(
                form.first_value("type").unwrap_or("application"),
            );
            for value in form.values("name") {
                // values are locale/display pairs split at the first slash
                if let Some((locale, display)) = value.split_once('/') {
                    descriptor
                        .names
                        .insert(locale.to_owned(), display.to_owned());
                }
            }
            for urn in form.values("capabilities") {
                descriptor.capabilities.insert(urn.clone());
            }
            out.insert(id.to_owned(), descriptor);
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ver digest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the caps ver string over an identity, feature set, and form
/// set: the XEP-0115 concatenation digested with SHA-256, hex-encoded.
pub fn compute_ver(identity: &DiscoIdentity, features: &[String], forms: &[DataForm]) -> String {
    let mut s = String::new();

    // single identity today, but sorted-by-string is the defined order
    let mut identities = vec![format!(
        "{}/{}/{}/{}",
        identity.category, identity.identity_type, identity.lang, identity.name
    )];
    identities.sort();
    for i in identities {
        s.push_str(&i);
        s.push('<');
    }

    let mut feats: Vec<&str> = features.iter().map(String::as_str).collect();
    feats.sort_unstable();
    for f in feats {
        s.push_str(f);
        s.push('<');
    }

    let mut sorted_forms: Vec<&DataForm> = forms.iter().collect();
    sorted_forms.sort_by_key(|f| f.form_type.clone().unwrap_or_default());
    for form in sorted_forms {
        s.push_str(form.form_type.as_deref().unwrap_or_default());
        s.push('<');
        let mut fields: Vec<_> = form
            .fields
            .iter()
            .filter(|f| f.var != "FORM_TYPE")
            .collect();
        fields.sort_by(|a, b| a.var.cmp(&b.var));
        for field in fields {
            s.push_str(&field.var);
            s.push('<');
            let mut values: Vec<&str> = field.values.iter().map(String::as_str).collect();
            values.sort_unstable();
            for v in values {
                s.push_str(v);
                s.push('<');
            }
        }
    }

    hex::encode(Sha256::digest(s.as_bytes()))
}
