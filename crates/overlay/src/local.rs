//! The services we publish ourselves: capability forms, the feature
//! list, the caps ver, and disco#info answers.
//!
//! Registering or removing a service changes the ver, and the
//! connection re-announces presence so peers re-resolve us.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use yts_domain::{
    validate_service_name, ErrorType, IdentityConfig, LocalService, MessageError, Result,
};
use yts_protocol::{
    caps, ns, stanza, CapsToken, DataForm, DiscoIdentity, Element, FormBuilder, HASH_NAME,
};

pub struct LocalServices {
    identity: IdentityConfig,
    services: RwLock<BTreeMap<String, LocalService>>,
}

impl LocalServices {
    pub fn new(identity: IdentityConfig) -> Self {
        Self {
            identity,
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// Publish a service under its id, replacing any previous
    /// registration of the same id.
    pub fn register(&self, service: LocalService) -> Result<()> {
        validate_service_name(&service.id)?;
        tracing::info!(service = %service.id, "local service registered");
        self.services.write().insert(service.id.clone(), service);
        Ok(())
    }

    /// Withdraw a service. Returns false when the id was unknown.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.services.write().remove(id).is_some();
        if removed {
            tracing::info!(service = %id, "local service unregistered");
        }
        removed
    }

    pub fn list(&self) -> Vec<LocalService> {
        self.services.read().values().cloned().collect()
    }

    pub fn disco_identity(&self) -> DiscoIdentity {
        DiscoIdentity {
            category: self.identity.category.clone(),
            identity_type: self.identity.client_type.clone(),
            lang: self.identity.lang.clone(),
            name: self.identity.name.clone(),
        }
    }

    /// One capability form per registered service.
    pub fn forms(&self) -> Vec<DataForm> {
        self.services
            .read()
            .values()
            .map(|service| {
                let mut builder = FormBuilder::new(ns::capability_form_type(&service.id));
                if !service.descriptor.service_type.is_empty() {
                    builder = builder.field(
                        "type",
                        Some("text-single"),
                        vec![service.descriptor.service_type.clone()],
                    );
                }
                if !service.descriptor.names.is_empty() {
                    let values = service
                        .descriptor
                        .names
                        .iter()
                        .map(|(locale, display)| format!("{locale}/{display}"))
                        .collect();
                    builder = builder.field("name", Some("text-multi"), values);
                }
                if !service.descriptor.capabilities.is_empty() {
                    builder = builder.field(
                        "capabilities",
                        Some("text-multi"),
                        service.descriptor.capabilities.iter().cloned().collect(),
                    );
                }
                builder.build()
            })
            .collect()
    }

    /// The `{urn}+notify` features covering every capability our
    /// services subscribe to. Notify features are what make the server
    /// fan that node's pubsub events our way.
    pub fn features(&self) -> Vec<String> {
        let mut features: Vec<String> = self
            .services
            .read()
            .values()
            .flat_map(|s| s.interests.iter())
            .map(|urn| format!("{urn}+notify"))
            .collect();
        features.sort();
        features.dedup();
        features
    }

    /// The token our presence currently advertises.
    pub fn caps_token(&self) -> CapsToken {
        let ver = caps::compute_ver(&self.disco_identity(), &self.features(), &self.forms());
        CapsToken {
            node: self.identity.caps_node.clone(),
            ver,
            hash: HASH_NAME.into(),
        }
    }

    /// Answer a disco#info query for `node`. The bare node, our caps
    /// node, and the current `{node}#{ver}` all get the full reply;
    /// anything else is an item-not-found error.
    pub fn answer_disco(&self, request: &Element, node: &str) -> Element {
        let token = self.caps_token();
        let known = node.is_empty() || node == token.node || node == token.disco_node();
        if known {
            caps::disco_reply(
                request,
                &self.disco_identity(),
                &self.features(),
                &self.forms(),
            )
        } else {
            tracing::debug!(node, "disco query for unknown node");
            stanza::error_reply(
                request,
                &MessageError::new(ErrorType::Cancel).with_stanza_condition("item-not-found"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use yts_domain::ServiceDescriptor;

    fn banshee() -> LocalService {
        LocalService {
            id: "org.gnome.Banshee".into(),
            descriptor: ServiceDescriptor::new("application")
                .with_name("en_GB", "Banshee Media Player")
                .with_capability("urn:ytstenut:capabilities:yts-caps-audio"),
            interests: BTreeSet::from(["urn:ytstenut:capabilities:yts-caps-audio".to_owned()]),
        }
    }

    fn locals() -> LocalServices {
        LocalServices::new(IdentityConfig::default())
    }

    #[test]
    fn register_validates_the_id() {
        let locals = locals();
        let mut bad = banshee();
        bad.id = "banshee".into();
        assert!(locals.register(bad).is_err());
        assert!(locals.list().is_empty());
    }

    #[test]
    fn forms_carry_the_descriptor() {
        let locals = locals();
        locals.register(banshee()).unwrap();

        let forms = locals.forms();
        assert_eq!(forms.len(), 1);
        let form = &forms[0];
        assert_eq!(
            form.form_type.as_deref(),
            Some("urn:ytstenut:capabilities#org.gnome.Banshee")
        );
        assert_eq!(form.first_value("type"), Some("application"));
        assert_eq!(form.values("name"), ["en_GB/Banshee Media Player"]);
        assert_eq!(
            form.values("capabilities"),
            ["urn:ytstenut:capabilities:yts-caps-audio"]
        );
    }

    #[test]
    fn interests_become_notify_features() {
        let locals = locals();
        locals.register(banshee()).unwrap();
        assert_eq!(
            locals.features(),
            vec!["urn:ytstenut:capabilities:yts-caps-audio+notify".to_owned()]
        );
    }

    #[test]
    fn ver_tracks_registration_and_restores() {
        let locals = locals();
        let empty_ver = locals.caps_token().ver;

        locals.register(banshee()).unwrap();
        let with_banshee = locals.caps_token().ver;
        assert_ne!(empty_ver, with_banshee);

        assert!(locals.unregister("org.gnome.Banshee"));
        assert_eq!(locals.caps_token().ver, empty_ver);
        assert!(!locals.unregister("org.gnome.Banshee"));
    }

    #[test]
    fn each_service_gets_its_own_form() {
        let locals = locals();
        locals.register(banshee()).unwrap();
        let banshee_ver = locals.caps_token().ver;

        locals
            .register(LocalService {
                id: "org.gnome.Evince".into(),
                descriptor: ServiceDescriptor::new("application")
                    .with_name("en_GB", "Evince Document Viewer")
                    .with_capability("urn:ytstenut:capabilities:yts-caps-docs"),
                interests: BTreeSet::new(),
            })
            .unwrap();
        assert_ne!(locals.caps_token().ver, banshee_ver);

        let types: Vec<_> = locals
            .forms()
            .iter()
            .filter_map(|f| f.form_type.clone())
            .collect();
        assert_eq!(
            types,
            [
                "urn:ytstenut:capabilities#org.gnome.Banshee",
                "urn:ytstenut:capabilities#org.gnome.Evince",
            ]
        );

        // dropping one restores the previous form set and ver
        assert!(locals.unregister("org.gnome.Evince"));
        assert_eq!(locals.caps_token().ver, banshee_ver);
        assert_eq!(locals.forms().len(), 1);
    }

    #[test]
    fn disco_reply_for_the_current_ver() {
        let locals = locals();
        locals.register(banshee()).unwrap();
        let token = locals.caps_token();

        let request = caps::disco_request("q1", "us@x", &token.disco_node())
            .attr("from", "peer@x/r");
        let reply = locals.answer_disco(&request, &token.disco_node());
        assert_eq!(stanza::iq_type(&reply), Some("result"));
        let query = reply.child_in_ns("query", ns::DISCO_INFO).unwrap();
        assert!(query
            .child_elements()
            .any(|c| c.name() == "x" && c.ns() == ns::DATA_FORMS));
    }

    #[test]
    fn unknown_node_is_item_not_found() {
        let locals = locals();
        let request =
            caps::disco_request("q2", "us@x", "http://elsewhere#stale").attr("from", "peer@x/r");
        let reply = locals.answer_disco(&request, "http://elsewhere#stale");
        assert_eq!(stanza::iq_type(&reply), Some("error"));
        let error = reply.child_named("error").unwrap();
        assert!(error.child_in_ns("item-not-found", ns::STANZAS).is_some());
    }
}
