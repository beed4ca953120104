use yts_domain::config::{Config, ConfigSeverity};

#[test]
fn default_caps_node_is_set() {
    let config = Config::default();
    assert_eq!(config.identity.caps_node, "http://ytstenut.org/overlay");
}

#[test]
fn default_config_only_warns_about_the_jid() {
    let issues = Config::default().validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert_eq!(issues[0].field, "identity.jid");
}

#[test]
fn configured_jid_validates_clean() {
    let config: Config =
        toml::from_str("[identity]\njid = \"alice@example.org\"\n").unwrap();
    assert!(config.validate().is_empty());
}

#[test]
fn explicit_sections_parse() {
    let toml_str = r#"
[identity]
caps_node = "http://example.org/peer"

[timeouts]
iq_secs = 10

[channels]
max_pending_per_contact = 8
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.identity.caps_node, "http://example.org/peer");
    assert_eq!(config.timeouts.iq_secs, 10);
    assert_eq!(config.channels.max_pending_per_contact, 8);
    // untouched sections keep defaults
    assert_eq!(config.timeouts.request_secs, 60);
    assert_eq!(config.channels.max_pending_global, 256);
}

#[test]
fn empty_caps_node_is_an_error() {
    let mut config = Config::default();
    config.identity.jid = "a@x".into();
    config.identity.caps_node = String::new();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Error);
    assert_eq!(issues[0].field, "identity.caps_node");
}

#[test]
fn zero_timeouts_and_caps_are_errors() {
    let mut config = Config::default();
    config.identity.jid = "a@x".into();
    config.timeouts.iq_secs = 0;
    config.timeouts.request_secs = 0;
    config.channels.max_pending_per_contact = 0;
    let errors = config
        .validate()
        .into_iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    assert_eq!(errors, 3);
}

#[test]
fn global_cap_below_per_contact_warns() {
    let mut config = Config::default();
    config.identity.jid = "a@x".into();
    config.channels.max_pending_global = 8;
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert!(issues[0].to_string().contains("max_pending_global"));
}
