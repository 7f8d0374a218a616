use epx_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy,
};

const YAML: &str = r#"
integrity:
  rate_limit_ms: 2000
escalation:
  warn_threshold: 60
classifier:
  model: "gemini-pro"
daemon:
  addr: "127.0.0.1:9000"
legacy:
  proctor_mode: "strict"
"#;

#[test]
fn warn_returns_report_with_unused_leaves() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(report.mode, "DAEMON");
    assert_eq!(report.unused_leaf_pointers, vec!["/legacy/proctor_mode".to_string()]);
    assert!(!report.is_clean());
}

#[test]
fn replay_mode_does_not_consume_daemon_sections() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Replay, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/classifier/model".to_string(),
            "/daemon/addr".to_string(),
            "/legacy/proctor_mode".to_string(),
        ]
    );
}

#[test]
fn fail_policy_errors_on_unused() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS (mode=DAEMON)"), "got: {msg}");
    assert!(msg.contains("/legacy/proctor_mode"));
}

#[test]
fn fail_policy_passes_on_clean_config() {
    let clean = "integrity:\n  rate_limit_ms: 1500\nescalation:\n  max_session_secs: 5400\n";
    let loaded = load_layered_yaml_from_strings(&[clean]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Replay, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
