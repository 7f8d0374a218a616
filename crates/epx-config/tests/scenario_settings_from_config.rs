use epx_config::{load_layered_yaml_from_strings, ProctorSettings};

#[test]
fn layered_settings_reach_the_engine_config() {
    let base = r#"
integrity:
  rate_limit_ms: 2000
  clock_skew_tolerance_ms: 1000
escalation:
  warn_threshold: 60
"#;
    let exam = r#"
integrity:
  rate_limit_ms: 3000
escalation:
  warn_threshold: 70
  max_session_secs: 5400
classifier:
  base_url: "http://127.0.0.1:7777"
  model: "gemini-1.5-flash"
daemon:
  addr: "0.0.0.0:9100"
"#;
    let loaded = load_layered_yaml_from_strings(&[base, exam]).unwrap();
    let s = ProctorSettings::from_config_json(&loaded.config_json).unwrap();

    assert_eq!(s.integrity.rate_limit_ms, 3000);
    assert_eq!(s.integrity.clock_skew_tolerance_ms, 1000);
    assert_eq!(s.integrity.escalation.warn_threshold, 70);
    assert_eq!(s.integrity.escalation.max_session_secs, Some(5400));
    assert_eq!(s.classifier.base_url, "http://127.0.0.1:7777");
    assert_eq!(s.classifier.model, "gemini-1.5-flash");
    assert_eq!(s.classifier.api_key_env, "GEMINI_API_KEY");
    assert_eq!(s.daemon.addr, "0.0.0.0:9100");
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let loaded =
        load_layered_yaml_from_strings(&["escalation:\n  warn_threshold: 150\n"]).unwrap();
    let err = ProctorSettings::from_config_json(&loaded.config_json).unwrap_err();
    assert!(err.to_string().contains("warn_threshold"));
}

#[test]
fn negative_rate_limit_is_rejected() {
    let loaded = load_layered_yaml_from_strings(&["integrity:\n  rate_limit_ms: -5\n"]).unwrap();
    assert!(ProctorSettings::from_config_json(&loaded.config_json).is_err());
}

#[test]
fn non_numeric_value_is_rejected_with_pointer() {
    let loaded =
        load_layered_yaml_from_strings(&["integrity:\n  rate_limit_ms: fast\n"]).unwrap();
    let err = ProctorSettings::from_config_json(&loaded.config_json).unwrap_err();
    assert!(format!("{err:#}").contains("/integrity/rate_limit_ms"));
}
