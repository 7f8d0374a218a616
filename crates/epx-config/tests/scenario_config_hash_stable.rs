//! Config hash stability.
//!
//! - Same input twice gives the same hash.
//! - Key order within YAML does not change the hash.
//! - Later layers override earlier ones.

use epx_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
integrity:
  rate_limit_ms: 2000
  clock_skew_tolerance_ms: 1000
escalation:
  warn_threshold: 60
classifier:
  model: "gemini-pro"
  api_key_env: "GEMINI_API_KEY"
"#;

const BASE_YAML_REORDERED: &str = r#"
classifier:
  api_key_env: "GEMINI_API_KEY"
  model: "gemini-pro"
escalation:
  warn_threshold: 60
integrity:
  clock_skew_tolerance_ms: 1000
  rate_limit_ms: 2000
"#;

const EXAM_OVERLAY_YAML: &str = r#"
escalation:
  max_session_secs: 3600
integrity:
  rate_limit_ms: 5000
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn overlay_changes_hash_and_values() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, EXAM_OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let rl = merged
        .config_json
        .pointer("/integrity/rate_limit_ms")
        .and_then(|v| v.as_i64())
        .unwrap();
    assert_eq!(rl, 5000);

    // untouched sibling survives the merge
    let tol = merged
        .config_json
        .pointer("/integrity/clock_skew_tolerance_ms")
        .and_then(|v| v.as_i64())
        .unwrap();
    assert_eq!(tol, 1000);
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn files_load_like_strings() {
    let dir = std::env::temp_dir().join(format!("epx-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let base = dir.join("base.yaml");
    let overlay = dir.join("exam.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&overlay, EXAM_OVERLAY_YAML).unwrap();

    let from_files = epx_config::load_layered_yaml(&[
        base.to_str().unwrap(),
        overlay.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, EXAM_OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_an_error_naming_the_path() {
    let err = epx_config::load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}
