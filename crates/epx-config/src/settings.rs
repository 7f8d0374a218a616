//! Typed view over the merged config tree.
//!
//! Config YAML stores only env var NAMES for credentials
//! (`classifier.api_key_env`). The value is resolved once at startup with
//! [`ClassifierSettings::resolve_api_key`] and redacted in `Debug` output.

use anyhow::{anyhow, Context, Result};
use epx_integrity::{EscalationPolicy, IntegrityConfig};
use serde_json::Value;

pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";
const DEFAULT_CLASSIFIER_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_CLASSIFIER_MODEL: &str = "gemini-pro";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the env var holding the API key (never the key itself).
    pub api_key_env: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub addr: String,
}

/// Everything the proctoring services read from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProctorSettings {
    pub integrity: IntegrityConfig,
    pub classifier: ClassifierSettings,
    pub daemon: DaemonSettings,
}

impl Default for ProctorSettings {
    fn default() -> Self {
        Self {
            integrity: IntegrityConfig::standard_defaults(),
            classifier: ClassifierSettings {
                base_url: DEFAULT_CLASSIFIER_BASE_URL.to_string(),
                model: DEFAULT_CLASSIFIER_MODEL.to_string(),
                api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            },
            daemon: DaemonSettings {
                addr: DEFAULT_DAEMON_ADDR.to_string(),
            },
        }
    }
}

impl ProctorSettings {
    /// Read settings from the merged config JSON. Absent keys take defaults;
    /// present but malformed keys are errors.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();

        if let Some(v) = read_i64(cfg, "/integrity/rate_limit_ms")? {
            if v < 0 {
                return Err(anyhow!("integrity.rate_limit_ms must be >= 0 (got {v})"));
            }
            out.integrity.rate_limit_ms = v;
        }
        if let Some(v) = read_i64(cfg, "/integrity/clock_skew_tolerance_ms")? {
            if v < 0 {
                return Err(anyhow!(
                    "integrity.clock_skew_tolerance_ms must be >= 0 (got {v})"
                ));
            }
            out.integrity.clock_skew_tolerance_ms = v;
        }

        let mut escalation = EscalationPolicy::standard_defaults();
        if let Some(v) = read_i64(cfg, "/escalation/warn_threshold")? {
            if !(0..=100).contains(&v) {
                return Err(anyhow!(
                    "escalation.warn_threshold out of bounds (0..=100): {v}"
                ));
            }
            escalation.warn_threshold = v as u8;
        }
        if let Some(v) = read_i64(cfg, "/escalation/max_session_secs")? {
            if v <= 0 {
                return Err(anyhow!(
                    "escalation.max_session_secs must be > 0 when set (got {v})"
                ));
            }
            escalation.max_session_secs = Some(v as u64);
        }
        out.integrity.escalation = escalation;

        if let Some(s) = read_str(cfg, "/classifier/base_url") {
            out.classifier.base_url = s;
        }
        if let Some(s) = read_str(cfg, "/classifier/model") {
            out.classifier.model = s;
        }
        if let Some(s) = read_str(cfg, "/classifier/api_key_env") {
            out.classifier.api_key_env = s;
        }
        if let Some(s) = read_str(cfg, "/daemon/addr") {
            out.daemon.addr = s;
        }

        Ok(out)
    }
}

/// API key resolved from the environment. **Redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedClassifierKey {
    pub env_var: String,
    pub value: Option<String>,
}

impl std::fmt::Debug for ResolvedClassifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedClassifierKey")
            .field("env_var", &self.env_var)
            .field("value", &self.value.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl ClassifierSettings {
    /// Look up the named env var. Unset or blank resolves to `None`; the
    /// classifier then runs degraded (neutral results).
    pub fn resolve_api_key(&self) -> ResolvedClassifierKey {
        let value = match std::env::var(&self.api_key_env) {
            Ok(v) if !v.trim().is_empty() => Some(v),
            _ => None,
        };
        ResolvedClassifierKey {
            env_var: self.api_key_env.clone(),
            value,
        }
    }
}

/// Non-empty trimmed string at `pointer`, or `None`.
fn read_str(cfg: &Value, pointer: &str) -> Option<String> {
    let s = cfg.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Integer at `pointer`. Accepts a number or a numeric string.
fn read_i64(cfg: &Value, pointer: &str) -> Result<Option<i64>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .with_context(|| format!("config {pointer} must be an integer (got {n})")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("config {pointer} must be an integer (got '{s}')")),
        Some(other) => Err(anyhow!("config {pointer} must be an integer (got {other})")),
    }
}
