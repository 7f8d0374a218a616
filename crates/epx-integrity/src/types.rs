use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AttemptPhase, EscalationPolicy, Severity, SignalKind};

/// Score every attempt starts from (and returns to on an explicit reset).
pub const MAX_SCORE: u8 = 100;

/// Engine policy config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Same-kind signals closer together than this are suppressed.
    pub rate_limit_ms: i64,

    /// A signal older than the last accepted one of its kind by more than this
    /// is rejected as out-of-order. Within the tolerance it is debounced.
    pub clock_skew_tolerance_ms: i64,

    pub escalation: EscalationPolicy,
}

impl IntegrityConfig {
    pub fn standard_defaults() -> Self {
        Self {
            rate_limit_ms: 2_000,
            clock_skew_tolerance_ms: 1_000,
            escalation: EscalationPolicy::standard_defaults(),
        }
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self::standard_defaults()
    }
}

/// Log entry for one accepted signal. Never edited after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub kind: SignalKind,
    pub severity: Severity,
    pub ts_millis: i64,
    /// Applied delta (<= 0). Reflects the floor at zero only through `score`,
    /// the record keeps the nominal delta.
    pub score_delta: i32,
    pub detail: String,
}

/// Score + violation log for one attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityState {
    pub score: u8,
    pub attention_score: u8,
    /// Append-only, detection order. The engine never truncates it.
    pub violations: Vec<ViolationRecord>,
    /// Last accepted timestamp per kind (debounce + ordering).
    pub last_signal_ts: BTreeMap<SignalKind, i64>,
}

impl IntegrityState {
    pub fn new() -> Self {
        Self {
            score: MAX_SCORE,
            attention_score: MAX_SCORE,
            violations: Vec::new(),
            last_signal_ts: BTreeMap::new(),
        }
    }

    /// Explicit session reset: the only operation that raises the score.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn last_violation(&self) -> Option<&ViolationRecord> {
        self.violations.last()
    }

    pub fn violation_count(&self, kind: SignalKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

impl Default for IntegrityState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the engine owns for one attempt: the integrity state plus the
/// escalation phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    pub integrity: IntegrityState,
    pub phase: AttemptPhase,
}

impl AttemptState {
    pub fn new() -> Self {
        Self {
            integrity: IntegrityState::new(),
            phase: AttemptPhase::Active,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

impl Default for AttemptState {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one signal inside the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalOutcome {
    /// Recorded; `score_after` already reflects the floor at zero.
    Accepted {
        violation: ViolationRecord,
        score_after: u8,
    },
    /// Debounced: nothing recorded, nothing changed.
    Suppressed { kind: SignalKind },
}

impl SignalOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, SignalOutcome::Suppressed { .. })
    }
}
