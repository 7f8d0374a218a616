//! Escalation policy over the attempt lifecycle.
//!
//! # Invariants
//!
//! - **Terminal phases are sticky**: once `ForceSubmitted` or
//!   `NormallySubmitted` is reached, evaluation never leaves it and the
//!   engine refuses every further signal.
//!
//! - **Warn once**: `Active -> Warned` emits a single `Alert` the first time
//!   the score drops below the warn threshold. Later evaluations in `Warned`
//!   report `Continue`.
//!
//! - **Score exhaustion beats the timer**: when the score hits zero in the
//!   same evaluation in which the session duration runs out, the reported
//!   reason is `score-exhausted`.
//!
//! All logic is pure deterministic: no IO, no clock. Elapsed time is supplied.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Force-submit reason
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum ForceSubmitReason {
    /// Integrity score reached zero.
    ScoreExhausted,
    /// Configured maximum session duration elapsed.
    SessionTimeout,
    /// External hard stop (e.g. camera permission permanently denied).
    HardStop { cause: String },
}

impl ForceSubmitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForceSubmitReason::ScoreExhausted => "score-exhausted",
            ForceSubmitReason::SessionTimeout => "session-timeout",
            ForceSubmitReason::HardStop { .. } => "hard-stop",
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt phase
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AttemptPhase {
    Active,
    Warned,
    ForceSubmitted { reason: ForceSubmitReason },
    NormallySubmitted,
}

impl AttemptPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptPhase::Active => "active",
            AttemptPhase::Warned => "warned",
            AttemptPhase::ForceSubmitted { .. } => "force_submitted",
            AttemptPhase::NormallySubmitted => "normally_submitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptPhase::ForceSubmitted { .. } | AttemptPhase::NormallySubmitted
        )
    }
}

// ---------------------------------------------------------------------------
// Policy + decision
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// `Active -> Warned` when score drops strictly below this.
    pub warn_threshold: u8,
    /// Force-submit once elapsed session time reaches this. `None` = no cap.
    pub max_session_secs: Option<u64>,
}

impl EscalationPolicy {
    pub fn standard_defaults() -> Self {
        Self {
            warn_threshold: 60,
            max_session_secs: None,
        }
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::standard_defaults()
    }
}

/// What the caller should do after an evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    Continue,
    /// Advisory: show the student a warning. State is not touched further.
    Alert,
    /// Stop producers and submit the attempt now.
    ForceSubmit,
    /// Attempt was submitted normally.
    Submitted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub action: EscalationAction,
    /// Phase after this evaluation.
    pub phase: AttemptPhase,
}

impl EscalationDecision {
    pub fn reason(&self) -> Option<&ForceSubmitReason> {
        match &self.phase {
            AttemptPhase::ForceSubmitted { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Evaluate the phase transition for a resulting score and elapsed time.
pub fn evaluate(
    policy: &EscalationPolicy,
    phase: &AttemptPhase,
    score: u8,
    elapsed_secs: u64,
) -> EscalationDecision {
    match phase {
        AttemptPhase::ForceSubmitted { .. } => {
            return EscalationDecision {
                action: EscalationAction::ForceSubmit,
                phase: phase.clone(),
            };
        }
        AttemptPhase::NormallySubmitted => {
            return EscalationDecision {
                action: EscalationAction::Submitted,
                phase: phase.clone(),
            };
        }
        AttemptPhase::Active | AttemptPhase::Warned => {}
    }

    // Order matters: score exhaustion is reported ahead of the timer.
    if score == 0 {
        return force(ForceSubmitReason::ScoreExhausted);
    }
    if let Some(max) = policy.max_session_secs {
        if elapsed_secs >= max {
            return force(ForceSubmitReason::SessionTimeout);
        }
    }

    if *phase == AttemptPhase::Active && score < policy.warn_threshold {
        return EscalationDecision {
            action: EscalationAction::Alert,
            phase: AttemptPhase::Warned,
        };
    }

    EscalationDecision {
        action: EscalationAction::Continue,
        phase: phase.clone(),
    }
}

fn force(reason: ForceSubmitReason) -> EscalationDecision {
    EscalationDecision {
        action: EscalationAction::ForceSubmit,
        phase: AttemptPhase::ForceSubmitted { reason },
    }
}
