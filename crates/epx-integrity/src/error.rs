use thiserror::Error;

use crate::{AttemptPhase, SignalKind};

/// Why a signal was refused before it touched any state.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum InvalidSignalReason {
    /// Wire kind string is not part of the closed [`SignalKind`] set.
    #[error("unknown signal kind '{0}'")]
    UnknownKind(String),

    /// Score-delta overrides are only honoured from trusted producers.
    #[error("score delta override from untrusted source")]
    UntrustedDeltaOverride,

    /// A delta override must never raise the score.
    #[error("score delta override must be <= 0 (got {0})")]
    PositiveDeltaOverride(i32),

    /// Timestamp is older than the last accepted one for this kind by more
    /// than the configured clock-skew tolerance.
    #[error("out-of-order {kind:?} signal: ts={ts_millis} last={last_ts_millis}")]
    OutOfOrder {
        kind: SignalKind,
        ts_millis: i64,
        last_ts_millis: i64,
    },

    /// AI-content signals must carry the likelihood they were banded from.
    #[error("AI-content signal without ai_likelihood")]
    MissingAiLikelihood,

    #[error("ai_likelihood {0} outside 0..=100")]
    LikelihoodOutOfRange(f64),

    /// The likelihood does not fall into the band the kind claims.
    #[error("{kind:?} does not match ai_likelihood {likelihood}")]
    AiBandMismatch { kind: SignalKind, likelihood: f64 },
}

/// Errors returned by the engine. State is never mutated when one is returned.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum IntegrityError {
    #[error("invalid signal: {0}")]
    InvalidSignal(InvalidSignalReason),

    #[error("session already terminal ({})", .phase.as_str())]
    SessionAlreadyTerminal { phase: AttemptPhase },
}

impl From<InvalidSignalReason> for IntegrityError {
    fn from(r: InvalidSignalReason) -> Self {
        IntegrityError::InvalidSignal(r)
    }
}
