//! epx-integrity
//!
//! Integrity scoring + violation aggregation for one exam attempt.
//!
//! Architectural decisions:
//! - One signal in, one decision out (single writer per attempt)
//! - Score only decays; the only way back up is an explicit session reset
//! - Same-kind signal storms are debounced, AI-content results never are
//! - Terminal phases are sticky: nothing is applied after a submit
//!
//! Pure deterministic logic. No IO, no wall-clock. Callers supply signal
//! timestamps and the elapsed session time.

mod engine;
mod error;
mod escalation;
mod signal;
mod types;

pub use engine::{
    apply_signal, attention_from_sample, hard_stop, observe_camera, reduce, submit, tick,
    SignalReport,
};
pub use error::{IntegrityError, InvalidSignalReason};
pub use escalation::{
    evaluate, AttemptPhase, EscalationAction, EscalationDecision, EscalationPolicy,
    ForceSubmitReason,
};
pub use signal::{
    AiBand, AiDetection, CameraSample, DeltaOverride, Gaze, Severity, Signal, SignalEnvelope, SignalKind,
    SignalOrigin,
};
pub use types::*;
