use crate::{
    evaluate, AttemptPhase, AttemptState, CameraSample, EscalationAction, EscalationDecision,
    ForceSubmitReason, Gaze, IntegrityConfig, IntegrityError, InvalidSignalReason, Signal,
    SignalOutcome, ViolationRecord, MAX_SCORE,
};

/// Result of one `apply_signal` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalReport {
    pub outcome: SignalOutcome,
    pub decision: EscalationDecision,
}

fn refuse_if_terminal(st: &AttemptState) -> Result<(), IntegrityError> {
    if st.phase.is_terminal() {
        return Err(IntegrityError::SessionAlreadyTerminal {
            phase: st.phase.clone(),
        });
    }
    Ok(())
}

/// Attention estimate for one camera frame, computed fresh from 100.
///
/// Gaze away -20 (other non-center -5), no face -25, several faces -15,
/// -10 per suspicious-activity flag. Clamped to 0..=100.
pub fn attention_from_sample(sample: &CameraSample) -> u8 {
    let mut score: i64 = MAX_SCORE as i64;

    match sample.gaze {
        Gaze::Away => score -= 20,
        Gaze::Center => {}
        _ => score -= 5,
    }

    if sample.face_count > 1 {
        score -= 15;
    } else if sample.face_count == 0 {
        score -= 25;
    }

    score -= 10 * sample.suspicious_activity.len() as i64;

    score.clamp(0, MAX_SCORE as i64) as u8
}

/// Apply one signal to the attempt and evaluate escalation.
///
/// Inputs:
/// - signal: validated detection (see `SignalEnvelope::into_signal`)
/// - elapsed_secs: session time supplied by the caller (engine owns no clock)
///
/// On `Err` the state is untouched.
pub fn apply_signal(
    cfg: &IntegrityConfig,
    st: &mut AttemptState,
    signal: &Signal,
    elapsed_secs: u64,
) -> Result<SignalReport, IntegrityError> {
    // Sticky terminal phases take precedence.
    refuse_if_terminal(st)?;

    // Validate everything before touching state.
    let delta = signal.effective_delta()?;
    signal.check_ai_band()?;

    let kind = signal.kind;
    let last = st.integrity.last_signal_ts.get(&kind).copied();

    // Timestamps are producer-supplied: all arithmetic on them saturates.
    if let Some(last_ts) = last {
        if signal.ts_millis < last_ts.saturating_sub(cfg.clock_skew_tolerance_ms) {
            return Err(InvalidSignalReason::OutOfOrder {
                kind,
                ts_millis: signal.ts_millis,
                last_ts_millis: last_ts,
            }
            .into());
        }
    }

    // 1) Debounce same-kind storms.
    let suppressed = kind.is_rate_limited()
        && last.is_some_and(|last_ts| signal.ts_millis.saturating_sub(last_ts) < cfg.rate_limit_ms);

    let outcome = if suppressed {
        SignalOutcome::Suppressed { kind }
    } else {
        // 2) Attention is overwritten from the frame that drove the signal.
        if kind.carries_camera_sample() {
            if let Some(sample) = &signal.camera {
                st.integrity.attention_score = attention_from_sample(sample);
            }
        }

        // 3) Score decay, floored at zero.
        let next = (st.integrity.score as i32 + delta).clamp(0, MAX_SCORE as i32);
        st.integrity.score = next as u8;

        let violation = ViolationRecord {
            kind,
            severity: kind.severity(),
            ts_millis: signal.ts_millis,
            score_delta: delta,
            detail: signal.detail.clone(),
        };
        st.integrity.violations.push(violation.clone());
        st.integrity.last_signal_ts.insert(kind, signal.ts_millis);

        SignalOutcome::Accepted {
            violation,
            score_after: st.integrity.score,
        }
    };

    // 4) Escalation runs after every call, suppressed or not.
    let decision = evaluate(
        &cfg.escalation,
        &st.phase,
        st.integrity.score,
        elapsed_secs,
    );
    st.phase = decision.phase.clone();

    Ok(SignalReport { outcome, decision })
}

/// Value-in/value-out form of [`apply_signal`]: the input state is left
/// untouched and the successor is returned alongside the report.
pub fn reduce(
    cfg: &IntegrityConfig,
    st: &AttemptState,
    signal: &Signal,
    elapsed_secs: u64,
) -> Result<(AttemptState, SignalReport), IntegrityError> {
    let mut next = st.clone();
    let report = apply_signal(cfg, &mut next, signal, elapsed_secs)?;
    Ok((next, report))
}

/// Timer-only evaluation (no signal). Used to enforce the session cap when
/// producers are quiet.
pub fn tick(
    cfg: &IntegrityConfig,
    st: &mut AttemptState,
    elapsed_secs: u64,
) -> Result<EscalationDecision, IntegrityError> {
    refuse_if_terminal(st)?;

    let decision = evaluate(
        &cfg.escalation,
        &st.phase,
        st.integrity.score,
        elapsed_secs,
    );
    st.phase = decision.phase.clone();
    Ok(decision)
}

/// Update the attention score from a camera frame that raised no violation.
///
/// Does not touch `score` or `violations`.
pub fn observe_camera(st: &mut AttemptState, sample: &CameraSample) -> Result<u8, IntegrityError> {
    refuse_if_terminal(st)?;
    st.integrity.attention_score = attention_from_sample(sample);
    Ok(st.integrity.attention_score)
}

/// External hard stop (camera permission permanently denied, proctor abort).
pub fn hard_stop(
    st: &mut AttemptState,
    cause: impl Into<String>,
) -> Result<EscalationDecision, IntegrityError> {
    refuse_if_terminal(st)?;

    st.phase = AttemptPhase::ForceSubmitted {
        reason: ForceSubmitReason::HardStop {
            cause: cause.into(),
        },
    };
    Ok(EscalationDecision {
        action: EscalationAction::ForceSubmit,
        phase: st.phase.clone(),
    })
}

/// Student-initiated or timer-expired submission. Independent of score.
pub fn submit(st: &mut AttemptState) -> Result<EscalationDecision, IntegrityError> {
    refuse_if_terminal(st)?;

    st.phase = AttemptPhase::NormallySubmitted;
    Ok(EscalationDecision {
        action: EscalationAction::Submitted,
        phase: st.phase.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignalKind;

    #[test]
    fn attention_terms_combine() {
        let s = CameraSample {
            face_count: 0,
            gaze: Gaze::Away,
            suspicious_activity: vec!["a".into(), "b".into()],
        };
        // 100 - 20 - 25 - 20
        assert_eq!(attention_from_sample(&s), 35);

        let s = CameraSample {
            face_count: 2,
            gaze: Gaze::Left,
            suspicious_activity: vec![],
        };
        assert_eq!(attention_from_sample(&s), 80);
    }

    #[test]
    fn attention_clamps_at_zero() {
        let s = CameraSample {
            face_count: 0,
            gaze: Gaze::Away,
            suspicious_activity: vec!["x".into(); 12],
        };
        assert_eq!(attention_from_sample(&s), 0);
    }

    #[test]
    fn suppressed_signal_leaves_timestamp_alone() {
        let cfg = IntegrityConfig::standard_defaults();
        let mut st = AttemptState::new();
        apply_signal(&cfg, &mut st, &Signal::new(SignalKind::TabHidden, 1_000), 0).unwrap();
        let r = apply_signal(&cfg, &mut st, &Signal::new(SignalKind::TabHidden, 2_500), 0).unwrap();
        assert!(r.outcome.is_suppressed());
        assert_eq!(
            st.integrity.last_signal_ts.get(&SignalKind::TabHidden),
            Some(&1_000)
        );
    }

    #[test]
    fn camera_signal_overwrites_attention() {
        let cfg = IntegrityConfig::standard_defaults();
        let mut st = AttemptState::new();
        let sample = CameraSample {
            face_count: 1,
            gaze: Gaze::Away,
            suspicious_activity: vec![],
        };
        let sig = Signal::new(SignalKind::GazeAway, 0).with_camera(sample);
        apply_signal(&cfg, &mut st, &sig, 0).unwrap();
        assert_eq!(st.integrity.attention_score, 80);

        observe_camera(
            &mut st,
            &CameraSample {
                face_count: 1,
                gaze: Gaze::Center,
                suspicious_activity: vec![],
            },
        )
        .unwrap();
        assert_eq!(st.integrity.attention_score, 100);
        assert_eq!(st.integrity.score, 95);
    }
}
