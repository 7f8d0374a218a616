//! `epx replay`: feed a recorded signal log through the integrity engine.
//!
//! Input is JSONL, one `SignalEnvelope` per line. Blank lines and lines
//! starting with `#` are skipped. A rejected line never stops the replay;
//! it is reported and the next line is applied to the unchanged state.

use anyhow::{Context, Result};
use epx_config::ConfigMode;
use epx_integrity::{
    apply_signal, tick, AttemptState, EscalationAction, EscalationDecision, IntegrityConfig,
    SignalEnvelope, SignalOutcome, SignalReport,
};
use tracing::{info, warn};

pub struct ReplayArgs {
    pub signals_path: String,
    pub config_paths: Vec<String>,
    pub elapsed_from_ts: bool,
    pub strict_config: bool,
    pub json: bool,
}

/// Per-line result of a replay.
#[derive(Debug)]
pub enum LineOutcome {
    Applied {
        line: usize,
        kind: String,
        report: SignalReport,
    },
    /// Well formed but reports nothing (AI likelihood in the minimal band).
    /// Escalation is still evaluated so a session cap fires on time.
    NoSignal {
        line: usize,
        decision: EscalationDecision,
    },
    Rejected {
        line: usize,
        reason: String,
    },
}

#[derive(Debug)]
pub struct ReplayRun {
    pub state: AttemptState,
    pub lines: Vec<LineOutcome>,
}

impl ReplayRun {
    pub fn rejected(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, LineOutcome::Rejected { .. }))
            .count()
    }
}

pub fn run(args: ReplayArgs) -> Result<()> {
    let (loaded, settings) =
        super::load_settings(&args.config_paths, ConfigMode::Replay, args.strict_config)?;

    let input = std::fs::read_to_string(&args.signals_path)
        .with_context(|| format!("read signals failed: {}", args.signals_path))?;

    let replay = replay_str(&settings.integrity, &input, args.elapsed_from_ts);

    for line in &replay.lines {
        println!("{}", render_line(line));
    }

    let st = &replay.state;
    println!(
        "score={} attention={} phase={} violations={} rejected={} config_hash={}",
        st.integrity.score,
        st.integrity.attention_score,
        st.phase.as_str(),
        st.integrity.violations.len(),
        replay.rejected(),
        loaded.config_hash
    );
    info!(
        score = st.integrity.score,
        phase = st.phase.as_str(),
        lines = replay.lines.len(),
        rejected = replay.rejected(),
        "replay finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(st)?);
    }

    Ok(())
}

/// Replay `input` against a fresh attempt. Pure apart from logging.
///
/// With `elapsed_from_ts`, elapsed session time is derived from the first
/// envelope's timestamp and never moves backwards. Otherwise it stays at 0
/// and only score thresholds can escalate.
pub fn replay_str(cfg: &IntegrityConfig, input: &str, elapsed_from_ts: bool) -> ReplayRun {
    let mut st = AttemptState::new();
    let mut lines = Vec::new();
    let mut origin_ts: Option<i64> = None;
    let mut elapsed_secs: u64 = 0;

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let env: SignalEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                lines.push(reject(line, format!("malformed envelope: {e}")));
                continue;
            }
        };

        if elapsed_from_ts {
            let origin = *origin_ts.get_or_insert(env.ts_millis);
            let since = (env.ts_millis.saturating_sub(origin).max(0) / 1_000) as u64;
            elapsed_secs = elapsed_secs.max(since);
        }

        let kind = env.kind.clone();
        let signal = match env.into_signal() {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                match tick(cfg, &mut st, elapsed_secs) {
                    Ok(decision) => lines.push(LineOutcome::NoSignal { line, decision }),
                    Err(e) => lines.push(reject(line, e.to_string())),
                }
                continue;
            }
            Err(e) => {
                lines.push(reject(line, e.to_string()));
                continue;
            }
        };

        match apply_signal(cfg, &mut st, &signal, elapsed_secs) {
            Ok(report) => lines.push(LineOutcome::Applied {
                line,
                kind: signal.kind.as_str().to_string(),
                report,
            }),
            Err(e) => {
                warn!(line, kind = %kind, error = %e, "signal rejected");
                lines.push(LineOutcome::Rejected {
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }

    ReplayRun { state: st, lines }
}

fn reject(line: usize, reason: String) -> LineOutcome {
    warn!(line, reason = %reason, "line rejected");
    LineOutcome::Rejected { line, reason }
}

fn action_str(action: EscalationAction) -> &'static str {
    match action {
        EscalationAction::Continue => "continue",
        EscalationAction::Alert => "alert",
        EscalationAction::ForceSubmit => "force_submit",
        EscalationAction::Submitted => "submitted",
    }
}

fn render_decision(d: &EscalationDecision) -> String {
    let mut out = format!("action={} phase={}", action_str(d.action), d.phase.as_str());
    if let Some(reason) = d.reason() {
        out.push_str(" reason=");
        out.push_str(reason.as_str());
    }
    out
}

pub fn render_line(outcome: &LineOutcome) -> String {
    match outcome {
        LineOutcome::Applied { line, kind, report } => {
            let applied = match &report.outcome {
                SignalOutcome::Accepted {
                    violation,
                    score_after,
                } => format!(
                    "outcome=accepted delta={} score={}",
                    violation.score_delta, score_after
                ),
                SignalOutcome::Suppressed { .. } => "outcome=suppressed".to_string(),
            };
            format!(
                "line={line} kind={kind} {applied} {}",
                render_decision(&report.decision)
            )
        }
        LineOutcome::NoSignal { line, decision } => {
            format!("line={line} outcome=no_signal {}", render_decision(decision))
        }
        LineOutcome::Rejected { line, reason } => {
            format!("line={line} rejected reason=\"{reason}\"")
        }
    }
}
