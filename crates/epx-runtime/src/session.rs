use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use epx_integrity::{
    apply_signal, hard_stop, observe_camera, submit, tick, AiDetection, AttemptState,
    CameraSample, EscalationAction, EscalationDecision, IntegrityConfig, IntegrityError, Signal,
    SignalOutcome, SignalReport,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{CancelToken, RuntimeError};

/// Bounded so a runaway producer backs up instead of growing memory.
const COMMAND_QUEUE_DEPTH: usize = 256;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable view of one attempt, republished after every command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub attempt_id: Uuid,
    pub student_id: String,
    #[serde(default)]
    pub exam_id: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Latest elapsed reading supplied to the session.
    pub elapsed_secs: u64,
    pub state: AttemptState,
    pub last_decision: Option<EscalationDecision>,
    /// Latest answer text per question id.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// AI-content analysis per question id (only answers long enough to classify).
    #[serde(default)]
    pub ai_analyses: BTreeMap<String, AiDetection>,
}

/// Outcome of one camera frame: the refreshed attention score plus one
/// report per violation the frame raised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraReport {
    pub attention_score: u8,
    pub reports: Vec<SignalReport>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, IntegrityError>>;

enum SessionCommand {
    Signal {
        signal: Signal,
        reply: Reply<SignalReport>,
    },
    Camera {
        sample: CameraSample,
        ts_millis: i64,
        reply: Reply<CameraReport>,
    },
    Answer {
        question_id: String,
        text: String,
        detection: Option<AiDetection>,
        ts_millis: i64,
        reply: Reply<Option<SignalReport>>,
    },
    Tick {
        elapsed_secs: u64,
        reply: Reply<EscalationDecision>,
    },
    HardStop {
        cause: String,
        reply: Reply<EscalationDecision>,
    },
    Submit {
        reply: Reply<EscalationDecision>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable front door to one session task.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    attempt_id: Uuid,
    tx: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cancel: CancelToken,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionCommand::Signal { .. } => "Signal",
            SessionCommand::Camera { .. } => "Camera",
            SessionCommand::Answer { .. } => "Answer",
            SessionCommand::Tick { .. } => "Tick",
            SessionCommand::HardStop { .. } => "HardStop",
            SessionCommand::Submit { .. } => "Submit",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    /// Latest published snapshot. Never waits on the session task.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every republished snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Flipped on the first terminal transition. Producers stop when it fires.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot.borrow().state.is_terminal()
    }

    pub async fn signal(&self, signal: Signal) -> Result<SignalReport, RuntimeError> {
        self.request(|reply| SessionCommand::Signal { signal, reply })
            .await
    }

    pub async fn camera(
        &self,
        sample: CameraSample,
        ts_millis: i64,
    ) -> Result<CameraReport, RuntimeError> {
        self.request(|reply| SessionCommand::Camera {
            sample,
            ts_millis,
            reply,
        })
        .await
    }

    /// Record one answer and, when its AI analysis reaches the low band,
    /// apply the matching signal. Nothing is recorded when the signal is
    /// rejected.
    pub async fn answer(
        &self,
        question_id: impl Into<String>,
        text: impl Into<String>,
        detection: Option<AiDetection>,
        ts_millis: i64,
    ) -> Result<Option<SignalReport>, RuntimeError> {
        let question_id = question_id.into();
        let text = text.into();
        self.request(|reply| SessionCommand::Answer {
            question_id,
            text,
            detection,
            ts_millis,
            reply,
        })
        .await
    }

    pub async fn tick(&self, elapsed_secs: u64) -> Result<EscalationDecision, RuntimeError> {
        self.request(|reply| SessionCommand::Tick {
            elapsed_secs,
            reply,
        })
        .await
    }

    pub async fn hard_stop(
        &self,
        cause: impl Into<String>,
    ) -> Result<EscalationDecision, RuntimeError> {
        let cause = cause.into();
        self.request(|reply| SessionCommand::HardStop { cause, reply })
            .await
    }

    pub async fn submit(&self) -> Result<EscalationDecision, RuntimeError> {
        self.request(|reply| SessionCommand::Submit { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| RuntimeError::SessionClosed(self.attempt_id))?;
        let res = rx
            .await
            .map_err(|_| RuntimeError::SessionClosed(self.attempt_id))?;
        Ok(res?)
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

/// Start the single writer for one attempt.
///
/// The task lives until every [`SessionHandle`] is dropped. After a terminal
/// transition it keeps answering, refusing every command with
/// `SessionAlreadyTerminal`.
pub fn spawn_session(
    attempt_id: Uuid,
    student_id: impl Into<String>,
    exam_id: Option<String>,
    cfg: IntegrityConfig,
) -> SessionHandle {
    let student_id = student_id.into();
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let initial = SessionSnapshot {
        attempt_id,
        student_id,
        exam_id,
        started_at: Utc::now(),
        elapsed_secs: 0,
        state: AttemptState::new(),
        last_decision: None,
        answers: BTreeMap::new(),
        ai_analyses: BTreeMap::new(),
    };
    let (snap_tx, snap_rx) = watch::channel(initial.clone());
    let cancel = CancelToken::new();

    info!(%attempt_id, student_id = %initial.student_id, "session opened");

    let actor = SessionActor {
        cfg,
        snap: initial,
        snap_tx,
        cancel: cancel.clone(),
    };
    tokio::spawn(actor.run(rx));

    SessionHandle {
        attempt_id,
        tx,
        snapshot: snap_rx,
        cancel,
    }
}

struct SessionActor {
    cfg: IntegrityConfig,
    snap: SessionSnapshot,
    snap_tx: watch::Sender<SessionSnapshot>,
    cancel: CancelToken,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        // Replies go out only after the snapshot is published, so a caller
        // that awaited a command always observes its effect.
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SessionCommand::Signal { signal, reply } => {
                    let res = self.on_signal(&signal);
                    self.settle();
                    let _ = reply.send(res);
                }
                SessionCommand::Camera {
                    sample,
                    ts_millis,
                    reply,
                } => {
                    let res = self.on_camera(&sample, ts_millis);
                    self.settle();
                    let _ = reply.send(res);
                }
                SessionCommand::Answer {
                    question_id,
                    text,
                    detection,
                    ts_millis,
                    reply,
                } => {
                    let res = self.on_answer(question_id, text, detection, ts_millis);
                    self.settle();
                    let _ = reply.send(res);
                }
                SessionCommand::Tick {
                    elapsed_secs,
                    reply,
                } => {
                    let res = self.on_tick(elapsed_secs);
                    self.settle();
                    let _ = reply.send(res);
                }
                SessionCommand::HardStop { cause, reply } => {
                    let res = hard_stop(&mut self.snap.state, cause);
                    if let Ok(d) = &res {
                        self.note_decision(d);
                    }
                    self.settle();
                    let _ = reply.send(res);
                }
                SessionCommand::Submit { reply } => {
                    let res = submit(&mut self.snap.state);
                    if let Ok(d) = &res {
                        self.note_decision(d);
                    }
                    self.settle();
                    let _ = reply.send(res);
                }
            }
        }
        debug!(attempt_id = %self.snap.attempt_id, "session task exiting; all handles dropped");
    }

    fn on_signal(&mut self, signal: &Signal) -> Result<SignalReport, IntegrityError> {
        let attempt_id = self.snap.attempt_id;
        match apply_signal(&self.cfg, &mut self.snap.state, signal, self.snap.elapsed_secs) {
            Ok(report) => {
                match &report.outcome {
                    SignalOutcome::Accepted { score_after, .. } => debug!(
                        %attempt_id,
                        kind = signal.kind.as_str(),
                        score = *score_after,
                        "signal accepted"
                    ),
                    SignalOutcome::Suppressed { .. } => debug!(
                        %attempt_id,
                        kind = signal.kind.as_str(),
                        "signal debounced"
                    ),
                }
                self.note_decision(&report.decision);
                Ok(report)
            }
            Err(e) => {
                warn!(%attempt_id, kind = signal.kind.as_str(), error = %e, "signal rejected");
                Err(e)
            }
        }
    }

    /// A frame is all-or-nothing: attention and every violation it raises
    /// are worked out on a copy and committed only if all of them apply.
    fn on_camera(
        &mut self,
        sample: &CameraSample,
        ts_millis: i64,
    ) -> Result<CameraReport, IntegrityError> {
        let attempt_id = self.snap.attempt_id;
        let mut next = self.snap.state.clone();
        let attention_score = observe_camera(&mut next, sample)?;

        let mut reports = Vec::new();
        for signal in sample.violation_signals(ts_millis) {
            // A frame can exhaust the score; later violations of it are moot.
            if next.is_terminal() {
                break;
            }
            match apply_signal(&self.cfg, &mut next, &signal, self.snap.elapsed_secs) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(%attempt_id, kind = signal.kind.as_str(), error = %e, "camera frame rejected");
                    return Err(e);
                }
            }
        }

        self.snap.state = next;
        debug!(
            %attempt_id,
            attention = attention_score,
            violations = reports.len(),
            score = self.snap.state.integrity.score,
            "camera frame applied"
        );
        for report in &reports {
            self.note_decision(&report.decision);
        }
        Ok(CameraReport {
            attention_score,
            reports,
        })
    }

    fn on_answer(
        &mut self,
        question_id: String,
        text: String,
        detection: Option<AiDetection>,
        ts_millis: i64,
    ) -> Result<Option<SignalReport>, IntegrityError> {
        if self.snap.state.is_terminal() {
            return Err(IntegrityError::SessionAlreadyTerminal {
                phase: self.snap.state.phase.clone(),
            });
        }

        let report = match detection.as_ref().and_then(|d| d.to_signal(ts_millis)) {
            Some(signal) => Some(self.on_signal(&signal)?),
            None => None,
        };

        self.snap.answers.insert(question_id.clone(), text);
        if let Some(d) = detection {
            self.snap.ai_analyses.insert(question_id, d);
        }
        Ok(report)
    }

    fn on_tick(&mut self, elapsed_secs: u64) -> Result<EscalationDecision, IntegrityError> {
        // Elapsed readings never go backwards.
        self.snap.elapsed_secs = self.snap.elapsed_secs.max(elapsed_secs);
        let d = tick(&self.cfg, &mut self.snap.state, self.snap.elapsed_secs)?;
        self.note_decision(&d);
        Ok(d)
    }

    fn note_decision(&mut self, d: &EscalationDecision) {
        let attempt_id = self.snap.attempt_id;
        let score = self.snap.state.integrity.score;
        match d.action {
            EscalationAction::Alert => {
                info!(%attempt_id, score, "integrity below warn threshold");
            }
            EscalationAction::ForceSubmit | EscalationAction::Submitted => {
                let reason = d.reason().map(|r| r.as_str()).unwrap_or("submitted");
                info!(%attempt_id, score, reason, "attempt closed");
            }
            EscalationAction::Continue => {}
        }
        self.snap.last_decision = Some(d.clone());
    }

    /// Publish the snapshot, then stop producers on the first terminal
    /// transition. Watchers of the token always see the terminal snapshot.
    fn settle(&self) {
        self.snap_tx.send_replace(self.snap.clone());
        if self.snap.state.is_terminal() && !self.cancel.is_cancelled() {
            debug!(attempt_id = %self.snap.attempt_id, "stopping producers");
            self.cancel.cancel();
        }
    }
}
