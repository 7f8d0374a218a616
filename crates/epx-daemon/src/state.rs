//! Shared runtime state for epx-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use epx_classifier::{AiContentDetector, GenerativeClient, SimilarityClassifier};
use epx_config::ProctorSettings;
use chrono::Utc;
use epx_integrity::EscalationDecision;
use epx_runtime::{DashboardRow, SessionHandle, SessionRegistry, SessionSnapshot};
use epx_submission::{
    attempt_submission_id, process_closed_attempt, ClosedAttempt, SubmissionRecord,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// How often session timers push elapsed time into their attempt.
pub const SESSION_TICK: Duration = Duration::from_secs(1);

/// How long a closed attempt stays in the live registry (still answering
/// 409 and still on the dashboard) before it is evicted.
pub const CLOSED_SESSION_RETENTION: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    /// Fresh dashboard row after any change to one attempt.
    Attempt(DashboardRow),
    /// Alert or submit decision for one attempt.
    Escalation {
        attempt_id: Uuid,
        decision: EscalationDecision,
    },
    LogLine {
        level: String,
        msg: String,
    },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    pub settings: ProctorSettings,
    /// Hash of the effective config the daemon booted with.
    pub config_hash: String,
    /// Live attempts.
    pub sessions: SessionRegistry,
    pub similarity: Arc<dyn SimilarityClassifier>,
    pub detector: Arc<dyn AiContentDetector>,
    /// Graded submissions by id (in-memory).
    pub submissions: Arc<RwLock<BTreeMap<String, SubmissionRecord>>>,
    pub closed_retention: Duration,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Default settings and a keyless classifier (every classification
    /// degrades to neutral). Used by tests and local smoke runs.
    pub fn new() -> Self {
        Self::from_settings(ProctorSettings::default(), String::new(), None)
    }

    /// Production wiring: one `GenerativeClient` serves both classifier roles.
    pub fn from_settings(
        settings: ProctorSettings,
        config_hash: String,
        api_key: Option<String>,
    ) -> Self {
        let client = Arc::new(
            GenerativeClient::new_with_base_url(
                api_key.unwrap_or_default(),
                settings.classifier.base_url.clone(),
            )
            .with_model(settings.classifier.model.clone()),
        );
        Self::with_classifiers(settings, config_hash, client.clone(), client)
    }

    pub fn with_classifiers(
        settings: ProctorSettings,
        config_hash: String,
        similarity: Arc<dyn SimilarityClassifier>,
        detector: Arc<dyn AiContentDetector>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "epx-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            settings,
            config_hash,
            sessions: SessionRegistry::new(),
            similarity,
            detector,
            submissions: Arc::new(RwLock::new(BTreeMap::new())),
            closed_retention: CLOSED_SESSION_RETENTION,
        }
    }

    pub fn with_closed_retention(mut self, retention: Duration) -> Self {
        self.closed_retention = retention;
        self
    }

    /// Grade a closed attempt from its engine state and store the record.
    ///
    /// Returns `None` while the attempt is still open. Repeated calls return
    /// the first stored record.
    pub async fn finalize_attempt(&self, snap: &SessionSnapshot) -> Option<SubmissionRecord> {
        if !snap.state.is_terminal() {
            return None;
        }
        let attempt_id = snap.attempt_id.to_string();
        let id = attempt_submission_id(&attempt_id);

        let mut store = self.submissions.write().await;
        if let Some(existing) = store.get(&id) {
            return Some(existing.clone());
        }

        let record = process_closed_attempt(
            ClosedAttempt {
                attempt_id: &attempt_id,
                exam_id: snap.exam_id.as_deref().unwrap_or_default(),
                student_id: &snap.student_id,
                integrity: &snap.state.integrity,
                answers: &snap.answers,
                ai_analysis_results: &snap.ai_analyses,
                time_used: i64::try_from(snap.elapsed_secs).unwrap_or(i64::MAX),
            },
            Utc::now(),
        );
        info!(
            %attempt_id,
            submission_id = %record.id,
            phase = snap.state.phase.as_str(),
            final_score = record.final_score,
            "attempt graded"
        );
        store.insert(id, record.clone());
        Some(record)
    }

    /// Emit a log line on the SSE bus. No subscribers is not an error.
    pub fn log_line(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Wait for an attempt to close (submit, force submit, timer), grade it,
/// then evict it from the registry after `closed_retention`.
pub fn spawn_attempt_closer(state: Arc<AppState>, handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        handle.cancel_token().cancelled().await;
        state.finalize_attempt(&handle.snapshot()).await;

        tokio::time::sleep(state.closed_retention).await;
        let attempt_id = handle.attempt_id();
        state.sessions.remove(attempt_id).await;
        debug!(%attempt_id, "closed attempt evicted");
    })
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
