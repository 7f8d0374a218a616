//! Request and response types for all epx-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use epx_classifier::{AiDetection, SimilarityAnalysis};
use epx_integrity::{AttemptPhase, CameraSample, EscalationDecision, SignalOutcome};
use epx_runtime::{DashboardRow, DashboardSummary};
use epx_submission::SubmissionRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub config_hash: String,
    pub active_sessions: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine code: "invalid_signal" | "unknown_attempt" |
    /// "session_terminal" | "bad_request" | "internal"
    pub code: String,
}

// ---------------------------------------------------------------------------
// /v1/dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub summary: DashboardSummary,
    pub students: Vec<DashboardRow>,
}

// ---------------------------------------------------------------------------
// /v1/attempts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAttemptRequest {
    pub student_id: String,
    /// Client-chosen id; a fresh one is minted when absent.
    #[serde(default)]
    pub attempt_id: Option<Uuid>,
    #[serde(default)]
    pub exam_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    pub attempt_id: Uuid,
    /// `None` when the signal reported nothing (minimal AI-likelihood band).
    pub outcome: Option<SignalOutcome>,
    pub decision: Option<EscalationDecision>,
    pub score: u8,
    pub phase: AttemptPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRequest {
    pub ts_millis: i64,
    #[serde(flatten)]
    pub sample: CameraSample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraResponse {
    pub attempt_id: Uuid,
    pub attention_score: u8,
    pub outcomes: Vec<SignalOutcome>,
    pub score: u8,
    pub phase: AttemptPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question_id: String,
    pub text: String,
    pub ts_millis: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub attempt_id: Uuid,
    pub question_id: String,
    /// `None` when the answer was too short to classify.
    pub detection: Option<AiDetection>,
    pub outcome: Option<SignalOutcome>,
    pub score: u8,
    pub phase: AttemptPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardStopRequest {
    pub cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub attempt_id: Uuid,
    pub decision: EscalationDecision,
    pub score: u8,
    /// Graded record, present once the attempt is closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionRecord>,
}

// ---------------------------------------------------------------------------
// /api/semantic-similarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityRequest {
    #[serde(default)]
    pub text1: String,
    #[serde(default)]
    pub text2: String,
    #[serde(default)]
    pub exam_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResponse {
    pub success: bool,
    pub analysis: SimilarityAnalysis,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// /api/exam-submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub submission: SubmissionRecord,
}
