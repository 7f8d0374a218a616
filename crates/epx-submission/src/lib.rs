//! epx-submission
//!
//! Submission handling: turns the final integrity score plus per-question
//! AI-detection results into a graded submission record.
//!
//! The scoring formula is compatibility-critical:
//!
//! ```text
//! avg_ai_likelihood = mean(analysis.ai_likelihood)      (0 when no analyses)
//! final_score       = max(0, integrity_score - floor(avg_ai_likelihood / 4))
//! reported average  = round-half-up(avg_ai_likelihood)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use epx_integrity::{AiDetection, IntegrityState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_SUBMITTED: &str = "submitted";

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Mean AI likelihood over all supplied per-question analyses.
pub fn avg_ai_likelihood<'a, I>(analyses: I) -> f64
where
    I: IntoIterator<Item = &'a AiDetection>,
{
    let (sum, n) = analyses
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, n), a| (sum + a.ai_likelihood, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// `max(0, integrity_score - floor(avg / 4))`.
pub fn final_score(integrity_score: i64, avg_ai_likelihood: f64) -> i64 {
    let penalty = (avg_ai_likelihood / 4.0).floor() as i64;
    (integrity_score - penalty).max(0)
}

/// Round half up (matches the display rounding consumers already rely on).
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Final score straight from an engine state.
pub fn final_score_for_attempt(st: &IntegrityState, analyses: &BTreeMap<String, AiDetection>) -> i64 {
    final_score(st.score as i64, avg_ai_likelihood(analyses.values()))
}

// ---------------------------------------------------------------------------
// Submission record
// ---------------------------------------------------------------------------

/// Body posted by the exam client on submit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub exam_id: String,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    pub integrity_score: i64,
    /// Passed through untouched (client-side log entries).
    #[serde(default)]
    pub violations: Vec<Value>,
    /// Seconds spent in the exam.
    #[serde(default)]
    pub time_used: i64,
    #[serde(default)]
    pub ai_analysis_results: BTreeMap<String, AiDetection>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub answers: BTreeMap<String, String>,
    pub integrity_score: i64,
    pub violations: Vec<Value>,
    pub time_used: i64,
    pub ai_analysis_results: BTreeMap<String, AiDetection>,
    pub submitted_at: DateTime<Utc>,
    pub status: String,
    pub final_score: i64,
    #[serde(rename = "avgAILikelihood")]
    pub avg_ai_likelihood: i64,
}

/// Build the graded record. `now` is supplied so ids and timestamps are
/// reproducible under test.
pub fn process_submission(
    req: SubmissionRequest,
    student_id: &str,
    now: DateTime<Utc>,
) -> SubmissionRecord {
    let avg = avg_ai_likelihood(req.ai_analysis_results.values());
    let final_score = final_score(req.integrity_score, avg);

    SubmissionRecord {
        id: format!("submission_{}", now.timestamp_millis()),
        exam_id: req.exam_id,
        student_id: student_id.to_string(),
        answers: req.answers,
        integrity_score: req.integrity_score,
        violations: req.violations,
        time_used: req.time_used,
        ai_analysis_results: req.ai_analysis_results,
        submitted_at: now,
        status: STATUS_SUBMITTED.to_string(),
        final_score,
        avg_ai_likelihood: round_half_up(avg),
    }
}

// ---------------------------------------------------------------------------
// Engine-backed submission
// ---------------------------------------------------------------------------

/// What the engine knows about an attempt once it reached a terminal phase.
#[derive(Clone, Copy, Debug)]
pub struct ClosedAttempt<'a> {
    pub attempt_id: &'a str,
    pub exam_id: &'a str,
    pub student_id: &'a str,
    pub integrity: &'a IntegrityState,
    pub answers: &'a BTreeMap<String, String>,
    pub ai_analysis_results: &'a BTreeMap<String, AiDetection>,
    pub time_used: i64,
}

/// Record id for an engine-backed submission. One per attempt.
pub fn attempt_submission_id(attempt_id: &str) -> String {
    format!("submission_{attempt_id}")
}

/// Grade a closed attempt from engine state. The integrity score and
/// violations come from the engine, never from the client.
pub fn process_closed_attempt(attempt: ClosedAttempt<'_>, now: DateTime<Utc>) -> SubmissionRecord {
    let avg = avg_ai_likelihood(attempt.ai_analysis_results.values());
    let violations = attempt
        .integrity
        .violations
        .iter()
        .filter_map(|v| serde_json::to_value(v).ok())
        .collect();

    SubmissionRecord {
        id: attempt_submission_id(attempt.attempt_id),
        exam_id: attempt.exam_id.to_string(),
        student_id: attempt.student_id.to_string(),
        answers: attempt.answers.clone(),
        integrity_score: attempt.integrity.score as i64,
        violations,
        time_used: attempt.time_used,
        ai_analysis_results: attempt.ai_analysis_results.clone(),
        submitted_at: now,
        status: STATUS_SUBMITTED.to_string(),
        final_score: final_score_for_attempt(attempt.integrity, attempt.ai_analysis_results),
        avg_ai_likelihood: round_half_up(avg),
    }
}
