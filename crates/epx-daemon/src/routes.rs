//! Axum router and all HTTP handlers for epx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use epx_classifier::{compare_or_neutral, detect_or_neutral};
use epx_integrity::{EscalationAction, EscalationDecision, IntegrityError, SignalEnvelope};
use epx_runtime::{dashboard, spawn_session_timer, DashboardRow, RuntimeError, SessionHandle};
use epx_submission::{attempt_submission_id, process_submission, SubmissionRequest};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        AnswerRequest, AnswerResponse, CameraRequest, CameraResponse, DashboardResponse,
        DecisionResponse, ErrorResponse, HardStopRequest, HealthResponse, OpenAttemptRequest,
        SignalResponse, SimilarityRequest, SimilarityResponse, SubmissionResponse,
    },
    state::{spawn_attempt_closer, uptime_secs, AppState, BusMsg, SESSION_TICK},
};

/// Header carrying the authenticated student id for `/api/exam-submission`.
pub const STUDENT_ID_HEADER: &str = "x-student-id";
const ANONYMOUS_STUDENT: &str = "current_student";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/dashboard", get(dashboard_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/attempts", post(open_attempt))
        .route("/v1/attempts/:id", get(get_attempt))
        .route("/v1/attempts/:id/signals", post(post_signal))
        .route("/v1/attempts/:id/camera", post(post_camera))
        .route("/v1/attempts/:id/answers", post(post_answer))
        .route("/v1/attempts/:id/hard-stop", post(post_hard_stop))
        .route("/v1/attempts/:id/submit", post(post_submit))
        .route("/v1/attempts/:id/submission", get(get_attempt_submission))
        .route("/api/semantic-similarity", post(semantic_similarity))
        .route("/api/exam-submission", post(exam_submission))
        .route("/api/exam-submission/:id", get(get_submission))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Handler error. Maps domain failures onto HTTP status codes:
/// invalid input 400, unknown attempt 404, terminal session 409.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Attempt already graded and evicted from the live registry.
    Closed(Uuid),
    Runtime(RuntimeError),
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        ApiError::Runtime(e)
    }
}

impl From<IntegrityError> for ApiError {
    fn from(e: IntegrityError) -> Self {
        ApiError::Runtime(RuntimeError::Rejected(e))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Closed(id) => (
                StatusCode::CONFLICT,
                "session_terminal",
                format!("attempt {id} already submitted"),
            ),
            ApiError::Runtime(e) => {
                let (status, code) = match &e {
                    RuntimeError::UnknownAttempt(_) => (StatusCode::NOT_FOUND, "unknown_attempt"),
                    RuntimeError::Rejected(IntegrityError::InvalidSignal(_)) => {
                        (StatusCode::BAD_REQUEST, "invalid_signal")
                    }
                    RuntimeError::Rejected(IntegrityError::SessionAlreadyTerminal { .. }) => {
                        (StatusCode::CONFLICT, "session_terminal")
                    }
                    RuntimeError::SessionClosed(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                    }
                };
                (status, code, e.to_string())
            }
        };
        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn refuse_if_terminal(handle: &SessionHandle) -> Result<(), ApiError> {
    let snap = handle.snapshot();
    if snap.state.is_terminal() {
        return Err(IntegrityError::SessionAlreadyTerminal {
            phase: snap.state.phase,
        }
        .into());
    }
    Ok(())
}

/// Push the attempt's fresh dashboard row (and any non-trivial decision)
/// onto the SSE bus.
fn publish(st: &AppState, handle: &SessionHandle, decision: Option<&EscalationDecision>) {
    let _ = st
        .bus
        .send(BusMsg::Attempt(DashboardRow::from_snapshot(&handle.snapshot())));
    if let Some(d) = decision.filter(|d| d.action != EscalationAction::Continue) {
        let _ = st.bus.send(BusMsg::Escalation {
            attempt_id: handle.attempt_id(),
            decision: d.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
            active_sessions: st.sessions.len().await,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/dashboard
// ---------------------------------------------------------------------------

pub(crate) async fn dashboard_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let (students, summary) = dashboard(&st.sessions.snapshots().await);
    (StatusCode::OK, Json(DashboardResponse { summary, students }))
}

// ---------------------------------------------------------------------------
// POST /v1/attempts  +  GET /v1/attempts/:id
// ---------------------------------------------------------------------------

/// Open an attempt. Re-opening a known attempt id returns it unchanged (200);
/// a new attempt answers 201, gets a closer that grades it once it ends, and
/// starts its session timer when a maximum duration is configured.
pub(crate) async fn open_attempt(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<OpenAttemptRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let student_id = req.student_id.trim();
    if student_id.is_empty() {
        return Err(ApiError::BadRequest("student_id is required".to_string()));
    }

    let attempt_id = req.attempt_id.unwrap_or_else(Uuid::new_v4);
    if let Ok(existing) = st.sessions.get(attempt_id).await {
        return Ok((StatusCode::OK, Json(existing.snapshot())).into_response());
    }
    let graded_id = attempt_submission_id(&attempt_id.to_string());
    if st.submissions.read().await.contains_key(&graded_id) {
        return Err(ApiError::Closed(attempt_id));
    }

    let exam_id = req
        .exam_id
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    let handle = st
        .sessions
        .open(attempt_id, student_id, exam_id, st.settings.integrity.clone())
        .await;
    let _ = spawn_attempt_closer(Arc::clone(&st), handle.clone());
    if st.settings.integrity.escalation.max_session_secs.is_some() {
        let _ = spawn_session_timer(handle.clone(), SESSION_TICK);
    }

    info!(%attempt_id, student_id, "attempt opened");
    publish(&st, &handle, None);
    Ok((StatusCode::CREATED, Json(handle.snapshot())).into_response())
}

pub(crate) async fn get_attempt(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = st.sessions.get(attempt_id).await?;
    Ok((StatusCode::OK, Json(handle.snapshot())).into_response())
}

// ---------------------------------------------------------------------------
// POST /v1/attempts/:id/signals
// ---------------------------------------------------------------------------

pub(crate) async fn post_signal(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    payload: Result<Json<SignalEnvelope>, JsonRejection>,
) -> Result<Response, ApiError> {
    let handle = st.sessions.get(attempt_id).await?;
    let Json(envelope) = payload?;

    let (outcome, decision) = match envelope.into_signal()? {
        Some(signal) => {
            let report = handle.signal(signal).await?;
            publish(&st, &handle, Some(&report.decision));
            (Some(report.outcome), Some(report.decision))
        }
        None => {
            // Nothing to record, but a closed attempt still refuses input.
            refuse_if_terminal(&handle)?;
            (None, None)
        }
    };

    let snap = handle.snapshot();
    Ok((
        StatusCode::OK,
        Json(SignalResponse {
            attempt_id,
            outcome,
            decision,
            score: snap.state.integrity.score,
            phase: snap.state.phase,
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /v1/attempts/:id/camera
// ---------------------------------------------------------------------------

pub(crate) async fn post_camera(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    payload: Result<Json<CameraRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let handle = st.sessions.get(attempt_id).await?;
    let Json(req) = payload?;

    let report = handle.camera(req.sample, req.ts_millis).await?;
    publish(
        &st,
        &handle,
        report.reports.last().map(|r| &r.decision),
    );

    let snap = handle.snapshot();
    Ok((
        StatusCode::OK,
        Json(CameraResponse {
            attempt_id,
            attention_score: report.attention_score,
            outcomes: report.reports.into_iter().map(|r| r.outcome).collect(),
            score: snap.state.integrity.score,
            phase: snap.state.phase,
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /v1/attempts/:id/answers
// ---------------------------------------------------------------------------

/// Run AI-content detection on one answer and feed the banded result into
/// the attempt. Classifier outages score as "no AI content".
pub(crate) async fn post_answer(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let handle = st.sessions.get(attempt_id).await?;
    let Json(req) = payload?;
    refuse_if_terminal(&handle)?;

    let detection = detect_or_neutral(st.detector.as_ref(), &req.text).await;
    let report = handle
        .answer(
            req.question_id.clone(),
            req.text,
            detection.clone(),
            req.ts_millis,
        )
        .await?;

    let outcome = match report {
        Some(report) => {
            publish(&st, &handle, Some(&report.decision));
            Some(report.outcome)
        }
        None => None,
    };

    let snap = handle.snapshot();
    Ok((
        StatusCode::OK,
        Json(AnswerResponse {
            attempt_id,
            question_id: req.question_id,
            detection,
            outcome,
            score: snap.state.integrity.score,
            phase: snap.state.phase,
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /v1/attempts/:id/hard-stop  +  /submit
// ---------------------------------------------------------------------------

pub(crate) async fn post_hard_stop(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    payload: Result<Json<HardStopRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let handle = st.sessions.get(attempt_id).await?;
    let Json(req) = payload?;
    let cause = req.cause.trim();
    if cause.is_empty() {
        return Err(ApiError::BadRequest("cause is required".to_string()));
    }

    let decision = handle.hard_stop(cause).await?;
    warn!(%attempt_id, cause, "attempt hard-stopped");
    st.log_line("WARN", format!("attempt {attempt_id} hard-stopped: {cause}"));
    publish(&st, &handle, Some(&decision));
    Ok(decision_response(&st, &handle, decision).await)
}

pub(crate) async fn post_submit(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = st.sessions.get(attempt_id).await?;
    let decision = handle.submit().await?;
    info!(%attempt_id, "attempt submitted");
    publish(&st, &handle, Some(&decision));
    Ok(decision_response(&st, &handle, decision).await)
}

async fn decision_response(
    st: &AppState,
    handle: &SessionHandle,
    decision: EscalationDecision,
) -> Response {
    let snap = handle.snapshot();
    let submission = st.finalize_attempt(&snap).await;
    (
        StatusCode::OK,
        Json(DecisionResponse {
            attempt_id: handle.attempt_id(),
            decision,
            score: snap.state.integrity.score,
            submission,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/attempts/:id/submission  +  GET /api/exam-submission/:id
// ---------------------------------------------------------------------------

/// Graded record of a closed attempt. Still served after the attempt has
/// been evicted from the live registry.
pub(crate) async fn get_attempt_submission(
    State(st): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let id = attempt_submission_id(&attempt_id.to_string());
    submission_response(&st, &id).await
}

pub(crate) async fn get_submission(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    submission_response(&st, &id).await
}

async fn submission_response(st: &AppState, id: &str) -> Result<Response, ApiError> {
    let record = st
        .submissions
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("no submission {id}")))?;
    Ok((
        StatusCode::OK,
        Json(SubmissionResponse {
            success: true,
            submission: record,
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /api/semantic-similarity
// ---------------------------------------------------------------------------

pub(crate) async fn semantic_similarity(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<SimilarityRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    if req.text1.is_empty() || req.text2.is_empty() {
        return Err(ApiError::BadRequest("Both texts are required".to_string()));
    }

    let analysis = compare_or_neutral(st.similarity.as_ref(), &req.text1, &req.text2).await;
    info!(
        exam_id = req.exam_id.as_deref().unwrap_or("-"),
        similarity = analysis.similarity_score,
        plagiarism_risk = analysis.plagiarism_risk,
        "semantic similarity analysed"
    );

    Ok((
        StatusCode::OK,
        Json(SimilarityResponse {
            success: true,
            analysis,
            timestamp: Utc::now(),
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /api/exam-submission
// ---------------------------------------------------------------------------

pub(crate) async fn exam_submission(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e.body_text(), "exam submission rejected");
        ApiError::BadRequest("Failed to submit exam".to_string())
    })?;

    let student_id = headers
        .get(STUDENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_STUDENT)
        .to_string();

    let record = process_submission(req, &student_id, Utc::now());
    info!(
        submission_id = %record.id,
        final_score = record.final_score,
        avg_ai_likelihood = record.avg_ai_likelihood,
        violation_count = record.violations.len(),
        "exam submission processed"
    );

    st.submissions
        .write()
        .await
        .insert(record.id.clone(), record.clone());

    Ok((
        StatusCode::OK,
        Json(SubmissionResponse {
            success: true,
            submission: record,
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Attempt(_) => "attempt",
                    BusMsg::Escalation { .. } => "escalation",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
