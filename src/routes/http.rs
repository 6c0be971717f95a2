//! HTTP endpoint handlers. These are thin wrappers that forward to the engine.
//! Errors render through `VivaError`'s `IntoResponse`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, instrument};

use crate::dashboard::{Dashboard, Page, SessionListQuery};
use crate::domain::Rubric;
use crate::error::{VivaError, VivaResult};
use crate::protocol::*;
use crate::state::AppState;
use crate::store::SessionSummary;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
    Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(assignment = %body.assignment_id, student = %body.student_id))]
pub async fn http_start_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartSessionIn>,
) -> VivaResult<(StatusCode, Json<StartSessionOut>)> {
    let (session, question) = state.engine.start_session(&body.assignment_id, &body.student_id).await?;
    Ok((StatusCode::CREATED, Json(StartSessionOut::new(&session, question))))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> VivaResult<Json<SessionOut>> {
    let session = state.engine.get_session(&id).await?;
    Ok(Json(SessionOut::from(&session)))
}

#[instrument(level = "info", skip(state, body), fields(transcript_len = body.transcript.len()))]
pub async fn http_submit_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ResponseIn>,
) -> VivaResult<Json<ResponseOut>> {
    let outcome = state.engine.submit_response(&id, &body.transcript, body.similarity).await?;
    Ok(Json(ResponseOut::from(&outcome)))
}

/// The end body is optional, but a body that is present must parse: a
/// mistyped `abandoned` must not end the session as SUBMITTED.
fn parse_end_body(raw: &[u8]) -> VivaResult<EndSessionIn> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(EndSessionIn::default());
    }
    serde_json::from_slice(raw).map_err(|e| VivaError::Validation(format!("invalid end-session body: {e}")))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> VivaResult<Json<SessionOut>> {
    let body = parse_end_body(&body)?;
    let session = state.engine.end_session(&id, body.reason, body.abandoned).await?;
    Ok(Json(SessionOut::from(&session)))
}

#[instrument(level = "info", skip(state, body), fields(reviewer = %body.reviewer_id))]
pub async fn http_review_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewIn>,
) -> VivaResult<Json<SessionOut>> {
    let session = state
        .engine
        .review_session(&id, &body.reviewer_id, body.score_override, body.override_reason)
        .await?;
    Ok(Json(SessionOut::from(&session)))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_list_sessions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<SessionListQuery>,
) -> VivaResult<Json<Page<SessionSummary>>> {
    let page = state.engine.list_sessions(&id, &q).await?;
    info!(target: "viva_backend", assignment = %id, total = page.total_elements, "Session list served");
    Ok(Json(page))
}

#[instrument(level = "info", skip(state))]
pub async fn http_assignment_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<AssignmentConfigOut> {
    Json(AssignmentConfigOut::from(&state.engine.assignment_config(&id)))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_dashboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<DashboardQuery>,
) -> Json<Dashboard> {
    Json(state.engine.dashboard(&id, q.total_students).await)
}

#[instrument(level = "info", skip(state, rubric), fields(rubric = %rubric.id))]
pub async fn http_publish_rubric(
    State(state): State<Arc<AppState>>,
    Json(rubric): Json<Rubric>,
) -> VivaResult<(StatusCode, Json<RubricPublishedOut>)> {
    let snapshot = state.engine.rubrics().publish(rubric).await?;
    Ok((
        StatusCode::CREATED,
        Json(RubricPublishedOut {
            rubric_id: snapshot.id.clone(),
            assignment_id: snapshot.assignment_id.clone(),
            status: snapshot.status,
            selectable_questions: snapshot.selectable_question_count(),
        }),
    ))
}
