use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get};
use axum::Router;
use ledger_core::{Event, LabelShare, LedgerError, MergeOrder, Payload, Summary, Transition};
use ledger_reports::{generation_context, group_context, ReportGenerator};
use serde::{Deserialize, Serialize};

type ApiError = (StatusCode, String);

fn ledger_error(err: LedgerError) -> ApiError {
    let status = if err.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, err.to_string())
}

// ── Health ──────────────────────────────────────────────────────────────

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ledger": state.ledger.stats(),
    }))
}

// ── Session groups ──────────────────────────────────────────────────────

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions/{group}", delete(clear_session))
        .route("/v1/sessions/{group}/events", get(list_events).post(append_event))
        .route("/v1/sessions/{group}/history", get(history))
        .route("/v1/sessions/{group}/distribution", get(distribution))
        .route("/v1/sessions/{group}/context", get(call_context))
        .route("/v1/sessions/{group}/report", get(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendRequest {
    participant: String,
    #[serde(alias = "dominantLabel")]
    label: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Serialize)]
struct AppendResponse {
    sequence: u64,
}

async fn append_event(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Json(req): Json<AppendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sequence = state
        .ledger
        .append(&group, &req.participant, &req.label, req.payload)
        .map_err(ledger_error)?;
    Ok((StatusCode::CREATED, Json(AppendResponse { sequence })))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    participant: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    order: MergeOrder,
}

async fn list_events(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    let limit = query.limit.unwrap_or(state.ledger.config().window_size);
    Json(state.ledger.events_ordered(
        &group,
        query.participant.as_deref(),
        limit,
        query.order,
    ))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    participant: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    events: Vec<Event>,
    summary: Option<Summary>,
    transitions: Option<Vec<Transition>>,
}

/// Recent events, plus summary and transitions once a participant has enough history.
async fn history(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(state.ledger.config().window_size);
    let events = state.ledger.events(&group, query.participant.as_deref(), limit);

    let (summary, transitions) = match &query.participant {
        Some(participant) if events.len() >= state.ledger.config().min_summary_events => (
            state.ledger.summarize(&group, participant),
            Some(state.ledger.transitions(&group, participant)),
        ),
        _ => (None, None),
    };

    Json(HistoryResponse {
        events,
        summary,
        transitions,
    })
}

#[derive(Debug, Deserialize)]
struct DistributionQuery {
    participant: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DistributionResponse {
    total: usize,
    distribution: Vec<LabelShare>,
}

async fn distribution(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(query): Query<DistributionQuery>,
) -> Json<DistributionResponse> {
    let limit = query
        .limit
        .unwrap_or(state.ledger.config().distribution_limit);
    let distribution = state
        .ledger
        .distribution(&group, query.participant.as_deref(), limit);
    Json(DistributionResponse {
        total: distribution.iter().map(|s| s.count).sum(),
        distribution,
    })
}

async fn call_context(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> impl IntoResponse {
    Json(group_context(&state.ledger, &group))
}

async fn report(State(state): State<AppState>, Path(group): Path<String>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        ReportGenerator::session_report(&state.ledger, &group),
    )
}

async fn clear_session(State(state): State<AppState>, Path(group): Path<String>) -> StatusCode {
    state.ledger.clear_session_group(&group);
    StatusCode::NO_CONTENT
}

// ── Participants ────────────────────────────────────────────────────────

pub fn participant_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/sessions/{group}/participants/{participant}/labels",
            get(recent_labels),
        )
        .route(
            "/v1/sessions/{group}/participants/{participant}/summary",
            get(summary),
        )
        .route(
            "/v1/sessions/{group}/participants/{participant}/transitions",
            get(transitions),
        )
        .route(
            "/v1/sessions/{group}/participants/{participant}/context",
            get(participant_context),
        )
}

#[derive(Debug, Deserialize)]
struct LabelsQuery {
    limit: Option<usize>,
}

async fn recent_labels(
    State(state): State<AppState>,
    Path((group, participant)): Path<(String, String)>,
    Query(query): Query<LabelsQuery>,
) -> Json<Vec<String>> {
    let limit = query.limit.unwrap_or(state.ledger.config().context_limit);
    Json(state.ledger.recent_labels(&group, &participant, limit))
}

async fn summary(
    State(state): State<AppState>,
    Path((group, participant)): Path<(String, String)>,
) -> Json<Option<Summary>> {
    Json(state.ledger.summarize(&group, &participant))
}

async fn transitions(
    State(state): State<AppState>,
    Path((group, participant)): Path<(String, String)>,
) -> Json<Vec<Transition>> {
    Json(state.ledger.transitions(&group, &participant))
}

async fn participant_context(
    State(state): State<AppState>,
    Path((group, participant)): Path<(String, String)>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "context": generation_context(&state.ledger, &group, &participant),
    }))
}
