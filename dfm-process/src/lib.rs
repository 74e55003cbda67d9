//! The Process Service HTTP surface (spec §6): `POST /process` submits a
//! `Process` node and returns its `request_id`; `GET /responses` streams
//! that request's accumulated `Response`s back over SSE as they arrive;
//! `GET /version` and `GET /health` are the ambient operability endpoints
//! every teacher-style service binary carries.
//!
//! Deliberately plain `axum::Router`/handlers rather than a declarative
//! controller DSL — see the workspace's design notes on why this service
//! does not reuse that machinery.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dfm_config::AuthMethod;
use dfm_core::function_call::Process;
use dfm_core::{ResponseBody, Job};
use dfm_runtime::request::DfmRequest;
use dfm_transport::Transport;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "metrics")]
pub mod metrics;

/// How often the `/responses` SSE handler re-polls the transport for new
/// entries when the last poll came up empty.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Shared state behind every handler: the transport, this service's site
/// identity, and the configured auth gate.
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn Transport>,
    pub site_name: String,
    pub auth: AuthMethod,
    #[cfg(feature = "metrics")]
    pub metrics: Arc<metrics::Metrics>,
}

impl AppState {
    pub fn new(transport: Arc<dyn Transport>, site_name: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            transport,
            site_name: site_name.into(),
            auth,
            #[cfg(feature = "metrics")]
            metrics: Arc::new(metrics::Metrics::new()),
        }
    }
}

/// Assemble the full router: the three public endpoints, the `X-DFM-Auth`
/// gate (skipped in `auth: none` mode), CORS, and request tracing.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/process", post(submit_process))
        .route("/responses", get(stream_responses))
        .route("/version", get(version))
        .route("/health", get(health));

    #[cfg(feature = "metrics")]
    {
        app = app.route("/metrics", get(metrics::scrape));
    }

    app.route_layer(axum::middleware::from_fn_with_state(state.clone(), auth_gate))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// `X-DFM-Auth` gate: an `AuthMethod::None` site skips the check entirely;
/// otherwise the header must be present and equal the configured API key.
async fn auth_gate(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    if let AuthMethod::ApiKey(expected) = &state.auth {
        let presented = headers.get("X-DFM-Auth").and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return (StatusCode::FORBIDDEN, "missing or invalid X-DFM-Auth header").into_response();
        }
    }
    next.run(request).await
}

#[derive(Debug, Serialize)]
struct ProcessSubmitted {
    request_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ApiError {
    kind: String,
    message: String,
}

impl From<dfm_core::DfmError> for ApiError {
    fn from(err: dfm_core::DfmError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.message(),
        }
    }
}

/// Map a `DfmError`'s taxonomy to the HTTP status a client should see,
/// mirroring spec §7's kind-to-status mapping (`AuthError` -> 403,
/// `DataError` -> 400, everything else -> 500).
fn error_status(err: &dfm_core::DfmError) -> StatusCode {
    match err.kind() {
        "AuthError" => StatusCode::FORBIDDEN,
        "DataError" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /process`: submit a `Process` node, schedule its inner `Execute`
/// through the same three-way routing decision every other operation
/// uses, and hand the client back the `request_id` to poll/stream.
async fn submit_process(
    State(state): State<AppState>,
    Json(process): Json<Process>,
) -> Result<Json<ProcessSubmitted>, (StatusCode, Json<ApiError>)> {
    let request_id = Uuid::new_v4();
    let request = DfmRequest::new(state.transport.clone(), state.site_name.clone(), state.site_name.clone(), request_id);

    request
        .schedule_execute(*process.execute, None)
        .await
        .map_err(|e| (error_status(&e), Json(ApiError::from(e))))?;

    #[cfg(feature = "metrics")]
    state.metrics.processes_submitted.inc();

    Ok(Json(ProcessSubmitted { request_id }))
}

#[derive(Debug, Deserialize)]
struct ResponsesQuery {
    request_id: Uuid,
    stop_node_ids: Option<String>,
    #[serde(default)]
    return_statuses: bool,
}

fn parse_stop_ids(raw: &Option<String>) -> Result<Vec<Uuid>, (StatusCode, Json<ApiError>)> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim().parse::<Uuid>().map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiError {
                        kind: "DataError".to_string(),
                        message: format!("invalid stop_node_ids entry: {s}"),
                    }),
                )
            })
        })
        .collect()
}

/// `GET /responses`: poll `transport.get_responses(request_id)` until new
/// entries appear, emitting each as an SSE event as it shows up. Closes
/// the stream once a response tagged with one of `stop_node_ids` has been
/// delivered; with no `stop_node_ids` the stream runs until the client
/// disconnects. `return_statuses=false` (the default) filters out
/// `StatusResponse`/`HeartbeatResponse` entries so a client only sees
/// `Value`/`Error`/`Discovery` payloads.
async fn stream_responses(
    State(state): State<AppState>,
    Query(query): Query<ResponsesQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ApiError>)> {
    let stop_ids = parse_stop_ids(&query.stop_node_ids)?;

    let stream = futures_util::stream::unfold(
        ResponseStreamState {
            transport: state.transport.clone(),
            request_id: query.request_id,
            next_index: 0,
            pending: VecDeque::new(),
            stop_ids,
            return_statuses: query.return_statuses,
            done: false,
        },
        next_sse_event,
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct ResponseStreamState {
    transport: Arc<dyn Transport>,
    request_id: Uuid,
    next_index: usize,
    pending: VecDeque<dfm_core::Response>,
    stop_ids: Vec<Uuid>,
    return_statuses: bool,
    done: bool,
}

async fn next_sse_event(mut state: ResponseStreamState) -> Option<(Result<Event, Infallible>, ResponseStreamState)> {
    loop {
        if let Some(response) = state.pending.pop_front() {
            if state.stop_ids.contains(&response.node_id) {
                state.done = true;
            }
            let event = Event::default().json_data(&response).expect("Response always serializes");
            return Some((Ok(event), state));
        }

        if state.done {
            return None;
        }

        match state.transport.get_responses(state.request_id).await {
            Ok(responses) if responses.len() > state.next_index => {
                for response in &responses[state.next_index..] {
                    if state.return_statuses || !matches!(response.body, ResponseBody::Status(_) | ResponseBody::Heartbeat(_)) {
                        state.pending.push_back(response.clone());
                    }
                }
                state.next_index = responses.len();
            }
            Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to poll responses for SSE stream");
                return None;
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    version: &'static str,
    site: String,
}

/// `GET /version`.
async fn version(State(state): State<AppState>) -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        site: state.site_name.clone(),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// `GET /health`: liveness gated on one cheap transport round-trip
/// (`sched_peek_min`), grounded on the teacher's `HealthIndicator`
/// pattern of checking a dependency with a trivial read.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.transport.sched_peek_min().await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { status: "UP", reason: None })),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "DOWN", reason: Some(e.to_string()) }),
        ),
    }
}

/// Helper used by [`dfm_cli`] and tests: build the `Job` a `Process`
/// submission would enqueue, without going through HTTP. Exposed so the
/// routing semantics stay exercised by one code path.
pub fn job_from_process(site_name: &str, request_id: Uuid, process: Process) -> Job {
    Job::new(site_name.to_string(), request_id, *process.execute)
}
