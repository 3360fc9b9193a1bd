//! REST and SSE handlers over the broker adapter contract.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use jobscope_core::{
    defaults, BrokerAdapter, ConnectionInfo, Job, JobEvent, JobStatus, ListJobsRequest,
    QueueMetrics, QueueSummary,
};

use crate::error::ApiError;

/// Shared handler state: the adapter behind its contract, plus the event
/// fan-out channel fed by the single adapter subscription.
#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<dyn BrokerAdapter>,
    pub events: broadcast::Sender<JobEvent>,
}

// =============================================================================
// QUEUES
// =============================================================================

/// `GET /api/v1/queues` — discovery snapshot, sorted by name.
pub async fn list_queues(
    State(state): State<AppState>,
) -> Result<Json<Vec<QueueSummary>>, ApiError> {
    let mut queues = state.adapter.discover_queues().await?;
    queues.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(queues))
}

// =============================================================================
// JOBS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Status index to list (`waiting`, `active`, `completed`, `failed`,
    /// `delayed`).
    pub status: String,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Pagination envelope for job listings.
#[derive(Debug, Serialize)]
pub struct JobsPage {
    pub queue: String,
    pub status: JobStatus,
    pub offset: usize,
    pub limit: usize,
    pub count: usize,
    pub jobs: Vec<Job>,
}

/// `GET /api/v1/queues/{queue}/jobs?status=&offset=&limit=`
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobsPage>, ApiError> {
    let status: JobStatus = query.status.parse()?;
    let limit = query.limit.unwrap_or(defaults::PAGE_LIMIT);

    let req = ListJobsRequest::new(queue.clone(), status)
        .with_offset(query.offset)
        .with_limit(limit);
    let jobs = state.adapter.list_jobs(req).await?;

    Ok(Json(JobsPage {
        queue,
        status,
        offset: query.offset,
        limit,
        count: jobs.len(),
        jobs,
    }))
}

/// `GET /api/v1/queues/{queue}/jobs/{id}`
pub async fn get_job(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, String)>,
) -> Result<Json<Job>, ApiError> {
    let job = state.adapter.fetch_job(&queue, &id).await?;
    Ok(Json(job))
}

// =============================================================================
// METRICS
// =============================================================================

/// `GET /api/v1/queues/{queue}/metrics`
pub async fn queue_metrics(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<QueueMetrics>, ApiError> {
    let metrics = state.adapter.queue_metrics(&queue).await?;
    Ok(Json(metrics))
}

// =============================================================================
// EVENTS (SSE)
// =============================================================================

/// `GET /api/v1/events` — Server-Sent Events stream of job events.
///
/// Each consumer gets an independent broadcast receiver; a consumer that
/// lags behind skips the missed events and stays on the live stream.
pub async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let kind = event.kind.as_str();
            serde_json::to_string(&event)
                .ok()
                .map(|json| Ok(Event::default().event(kind).data(json)))
        }
        Err(_) => None, // Skip lagged errors
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    )
}

// =============================================================================
// HEALTH
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionInfo>,
}

/// `GET /health` — liveness plus the connect-time endpoint descriptor.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let connection = state.adapter.connection_info().await;
    Json(Health {
        status: if connection.is_some() {
            "ok"
        } else {
            "disconnected"
        },
        connection,
    })
}
