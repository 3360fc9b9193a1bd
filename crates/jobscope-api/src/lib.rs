//! # jobscope-api
//!
//! HTTP + SSE dashboard server for jobscope.
//!
//! The server is a thin collaborator over the `jobscope-core` contract: it
//! routes read requests to a [`jobscope_core::BrokerAdapter`] and bridges
//! the adapter's event subscription onto a broadcast channel consumed by
//! the SSE endpoint. It performs no broker I/O of its own.

use axum::routing::get;
use axum::Router;

pub mod error;
pub mod handlers;

pub use handlers::AppState;

/// Build the API router over a prepared [`AppState`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/queues", get(handlers::list_queues))
        .route("/api/v1/queues/:queue/jobs", get(handlers::list_jobs))
        .route("/api/v1/queues/:queue/jobs/:id", get(handlers::get_job))
        .route("/api/v1/queues/:queue/metrics", get(handlers::queue_metrics))
        .route("/api/v1/events", get(handlers::sse_events))
        .with_state(state)
}
