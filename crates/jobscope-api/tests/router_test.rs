//! Router tests over a mock broker adapter.
//!
//! The mock implements the `jobscope-core` contract in memory, which is
//! exactly the swap the contract exists for: the routes cannot tell it
//! apart from the Redis-backed adapter.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;
use tower::ServiceExt;

use jobscope_api::{router, AppState};
use jobscope_core::{
    BrokerAdapter, ConnectionInfo, Error, EventListener, Job, JobStatus, ListJobsRequest,
    QueueMetrics, QueueSummary, Result, Subscription,
};

fn connection() -> ConnectionInfo {
    ConnectionInfo {
        host: "localhost".to_string(),
        port: 6379,
        db: 0,
    }
}

fn fixture_job(id: &str, status: JobStatus) -> Job {
    Job {
        id: id.to_string(),
        queue: "emails".to_string(),
        status,
        payload: serde_json::json!({"to": "ops@example.com"}),
        result: None,
        error: None,
        attempts: 1,
        max_attempts: Some(3),
        created_at: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
        started_at: None,
        finished_at: None,
        delayed_until: None,
    }
}

struct MockBroker;

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn connect(&self, _endpoint: &str) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn connection_info(&self) -> Option<ConnectionInfo> {
        Some(connection())
    }

    async fn discover_queues(&self) -> Result<Vec<QueueSummary>> {
        // Deliberately unsorted; the handler sorts by name.
        Ok(vec![
            QueueSummary {
                name: "reports".to_string(),
                waiting: 0,
                active: 0,
                completed: 3,
                failed: 0,
                delayed: 0,
                paused: true,
                connection: connection(),
            },
            QueueSummary {
                name: "emails".to_string(),
                waiting: 2,
                active: 1,
                completed: 2,
                failed: 1,
                delayed: 1,
                paused: false,
                connection: connection(),
            },
        ])
    }

    async fn list_jobs(&self, req: ListJobsRequest) -> Result<Vec<Job>> {
        if req.limit == 0 || req.limit > 100 {
            return Err(Error::InvalidArgument(format!(
                "limit out of range: {}",
                req.limit
            )));
        }
        if req.status == JobStatus::Paused {
            return Err(Error::InvalidArgument(
                "jobs are never paused individually".to_string(),
            ));
        }
        if req.queue == "emails" && req.status == JobStatus::Waiting {
            Ok(vec![
                fixture_job("j1", JobStatus::Waiting),
                fixture_job("j2", JobStatus::Waiting),
            ])
        } else {
            Ok(Vec::new())
        }
    }

    async fn fetch_job(&self, queue: &str, id: &str) -> Result<Job> {
        if queue == "emails" && id == "42" {
            Ok(fixture_job("42", JobStatus::Active))
        } else {
            Err(Error::NotFound(format!("job {queue}/{id}")))
        }
    }

    async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics> {
        if queue == "down" {
            return Err(Error::Transport("connection reset".to_string()));
        }
        Ok(QueueMetrics {
            throughput: 12,
            failure_rate: 0.25,
            avg_processing_ms: 830.5,
        })
    }

    async fn subscribe(&self, _listener: EventListener) -> Result<Subscription> {
        Ok(Subscription::new(|| {}))
    }
}

fn app() -> axum::Router {
    let (events, _) = broadcast::channel(16);
    router(AppState {
        adapter: Arc::new(MockBroker),
        events,
    })
}

async fn get(uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_connection() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connection"]["host"], "localhost");
    assert_eq!(body["connection"]["port"], 6379);
}

#[tokio::test]
async fn queues_are_sorted_by_name() {
    let (status, body) = get("/api/v1/queues").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["emails", "reports"]);
    assert_eq!(body[1]["paused"], true);
}

#[tokio::test]
async fn list_jobs_returns_pagination_envelope() {
    let (status, body) = get("/api/v1/queues/emails/jobs?status=waiting&offset=0&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"], "emails");
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["offset"], 0);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["count"], 2);
    assert_eq!(body["jobs"][0]["id"], "j1");
}

#[tokio::test]
async fn list_jobs_unknown_status_is_bad_request() {
    let (status, body) = get("/api/v1/queues/emails/jobs?status=stuck").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown job status"));
}

#[tokio::test]
async fn list_jobs_paused_status_is_bad_request() {
    let (status, _) = get("/api/v1/queues/emails/jobs?status=paused").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_jobs_limit_out_of_range_is_bad_request() {
    let (status, _) = get("/api/v1/queues/emails/jobs?status=waiting&limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get("/api/v1/queues/emails/jobs?status=waiting&limit=101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_detail_serializes_iso_8601_timestamps() {
    let (status, body) = get("/api/v1/queues/emails/jobs/42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "42");
    assert_eq!(body["status"], "active");
    assert_eq!(body["created_at"], "2023-11-14T22:13:20Z");
}

#[tokio::test]
async fn missing_job_is_not_found() {
    let (status, body) = get("/api/v1/queues/emails/jobs/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn metrics_snapshot_round_trips() {
    let (status, body) = get("/api/v1/queues/emails/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["throughput"], 12);
    assert_eq!(body["failure_rate"], 0.25);
    assert_eq!(body["avg_processing_ms"], 830.5);
}

#[tokio::test]
async fn transport_failure_maps_to_bad_gateway() {
    let (status, body) = get("/api/v1/queues/down/metrics").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("Transport"));
}

#[tokio::test]
async fn sse_endpoint_speaks_event_stream() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
}
