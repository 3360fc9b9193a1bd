//! The broker adapter contract.
//!
//! A broker adapter translates one broker's native storage layout into the
//! normalized model of [`crate::models`]. The HTTP/SSE layer consumes only
//! this trait, so alternative brokers can be swapped in behind the same
//! consumer API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ConnectionInfo, Job, JobEvent, JobStatus, QueueMetrics, QueueSummary};

/// Consumer callback receiving translated job events.
///
/// Invoked serially from the adapter's delivery loop; implementations must
/// not block for long. A panicking listener is caught and logged without
/// terminating delivery.
pub type EventListener = Arc<dyn Fn(JobEvent) + Send + Sync>;

/// Request for listing jobs in one status index of a queue.
#[derive(Debug, Clone)]
pub struct ListJobsRequest {
    pub queue: String,
    /// Status index to read. `Paused` is rejected — jobs are never paused
    /// individually.
    pub status: JobStatus,
    /// Zero-based start position within the index.
    pub offset: usize,
    /// Page size, must lie within
    /// [`crate::defaults::PAGE_LIMIT_MIN`]..=[`crate::defaults::PAGE_LIMIT_MAX`].
    pub limit: usize,
}

impl ListJobsRequest {
    pub fn new(queue: impl Into<String>, status: JobStatus) -> Self {
        Self {
            queue: queue.into(),
            status,
            offset: 0,
            limit: crate::defaults::PAGE_LIMIT,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Registration handle returned by [`BrokerAdapter::subscribe`].
///
/// Unregisters the listener when released, either explicitly via
/// [`Subscription::unsubscribe`] or implicitly on drop. Unregistering is
/// idempotent.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an adapter-side unregister action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the listener from the adapter's delivery set.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Read-only adapter over one broker's data store.
///
/// Subscriber model: implementations in this workspace hold one underlying
/// broker subscription and fan events out to every registered listener
/// in-process. Single-subscriber implementations of this trait instead
/// reject a second `subscribe` with [`Error::AlreadySubscribed`].
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Validate the endpoint, open the command connection and wait for the
    /// first of ready/error (bounded, default 10 s). Any previously held
    /// connections are torn down first.
    async fn connect(&self, endpoint: &str) -> Result<()>;

    /// Close subscriber then command connection, escalating to a forced
    /// close on failure. Idempotent: repeated calls are no-ops.
    async fn disconnect(&self) -> Result<()>;

    /// Endpoint descriptor captured at connect time, if connected.
    async fn connection_info(&self) -> Option<ConnectionInfo>;

    /// Scan the broker for queues and capture per-status counts.
    /// Returns an unordered collection; callers may sort.
    async fn discover_queues(&self) -> Result<Vec<QueueSummary>>;

    /// Read one page of a status index. Ids whose record has been pruned by
    /// the broker (tombstones) are dropped silently.
    async fn list_jobs(&self, req: ListJobsRequest) -> Result<Vec<Job>>;

    /// Locate a job by probing the status indexes and decode its record.
    async fn fetch_job(&self, queue: &str, id: &str) -> Result<Job>;

    /// Compute rolling metrics over the newest terminal jobs of a queue.
    async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics>;

    /// Register a listener for translated job events, lazily opening the
    /// subscriber connection. Not cancelled by caller deadlines; torn down
    /// by `disconnect` or by releasing the returned [`Subscription`].
    async fn subscribe(&self, listener: EventListener) -> Result<Subscription>;
}

/// Run a contract operation under a caller-supplied deadline.
///
/// Maps deadline expiry to [`Error::Cancelled`] and drops the in-flight
/// future, aborting the underlying broker call.
pub async fn with_deadline<T, F>(deadline: Duration, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(Error::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_list_jobs_request_builder() {
        let req = ListJobsRequest::new("emails", JobStatus::Completed)
            .with_offset(40)
            .with_limit(50);
        assert_eq!(req.queue, "emails");
        assert_eq!(req.status, JobStatus::Completed);
        assert_eq!(req.offset, 40);
        assert_eq!(req.limit, 50);
    }

    #[test]
    fn test_list_jobs_request_defaults() {
        let req = ListJobsRequest::new("emails", JobStatus::Waiting);
        assert_eq!(req.offset, 0);
        assert_eq!(req.limit, crate::defaults::PAGE_LIMIT);
    }

    #[test]
    fn test_subscription_unsubscribe_runs_cancel_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_drop_runs_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        {
            let _sub = Subscription::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through_ok() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_deadline_maps_elapse_to_cancelled() {
        let result: Result<()> = with_deadline(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result.unwrap_err(), Error::Cancelled));
    }
}
