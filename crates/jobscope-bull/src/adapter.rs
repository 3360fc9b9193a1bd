//! The BullMQ-on-Redis broker adapter.
//!
//! Owns both broker connections: the command connection (opened by
//! `connect`) and the subscriber connection (opened lazily on first
//! `subscribe`). All contract operations translate the BullMQ storage
//! layout — five status indexes plus a record hash per job — into the
//! normalized model of `jobscope-core`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use redis::aio::PubSub;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobscope_core::{
    defaults, BrokerAdapter, ConnectionInfo, Error, EventListener, Job, JobEvent, JobStatus,
    ListJobsRequest, QueueMetrics, QueueSummary, Result, Subscription,
};

use crate::client::StoreClient;
use crate::decode::decode_record;
use crate::events::{EventParser, ListenerSet};
use crate::keys::KeyLayout;
use crate::metrics::{processing_time_ms, summarize};

// =============================================================================
// SETTINGS
// =============================================================================

/// Configuration for the BullMQ adapter.
#[derive(Debug, Clone)]
pub struct BullSettings {
    /// Broker key prefix.
    pub prefix: String,
    /// Metrics sampling horizon (newest terminal jobs inspected per call).
    pub metrics_sample: usize,
    /// Bound on waiting for ready/error during `connect`.
    pub connect_timeout: Duration,
}

impl Default for BullSettings {
    fn default() -> Self {
        Self {
            prefix: defaults::BROKER_PREFIX.to_string(),
            metrics_sample: defaults::METRICS_SAMPLE_SIZE,
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
        }
    }
}

impl BullSettings {
    /// Create settings from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOBSCOPE_PREFIX` | `bull` | Broker key prefix |
    /// | `JOBSCOPE_METRICS_SAMPLE` | `100` | Metrics sampling horizon |
    /// | `JOBSCOPE_CONNECT_TIMEOUT_MS` | `10000` | Connect ready/error bound |
    pub fn from_env() -> Self {
        let prefix = std::env::var("JOBSCOPE_PREFIX")
            .unwrap_or_else(|_| defaults::BROKER_PREFIX.to_string());

        let metrics_sample = std::env::var("JOBSCOPE_METRICS_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::METRICS_SAMPLE_SIZE)
            .max(1);

        let connect_timeout_ms = std::env::var("JOBSCOPE_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::CONNECT_TIMEOUT_MS);

        Self {
            prefix,
            metrics_sample,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_metrics_sample(mut self, sample: usize) -> Self {
        self.metrics_sample = sample.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Connection state guarded by the adapter mutex.
struct Shared {
    store: Option<Arc<StoreClient>>,
    subscriber: Option<SubscriberHandle>,
}

/// Control handle of the spawned delivery task.
struct SubscriberHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Read-only BullMQ adapter over a Redis data store.
pub struct BullAdapter {
    settings: BullSettings,
    keys: KeyLayout,
    state: Mutex<Shared>,
    listeners: Arc<ListenerSet>,
}

impl BullAdapter {
    pub fn new(settings: BullSettings) -> Self {
        let keys = KeyLayout::new(settings.prefix.clone());
        Self {
            settings,
            keys,
            state: Mutex::new(Shared {
                store: None,
                subscriber: None,
            }),
            listeners: Arc::new(ListenerSet::default()),
        }
    }

    pub fn settings(&self) -> &BullSettings {
        &self.settings
    }

    /// Snapshot the command-connection handle without holding the state
    /// lock across broker I/O.
    async fn store(&self) -> Result<Arc<StoreClient>> {
        let guard = self.state.lock().await;
        guard.store.clone().ok_or(Error::NotConnected)
    }

    /// Release both connections and clear listeners. Subscriber first:
    /// graceful drain bounded by
    /// [`defaults::SUBSCRIBER_DRAIN_TIMEOUT_MS`], then forced abort.
    async fn teardown(&self, guard: &mut Shared) {
        if let Some(subscriber) = guard.subscriber.take() {
            let _ = subscriber.shutdown_tx.send(()).await;
            let mut task = subscriber.task;
            let drain = Duration::from_millis(defaults::SUBSCRIBER_DRAIN_TIMEOUT_MS);
            if tokio::time::timeout(drain, &mut task).await.is_err() {
                warn!("Subscriber did not drain in time, forcing close");
                task.abort();
            }
        }
        self.listeners.clear();
        guard.store = None;
    }

    /// Assemble one queue snapshot: the five count probes run concurrently,
    /// alongside the meta read for the paused flag. Any probe failure fails
    /// the whole discovery (counts are consistent per queue or absent).
    async fn summarize_queue(&self, store: &StoreClient, name: &str) -> Result<QueueSummary> {
        let wait_key = self.keys.wait(name);
        let active_key = self.keys.active(name);
        let completed_key = self.keys.completed(name);
        let failed_key = self.keys.failed(name);
        let delayed_key = self.keys.delayed(name);
        let meta_key = self.keys.meta(name);
        let (waiting, active, completed, failed, delayed, meta) = tokio::try_join!(
            store.list_len(&wait_key),
            store.list_len(&active_key),
            store.sorted_len(&completed_key),
            store.sorted_len(&failed_key),
            store.sorted_len(&delayed_key),
            store.record(&meta_key),
        )?;

        let paused = meta.get("paused").map(|v| v == "1").unwrap_or(false);

        Ok(QueueSummary {
            name: name.to_string(),
            waiting,
            active,
            completed,
            failed,
            delayed,
            paused,
            connection: store.info().clone(),
        })
    }

    /// Probe the five indexes in fixed order; the first positive probe
    /// determines the status and no further probes are issued.
    async fn resolve_status(
        &self,
        store: &StoreClient,
        queue: &str,
        id: &str,
    ) -> Result<Option<JobStatus>> {
        if store
            .list_position(&self.keys.wait(queue), id)
            .await?
            .is_some()
        {
            return Ok(Some(JobStatus::Waiting));
        }
        if store
            .list_position(&self.keys.active(queue), id)
            .await?
            .is_some()
        {
            return Ok(Some(JobStatus::Active));
        }
        if store
            .sorted_score(&self.keys.completed(queue), id)
            .await?
            .is_some()
        {
            return Ok(Some(JobStatus::Completed));
        }
        if store
            .sorted_score(&self.keys.failed(queue), id)
            .await?
            .is_some()
        {
            return Ok(Some(JobStatus::Failed));
        }
        if store
            .sorted_score(&self.keys.delayed(queue), id)
            .await?
            .is_some()
        {
            return Ok(Some(JobStatus::Delayed));
        }
        Ok(None)
    }

    /// Read one page of ids from the index backing `status`.
    async fn page_ids(
        &self,
        store: &StoreClient,
        queue: &str,
        status: JobStatus,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        let start = offset as isize;
        let stop = (offset + limit - 1) as isize;
        match status {
            JobStatus::Waiting => store.list_range(&self.keys.wait(queue), start, stop).await,
            JobStatus::Active => store.list_range(&self.keys.active(queue), start, stop).await,
            // Newest first for terminal history.
            JobStatus::Completed => {
                store
                    .sorted_range(&self.keys.completed(queue), start, stop, false)
                    .await
            }
            JobStatus::Failed => {
                store
                    .sorted_range(&self.keys.failed(queue), start, stop, false)
                    .await
            }
            // Soonest release first.
            JobStatus::Delayed => {
                store
                    .sorted_range(&self.keys.delayed(queue), start, stop, true)
                    .await
            }
            JobStatus::Paused => Err(Error::InvalidArgument(
                "jobs are never paused individually".to_string(),
            )),
        }
    }

    /// Start the delivery task over a freshly subscribed connection.
    fn spawn_delivery(
        &self,
        pubsub: PubSub,
        pattern: String,
        parser: EventParser,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        let listeners = self.listeners.clone();
        tokio::spawn(deliver_loop(pubsub, pattern, parser, listeners, shutdown_rx))
    }
}

impl Default for BullAdapter {
    fn default() -> Self {
        Self::new(BullSettings::default())
    }
}

/// Serial delivery loop: translate each keyspace message and fan it out.
/// Runs until shutdown is signalled or the broker closes the stream, then
/// unsubscribes and drops the connection.
async fn deliver_loop(
    mut pubsub: PubSub,
    pattern: String,
    parser: EventParser,
    listeners: Arc<ListenerSet>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    {
        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Subscriber shutdown requested");
                    break;
                }
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        warn!("Subscriber stream closed by broker");
                        break;
                    };
                    let channel = msg.get_channel_name().to_string();
                    let op: String = match msg.get_payload() {
                        Ok(op) => op,
                        Err(e) => {
                            debug!(error = %e, %channel, "Undecodable keyspace payload, dropping");
                            continue;
                        }
                    };
                    if let Some(parsed) = parser.parse(&channel, &op) {
                        listeners.emit(JobEvent {
                            kind: parsed.kind,
                            queue: parsed.queue,
                            job_id: parsed.job_id,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }
    }

    if let Err(e) = pubsub.punsubscribe(&pattern).await {
        debug!(error = %e, "Unsubscribe during teardown failed");
    }
}

/// Keyspace notifications need the `K` class plus the data-type classes we
/// translate (`A` covers them all).
fn keyspace_events_enabled(flags: &str) -> bool {
    flags.contains('K')
        && (flags.contains('A') || ['g', 'l', 'z', 'h'].iter().all(|c| flags.contains(*c)))
}

fn validate_queue_name(queue: &str) -> Result<()> {
    if queue.is_empty() {
        return Err(Error::InvalidArgument("queue name is empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl BrokerAdapter for BullAdapter {
    async fn connect(&self, endpoint: &str) -> Result<()> {
        if !endpoint.starts_with("redis://") && !endpoint.starts_with("rediss://") {
            return Err(Error::InvalidArgument(format!(
                "endpoint must be a redis:// or rediss:// URL: {endpoint}"
            )));
        }

        let mut guard = self.state.lock().await;
        // Re-running connect replaces any prior connections.
        self.teardown(&mut guard).await;

        let store = StoreClient::open(endpoint, self.settings.connect_timeout).await?;
        info!(endpoint = %store.info(), prefix = %self.settings.prefix, "Connected to broker");
        guard.store = Some(Arc::new(store));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard.store.is_none() && guard.subscriber.is_none() {
            return Ok(());
        }
        self.teardown(&mut guard).await;
        info!("Disconnected from broker");
        Ok(())
    }

    async fn connection_info(&self) -> Option<ConnectionInfo> {
        let guard = self.state.lock().await;
        guard.store.as_ref().map(|s| s.info().clone())
    }

    async fn discover_queues(&self) -> Result<Vec<QueueSummary>> {
        let store = self.store().await?;

        let meta_keys = store.scan_keys(&self.keys.meta_scan_pattern()).await?;
        // SCAN may return duplicates; names are deduplicated and invalid
        // matches (empty or reserved) already dropped by the key parser.
        let names: BTreeSet<String> = meta_keys
            .iter()
            .filter_map(|key| self.keys.parse_meta_key(key))
            .collect();

        let mut queues = Vec::with_capacity(names.len());
        for name in &names {
            queues.push(self.summarize_queue(&store, name).await?);
        }

        debug!(count = queues.len(), "Discovered queues");
        Ok(queues)
    }

    async fn list_jobs(&self, req: ListJobsRequest) -> Result<Vec<Job>> {
        validate_queue_name(&req.queue)?;
        if req.limit < defaults::PAGE_LIMIT_MIN || req.limit > defaults::PAGE_LIMIT_MAX {
            return Err(Error::InvalidArgument(format!(
                "limit must be between {} and {}, got {}",
                defaults::PAGE_LIMIT_MIN,
                defaults::PAGE_LIMIT_MAX,
                req.limit
            )));
        }
        if req.status == JobStatus::Paused {
            return Err(Error::InvalidArgument(
                "jobs are never paused individually".to_string(),
            ));
        }

        let store = self.store().await?;
        let ids = self
            .page_ids(&store, &req.queue, req.status, req.offset, req.limit)
            .await?;

        let fetches = ids.iter().map(|id| {
            let key = self.keys.job(&req.queue, id);
            let store = &store;
            async move { (id, store.record(&key).await) }
        });

        let mut jobs = Vec::with_capacity(ids.len());
        for (id, fields) in join_all(fetches).await {
            let fields = fields?;
            if fields.is_empty() {
                // Tombstone: the id is still indexed but the broker pruned
                // the record. Not an error.
                debug!(queue = %req.queue, job_id = %id, "Dropping tombstoned job");
                continue;
            }
            jobs.push(decode_record(&req.queue, id, req.status, &fields)?);
        }
        Ok(jobs)
    }

    async fn fetch_job(&self, queue: &str, id: &str) -> Result<Job> {
        validate_queue_name(queue)?;
        if id.is_empty() {
            return Err(Error::InvalidArgument("job id is empty".to_string()));
        }

        let store = self.store().await?;
        let status = self
            .resolve_status(&store, queue, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {queue}/{id}")))?;

        let fields = store.record(&self.keys.job(queue, id)).await?;
        if fields.is_empty() {
            // Raced with broker pruning between probe and record read.
            return Err(Error::NotFound(format!("job {queue}/{id}")));
        }
        decode_record(queue, id, status, &fields)
    }

    async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics> {
        validate_queue_name(queue)?;
        let store = self.store().await?;

        let stop = (self.settings.metrics_sample - 1) as isize;
        let completed_key = self.keys.completed(queue);
        let failed_key = self.keys.failed(queue);
        let (completed, failed) = tokio::try_join!(
            store.sorted_range_with_scores(&completed_key, 0, stop, false),
            store.sorted_range_with_scores(&failed_key, 0, stop, false),
        )?;

        let fetches = completed.iter().map(|(id, _)| {
            let key = self.keys.job(queue, id);
            let store = &store;
            async move { store.record(&key).await }
        });
        let mut processing_ms = Vec::with_capacity(completed.len());
        for fields in join_all(fetches).await {
            // Missing or incomplete records are skipped silently.
            if let Some(ms) = processing_time_ms(&fields?) {
                processing_ms.push(ms);
            }
        }

        let now_ms = Utc::now().timestamp_millis();
        Ok(summarize(now_ms, &completed, &failed, &processing_ms))
    }

    async fn subscribe(&self, listener: EventListener) -> Result<Subscription> {
        let mut guard = self.state.lock().await;
        let store = guard.store.clone().ok_or(Error::NotConnected)?;

        if guard.subscriber.is_none() {
            if let Some(flags) = store.notify_flags().await? {
                if !keyspace_events_enabled(&flags) {
                    return Err(Error::Transport(
                        "keyspace notifications disabled".to_string(),
                    ));
                }
            }

            let pattern = self.keys.keyspace_pattern(store.info().db);
            let mut pubsub = store.open_subscriber().await?;
            pubsub.psubscribe(&pattern).await?;

            let parser = EventParser::new(store.info().db, self.keys.prefix());
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let task = self.spawn_delivery(pubsub, pattern.clone(), parser, shutdown_rx);
            guard.subscriber = Some(SubscriberHandle { shutdown_tx, task });
            info!(%pattern, "Subscribed to broker keyspace events");
        }
        drop(guard);

        let id = self.listeners.add(listener);
        let listeners = self.listeners.clone();
        Ok(Subscription::new(move || listeners.remove(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = BullSettings::default();
        assert_eq!(settings.prefix, "bull");
        assert_eq!(settings.metrics_sample, 100);
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_settings_builders() {
        let settings = BullSettings::default()
            .with_prefix("jobs")
            .with_metrics_sample(500)
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(settings.prefix, "jobs");
        assert_eq!(settings.metrics_sample, 500);
        assert_eq!(settings.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_settings_metrics_sample_floor() {
        let settings = BullSettings::default().with_metrics_sample(0);
        assert_eq!(settings.metrics_sample, 1);
    }

    #[test]
    fn test_keyspace_events_enabled() {
        assert!(keyspace_events_enabled("KEA"));
        assert!(keyspace_events_enabled("AKE"));
        assert!(keyspace_events_enabled("Kglzh"));
        assert!(keyspace_events_enabled("K$glzxeh"));
        assert!(!keyspace_events_enabled(""));
        assert!(!keyspace_events_enabled("EA"));
        assert!(!keyspace_events_enabled("Kgl"));
        assert!(!keyspace_events_enabled("K"));
    }
}
