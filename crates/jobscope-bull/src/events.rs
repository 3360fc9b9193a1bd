//! Keyspace-notification translation and listener fan-out.
//!
//! Redis reports key mutations on channels shaped
//! `__keyspace@<db>__:<key>` with the mutation verb as payload. The parser
//! strips the envelope for our prefix, classifies the key tail against the
//! reserved index suffixes, and maps `(tail, verb)` onto a semantic
//! [`JobEventKind`]. Translation must never kill the delivery loop:
//! unclassifiable messages are dropped, and listener panics are caught.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use jobscope_core::{EventListener, JobEvent, JobEventKind};

// =============================================================================
// CHANNEL PARSER
// =============================================================================

/// Stateless translator from `(channel, op)` pairs to event classifications.
#[derive(Debug, Clone)]
pub struct EventParser {
    /// `__keyspace@<db>__:<prefix>:` — everything after it belongs to us.
    envelope: String,
}

/// Classification of one keyspace message, before the delivery timestamp
/// is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub kind: JobEventKind,
    pub queue: String,
    /// Empty for queue-index events.
    pub job_id: String,
}

impl EventParser {
    pub fn new(db: i64, prefix: &str) -> Self {
        Self {
            envelope: format!("__keyspace@{db}__:{prefix}:"),
        }
    }

    /// Translate one notification; `None` means drop.
    ///
    /// The first token after the envelope is the queue name; the joined
    /// remainder is the tail. A reserved tail names an index structure and
    /// yields a queue-level event without a job id; `meta` is internal
    /// housekeeping and is suppressed; any other tail is a job id, which
    /// may itself contain `:`.
    pub fn parse(&self, channel: &str, op: &str) -> Option<ParsedEvent> {
        let key = channel.strip_prefix(&self.envelope)?;
        let (queue, tail) = key.split_once(':')?;
        if queue.is_empty() || tail.is_empty() {
            return None;
        }

        let kind = match tail {
            "meta" => return None,
            "wait" => match op {
                "lpush" | "rpush" => JobEventKind::Waiting,
                "lrem" => JobEventKind::Dequeued,
                _ => return None,
            },
            "active" => match op {
                "lpush" | "rpush" => JobEventKind::Active,
                _ => return None,
            },
            "completed" => match op {
                "zadd" => JobEventKind::Completed,
                _ => return None,
            },
            "failed" => match op {
                "zadd" => JobEventKind::Failed,
                _ => return None,
            },
            "delayed" => match op {
                "zadd" => JobEventKind::Delayed,
                _ => return None,
            },
            job_id => {
                // Broker may grow new verbs; default to `updated` rather
                // than dropping.
                let kind = match op {
                    "del" => JobEventKind::Removed,
                    _ => JobEventKind::Updated,
                };
                return Some(ParsedEvent {
                    kind,
                    queue: queue.to_string(),
                    job_id: job_id.to_string(),
                });
            }
        };

        Some(ParsedEvent {
            kind,
            queue: queue.to_string(),
            job_id: String::new(),
        })
    }
}

// =============================================================================
// LISTENER FAN-OUT
// =============================================================================

/// In-process listener registry shared between `subscribe` registrations
/// and the delivery loop.
///
/// The mutex guards only registry mutation and the snapshot taken per
/// delivery; listener callbacks run outside the critical section, serially,
/// in registration order.
#[derive(Default)]
pub(crate) struct ListenerSet {
    inner: Mutex<HashMap<u64, EventListener>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    /// Register a listener, returning its registry id.
    pub fn add(&self, listener: EventListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .expect("listener registry poisoned")
            .insert(id, listener);
        id
    }

    /// Remove a listener. Idempotent.
    pub fn remove(&self, id: u64) {
        self.inner
            .lock()
            .expect("listener registry poisoned")
            .remove(&id);
    }

    /// Drop every listener (disconnect teardown).
    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("listener registry poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("listener registry poisoned").len()
    }

    /// Deliver one event to every registered listener.
    ///
    /// A panicking listener is logged and skipped; delivery continues for
    /// the rest and for subsequent events.
    pub fn emit(&self, event: JobEvent) {
        let mut listeners: Vec<(u64, EventListener)> = {
            let guard = self.inner.lock().expect("listener registry poisoned");
            guard.iter().map(|(id, l)| (*id, l.clone())).collect()
        };
        listeners.sort_by_key(|(id, _)| *id);

        for (id, listener) in listeners {
            let ev = event.clone();
            if catch_unwind(AssertUnwindSafe(|| listener(ev))).is_err() {
                warn!(listener_id = id, kind = %event.kind, queue = %event.queue,
                    "Event listener panicked, skipping");
            }
        }
        debug!(kind = %event.kind, queue = %event.queue, job_id = %event.job_id,
            "Delivered job event");
    }
}
