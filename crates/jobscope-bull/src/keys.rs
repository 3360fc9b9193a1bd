//! Key layout of the BullMQ broker schema.
//!
//! BullMQ stores each queue under `<prefix>:<queue>:<suffix>` where the
//! suffix is one of the reserved index names or a job id. The layout is a
//! bijection between `(queue, suffix | id)` and the key, so reverse parsing
//! can recover the queue name and discriminate job-record keys from
//! status-index keys. Queue names may contain `:`; reverse parsing anchors
//! on the fixed prefix and the final suffix token.

use jobscope_core::JobStatus;

/// Tail tokens that name broker index structures rather than job ids.
///
/// A queue named exactly after one of these would be misparsed by the
/// event translator, so such names are dropped at discovery time.
pub const RESERVED_SUFFIXES: [&str; 6] = ["meta", "wait", "active", "completed", "failed", "delayed"];

/// Whether a queue name collides with a reserved tail token.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_SUFFIXES.contains(&name)
}

/// Deterministic name/id → storage-key mapping for one broker prefix.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Queue meta record, e.g. `bull:emails:meta`.
    pub fn meta(&self, queue: &str) -> String {
        format!("{}:{}:meta", self.prefix, queue)
    }

    /// Wait list (head = next to run).
    pub fn wait(&self, queue: &str) -> String {
        format!("{}:{}:wait", self.prefix, queue)
    }

    /// Active list.
    pub fn active(&self, queue: &str) -> String {
        format!("{}:{}:active", self.prefix, queue)
    }

    /// Completed ordered set (score = termination timestamp, ms).
    pub fn completed(&self, queue: &str) -> String {
        format!("{}:{}:completed", self.prefix, queue)
    }

    /// Failed ordered set (score = termination timestamp, ms).
    pub fn failed(&self, queue: &str) -> String {
        format!("{}:{}:failed", self.prefix, queue)
    }

    /// Delayed ordered set (score = release timestamp).
    pub fn delayed(&self, queue: &str) -> String {
        format!("{}:{}:delayed", self.prefix, queue)
    }

    /// Job record hash, e.g. `bull:emails:42`.
    pub fn job(&self, queue: &str, id: &str) -> String {
        format!("{}:{}:{}", self.prefix, queue, id)
    }

    /// Index key for one of the five indexed statuses.
    pub fn index(&self, queue: &str, status: JobStatus) -> Option<String> {
        match status {
            JobStatus::Waiting => Some(self.wait(queue)),
            JobStatus::Active => Some(self.active(queue)),
            JobStatus::Completed => Some(self.completed(queue)),
            JobStatus::Failed => Some(self.failed(queue)),
            JobStatus::Delayed => Some(self.delayed(queue)),
            JobStatus::Paused => None,
        }
    }

    /// Glob pattern matching every queue meta key under this prefix.
    pub fn meta_scan_pattern(&self) -> String {
        format!("{}:*:meta", self.prefix)
    }

    /// Keyspace-notification subscription pattern for a database index.
    pub fn keyspace_pattern(&self, db: i64) -> String {
        format!("__keyspace@{}__:{}:*", db, self.prefix)
    }

    /// Recover the queue name from a meta key.
    ///
    /// Returns `None` for keys under a different prefix, keys whose tail is
    /// not `meta`, empty queue names, and queue names colliding with a
    /// reserved tail token.
    pub fn parse_meta_key(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix(':')?;
        let queue = rest.strip_suffix(":meta")?;
        if queue.is_empty() || is_reserved(queue) {
            return None;
        }
        Some(queue.to_string())
    }
}
