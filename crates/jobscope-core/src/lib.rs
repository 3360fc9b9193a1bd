//! # jobscope-core
//!
//! Normalized queue/job model and the broker adapter contract for jobscope.
//!
//! This crate defines the vocabulary shared by every broker adapter and by
//! the HTTP/SSE layer: the entity types ([`QueueSummary`], [`Job`],
//! [`JobEvent`], [`QueueMetrics`]), the error kinds, and the
//! [`BrokerAdapter`] trait behind which concrete brokers (reference:
//! BullMQ-on-Redis, see `jobscope-bull`) are plugged in.

pub mod adapter;
pub mod defaults;
pub mod error;
pub mod models;

// Re-export commonly used types at crate root
pub use adapter::{with_deadline, BrokerAdapter, EventListener, ListJobsRequest, Subscription};
pub use error::{Error, Result};
pub use models::{
    ConnectionInfo, Job, JobEvent, JobEventKind, JobFailure, JobStatus, QueueMetrics, QueueSummary,
};
