//! # jobscope-bull
//!
//! BullMQ-on-Redis broker adapter for jobscope.
//!
//! This crate implements the `jobscope-core` contract against the BullMQ
//! storage layout: per queue a meta record, `wait`/`active` lists,
//! `completed`/`failed`/`delayed` ordered sets, and a record hash per job.
//! It owns two broker connections (command + subscriber), reconstructs job
//! status by probing the five indexes, computes rolling metrics from the
//! timestamp-scored terminal sets, and translates keyspace notifications
//! into semantic job events fanned out to registered listeners.
//!
//! ## Example
//!
//! ```ignore
//! use jobscope_bull::{BullAdapter, BullSettings};
//! use jobscope_core::BrokerAdapter;
//!
//! let adapter = BullAdapter::new(BullSettings::from_env());
//! adapter.connect("redis://localhost:6379/0").await?;
//!
//! for queue in adapter.discover_queues().await? {
//!     println!("{}: {} waiting", queue.name, queue.waiting);
//! }
//!
//! let sub = adapter
//!     .subscribe(std::sync::Arc::new(|event| println!("{event:?}")))
//!     .await?;
//! // ...
//! sub.unsubscribe();
//! adapter.disconnect().await?;
//! ```

pub mod adapter;
pub mod client;
pub mod events;
pub mod keys;

mod decode;
mod metrics;

pub use adapter::{BullAdapter, BullSettings};
pub use client::StoreClient;
pub use events::{EventParser, ParsedEvent};
pub use keys::{is_reserved, KeyLayout, RESERVED_SUFFIXES};
