//! Centralized default constants for jobscope.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// BROKER LAYOUT
// =============================================================================

/// Default key prefix of the reference broker (BullMQ).
pub const BROKER_PREFIX: &str = "bull";

// =============================================================================
// PAGINATION
// =============================================================================

/// Smallest accepted page size for job listings.
pub const PAGE_LIMIT_MIN: usize = 1;

/// Largest accepted page size for job listings.
pub const PAGE_LIMIT_MAX: usize = 100;

/// Default page size used by the HTTP layer when the caller omits `limit`.
pub const PAGE_LIMIT: usize = 20;

// =============================================================================
// METRICS
// =============================================================================

/// Sampling horizon: newest terminal jobs inspected per metrics call.
///
/// Part of the contract — widening it is a configuration-time decision, the
/// metrics call itself never pages.
pub const METRICS_SAMPLE_SIZE: usize = 100;

/// Rolling throughput window in milliseconds (one hour).
pub const THROUGHPUT_WINDOW_MS: i64 = 3_600_000;

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Bound on waiting for the broker's first ready/error after `connect`.
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Bound on draining the subscriber delivery task during `disconnect`
/// before escalating to a forced close.
pub const SUBSCRIBER_DRAIN_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast capacity of the HTTP layer's event fan-out channel.
pub const EVENT_BUS_CAPACITY: usize = 256;
