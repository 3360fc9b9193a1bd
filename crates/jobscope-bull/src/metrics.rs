//! Rolling-window metric computation.
//!
//! The adapter samples the newest N members of the completed and failed
//! sets (scores = termination timestamps in epoch milliseconds) and reduces
//! them here. Pure math, no I/O.

use std::collections::HashMap;

use jobscope_core::{defaults, QueueMetrics};

/// Reduce terminal samples to a metrics snapshot.
///
/// `completed` and `failed` carry `(job_id, termination_ms)` pairs;
/// `processing_ms` carries the per-job processing durations recovered from
/// the sampled completed records. The one-hour throughput boundary is
/// inclusive.
pub(crate) fn summarize(
    now_ms: i64,
    completed: &[(String, f64)],
    failed: &[(String, f64)],
    processing_ms: &[i64],
) -> QueueMetrics {
    let window_start = now_ms - defaults::THROUGHPUT_WINDOW_MS;
    let in_window = |(_, score): &&(String, f64)| *score as i64 >= window_start;
    let throughput = (completed.iter().filter(in_window).count()
        + failed.iter().filter(in_window).count()) as u64;

    let sampled = completed.len() + failed.len();
    let failure_rate = if sampled == 0 {
        0.0
    } else {
        failed.len() as f64 / sampled as f64
    };

    let avg_processing_ms = if processing_ms.is_empty() {
        0.0
    } else {
        processing_ms.iter().sum::<i64>() as f64 / processing_ms.len() as f64
    };

    QueueMetrics {
        throughput,
        failure_rate,
        avg_processing_ms,
    }
}

/// Processing duration of one completed record, when recoverable.
///
/// Requires both `processedOn` and `finishedOn` to be well-formed integer
/// milliseconds; anything else skips the sample silently.
pub(crate) fn processing_time_ms(fields: &HashMap<String, String>) -> Option<i64> {
    let started: i64 = fields.get("processedOn")?.parse().ok()?;
    let finished: i64 = fields.get("finishedOn")?.parse().ok()?;
    Some(finished - started)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = defaults::THROUGHPUT_WINDOW_MS;

    fn sample(pairs: &[(&str, i64)]) -> Vec<(String, f64)> {
        pairs
            .iter()
            .map(|(id, ms)| (id.to_string(), *ms as f64))
            .collect()
    }

    #[test]
    fn test_empty_samples_are_all_zero() {
        let m = summarize(1_700_000_000_000, &[], &[], &[]);
        assert_eq!(m, QueueMetrics::zero());
    }

    #[test]
    fn test_throughput_counts_both_sets_in_window() {
        let now = 1_700_000_000_000;
        let completed = sample(&[("a", now - 1_000), ("b", now - 2 * HOUR_MS)]);
        let failed = sample(&[("c", now - 30 * 60 * 1000)]);
        let m = summarize(now, &completed, &failed, &[]);
        assert_eq!(m.throughput, 2);
    }

    #[test]
    fn test_throughput_window_boundary_is_inclusive() {
        let now = 1_700_000_000_000;
        let completed = sample(&[("edge", now - HOUR_MS)]);
        let m = summarize(now, &completed, &[], &[]);
        assert_eq!(m.throughput, 1);

        let completed = sample(&[("out", now - HOUR_MS - 1)]);
        let m = summarize(now, &completed, &[], &[]);
        assert_eq!(m.throughput, 0);
    }

    #[test]
    fn test_failure_rate_over_sampled_population() {
        let now = 1_700_000_000_000;
        let completed = sample(&[("a", now), ("b", now)]);
        let failed = sample(&[("c", now)]);
        let m = summarize(now, &completed, &failed, &[]);
        assert!((m.failure_rate - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_rate_stays_in_unit_interval() {
        let now = 1_700_000_000_000;
        let all_failed = sample(&[("a", now), ("b", now)]);
        let m = summarize(now, &[], &all_failed, &[]);
        assert_eq!(m.failure_rate, 1.0);
        assert!(m.failure_rate >= 0.0 && m.failure_rate <= 1.0);
    }

    #[test]
    fn test_failure_rate_counts_stale_samples_too() {
        // Rate is over the sampled population, not the rolling window.
        let now = 1_700_000_000_000;
        let completed = sample(&[("old", now - 3 * HOUR_MS)]);
        let failed = sample(&[("older", now - 4 * HOUR_MS)]);
        let m = summarize(now, &completed, &failed, &[]);
        assert_eq!(m.throughput, 0);
        assert!((m.failure_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_avg_processing_mean() {
        let m = summarize(1_700_000_000_000, &[], &[], &[1000, 2000, 3000]);
        assert!((m.avg_processing_ms - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_processing_time_requires_both_timestamps() {
        let mut fields = HashMap::new();
        fields.insert("processedOn".to_string(), "1000".to_string());
        assert!(processing_time_ms(&fields).is_none());

        fields.insert("finishedOn".to_string(), "3500".to_string());
        assert_eq!(processing_time_ms(&fields), Some(2500));
    }

    #[test]
    fn test_processing_time_skips_malformed_values() {
        let mut fields = HashMap::new();
        fields.insert("processedOn".to_string(), "soon".to_string());
        fields.insert("finishedOn".to_string(), "3500".to_string());
        assert!(processing_time_ms(&fields).is_none());
    }
}
