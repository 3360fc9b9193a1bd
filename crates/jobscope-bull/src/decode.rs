//! BullMQ job-record decoding.
//!
//! The broker record is a flat map of string fields, JSON-encoded where
//! structural. Payload fields (`data`, `opts`, `returnvalue`, `stacktrace`)
//! decode leniently: a malformed value surfaces the raw string so callers
//! can inspect broken jobs. Structural fields (timestamps, counters) decode
//! strictly and fail the fetch with a decode error.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value as JsonValue;

use jobscope_core::{Error, Job, JobFailure, JobStatus, Result};

/// Decode one job-record hash into a normalized [`Job`].
///
/// The status is resolved by the caller (index probes); the record itself
/// does not carry one.
pub(crate) fn decode_record(
    queue: &str,
    id: &str,
    status: JobStatus,
    fields: &HashMap<String, String>,
) -> Result<Job> {
    let payload = fields.get("data").map(lenient_json).unwrap_or(JsonValue::Null);
    let result = fields.get("returnvalue").map(|raw| lenient_json(raw));

    let attempts = parse_u32(fields, "attemptsMade")?.unwrap_or(0);
    let max_attempts = fields
        .get("opts")
        .and_then(|raw| serde_json::from_str::<JsonValue>(raw).ok())
        .and_then(|opts| opts.get("attempts").and_then(JsonValue::as_u64))
        .map(|n| n as u32);

    let created_at = parse_millis(fields, "timestamp")?;
    let started_at = parse_millis(fields, "processedOn")?;
    let finished_at = parse_millis(fields, "finishedOn")?;

    let delay_ms = parse_i64(fields, "delay")?;
    let delayed_until = match (created_at, delay_ms) {
        (Some(created), Some(delay)) if delay > 0 => Some(created + Duration::milliseconds(delay)),
        _ => None,
    };

    let error = fields.get("failedReason").map(|message| JobFailure {
        message: message.clone(),
        stack: decode_stacktrace(fields.get("stacktrace")),
    });

    Ok(Job {
        id: id.to_string(),
        queue: queue.to_string(),
        status,
        payload,
        result,
        error,
        attempts,
        max_attempts,
        created_at,
        started_at,
        finished_at,
        delayed_until,
    })
}

/// Parse a payload field as JSON, surfacing the raw string on failure.
fn lenient_json(raw: &String) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.clone()))
}

/// `stacktrace` is a JSON list of strings; a malformed value is retained
/// verbatim as a single entry.
fn decode_stacktrace(raw: Option<&String>) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(raw) => match serde_json::from_str::<Vec<String>>(raw) {
            Ok(lines) => lines,
            Err(_) => vec![raw.clone()],
        },
    }
}

fn parse_i64(fields: &HashMap<String, String>, name: &str) -> Result<Option<i64>> {
    match fields.get(name) {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
            Error::Decode(format!("field {name} is not an integer: {raw:?}"))
        }),
    }
}

fn parse_u32(fields: &HashMap<String, String>, name: &str) -> Result<Option<u32>> {
    match fields.get(name) {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw.parse::<u32>().map(Some).map_err(|_| {
            Error::Decode(format!("field {name} is not a counter: {raw:?}"))
        }),
    }
}

/// Millisecond-epoch structural field → UTC timestamp.
fn parse_millis(fields: &HashMap<String, String>, name: &str) -> Result<Option<DateTime<Utc>>> {
    match parse_i64(fields, name)? {
        None => Ok(None),
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(Some)
            .ok_or_else(|| Error::Decode(format!("field {name} is out of range: {ms}"))),
    }
}
