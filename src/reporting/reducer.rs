//! Per-window reduction of events into summary statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reporting::event::Event;

/// Status classes a well-formed HTTP status code can fall into.
const STATUS_CLASSES: std::ops::RangeInclusive<u16> = 1..=5;

/// Summary of one reporting window.
///
/// Serializes to the field names the monitoring backend consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflightStats {
    #[serde(rename = "NRequests")]
    pub request_count: usize,

    #[serde(rename = "TraceIDs")]
    pub trace_ids: Vec<String>,

    #[serde(rename = "NthIteration")]
    pub window_index: u64,

    /// Status class (`status / 100`) to percentage of responses in the window.
    #[serde(rename = "RateResponseStats")]
    pub status_class_rate_percent: BTreeMap<u16, f64>,

    #[serde(rename = "AverageResponseDurationSeconds")]
    pub average_response_duration_seconds: f64,
}

/// Reduce one drained batch into the window's statistics.
///
/// Trace ids of every event are kept in arrival order. Rates and the average
/// duration divide by the response count floored at one, so an empty window
/// reports zeros. Responses whose status is outside `100..=599` count toward
/// the denominator and the average but are not attributed to a class.
pub fn reduce(events: Vec<Event>, window_index: u64) -> InflightStats {
    let mut request_count = 0usize;
    let mut response_count = 0usize;
    let mut total_duration = Duration::ZERO;
    let mut class_counts: BTreeMap<u16, usize> = BTreeMap::new();
    let mut trace_ids = Vec::with_capacity(events.len());

    for event in events {
        if event.is_request() {
            request_count += 1;
        } else {
            response_count += 1;
            total_duration += event.duration();

            let class = event.status_code() / 100;
            if STATUS_CLASSES.contains(&class) {
                *class_counts.entry(class).or_default() += 1;
            } else {
                tracing::debug!(
                    trace_id = %event.trace_id(),
                    status = event.status_code(),
                    "Status code outside 100..=599, not attributed to a class"
                );
            }
        }
        trace_ids.push(event.into_trace_id());
    }

    let denominator = response_count.max(1) as f64;
    let status_class_rate_percent = class_counts
        .into_iter()
        .map(|(class, count)| (class, 100.0 * count as f64 / denominator))
        .collect();

    InflightStats {
        request_count,
        trace_ids,
        window_index,
        status_class_rate_percent,
        average_response_duration_seconds: total_duration.as_secs_f64() / denominator,
    }
}
