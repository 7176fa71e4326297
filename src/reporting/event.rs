//! Observed traffic events.

use std::time::{Duration, SystemTime};

/// Status recorded for exchanges that failed before producing a response.
pub const FAILURE_STATUS: u16 = 500;

/// One observed request arrival or response completion.
///
/// Fields are private: an event cannot be changed after construction, and
/// submitting it to the reporter moves it into the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    is_request: bool,
    status_code: u16,
    trace_id: String,
    start_time: SystemTime,
    end_time: SystemTime,
    error: Option<String>,
}

impl Event {
    /// Request-arrival marker. Start and end both equal the arrival instant.
    pub fn request(trace_id: impl Into<String>, at: SystemTime) -> Self {
        Self {
            is_request: true,
            status_code: 0,
            trace_id: trace_id.into(),
            start_time: at,
            end_time: at,
            error: None,
        }
    }

    /// Response-completion marker spanning the whole exchange.
    pub fn response(
        trace_id: impl Into<String>,
        status_code: u16,
        start_time: SystemTime,
        end_time: SystemTime,
    ) -> Self {
        Self {
            is_request: false,
            status_code,
            trace_id: trace_id.into(),
            start_time,
            end_time,
            error: None,
        }
    }

    /// Response marker for a round trip that failed before a response arrived.
    /// Recorded with [`FAILURE_STATUS`].
    pub fn failure(
        trace_id: impl Into<String>,
        start_time: SystemTime,
        end_time: SystemTime,
        error: impl Into<String>,
    ) -> Self {
        Self {
            is_request: false,
            status_code: FAILURE_STATUS,
            trace_id: trace_id.into(),
            start_time,
            end_time,
            error: Some(error.into()),
        }
    }

    pub fn is_request(&self) -> bool {
        self.is_request
    }

    /// Status code of a response marker. Meaningless for request markers.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Wall-clock span of the event. Zero if the clock stepped backwards.
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }

    /// Consume the event, keeping only its trace id.
    pub(crate) fn into_trace_id(self) -> String {
        self.trace_id
    }
}
