//! Periodic metrics reporter.
//!
//! # States
//! ```text
//! Running → Draining (every period) → Running
//! any     → Stopped (first close() only)
//! ```
//!
//! # Design Decisions
//! - The reporter is an explicit `Arc<MetricsReporter>` handed to the HTTP
//!   layer, never a global
//! - `run` only suspends waiting for "period elapsed or stop"; `add_event`
//!   never waits on it
//! - Each window is reduced and dispatched on its own spawned task, so a slow
//!   sink never delays the next drain
//! - Close is single-fire: an atomic flag decides the winner, a watch channel
//!   wakes the loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::reporting::buffer::EventBuffer;
use crate::reporting::event::Event;
use crate::reporting::reducer::{reduce, InflightStats};
use crate::reporting::sink::{FnSink, SinkError, StatsSink};

/// Reporting period used when a zero period is configured.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Errors surfaced by reporter control operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReporterError {
    #[error("metrics reporter already closed")]
    AlreadyClosed,
}

/// Boxed because `ArcSwapOption<T>` needs a sized `T`.
type SinkSlot = ArcSwapOption<Box<dyn StatsSink>>;

/// Buffers traffic events and reports one summary per period.
pub struct MetricsReporter {
    buffer: EventBuffer,
    period: Duration,
    sink: SinkSlot,
    closed: AtomicBool,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl MetricsReporter {
    /// Create a reporter without a sink. A zero period becomes [`DEFAULT_PERIOD`].
    pub fn new(period: Duration) -> Self {
        let period = if period.is_zero() {
            tracing::debug!(default_secs = DEFAULT_PERIOD.as_secs(), "Zero reporting period, using default");
            DEFAULT_PERIOD
        } else {
            period
        };
        let (stop_tx, _) = watch::channel(false);

        Self {
            buffer: EventBuffer::new(),
            period,
            sink: ArcSwapOption::empty(),
            closed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_tx,
        }
    }

    /// Create a reporter that dispatches to `sink`.
    pub fn with_sink(period: Duration, sink: impl StatsSink + 'static) -> Self {
        let reporter = Self::new(period);
        reporter.set_sink(sink);
        reporter
    }

    /// Queue an event for the current window.
    pub fn add_event(&self, event: Event) {
        self.buffer.add(event);
    }

    /// Replace the sink. Windows already dispatched keep the sink they loaded.
    pub fn set_sink(&self, sink: impl StatsSink + 'static) {
        let sink: Box<dyn StatsSink> = Box::new(sink);
        tracing::debug!(sink = sink.name(), "Stats sink configured");
        self.sink.store(Some(Arc::new(sink)));
    }

    /// Replace the sink with a closure.
    pub fn set_stats_receiver<F>(&self, receiver: F)
    where
        F: Fn(InflightStats) -> Result<(), SinkError> + Send + Sync + 'static,
    {
        self.set_sink(FnSink::new(receiver));
    }

    /// Remove the sink; subsequent windows are dropped after draining.
    pub fn clear_sink(&self) {
        self.sink.store(None);
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Events waiting for the next drain.
    pub fn pending_events(&self) -> usize {
        self.buffer.len()
    }

    /// Run the timer loop until [`close`](Self::close) is called.
    ///
    /// Meant to be spawned as a background task. Returns immediately if the
    /// reporter is already closed or its loop has already been started; one
    /// reporter owns one window sequence.
    pub async fn run(&self) {
        let mut stop = self.stop_tx.subscribe();
        if *stop.borrow() {
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("Metrics reporter loop already started, ignoring second run");
            return;
        }

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut window = 0u64;

        tracing::info!(period_ms = self.period.as_millis() as u64, "Metrics reporter starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }

            window += 1;
            let events = self.buffer.drain_and_reset();
            self.dispatch(events, window);
        }

        tracing::info!(windows = window, "Metrics reporter stopped");
    }

    /// Stop the timer loop. Only the first call succeeds; in-flight dispatches
    /// are left to finish on their own.
    pub fn close(&self) -> Result<(), ReporterError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReporterError::AlreadyClosed);
        }

        self.stop_tx.send_replace(true);
        tracing::debug!("Metrics reporter close requested");
        Ok(())
    }

    fn dispatch(&self, events: Vec<Event>, window: u64) {
        let Some(sink) = self.sink.load_full() else {
            tracing::trace!(window, dropped = events.len(), "No stats sink, window dropped");
            return;
        };

        tokio::spawn(async move {
            let stats = reduce(events, window);
            if let Err(e) = sink.receive(stats).await {
                tracing::warn!(window, sink = sink.name(), error = %e, "Stats sink failed");
            }
        });
    }
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("period", &self.period)
            .field("pending", &self.buffer.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
