//! Per-worker service metrics in OpenMetrics text format.
//!
//! Monotonic counters plus a duration sum; the active-worker gauge derives
//! from the admission semaphore at render time. Counters only need to be
//! individually accurate (rate correctness), not cross-consistent.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,
    pub rejects_concurrency: AtomicU64,
    pub rejects_timeout: AtomicU64,
    execution_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_execution(&self, elapsed: Duration) {
        self.execution_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Render the OpenMetrics exposition text.
    pub fn render(&self, active_workers: usize) -> String {
        let mut out = String::new();
        let counters = [
            (
                "avap_requests_total",
                "Total requests received",
                self.requests_total.load(Ordering::Relaxed),
            ),
            (
                "avap_requests_success",
                "Requests completed successfully",
                self.requests_success.load(Ordering::Relaxed),
            ),
            (
                "avap_requests_error",
                "Requests failed with a script or command error",
                self.requests_error.load(Ordering::Relaxed),
            ),
            (
                "avap_rejects_concurrency",
                "Requests rejected due to lack of slots (503)",
                self.rejects_concurrency.load(Ordering::Relaxed),
            ),
            (
                "avap_rejects_timeout",
                "Requests terminated by the execution watchdog (504)",
                self.rejects_timeout.load(Ordering::Relaxed),
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        }

        let _ = writeln!(
            out,
            "# HELP avap_active_workers Currently busy execution slots"
        );
        let _ = writeln!(out, "# TYPE avap_active_workers gauge");
        let _ = writeln!(out, "avap_active_workers {}", active_workers);

        let _ = writeln!(
            out,
            "# HELP avap_execution_time_ms Accumulated request handling time"
        );
        let _ = writeln!(out, "# TYPE avap_execution_time_ms counter");
        let _ = write!(out, "avap_execution_time_ms {}", self.execution_time_ms());
        out
    }
}
