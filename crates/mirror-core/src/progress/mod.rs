//! Progress snapshots, the rate limiter and the reporter that forwards them.
//!
//! Progress is informational only: nothing in the pipeline makes control
//! decisions from it.

mod limiter;
mod reporter;

pub use limiter::{LimitPolicy, RateLimiter};
pub use reporter::{ChannelObserver, JobEvent, JobObserver, ProgressReporter, TracingObserver};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transfer progress for the current step of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub bytes_done: u64,
    /// `None` when the total is not known (no `Content-Length`, no torrent metadata yet).
    pub bytes_total: Option<u64>,
    pub rate_bytes_per_sec: f64,
    pub eta_secs: Option<f64>,
    /// True when the numbers are synthesized (e.g. browser uploads) rather than measured.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl Progress {
    /// Progress with the average rate over `elapsed`.
    pub fn measured(bytes_done: u64, bytes_total: Option<u64>, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            bytes_done as f64 / secs
        } else {
            0.0
        };
        Self::with_rate(bytes_done, bytes_total, rate)
    }

    /// Progress with a rate reported by an engine.
    pub fn with_rate(bytes_done: u64, bytes_total: Option<u64>, rate_bytes_per_sec: f64) -> Self {
        let eta_secs = bytes_total.and_then(|total| {
            let remaining = total.saturating_sub(bytes_done);
            if remaining == 0 {
                Some(0.0)
            } else if rate_bytes_per_sec > 0.0 {
                Some(remaining as f64 / rate_bytes_per_sec)
            } else {
                None
            }
        });
        Self {
            bytes_done,
            bytes_total,
            rate_bytes_per_sec,
            eta_secs,
            estimated: false,
        }
    }

    /// Mark as a displayed estimate rather than a measurement.
    pub fn estimated(mut self) -> Self {
        self.estimated = true;
        self
    }

    /// Fraction complete in [0.0, 1.0], if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.bytes_total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.bytes_done as f64 / total as f64).min(1.0)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_rate_and_eta() {
        let p = Progress::measured(500, Some(1500), Duration::from_secs(5));
        assert!((p.rate_bytes_per_sec - 100.0).abs() < 1e-9);
        assert!((p.eta_secs.unwrap() - 10.0).abs() < 1e-9);
        assert!((p.fraction().unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_total_has_no_eta() {
        let p = Progress::measured(500, None, Duration::from_secs(1));
        assert!(p.eta_secs.is_none());
        assert!(p.fraction().is_none());
    }

    #[test]
    fn stalled_transfer_has_no_eta_until_done() {
        assert!(Progress::with_rate(10, Some(20), 0.0).eta_secs.is_none());
        assert_eq!(Progress::with_rate(20, Some(20), 0.0).eta_secs, Some(0.0));
        assert_eq!(Progress::measured(0, Some(0), Duration::ZERO).fraction(), Some(1.0));
    }

    #[test]
    fn estimated_flag_only_serialized_when_set() {
        let measured = serde_json::to_value(Progress::with_rate(1, Some(2), 1.0)).unwrap();
        assert!(measured.get("estimated").is_none());
        let est = serde_json::to_value(Progress::with_rate(1, Some(2), 1.0).estimated()).unwrap();
        assert_eq!(est["estimated"], serde_json::Value::Bool(true));
    }
}
