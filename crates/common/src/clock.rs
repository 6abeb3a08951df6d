//! Clock and timing utilities for stream synchronization.
//!
//! Video and audio arrive from independent delivery contexts, each stamped
//! in the platform's monotonic clock domain. A [`SessionClock`] maps those
//! stamps onto one session time base whose zero is the first sample the
//! sink accepted, not the moment capture was requested. A platform that
//! delivers its first frame late therefore produces no leading gap.

use std::sync::OnceLock;

/// Shared time base for one capture session.
#[derive(Debug)]
pub struct SessionClock {
    /// Source timestamp (ns) of the first accepted sample.
    anchor_ns: OnceLock<u64>,
}

impl SessionClock {
    /// Create an unanchored clock.
    pub fn new() -> Self {
        Self {
            anchor_ns: OnceLock::new(),
        }
    }

    /// Map a source timestamp onto the session time base.
    ///
    /// The first call fixes the anchor. Timestamps earlier than the anchor
    /// (possible when the other media kind won the race to anchor) clamp
    /// to zero.
    pub fn session_time_ns(&self, source_pts_ns: u64) -> u64 {
        let anchor = *self.anchor_ns.get_or_init(|| source_pts_ns);
        source_pts_ns.saturating_sub(anchor)
    }

    /// Source timestamp of time zero, once a sample has been accepted.
    pub fn anchor_ns(&self) -> Option<u64> {
        self.anchor_ns.get().copied()
    }

    /// Convert a nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_anchors_time_zero() {
        let clock = SessionClock::new();
        assert_eq!(clock.anchor_ns(), None);

        assert_eq!(clock.session_time_ns(5_000_000_000), 0);
        assert_eq!(clock.anchor_ns(), Some(5_000_000_000));
        assert_eq!(clock.session_time_ns(5_033_000_000), 33_000_000);
    }

    #[test]
    fn earlier_stamps_clamp_to_zero() {
        let clock = SessionClock::new();
        clock.session_time_ns(1_000);
        assert_eq!(clock.session_time_ns(400), 0);
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((SessionClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }
}
