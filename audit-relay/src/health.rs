//! Per-registration failure tracking
//!
//! Counts consecutive provider failures so the failure log can say how long a
//! destination has been down, and logs a recovery line when it comes back.
//! The counters are diagnostics only; no dispatch decision reads them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// Internal state protected by a `std::sync::Mutex`
///
/// The mutex is never held across `.await` points.
#[derive(Default)]
struct TrackerState {
    /// Wall-clock time of the first failure in the current outage
    failing_since: Option<DateTime<Utc>>,
    consecutive_failures: u64,
    total_failures: u64,
    last_error: Option<String>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Failure counters of one registration
pub(crate) struct HealthTracker {
    registration: String,
    state: Mutex<TrackerState>,
}

/// Point-in-time view of a registration's health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationHealth {
    /// Registration name
    pub registration: String,
    /// Failures since the last success
    pub consecutive_failures: u64,
    /// Failures since the dispatcher was built
    pub total_failures: u64,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// When the most recent failure happened
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Start of the current outage, if failing
    pub failing_since: Option<DateTime<Utc>>,
}

impl RegistrationHealth {
    /// Whether the last call to this registration succeeded
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

impl HealthTracker {
    pub(crate) fn new(registration: impl Into<String>) -> Self {
        Self {
            registration: registration.into(),
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        // counters stay usable even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a failure, returning the consecutive failure count
    pub(crate) fn record_failure(&self, error: &str) -> u64 {
        let mut state = self.lock();
        let now = Utc::now();
        if state.failing_since.is_none() {
            state.failing_since = Some(now);
        }
        state.consecutive_failures += 1;
        state.total_failures += 1;
        state.last_error = Some(error.to_string());
        state.last_failure_at = Some(now);
        state.consecutive_failures
    }

    /// Record a success, logging recovery after an outage
    pub(crate) fn record_success(&self) {
        let outage = {
            let mut state = self.lock();
            if state.consecutive_failures == 0 {
                return;
            }
            let outage = (state.consecutive_failures, state.failing_since.take());
            state.consecutive_failures = 0;
            outage
        }; // lock dropped here

        let (failures, since) = outage;
        let outage_secs = since
            .map(|since| (Utc::now() - since).num_seconds().max(0))
            .unwrap_or(0);
        tracing::info!(
            registration = %self.registration,
            failures,
            outage_secs,
            "Audit provider '{}' recovered",
            self.registration
        );
    }

    pub(crate) fn snapshot(&self) -> RegistrationHealth {
        let state = self.lock();
        RegistrationHealth {
            registration: self.registration.clone(),
            consecutive_failures: state.consecutive_failures,
            total_failures: state.total_failures,
            last_error: state.last_error.clone(),
            last_failure_at: state.last_failure_at,
            failing_since: state.failing_since,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn consecutive_failures_accumulate() {
        let tracker = HealthTracker::new("siem");
        assert_eq!(tracker.record_failure("connection refused"), 1);
        assert_eq!(tracker.record_failure("connection reset"), 2);

        let health = tracker.snapshot();
        assert!(!health.is_healthy());
        assert_eq!(health.total_failures, 2);
        assert_eq!(health.last_error.as_deref(), Some("connection reset"));
        assert!(health.failing_since.is_some());
    }

    #[test]
    #[traced_test]
    fn success_resets_and_logs_recovery() {
        let tracker = HealthTracker::new("db");
        tracker.record_failure("timeout");
        tracker.record_success();

        let health = tracker.snapshot();
        assert!(health.is_healthy());
        assert_eq!(health.total_failures, 1);
        assert!(health.failing_since.is_none());
        assert!(logs_contain("Audit provider 'db' recovered"));
    }

    #[test]
    #[traced_test]
    fn success_without_outage_is_quiet() {
        let tracker = HealthTracker::new("db");
        tracker.record_success();
        assert!(!logs_contain("recovered"));
    }
}
