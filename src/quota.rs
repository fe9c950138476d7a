//! Daily translation quota.
//!
//! The server is the only source of truth. The tracker keeps the last
//! snapshot for display and pre-flight gating, counts `reset_in` down
//! locally, and goes back to the server once the countdown runs out.

use crate::error::PipelineError;
use crate::services::Platform;
use crate::utils::with_timeout;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Quota as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    pub used: u32,
    pub remaining: u32,
    /// Seconds until the daily reset.
    pub reset_in: u64,
}

/// A quota reading and the moment it was taken.
#[derive(Debug, Clone, Copy)]
pub struct QuotaSnapshot {
    pub state: QuotaState,
    fetched_at: Instant,
}

impl QuotaSnapshot {
    pub fn new(state: QuotaState, fetched_at: Instant) -> Self {
        Self { state, fetched_at }
    }

    /// Countdown to the reset, derived from the server value and elapsed time.
    pub fn reset_in(&self) -> Duration {
        self.reset_in_at(Instant::now())
    }

    fn reset_in_at(&self, now: Instant) -> Duration {
        Duration::from_secs(self.state.reset_in)
            .saturating_sub(now.saturating_duration_since(self.fetched_at))
    }

    /// True once the local countdown has reached zero.
    pub fn is_stale(&self) -> bool {
        self.reset_in().is_zero()
    }

    pub fn has_remaining(&self) -> bool {
        self.state.remaining > 0
    }

    /// Fails with `QuotaExhausted` unless at least one translation is left.
    pub fn ensure_remaining(&self) -> Result<(), PipelineError> {
        if self.has_remaining() {
            return Ok(());
        }
        info!(reset_in = self.state.reset_in, "translation quota exhausted");
        Err(PipelineError::QuotaExhausted {
            reset_in: self.reset_in(),
        })
    }
}

/// Reads and caches the caller's translation quota.
pub struct QuotaTracker {
    platform: Arc<dyn Platform>,
    timeout: Duration,
    last: Mutex<Option<QuotaSnapshot>>,
}

impl QuotaTracker {
    pub fn new(platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        Self {
            platform,
            timeout,
            last: Mutex::new(None),
        }
    }

    /// Fetches a fresh snapshot from the server.
    ///
    /// A failed read never falls back to the cached value.
    pub async fn check(&self) -> Result<QuotaSnapshot, PipelineError> {
        let state = with_timeout("quota", self.timeout, self.platform.quota())
            .await
            .map_err(PipelineError::QuotaCheckFailed)?;

        let snapshot = QuotaSnapshot::new(state, Instant::now());
        debug!(
            used = state.used,
            remaining = state.remaining,
            reset_in = state.reset_in,
            "quota synced"
        );
        self.store(snapshot);
        Ok(snapshot)
    }

    /// Returns the cached snapshot, syncing when there is none or its
    /// countdown has expired.
    pub async fn current(&self) -> Result<QuotaSnapshot, PipelineError> {
        match self.cached() {
            Some(snapshot) if !snapshot.is_stale() => Ok(snapshot),
            _ => self.check().await,
        }
    }

    /// Last snapshot without touching the network.
    pub fn cached(&self) -> Option<QuotaSnapshot> {
        self.last.lock().ok().and_then(|guard| *guard)
    }

    fn store(&self, snapshot: QuotaSnapshot) {
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakePlatform;

    fn state(remaining: u32, reset_in: u64) -> QuotaState {
        QuotaState {
            used: 10 - remaining,
            remaining,
            reset_in,
        }
    }

    #[test]
    fn test_countdown_saturates() {
        let now = Instant::now();
        let snapshot = QuotaSnapshot::new(state(1, 10), now);
        assert_eq!(snapshot.reset_in_at(now), Duration::from_secs(10));
        assert_eq!(
            snapshot.reset_in_at(now + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(
            snapshot.reset_in_at(now + Duration::from_secs(30)),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_resyncs_after_countdown() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_quota(state(3, 60));
        let tracker = QuotaTracker::new(platform.clone(), Duration::from_secs(5));

        tracker.check().await.unwrap();
        assert_eq!(platform.quota_calls(), 1);

        // Still counting down: served from cache.
        tokio::time::advance(Duration::from_secs(30)).await;
        let snapshot = tracker.current().await.unwrap();
        assert_eq!(platform.quota_calls(), 1);
        assert_eq!(snapshot.reset_in(), Duration::from_secs(30));

        // Countdown hit zero: the server is asked again.
        platform.set_quota(state(10, 86_400));
        tokio::time::advance(Duration::from_secs(31)).await;
        let snapshot = tracker.current().await.unwrap();
        assert_eq!(platform.quota_calls(), 2);
        assert_eq!(snapshot.state.remaining, 10);
    }

    #[tokio::test]
    async fn test_exhausted_quota_is_rejected() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_quota(state(0, 120));
        let tracker = QuotaTracker::new(platform, Duration::from_secs(5));

        let snapshot = tracker.check().await.unwrap();
        match snapshot.ensure_remaining() {
            Err(PipelineError::QuotaExhausted { reset_in }) => {
                assert!(reset_in <= Duration::from_secs(120));
                assert!(reset_in > Duration::from_secs(100));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_check_surfaces_error() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_quota(state(5, 120));
        let tracker = QuotaTracker::new(platform.clone(), Duration::from_secs(5));
        tracker.check().await.unwrap();

        platform.fail_quota(true);
        assert!(matches!(
            tracker.check().await,
            Err(PipelineError::QuotaCheckFailed(_))
        ));
        // The stale cached value is kept but never returned by a failed check.
        assert_eq!(tracker.cached().map(|s| s.state.remaining), Some(5));
    }
}
