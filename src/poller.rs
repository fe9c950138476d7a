//! Periodic status polling for a translation run.

use crate::jobs::Progress;
use crate::run::{RunShared, RunState};
use crate::utils::with_timeout;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a poller stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Every target reached a terminal status.
    Finished(Progress),
    /// The run was cancelled or dropped.
    Cancelled,
}

/// Fetches statuses on a fixed interval and merges them into the run.
///
/// Polling never overlaps: the next tick waits for the previous request to
/// finish or time out. A failed tick is skipped; the poller only gives up
/// when cancelled or when every target is terminal, which is checked before
/// each fetch so a run whose jobs all failed locally stops without one.
pub(crate) struct StatusPoller {
    shared: Arc<RunShared>,
    cancel: CancellationToken,
}

impl StatusPoller {
    pub fn new(shared: Arc<RunShared>, cancel: CancellationToken) -> Self {
        Self { shared, cancel }
    }

    pub async fn run(self) -> PollOutcome {
        let outcome = self.poll_until_done().await;
        if outcome == PollOutcome::Cancelled {
            let mut state = self.shared.state.lock().await;
            state.polling = false;
            self.shared.publish(&state);
            debug!(episode = %self.shared.key, "status poller cancelled");
        }
        outcome
    }

    async fn poll_until_done(&self) -> PollOutcome {
        let shared = &self.shared;
        let mut interval = time::interval(shared.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PollOutcome::Cancelled,
                _ = interval.tick() => {}
            }

            let ticket = {
                let mut state = shared.state.lock().await;
                if state.jobs.is_terminal() {
                    return self.finish(&mut state);
                }
                state.jobs.poll_ticket()
            };
            let fetch = with_timeout(
                "translations-status",
                shared.request_timeout,
                shared.platform.translation_statuses(&shared.key),
            );
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PollOutcome::Cancelled,
                result = fetch => result,
            };

            let mut state = shared.state.lock().await;
            match result {
                Ok(statuses) => {
                    failures = 0;
                    state.degraded = false;
                    let report = state.jobs.merge(&ticket, &statuses);
                    if !report.changed.is_empty() {
                        debug!(episode = %shared.key, changed = ?report.changed, "statuses updated");
                    }
                    if !report.stale.is_empty() {
                        debug!(episode = %shared.key, stale = ?report.stale, "ignored stale statuses");
                    }

                    if state.jobs.is_terminal() {
                        return self.finish(&mut state);
                    }
                    shared.publish(&state);
                }
                Err(e) => {
                    failures += 1;
                    if e.is_transient() {
                        debug!(episode = %shared.key, failures, error = %e, "status poll failed");
                    } else {
                        warn!(episode = %shared.key, failures, error = %e, "status poll rejected");
                    }
                    if failures == shared.max_consecutive_failures {
                        warn!(
                            episode = %shared.key,
                            failures,
                            error = %e,
                            "status service unreachable, progress may be out of date"
                        );
                        state.degraded = true;
                        shared.publish(&state);
                    }
                    // A retry failing meanwhile can leave nothing to wait for.
                    if state.jobs.is_terminal() {
                        return self.finish(&mut state);
                    }
                }
            }
        }
    }

    /// Clears the polling flag while the caller holds the state lock.
    fn finish(&self, state: &mut RunState) -> PollOutcome {
        state.polling = false;
        self.shared.publish(state);
        let progress = state.jobs.progress();
        info!(
            episode = %self.shared.key,
            completed = progress.completed,
            total = progress.total,
            "translations finished"
        );
        PollOutcome::Finished(progress)
    }
}
