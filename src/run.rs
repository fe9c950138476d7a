//! Handle on the translation jobs of one dispatched episode.
//!
//! A run owns the shared job set, publishes progress on a watch channel and
//! supervises the status poller. Dropping the run cancels its pollers, so no
//! timer outlives the view that started it.

use crate::config::PipelineConfig;
use crate::episode::{Episode, EpisodeKey};
use crate::jobs::{Progress, TranslationJobSet};
use crate::language::Language;
use crate::poller::StatusPoller;
use crate::services::Platform;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Mutable state of a run, guarded by one lock.
pub(crate) struct RunState {
    pub jobs: TranslationJobSet,
    /// A poller is attached. Only flipped while holding the lock, so a retry
    /// and a poller deciding to stop can never miss each other.
    pub polling: bool,
    pub degraded: bool,
}

impl RunState {
    fn progress(&self) -> Progress {
        let mut progress = self.jobs.progress();
        progress.degraded = self.degraded;
        progress.polling = self.polling;
        progress
    }
}

/// Everything the poller and the retry path share with the handle.
pub(crate) struct RunShared {
    pub key: EpisodeKey,
    pub platform: Arc<dyn Platform>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub state: Mutex<RunState>,
    progress: watch::Sender<Progress>,
}

impl RunShared {
    /// Pushes the current state to observers.
    pub fn publish(&self, state: &RunState) {
        self.progress.send_replace(state.progress());
    }
}

/// The translation jobs of one episode, as seen by this process.
pub struct TranslationRun {
    pub(crate) shared: Arc<RunShared>,
    /// Episode revision this run was dispatched for; unknown for adopted runs.
    revision: Option<u32>,
    stale: AtomicBool,
    pub(crate) cancel: CancellationToken,
}

impl TranslationRun {
    pub(crate) fn new(
        key: EpisodeKey,
        platform: Arc<dyn Platform>,
        settings: &PipelineConfig,
        jobs: TranslationJobSet,
        revision: Option<u32>,
    ) -> Self {
        let state = RunState {
            jobs,
            polling: false,
            degraded: false,
        };
        let (progress, _) = watch::channel(state.progress());

        Self {
            shared: Arc::new(RunShared {
                key,
                platform,
                poll_interval: settings.poll_interval(),
                request_timeout: settings.request_timeout(),
                max_consecutive_failures: settings.max_consecutive_poll_failures,
                state: Mutex::new(state),
                progress,
            }),
            revision,
            stale: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &EpisodeKey {
        &self.shared.key
    }

    pub fn revision(&self) -> Option<u32> {
        self.revision
    }

    /// Subscribes to progress updates.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.shared.progress.subscribe()
    }

    /// Latest published progress.
    pub fn progress(&self) -> Progress {
        self.shared.progress.borrow().clone()
    }

    /// Source language of the episode.
    pub async fn source(&self) -> Language {
        self.shared.state.lock().await.jobs.source()
    }

    /// A copy of the job set.
    pub async fn jobs(&self) -> TranslationJobSet {
        self.shared.state.lock().await.jobs.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.progress().polling
    }

    /// Attaches a poller unless one is already running.
    pub(crate) async fn ensure_polling(&self) {
        {
            let mut state = self.shared.state.lock().await;
            if state.polling {
                return;
            }
            state.polling = true;
            self.shared.publish(&state);
        }

        debug!(episode = %self.shared.key, "starting status poller");
        let poller = StatusPoller::new(self.shared.clone(), self.cancel.child_token());
        tokio::spawn(poller.run());
    }

    /// Waits until every target is terminal and no poller is attached, or
    /// until the run is cancelled. Returns the progress at that point.
    pub async fn wait(&self) -> Progress {
        let mut rx = self.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = rx.wait_for(|p| !p.polling && p.is_finished()) => {}
        }
        let progress = rx.borrow().clone();
        progress
    }

    /// Like [`wait`](Self::wait), calling `on_update` with every progress
    /// published along the way.
    pub async fn watch(&self, mut on_update: impl FnMut(&Progress)) -> Progress {
        let mut rx = self.subscribe();
        loop {
            let progress = rx.borrow_and_update().clone();
            on_update(&progress);
            if progress.is_finished() && !progress.polling {
                return progress;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.progress(),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return self.progress();
                    }
                }
            }
        }
    }

    /// Marks the run stale when `episode` was revised after dispatch.
    ///
    /// A stale run stops polling and refuses retries; the new revision has to
    /// be dispatched on its own.
    pub fn invalidate_if_revised(&self, episode: &Episode) -> bool {
        let Some(revision) = self.revision else {
            return false;
        };
        if episode.key() == self.shared.key && episode.revision() == revision {
            return false;
        }
        info!(
            episode = %self.shared.key,
            dispatched = revision,
            current = episode.revision(),
            "episode revised, invalidating translation run"
        );
        self.stale.store(true, Ordering::Release);
        self.cancel.cancel();
        true
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Stops every poller of this run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TranslationRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
