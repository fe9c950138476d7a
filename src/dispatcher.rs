//! Saving an episode and sending out its translation jobs.

use crate::config::PipelineConfig;
use crate::episode::{Episode, EpisodeKey};
use crate::error::{PipelineError, ServiceError};
use crate::jobs::TranslationJobSet;
use crate::language::Language;
use crate::quota::QuotaTracker;
use crate::run::TranslationRun;
use crate::services::Platform;
use crate::utils::with_timeout;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a saved episode into a set of running translation jobs.
pub struct JobDispatcher {
    platform: Arc<dyn Platform>,
    quota: Arc<QuotaTracker>,
    settings: PipelineConfig,
}

impl JobDispatcher {
    pub fn new(platform: Arc<dyn Platform>, quota: Arc<QuotaTracker>, settings: PipelineConfig) -> Self {
        Self {
            platform,
            quota,
            settings,
        }
    }

    /// Saves `episode` if needed and dispatches one job per target language.
    ///
    /// Gating failures (quota, save) return before any job is sent. Once the
    /// batch goes out, a failing language only marks itself FAILED.
    pub async fn dispatch(
        &self,
        episode: &mut Episode,
        source: Language,
    ) -> Result<TranslationRun, PipelineError> {
        let key = episode.key();
        let snapshot = self.quota.check().await?;

        if !episode.is_saved() {
            self.save(episode).await?;
        }

        snapshot.ensure_remaining()?;

        let targets = Language::targets(&self.settings.languages, source);
        let run = TranslationRun::new(
            key.clone(),
            self.platform.clone(),
            &self.settings,
            TranslationJobSet::new(source, &targets),
            Some(episode.revision()),
        );

        let dispatched = self.send_batch(&run).await;
        info!(
            episode = %key,
            %source,
            dispatched,
            total = run.progress().total,
            "translation jobs dispatched"
        );

        if let Err(e) = self.quota.check().await {
            warn!(error = %e, "could not refresh quota after dispatch");
        }

        run.ensure_polling().await;
        Ok(run)
    }

    /// Rebuilds a run for an episode dispatched earlier, from one status fetch.
    ///
    /// Targets the service has never heard of are marked FAILED so they can
    /// be retried. Not quota-gated.
    pub async fn resume(
        &self,
        key: EpisodeKey,
        source: Language,
    ) -> Result<TranslationRun, PipelineError> {
        let statuses = with_timeout(
            "translations-status",
            self.settings.request_timeout(),
            self.platform.translation_statuses(&key),
        )
        .await?;

        let targets = Language::targets(&self.settings.languages, source);
        let mut jobs = TranslationJobSet::new(source, &targets);
        let ticket = jobs.poll_ticket();
        jobs.merge(&ticket, &statuses);
        let unknown = jobs.fail_unconfirmed();
        if !unknown.is_empty() {
            debug!(episode = %key, languages = ?unknown, "no job registered, marked failed");
        }

        let run = TranslationRun::new(key, self.platform.clone(), &self.settings, jobs, None);
        if run.progress().is_finished() {
            return Ok(run);
        }
        run.ensure_polling().await;
        Ok(run)
    }

    /// Creates the episode, or updates it when it was created before and
    /// has since been revised.
    async fn save(&self, episode: &mut Episode) -> Result<(), PipelineError> {
        if let Some(id) = episode.remote_id().map(str::to_string) {
            return match with_timeout(
                "episodes",
                self.settings.request_timeout(),
                self.platform.update_episode(&id, episode),
            )
            .await
            {
                Ok(()) => {
                    info!(episode = %episode.key(), id = %id, revision = episode.revision(), "episode updated");
                    episode.mark_saved(id);
                    Ok(())
                }
                Err(e) => Err(save_error(episode, e)),
            };
        }

        let result = with_timeout(
            "episodes",
            self.settings.request_timeout(),
            self.platform.save_episode(episode),
        )
        .await;

        match result {
            Ok(id) => {
                info!(episode = %episode.key(), id = %id, revision = episode.revision(), "episode saved");
                episode.mark_saved(id);
                Ok(())
            }
            Err(e) => Err(save_error(episode, e)),
        }
    }

    /// Sends every target concurrently and folds failures into the job set.
    /// Returns the number of accepted requests.
    async fn send_batch(&self, run: &TranslationRun) -> usize {
        let shared = &run.shared;
        let batch = {
            let mut state = shared.state.lock().await;
            let batch: Vec<(Language, u64)> = state
                .jobs
                .targets()
                .into_iter()
                .filter_map(|lang| state.jobs.mark_dispatched(lang).map(|generation| (lang, generation)))
                .collect();
            shared.publish(&state);
            batch
        };

        let requests = batch.into_iter().map(|(language, generation)| async move {
            let result = with_timeout(
                "translations",
                shared.request_timeout,
                shared.platform.request_translation(&shared.key, language),
            )
            .await;

            match result {
                Ok(()) => true,
                Err(e) => {
                    warn!(episode = %shared.key, %language, error = %e, "translation request failed");
                    let mut state = shared.state.lock().await;
                    state.jobs.mark_dispatch_failed(language, generation);
                    shared.publish(&state);
                    false
                }
            }
        });

        join_all(requests).await.into_iter().filter(|ok| *ok).count()
    }
}

fn save_error(episode: &Episode, error: ServiceError) -> PipelineError {
    match error {
        ServiceError::Conflict(_) => PipelineError::DuplicateEpisode { ep: episode.ep },
        ServiceError::QuotaExhausted { reset_in } => PipelineError::QuotaExhausted { reset_in },
        e => PipelineError::SaveFailed(e),
    }
}
