//! Re-dispatching failed translation jobs.

use crate::error::PipelineError;
use crate::jobs::JobStatus;
use crate::language::Language;
use crate::run::TranslationRun;
use crate::utils::with_timeout;
use futures::future::join_all;
use tracing::{debug, info, warn};

/// What a retry request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job was FAILED and has been sent again.
    Dispatched,
    /// The job is already DONE; nothing was sent.
    AlreadyDone,
    /// The job is still PENDING or PROCESSING; nothing was sent.
    InFlight,
}

impl TranslationRun {
    /// Retries one FAILED language.
    ///
    /// Only that language moves back to PENDING; every other job keeps its
    /// status. Polling is restarted if it had already stopped.
    pub async fn retry(&self, language: Language) -> Result<RetryOutcome, PipelineError> {
        if self.is_stale() {
            return Err(PipelineError::StaleRevision);
        }
        let shared = &self.shared;

        let generation = {
            let mut state = shared.state.lock().await;
            if !state.jobs.contains_target(language) {
                return Err(PipelineError::NotATarget(language));
            }
            match state.jobs.status(language) {
                Some(JobStatus::Done) => return Ok(RetryOutcome::AlreadyDone),
                Some(JobStatus::Pending | JobStatus::Processing) => {
                    debug!(episode = %shared.key, %language, "job still in flight, not retrying");
                    return Ok(RetryOutcome::InFlight);
                }
                _ => {}
            }
            let Some(generation) = state.jobs.mark_dispatched(language) else {
                return Err(PipelineError::NotATarget(language));
            };
            shared.publish(&state);
            generation
        };

        let result = with_timeout(
            "retry",
            shared.request_timeout,
            shared.platform.retry_translation(&shared.key, language),
        )
        .await;

        match result {
            Ok(()) => {
                info!(episode = %shared.key, %language, "translation retried");
                self.ensure_polling().await;
                Ok(RetryOutcome::Dispatched)
            }
            Err(e) => {
                warn!(episode = %shared.key, %language, error = %e, "retry request failed");
                let mut state = shared.state.lock().await;
                state.jobs.mark_dispatch_failed(language, generation);
                shared.publish(&state);
                Err(PipelineError::Service(e))
            }
        }
    }

    /// Retries every FAILED language concurrently.
    pub async fn retry_failed(&self) -> Vec<(Language, Result<RetryOutcome, PipelineError>)> {
        let failed = self.shared.state.lock().await.jobs.failed();
        let results = join_all(failed.iter().map(|&language| self.retry(language))).await;
        failed.into_iter().zip(results).collect()
    }
}
