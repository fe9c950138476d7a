//! The publishing pipeline: one context object owning every component.

use crate::config::{Config, PipelineConfig};
use crate::dispatcher::JobDispatcher;
use crate::entities::{Entity, EntityCandidate, EntityExtractor, SaveOutcome};
use crate::episode::{Episode, EpisodeKey, NovelRef};
use crate::error::{PipelineError, ServiceError};
use crate::language::Language;
use crate::quota::{QuotaSnapshot, QuotaTracker};
use crate::run::TranslationRun;
use crate::services::{Compute, HttpCompute, HttpPlatform, Platform};
use crate::session::{Session, SessionRegistrar};
use std::sync::Arc;

/// Quota gate, sessions, entity extraction and translation dispatch for one
/// author account.
pub struct Pipeline {
    settings: PipelineConfig,
    quota: Arc<QuotaTracker>,
    sessions: SessionRegistrar,
    entities: EntityExtractor,
    dispatcher: JobDispatcher,
}

impl Pipeline {
    pub fn new(platform: Arc<dyn Platform>, compute: Arc<dyn Compute>, settings: PipelineConfig) -> Self {
        let timeout = settings.request_timeout();
        let quota = Arc::new(QuotaTracker::new(platform.clone(), timeout));

        Self {
            sessions: SessionRegistrar::new(compute.clone(), timeout),
            entities: EntityExtractor::new(compute, platform.clone(), timeout),
            dispatcher: JobDispatcher::new(platform, quota.clone(), settings.clone()),
            quota,
            settings,
        }
    }

    /// Builds a pipeline talking HTTP to the configured services.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let platform = HttpPlatform::new(&config.platform, &config.pipeline)?;
        let compute = HttpCompute::new(&config.compute, &config.pipeline)?;
        Ok(Self::new(Arc::new(platform), Arc::new(compute), config.pipeline.clone()))
    }

    /// Languages the pipeline translates into, before removing the source.
    pub fn languages(&self) -> &[Language] {
        &self.settings.languages
    }

    /// Reads the quota from the server.
    pub async fn quota(&self) -> Result<QuotaSnapshot, PipelineError> {
        self.quota.check().await
    }

    /// Cached quota, synced when missing or past its reset.
    pub async fn current_quota(&self) -> Result<QuotaSnapshot, PipelineError> {
        self.quota.current().await
    }

    pub async fn open_session(
        &self,
        text: &str,
        novel: &NovelRef,
        source: Language,
    ) -> Result<Session, PipelineError> {
        self.sessions.open(text, novel, source).await
    }

    /// Extracts entity candidates from an open session.
    pub async fn extract_entities(&self, session: Session) -> Result<Vec<EntityCandidate>, PipelineError> {
        self.entities.extract(session, &self.settings.languages).await
    }

    /// Opens a fresh session for `text` and extracts from it.
    pub async fn extract_for(
        &self,
        text: &str,
        novel: &NovelRef,
        source: Language,
    ) -> Result<Vec<EntityCandidate>, PipelineError> {
        let session = self.open_session(text, novel, source).await?;
        self.extract_entities(session).await
    }

    pub async fn save_entity(&self, novel: &NovelRef, entity: &Entity) -> Result<SaveOutcome, PipelineError> {
        self.entities.save(novel, entity).await
    }

    pub async fn save_entities(
        &self,
        novel: &NovelRef,
        entities: &[Entity],
    ) -> Vec<Result<SaveOutcome, PipelineError>> {
        self.entities.save_all(novel, entities).await
    }

    /// Saves the episode if needed and dispatches its translations.
    pub async fn translate(
        &self,
        episode: &mut Episode,
        source: Language,
    ) -> Result<TranslationRun, PipelineError> {
        self.dispatcher.dispatch(episode, source).await
    }

    /// Picks up the jobs of an episode dispatched earlier.
    pub async fn resume(
        &self,
        novel: &NovelRef,
        ep: u32,
        source: Language,
    ) -> Result<TranslationRun, PipelineError> {
        let key = EpisodeKey {
            novel_id: novel.id.clone(),
            ep,
        };
        self.dispatcher.resume(key, source).await
    }
}
