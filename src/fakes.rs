//! In-memory services for tests.

use crate::entities::{Entity, normalize_source};
use crate::episode::{Episode, EpisodeKey};
use crate::error::ServiceError;
use crate::jobs::JobStatus;
use crate::language::Language;
use crate::quota::QuotaState;
use crate::services::{Compute, ExtractRequest, ExtractResponse, Platform, RawCandidate};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn raw_candidate(source: &str, translations: &[(&str, &str)]) -> RawCandidate {
    RawCandidate {
        source: source.to_string(),
        translations: translations
            .iter()
            .map(|(code, text)| (code.to_string(), text.to_string()))
            .collect(),
    }
}

pub fn statuses(pairs: &[(Language, JobStatus)]) -> HashMap<Language, JobStatus> {
    pairs.iter().copied().collect()
}

fn unavailable(endpoint: &str) -> ServiceError {
    ServiceError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[derive(Default)]
struct PlatformState {
    quota: Option<QuotaState>,
    quota_calls: usize,
    fail_quota: bool,

    saves: Vec<(EpisodeKey, u32)>,
    created: HashMap<String, EpisodeKey>,
    updates: Vec<String>,
    save_error: Option<fn() -> ServiceError>,
    next_id: u64,

    dispatched: Vec<Language>,
    failing_dispatch: HashSet<Language>,
    hanging_dispatch: HashSet<Language>,

    statuses: HashMap<Language, JobStatus>,
    script: VecDeque<HashMap<Language, JobStatus>>,
    poll_calls: usize,
    failing_polls: usize,
    hanging_polls: usize,

    retried: Vec<Language>,
    failing_retry: HashSet<Language>,

    entities: HashMap<String, Vec<Entity>>,
    fail_entity_listing: bool,
    failing_entity_saves: HashSet<String>,
}

/// Persistence/quota service held in memory.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.set_quota(QuotaState {
            used: 0,
            remaining: 5,
            reset_in: 86_400,
        });
        platform
    }

    pub fn set_quota(&self, quota: QuotaState) {
        self.state.lock().unwrap().quota = Some(quota);
    }

    pub fn fail_quota(&self, fail: bool) {
        self.state.lock().unwrap().fail_quota = fail;
    }

    pub fn quota_calls(&self) -> usize {
        self.state.lock().unwrap().quota_calls
    }

    pub fn fail_saves_with(&self, error: fn() -> ServiceError) {
        self.state.lock().unwrap().save_error = Some(error);
    }

    /// Saved episodes with the revision written, in call order.
    pub fn saves(&self) -> Vec<(EpisodeKey, u32)> {
        self.state.lock().unwrap().saves.clone()
    }

    /// Ids passed to `update_episode`, in call order.
    pub fn updates(&self) -> Vec<String> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn fail_dispatch(&self, language: Language) {
        self.state.lock().unwrap().failing_dispatch.insert(language);
    }

    pub fn hang_dispatch(&self, language: Language) {
        self.state.lock().unwrap().hanging_dispatch.insert(language);
    }

    pub fn dispatched(&self) -> Vec<Language> {
        self.state.lock().unwrap().dispatched.clone()
    }

    /// Replaces the status the next polls will see.
    pub fn set_statuses(&self, statuses: HashMap<Language, JobStatus>) {
        self.state.lock().unwrap().statuses = statuses;
    }

    /// Queues a status update applied (and kept) by the next poll.
    pub fn push_statuses(&self, statuses: HashMap<Language, JobStatus>) {
        self.state.lock().unwrap().script.push_back(statuses);
    }

    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().unwrap().failing_polls = count;
    }

    pub fn hang_next_polls(&self, count: usize) {
        self.state.lock().unwrap().hanging_polls = count;
    }

    pub fn poll_calls(&self) -> usize {
        self.state.lock().unwrap().poll_calls
    }

    pub fn fail_retry(&self, language: Language) {
        self.state.lock().unwrap().failing_retry.insert(language);
    }

    pub fn retried(&self) -> Vec<Language> {
        self.state.lock().unwrap().retried.clone()
    }

    pub fn add_entity(&self, novel_id: &str, entity: Entity) {
        self.state
            .lock()
            .unwrap()
            .entities
            .entry(novel_id.to_string())
            .or_default()
            .push(entity);
    }

    pub fn saved_entities(&self, novel_id: &str) -> Vec<Entity> {
        self.state
            .lock()
            .unwrap()
            .entities
            .get(novel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_entity_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_entity_listing = fail;
    }

    pub fn fail_entity_save(&self, source_text: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_entity_saves
            .insert(source_text.to_string());
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn quota(&self) -> Result<QuotaState, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.quota_calls += 1;
        if state.fail_quota {
            return Err(unavailable("quota"));
        }
        state.quota.ok_or_else(|| unavailable("quota"))
    }

    async fn save_episode(&self, episode: &Episode) -> Result<String, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.save_error {
            return Err(error());
        }
        let key = episode.key();
        if state.created.values().any(|k| *k == key) {
            return Err(ServiceError::Conflict(format!("episode {} exists", key)));
        }
        state.saves.push((key.clone(), episode.revision()));
        state.next_id += 1;
        let id = format!("episode-{}", state.next_id);
        state.created.insert(id.clone(), key);
        Ok(id)
    }

    async fn update_episode(&self, remote_id: &str, episode: &Episode) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.save_error {
            return Err(error());
        }
        if !state.created.contains_key(remote_id) {
            return Err(ServiceError::Status {
                endpoint: "episodes".to_string(),
                status: 404,
                body: "not found".to_string(),
            });
        }
        state.saves.push((episode.key(), episode.revision()));
        state.updates.push(remote_id.to_string());
        Ok(())
    }

    async fn request_translation(
        &self,
        _episode: &EpisodeKey,
        language: Language,
    ) -> Result<(), ServiceError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.dispatched.push(language);
            if state.failing_dispatch.contains(&language) {
                return Err(unavailable("translations"));
            }
            state.hanging_dispatch.contains(&language)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn translation_statuses(
        &self,
        _episode: &EpisodeKey,
    ) -> Result<HashMap<Language, JobStatus>, ServiceError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.poll_calls += 1;
            if state.failing_polls > 0 {
                state.failing_polls -= 1;
                return Err(unavailable("translations-status"));
            }
            if state.hanging_polls > 0 {
                state.hanging_polls -= 1;
                true
            } else {
                false
            }
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(next) = state.script.pop_front() {
            state.statuses.extend(next);
        }
        Ok(state.statuses.clone())
    }

    async fn retry_translation(
        &self,
        _episode: &EpisodeKey,
        language: Language,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.retried.push(language);
        if state.failing_retry.contains(&language) {
            return Err(unavailable("retry"));
        }
        Ok(())
    }

    async fn entities(&self, novel_id: &str) -> Result<Vec<Entity>, ServiceError> {
        let state = self.state.lock().unwrap();
        if state.fail_entity_listing {
            return Err(unavailable("entities"));
        }
        Ok(state.entities.get(novel_id).cloned().unwrap_or_default())
    }

    async fn create_entity(&self, novel_id: &str, entity: &Entity) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_entity_saves.contains(&entity.source_text) {
            return Err(unavailable("entities"));
        }
        let saved = state.entities.entry(novel_id.to_string()).or_default();
        let key = normalize_source(&entity.source_text);
        if saved.iter().any(|e| e.normalized() == key) {
            return Err(ServiceError::Conflict(entity.source_text.clone()));
        }
        saved.push(entity.clone());
        Ok(())
    }
}

struct ComputeState {
    sessions_opened: usize,
    opened_titles: Vec<String>,
    fail_sessions: bool,
    blank_session: bool,
    extract_status: String,
    extract_message: Option<String>,
    candidates: Vec<RawCandidate>,
    last_request: Option<ExtractRequest>,
}

/// Compute service held in memory.
pub struct FakeCompute {
    state: Mutex<ComputeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ComputeState {
                sessions_opened: 0,
                opened_titles: Vec::new(),
                fail_sessions: false,
                blank_session: false,
                extract_status: "ok".to_string(),
                extract_message: None,
                candidates: Vec::new(),
                last_request: None,
            }),
        }
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.state.lock().unwrap().fail_sessions = fail;
    }

    pub fn return_blank_session(&self, blank: bool) {
        self.state.lock().unwrap().blank_session = blank;
    }

    pub fn opened_titles(&self) -> Vec<String> {
        self.state.lock().unwrap().opened_titles.clone()
    }

    pub fn set_candidates(&self, candidates: Vec<RawCandidate>) {
        self.state.lock().unwrap().candidates = candidates;
    }

    pub fn set_extract_status(&self, status: &str, message: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.extract_status = status.to_string();
        state.extract_message = message.map(str::to_string);
    }

    pub fn last_extract_request(&self) -> Option<ExtractRequest> {
        self.state.lock().unwrap().last_request.clone()
    }
}

#[async_trait]
impl Compute for FakeCompute {
    async fn process_text(
        &self,
        _text: &str,
        novel_title: &str,
        _source_language: Language,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sessions {
            return Err(ServiceError::Timeout {
                endpoint: "process_text".to_string(),
                timeout: Duration::from_secs(20),
            });
        }
        if state.blank_session {
            return Ok(" ".to_string());
        }
        state.sessions_opened += 1;
        state.opened_titles.push(novel_title.to_string());
        Ok(format!("session-{}", state.sessions_opened))
    }

    async fn extract_entities(
        &self,
        request: &ExtractRequest,
    ) -> Result<ExtractResponse, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.last_request = Some(request.clone());
        Ok(ExtractResponse {
            status: state.extract_status.clone(),
            candidates: state.candidates.clone(),
            message: state.extract_message.clone(),
        })
    }
}
