//! Terminology entities and their extraction.
//!
//! Entities are proper nouns with per-language renderings, kept per novel so
//! that every episode translates a name the same way. Candidates come from
//! the compute service and are only persisted when the author saves them.

use crate::episode::NovelRef;
use crate::error::{PipelineError, ServiceError};
use crate::language::Language;
use crate::services::{Compute, ExtractRequest, Platform, RawCandidate};
use crate::session::Session;
use crate::utils::with_timeout;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs of whitespace, collapsed during normalization.
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid WHITESPACE_RUN"));

/// Source texts made only of punctuation and symbols are never terms.
static PUNCTUATION_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{P}\p{S}]+$").expect("Invalid PUNCTUATION_ONLY"));

/// Category given to extracted candidates.
pub const DEFAULT_CATEGORY: &str = "term";

/// Normalizes a source text for uniqueness checks: trimmed, lowercased,
/// inner whitespace collapsed to single spaces.
pub fn normalize_source(text: &str) -> String {
    WHITESPACE_RUN
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// A proper noun and its translations, scoped to a novel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub source_text: String,
    #[serde(default)]
    pub translations: BTreeMap<Language, String>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Entity {
    pub fn new(source_text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            translations: BTreeMap::new(),
            category: category.into(),
        }
    }

    pub fn normalized(&self) -> String {
        normalize_source(&self.source_text)
    }
}

/// An unsaved entity proposed by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCandidate {
    pub source_text: String,
    pub translations: BTreeMap<Language, String>,
}

impl EntityCandidate {
    /// Turns the candidate into an entity ready to be saved.
    pub fn into_entity(self, category: impl Into<String>) -> Entity {
        Entity {
            source_text: self.source_text,
            translations: self.translations,
            category: category.into(),
        }
    }

    /// Cleans up a raw candidate. Returns `None` when nothing usable is left.
    fn from_raw(raw: RawCandidate, source_language: Language) -> Option<Self> {
        let source_text = raw.source.trim().to_string();
        if source_text.is_empty() || PUNCTUATION_ONLY.is_match(&source_text) {
            return None;
        }

        let translations: BTreeMap<Language, String> = raw
            .translations
            .into_iter()
            .filter_map(|(code, text)| {
                let language = code.parse::<Language>().ok()?;
                let text = text.trim().to_string();
                (language != source_language && !text.is_empty()).then_some((language, text))
            })
            .collect();

        if translations.is_empty() {
            return None;
        }

        Some(Self {
            source_text,
            translations,
        })
    }
}

/// Result of saving one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    /// The novel already had this entity; treated as success.
    AlreadyExisted,
}

/// Requests entity candidates and saves the ones the author keeps.
pub struct EntityExtractor {
    compute: Arc<dyn Compute>,
    platform: Arc<dyn Platform>,
    timeout: Duration,
}

impl EntityExtractor {
    pub fn new(compute: Arc<dyn Compute>, platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        Self {
            compute,
            platform,
            timeout,
        }
    }

    /// Extracts candidates for `languages` (the source is removed if present).
    ///
    /// Candidates already saved for the novel are filtered out. If the saved
    /// entities cannot be read, the unfiltered list is returned instead.
    pub async fn extract(
        &self,
        session: Session,
        languages: &[Language],
    ) -> Result<Vec<EntityCandidate>, PipelineError> {
        let source_language = session.source_language();
        let novel = session.novel().clone();
        let request = ExtractRequest {
            session_id: session.id().to_string(),
            novel_title: novel.title.clone(),
            source_language,
            languages: Language::targets(languages, source_language),
        };

        let response = with_timeout(
            "extract_entities",
            self.timeout,
            self.compute.extract_entities(&request),
        )
        .await
        .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;

        if !response.is_ok() {
            let message = response
                .message
                .unwrap_or_else(|| format!("compute service reported status '{}'", response.status));
            return Err(PipelineError::ExtractionFailed(message));
        }

        let received = response.candidates.len();
        let candidates = collapse_duplicates(
            response
                .candidates
                .into_iter()
                .filter_map(|raw| EntityCandidate::from_raw(raw, source_language))
                .collect(),
        );

        let candidates = match self.existing_sources(&novel).await {
            Ok(existing) => candidates
                .into_iter()
                .filter(|c| !existing.contains(&normalize_source(&c.source_text)))
                .collect(),
            Err(e) => {
                warn!(novel = %novel.id, error = %e, "could not load saved entities, returning unfiltered candidates");
                candidates
            }
        };

        info!(
            novel = %novel.id,
            received,
            kept = candidates.len(),
            "entity extraction finished"
        );
        Ok(candidates)
    }

    /// Saves one entity. A conflict means it already exists and counts as success.
    pub async fn save(
        &self,
        novel: &NovelRef,
        entity: &Entity,
    ) -> Result<SaveOutcome, PipelineError> {
        let result = with_timeout(
            "entities",
            self.timeout,
            self.platform.create_entity(&novel.id, entity),
        )
        .await;

        match result {
            Ok(()) => Ok(SaveOutcome::Created),
            Err(ServiceError::Conflict(_)) => {
                debug!(novel = %novel.id, source = %entity.source_text, "entity already saved");
                Ok(SaveOutcome::AlreadyExisted)
            }
            Err(e) => Err(PipelineError::Service(e)),
        }
    }

    /// Saves entities independently of each other.
    ///
    /// Results are returned in input order; one failure does not stop the rest.
    pub async fn save_all(
        &self,
        novel: &NovelRef,
        entities: &[Entity],
    ) -> Vec<Result<SaveOutcome, PipelineError>> {
        join_all(entities.iter().map(|entity| self.save(novel, entity))).await
    }

    async fn existing_sources(&self, novel: &NovelRef) -> Result<HashSet<String>, ServiceError> {
        let saved = with_timeout("entities", self.timeout, self.platform.entities(&novel.id)).await?;
        Ok(saved.iter().map(Entity::normalized).collect())
    }
}

/// Keeps the first candidate for each normalized source text.
fn collapse_duplicates(candidates: Vec<EntityCandidate>) -> Vec<EntityCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(normalize_source(&c.source_text)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCompute, FakePlatform, raw_candidate};
    use crate::session::SessionRegistrar;

    async fn open_session(compute: &Arc<FakeCompute>) -> Session {
        SessionRegistrar::new(compute.clone(), Duration::from_secs(5))
            .open("본문", &NovelRef::new("n1", "소설"), Language::Ko)
            .await
            .unwrap()
    }

    fn extractor(compute: &Arc<FakeCompute>, platform: &Arc<FakePlatform>) -> EntityExtractor {
        EntityExtractor::new(compute.clone(), platform.clone(), Duration::from_secs(5))
    }

    #[test]
    fn test_normalize_source() {
        assert_eq!(normalize_source("  Seoul   Tower "), "seoul tower");
        assert_eq!(normalize_source("ÉLISE"), "élise");
        assert_eq!(normalize_source("김\t민수"), "김 민수");
    }

    #[test]
    fn test_candidate_cleanup() {
        let kept = EntityCandidate::from_raw(
            raw_candidate(" 민수 ", &[("en", "Minsu"), ("ko", "민수"), ("xx", "?"), ("ja", " ")]),
            Language::Ko,
        )
        .unwrap();
        assert_eq!(kept.source_text, "민수");
        assert_eq!(kept.translations.len(), 1);
        assert_eq!(kept.translations[&Language::En], "Minsu");

        assert!(EntityCandidate::from_raw(raw_candidate("", &[("en", "x")]), Language::Ko).is_none());
        assert!(EntityCandidate::from_raw(raw_candidate("「」", &[("en", "x")]), Language::Ko).is_none());
        assert!(EntityCandidate::from_raw(raw_candidate("민수", &[]), Language::Ko).is_none());
    }

    #[tokio::test]
    async fn test_extract_requests_targets_without_source() {
        let compute = Arc::new(FakeCompute::new());
        let platform = Arc::new(FakePlatform::new());
        let session = open_session(&compute).await;

        extractor(&compute, &platform)
            .extract(session, &Language::ALL)
            .await
            .unwrap();

        let request = compute.last_extract_request().unwrap();
        assert_eq!(request.session_id, "session-1");
        assert_eq!(request.languages.len(), 8);
        assert!(!request.languages.contains(&Language::Ko));
    }

    #[tokio::test]
    async fn test_extract_filters_saved_entities_case_insensitively() {
        let compute = Arc::new(FakeCompute::new());
        compute.set_candidates(vec![
            raw_candidate("Aria", &[("en", "Aria")]),
            raw_candidate("서울", &[("en", "Seoul")]),
            raw_candidate("ARIA ", &[("en", "Aria")]),
        ]);
        let platform = Arc::new(FakePlatform::new());
        platform.add_entity("n1", Entity::new(" aria", "person"));

        let session = open_session(&compute).await;
        let candidates = extractor(&compute, &platform)
            .extract(session, &Language::ALL)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_text, "서울");
    }

    #[tokio::test]
    async fn test_extract_collapses_duplicates_in_response() {
        let compute = Arc::new(FakeCompute::new());
        compute.set_candidates(vec![
            raw_candidate("민수", &[("en", "Minsu")]),
            raw_candidate("민수", &[("en", "Min-su")]),
        ]);
        let platform = Arc::new(FakePlatform::new());

        let session = open_session(&compute).await;
        let candidates = extractor(&compute, &platform)
            .extract(session, &Language::ALL)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].translations[&Language::En], "Minsu");
    }

    #[tokio::test]
    async fn test_extract_degrades_when_saved_entities_unavailable() {
        let compute = Arc::new(FakeCompute::new());
        compute.set_candidates(vec![raw_candidate("Aria", &[("en", "Aria")])]);
        let platform = Arc::new(FakePlatform::new());
        platform.add_entity("n1", Entity::new("aria", "person"));
        platform.fail_entity_listing(true);

        let session = open_session(&compute).await;
        let candidates = extractor(&compute, &platform)
            .extract(session, &Language::ALL)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_reports_service_status() {
        let compute = Arc::new(FakeCompute::new());
        compute.set_extract_status("error", Some("model overloaded"));
        let platform = Arc::new(FakePlatform::new());

        let session = open_session(&compute).await;
        match extractor(&compute, &platform).extract(session, &Language::ALL).await {
            Err(PipelineError::ExtractionFailed(message)) => assert_eq!(message, "model overloaded"),
            other => panic!("expected extraction failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_conflict_is_success() {
        let compute = Arc::new(FakeCompute::new());
        let platform = Arc::new(FakePlatform::new());
        let novel = NovelRef::new("n1", "소설");
        let entity = Entity::new("서울", "place");
        let extractor = extractor(&compute, &platform);

        assert_eq!(extractor.save(&novel, &entity).await.unwrap(), SaveOutcome::Created);
        assert_eq!(
            extractor.save(&novel, &entity).await.unwrap(),
            SaveOutcome::AlreadyExisted
        );
        assert_eq!(platform.saved_entities("n1").len(), 1);
    }

    #[tokio::test]
    async fn test_save_all_is_independent() {
        let compute = Arc::new(FakeCompute::new());
        let platform = Arc::new(FakePlatform::new());
        platform.fail_entity_save("broken");
        let novel = NovelRef::new("n1", "소설");
        let entities = vec![
            Entity::new("서울", "place"),
            Entity::new("broken", "term"),
            Entity::new("민수", "person"),
        ];

        let results = extractor(&compute, &platform)
            .save_all(&novel, &entities)
            .await;

        assert!(matches!(results[0], Ok(SaveOutcome::Created)));
        assert!(results[1].is_err());
        assert!(matches!(results[2], Ok(SaveOutcome::Created)));
        assert_eq!(platform.saved_entities("n1").len(), 2);
    }

    #[test]
    fn test_entity_deserializes_with_default_category() {
        let entity: Entity =
            serde_json::from_str(r#"{"source_text":"서울","translations":{"en":"Seoul"}}"#).unwrap();
        assert_eq!(entity.category, DEFAULT_CATEGORY);
        assert_eq!(entity.translations[&Language::En], "Seoul");
    }
}
