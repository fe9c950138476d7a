//! Service traits and shared HTTP plumbing.
//!
//! The pipeline talks to two collaborators: the persistence/quota service
//! (`Platform`) and the extraction/translation compute service (`Compute`).
//! Both are reached through the traits below so the orchestration core can be
//! driven against any implementation.

mod compute;
mod platform;

pub use compute::HttpCompute;
pub use platform::HttpPlatform;

use crate::entities::Entity;
use crate::episode::{Episode, EpisodeKey};
use crate::error::ServiceError;
use crate::jobs::JobStatus;
use crate::language::Language;
use crate::quota::QuotaState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

/// Persistence/quota service: episodes, translation jobs, entities and quota.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Reads the caller's translation quota.
    async fn quota(&self) -> Result<QuotaState, ServiceError>;

    /// Creates an episode and returns its identifier.
    ///
    /// Fails with `Conflict` on a duplicate sequence number and
    /// `QuotaExhausted` when the service refuses for quota reasons.
    async fn save_episode(&self, episode: &Episode) -> Result<String, ServiceError>;

    /// Overwrites the title and body of an episode created earlier.
    async fn update_episode(&self, remote_id: &str, episode: &Episode) -> Result<(), ServiceError>;

    /// Registers a translation job for one language.
    async fn request_translation(
        &self,
        episode: &EpisodeKey,
        language: Language,
    ) -> Result<(), ServiceError>;

    /// Reads the per-language status of an episode's jobs.
    async fn translation_statuses(
        &self,
        episode: &EpisodeKey,
    ) -> Result<HashMap<Language, JobStatus>, ServiceError>;

    /// Re-registers a translation job for one language.
    async fn retry_translation(
        &self,
        episode: &EpisodeKey,
        language: Language,
    ) -> Result<(), ServiceError>;

    /// Lists the entities already saved for a novel.
    async fn entities(&self, novel_id: &str) -> Result<Vec<Entity>, ServiceError>;

    /// Saves an entity. Fails with `Conflict` when it already exists.
    async fn create_entity(&self, novel_id: &str, entity: &Entity) -> Result<(), ServiceError>;
}

/// Extraction/translation compute service.
#[async_trait]
pub trait Compute: Send + Sync {
    /// Opens a processing session for one text payload.
    async fn process_text(
        &self,
        text: &str,
        novel_title: &str,
        source_language: Language,
    ) -> Result<String, ServiceError>;

    /// Requests entity candidates for an open session.
    async fn extract_entities(
        &self,
        request: &ExtractRequest,
    ) -> Result<ExtractResponse, ServiceError>;
}

/// Body of `POST /extract_entities`.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest {
    pub session_id: String,
    pub novel_title: String,
    pub source_language: Language,
    pub languages: Vec<Language>,
}

/// Response of `POST /extract_entities`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractResponse {
    pub status: String,
    #[serde(default)]
    pub candidates: Vec<RawCandidate>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExtractResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// One candidate as returned by the compute service.
///
/// Translation keys are kept as strings; unknown codes are dropped later.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    pub source: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
}

/// Common HTTP client configuration for the services.
pub fn create_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("yakusu/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

/// Parses a base URL, making sure relative joins append to its path.
pub fn parse_base_url(base_url: &str) -> Result<Url, ServiceError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?)
}

/// Builds an endpoint URL from a base, a relative path and query pairs.
pub fn endpoint_url(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<Url, ServiceError> {
    let mut url = base.join(path.trim_start_matches('/'))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody {
    reset_in: Option<u64>,
}

/// Checks if an HTTP response is successful, and if not, returns a detailed error.
///
/// 409 becomes `Conflict` and 429 becomes `QuotaExhausted` so callers can
/// tell them apart from other failures.
pub async fn check_response(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        409 => Err(ServiceError::Conflict(format!("{}: {}", endpoint, body))),
        429 => Err(ServiceError::QuotaExhausted {
            reset_in: parse_reset_in(&body),
        }),
        code => Err(ServiceError::Status {
            endpoint: endpoint.to_string(),
            status: code,
            body,
        }),
    }
}

/// Reads `resetIn` from a 429 body, defaulting to zero when absent.
fn parse_reset_in(body: &str) -> Duration {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| b.reset_in)
        .map(Duration::from_secs)
        .unwrap_or_default()
}
