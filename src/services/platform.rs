//! HTTP client for the persistence/quota service.

use super::{Platform, check_response, create_http_client, endpoint_url, parse_base_url};
use crate::config::{PipelineConfig, PlatformConfig};
use crate::entities::Entity;
use crate::episode::{Episode, EpisodeKey, EpisodeStatus};
use crate::error::ServiceError;
use crate::jobs::JobStatus;
use crate::language::Language;
use crate::quota::QuotaState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    translation: QuotaState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveEpisodeRequest<'a> {
    novel_id: &'a str,
    ep: u32,
    title: &'a str,
    content: &'a str,
    status: EpisodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Episode> for SaveEpisodeRequest<'a> {
    fn from(episode: &'a Episode) -> Self {
        Self {
            novel_id: &episode.novel.id,
            ep: episode.ep,
            title: &episode.title,
            content: &episode.body,
            status: episode.status,
            scheduled_at: episode.scheduled_at,
        }
    }
}

/// Episode ids come back as strings or numbers depending on the backend.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteId {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
struct SaveEpisodeResponse {
    id: RemoteId,
}

#[derive(Debug, Serialize)]
struct LanguageRequest {
    language: Language,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEntityRequest<'a> {
    novel_id: &'a str,
    #[serde(flatten)]
    entity: &'a Entity,
}

/// Persistence/quota service reached over HTTP.
pub struct HttpPlatform {
    client: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpPlatform {
    pub fn new(config: &PlatformConfig, pipeline: &PipelineConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: create_http_client(pipeline.request_timeout())?,
            base: parse_base_url(&config.base_url)?,
            token: config.token.clone(),
        })
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.client.get(url).bearer_auth(&self.token)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.client.post(url).bearer_auth(&self.token)
    }

    fn episode_url(&self, episode: &EpisodeKey, action: &str) -> Result<Url, ServiceError> {
        endpoint_url(
            &self.base,
            &format!("episodes/{}/{}", episode.ep, action),
            &[("novelId", episode.novel_id.as_str())],
        )
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn quota(&self) -> Result<QuotaState, ServiceError> {
        let url = endpoint_url(&self.base, "quota", &[])?;
        let response = check_response("quota", self.get(url).send().await?).await?;
        let body: QuotaResponse = response.json().await.map_err(|e| ServiceError::Decode {
            endpoint: "quota".to_string(),
            message: e.to_string(),
        })?;
        Ok(body.translation)
    }

    async fn save_episode(&self, episode: &Episode) -> Result<String, ServiceError> {
        let url = endpoint_url(&self.base, "episodes", &[])?;
        let response = self
            .post(url)
            .json(&SaveEpisodeRequest::from(episode))
            .send()
            .await?;
        let response = check_response("episodes", response).await?;
        let body: SaveEpisodeResponse =
            response.json().await.map_err(|e| ServiceError::Decode {
                endpoint: "episodes".to_string(),
                message: e.to_string(),
            })?;

        Ok(match body.id {
            RemoteId::Text(id) => id,
            RemoteId::Number(id) => id.to_string(),
        })
    }

    async fn update_episode(&self, remote_id: &str, episode: &Episode) -> Result<(), ServiceError> {
        let url = endpoint_url(&self.base, &format!("episodes/{}", remote_id), &[])?;
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .json(&SaveEpisodeRequest::from(episode))
            .send()
            .await?;
        check_response("episodes", response).await?;
        Ok(())
    }

    async fn request_translation(
        &self,
        episode: &EpisodeKey,
        language: Language,
    ) -> Result<(), ServiceError> {
        let url = self.episode_url(episode, "translations")?;
        let response = self
            .post(url)
            .json(&LanguageRequest { language })
            .send()
            .await?;
        check_response("translations", response).await?;
        Ok(())
    }

    async fn translation_statuses(
        &self,
        episode: &EpisodeKey,
    ) -> Result<HashMap<Language, JobStatus>, ServiceError> {
        let url = self.episode_url(episode, "translations-status")?;
        let response = check_response("translations-status", self.get(url).send().await?).await?;
        let body = response.text().await?;
        parse_status_body(episode.ep, &body)
    }

    async fn retry_translation(
        &self,
        episode: &EpisodeKey,
        language: Language,
    ) -> Result<(), ServiceError> {
        let url = self.episode_url(episode, "retry")?;
        let response = self
            .post(url)
            .json(&LanguageRequest { language })
            .send()
            .await?;
        check_response("retry", response).await?;
        Ok(())
    }

    async fn entities(&self, novel_id: &str) -> Result<Vec<Entity>, ServiceError> {
        let url = endpoint_url(&self.base, "entities", &[("novelId", novel_id)])?;
        let response = check_response("entities", self.get(url).send().await?).await?;
        response.json().await.map_err(|e| ServiceError::Decode {
            endpoint: "entities".to_string(),
            message: e.to_string(),
        })
    }

    async fn create_entity(&self, novel_id: &str, entity: &Entity) -> Result<(), ServiceError> {
        let url = endpoint_url(&self.base, "entities", &[])?;
        let response = self
            .post(url)
            .json(&CreateEntityRequest { novel_id, entity })
            .send()
            .await?;
        check_response("entities", response).await?;
        Ok(())
    }
}

/// Parses `{"<ep>": {"<lang>": "<STATUS>"}}` into a status map.
///
/// Unknown languages and statuses are skipped. A body without an entry for
/// `ep` yields an empty map, which leaves every job unchanged.
fn parse_status_body(ep: u32, body: &str) -> Result<HashMap<Language, JobStatus>, ServiceError> {
    let parsed: HashMap<String, BTreeMap<String, String>> =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode {
            endpoint: "translations-status".to_string(),
            message: e.to_string(),
        })?;

    let Some(entry) = parsed.get(&ep.to_string()) else {
        return Ok(HashMap::new());
    };

    let mut statuses = HashMap::new();
    for (code, status) in entry {
        match (code.parse::<Language>(), status.parse::<JobStatus>()) {
            (Ok(language), Ok(status)) => {
                statuses.insert(language, status);
            }
            _ => debug!(ep, code = %code, status = %status, "skipping unrecognized status entry"),
        }
    }
    Ok(statuses)
}
