//! HTTP client for the extraction/translation compute service.

use super::{
    Compute, ExtractRequest, ExtractResponse, check_response, create_http_client, endpoint_url,
    parse_base_url,
};
use crate::config::{ComputeConfig, PipelineConfig};
use crate::error::ServiceError;
use crate::language::Language;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Serialize)]
struct ProcessTextRequest<'a> {
    text: &'a str,
    novel_title: &'a str,
    source_language: Language,
}

#[derive(Debug, Deserialize)]
struct ProcessTextResponse {
    #[serde(default)]
    session_id: Option<String>,
}

/// Compute service reached over HTTP.
pub struct HttpCompute {
    client: reqwest::Client,
    base: Url,
}

impl HttpCompute {
    pub fn new(config: &ComputeConfig, pipeline: &PipelineConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: create_http_client(pipeline.request_timeout())?,
            base: parse_base_url(&config.base_url)?,
        })
    }
}

#[async_trait]
impl Compute for HttpCompute {
    async fn process_text(
        &self,
        text: &str,
        novel_title: &str,
        source_language: Language,
    ) -> Result<String, ServiceError> {
        let url = endpoint_url(&self.base, "process_text", &[])?;
        let request = ProcessTextRequest {
            text,
            novel_title,
            source_language,
        };

        let response = self.client.post(url).json(&request).send().await?;
        let response = check_response("process_text", response).await?;
        let body: ProcessTextResponse =
            response.json().await.map_err(|e| ServiceError::Decode {
                endpoint: "process_text".to_string(),
                message: e.to_string(),
            })?;

        body.session_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ServiceError::Decode {
                endpoint: "process_text".to_string(),
                message: "response carries no session_id".to_string(),
            })
    }

    async fn extract_entities(
        &self,
        request: &ExtractRequest,
    ) -> Result<ExtractResponse, ServiceError> {
        let url = endpoint_url(&self.base, "extract_entities", &[])?;
        let response = self.client.post(url).json(request).send().await?;
        let response = check_response("extract_entities", response).await?;
        response.json().await.map_err(|e| ServiceError::Decode {
            endpoint: "extract_entities".to_string(),
            message: e.to_string(),
        })
    }
}
