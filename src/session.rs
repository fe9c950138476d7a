//! Processing sessions with the compute service.
//!
//! A session scopes one extraction to one text payload. It is consumed by
//! the extraction that follows, so a session can never be reused for an
//! edited body.

use crate::episode::NovelRef;
use crate::error::PipelineError;
use crate::language::Language;
use crate::services::Compute;
use crate::utils::with_timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// An open processing session.
#[derive(Debug)]
pub struct Session {
    id: String,
    novel: NovelRef,
    source_language: Language,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn novel(&self) -> &NovelRef {
        &self.novel
    }

    pub fn source_language(&self) -> Language {
        self.source_language
    }
}

/// Opens sessions with the compute service.
pub struct SessionRegistrar {
    compute: Arc<dyn Compute>,
    timeout: Duration,
}

impl SessionRegistrar {
    pub fn new(compute: Arc<dyn Compute>, timeout: Duration) -> Self {
        Self { compute, timeout }
    }

    /// Opens a session for `text`.
    ///
    /// Any failure, including an empty session id, is reported as
    /// `SessionFailed`; there is no partially opened session.
    pub async fn open(
        &self,
        text: &str,
        novel: &NovelRef,
        source_language: Language,
    ) -> Result<Session, PipelineError> {
        let id = with_timeout(
            "process_text",
            self.timeout,
            self.compute.process_text(text, &novel.title, source_language),
        )
        .await
        .map_err(|e| {
            warn!(novel = %novel.id, error = %e, "failed to open processing session");
            PipelineError::SessionFailed(e.to_string())
        })?;

        if id.trim().is_empty() {
            return Err(PipelineError::SessionFailed(
                "compute service returned an empty session id".to_string(),
            ));
        }

        info!(novel = %novel.id, session = %id, chars = text.chars().count(), "session opened");
        Ok(Session {
            id,
            novel: novel.clone(),
            source_language,
        })
    }
}
