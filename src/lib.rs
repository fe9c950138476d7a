//! Yakusu - multilingual publishing pipeline for web novel authors.
//!
//! This library provides:
//! - A quota gate in front of translation dispatch
//! - Processing sessions and entity (glossary) extraction with de-duplication
//! - Concurrent per-language translation dispatch with status polling and retry

pub mod config;
pub mod console;
mod dispatcher;
pub mod entities;
pub mod episode;
pub mod error;
pub mod jobs;
pub mod language;
pub mod pipeline;
mod poller;
pub mod quota;
mod retry;
pub mod run;
pub mod services;
pub mod session;
pub mod utils;

#[cfg(test)]
mod fakes;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use entities::{Entity, EntityCandidate, SaveOutcome};
pub use episode::{Episode, EpisodeKey, EpisodeStatus, NovelRef};
pub use error::{ConfigError, PipelineError, ServiceError};
pub use jobs::{JobStatus, Progress, TranslationJobSet};
pub use language::Language;
pub use pipeline::Pipeline;
pub use poller::PollOutcome;
pub use quota::{QuotaSnapshot, QuotaState};
pub use retry::RetryOutcome;
pub use run::TranslationRun;
pub use session::Session;
