//! Episodes and the novels they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The novel an episode belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NovelRef {
    /// Identifier used by the persistence service.
    pub id: String,

    /// Title sent to the compute service.
    pub title: String,
}

impl NovelRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Identity of an episode: novel plus sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpisodeKey {
    pub novel_id: String,
    pub ep: u32,
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.novel_id, self.ep)
    }
}

/// Publication state of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
}

/// One numbered installment of a novel in its original language.
#[derive(Debug, Clone)]
pub struct Episode {
    pub novel: NovelRef,
    pub ep: u32,
    pub title: String,
    pub body: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: EpisodeStatus,
    /// Bumped whenever the title or body changes.
    revision: u32,
    /// Revision last written to the persistence service.
    saved_revision: Option<u32>,
    /// Identifier returned by the persistence service.
    remote_id: Option<String>,
}

impl Episode {
    /// Creates an unsaved draft.
    pub fn new(novel: NovelRef, ep: u32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            novel,
            ep,
            title: title.into(),
            body: body.into(),
            scheduled_at: None,
            status: EpisodeStatus::Draft,
            revision: 1,
            saved_revision: None,
            remote_id: None,
        }
    }

    /// Schedules publication. Scheduling marks the episode as scheduled.
    pub fn schedule(&mut self, at: DateTime<Utc>) {
        self.scheduled_at = Some(at);
        self.status = EpisodeStatus::Scheduled;
    }

    /// Replaces title and body. Any existing translation run becomes stale
    /// and the episode must be saved again before dispatch.
    pub fn revise(&mut self, title: impl Into<String>, body: impl Into<String>) {
        let title = title.into();
        let body = body.into();
        if title == self.title && body == self.body {
            return;
        }
        self.title = title;
        self.body = body;
        self.revision += 1;
        self.saved_revision = None;
    }

    pub fn key(&self) -> EpisodeKey {
        EpisodeKey {
            novel_id: self.novel.id.clone(),
            ep: self.ep,
        }
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// True when the current revision has been persisted.
    pub fn is_saved(&self) -> bool {
        self.saved_revision == Some(self.revision)
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Records a successful save of the current revision.
    pub(crate) fn mark_saved(&mut self, remote_id: String) {
        self.saved_revision = Some(self.revision);
        self.remote_id = Some(remote_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn episode() -> Episode {
        Episode::new(NovelRef::new("n1", "Novel"), 3, "제목", "본문")
    }

    #[test]
    fn test_new_episode_is_unsaved_draft() {
        let ep = episode();
        assert!(!ep.is_saved());
        assert_eq!(ep.status, EpisodeStatus::Draft);
        assert_eq!(ep.revision(), 1);
        assert_eq!(ep.key().to_string(), "n1#3");
    }

    #[test]
    fn test_revise_invalidates_save() {
        let mut ep = episode();
        ep.mark_saved("42".to_string());
        assert!(ep.is_saved());

        ep.revise("제목", "새 본문");
        assert_eq!(ep.revision(), 2);
        assert!(!ep.is_saved());
        assert_eq!(ep.remote_id(), Some("42"));
    }

    #[test]
    fn test_revise_without_change_keeps_revision() {
        let mut ep = episode();
        ep.mark_saved("42".to_string());
        ep.revise("제목", "본문");
        assert_eq!(ep.revision(), 1);
        assert!(ep.is_saved());
    }

    #[test]
    fn test_schedule() {
        let mut ep = episode();
        let at = Utc.with_ymd_and_hms(2026, 11, 1, 9, 0, 0).unwrap();
        ep.schedule(at);
        assert_eq!(ep.status, EpisodeStatus::Scheduled);
        assert_eq!(ep.scheduled_at, Some(at));
    }
}
