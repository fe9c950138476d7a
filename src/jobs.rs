//! Per-language translation jobs for one episode.
//!
//! The job set is the only shared mutable state of a run. Writers touch one
//! language at a time and never replace the whole map, so a poll merge and a
//! retry landing at the same moment cannot erase each other.

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of one translation job, as reported by the compute service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    /// DONE and FAILED are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// State of one language within the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationJob {
    pub language: Language,
    /// Optimistic status, shown to the user.
    pub local: JobStatus,
    /// Last status reported by a poll, if any.
    pub confirmed: Option<JobStatus>,
    /// Bumped on every (re)dispatch of this language.
    generation: u64,
}

impl TranslationJob {
    fn new(language: Language, status: JobStatus) -> Self {
        Self {
            language,
            local: status,
            confirmed: None,
            generation: 0,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.local
    }
}

/// Per-language generations captured when a poll request is issued.
///
/// A language whose generation moved on while the request was in flight was
/// re-dispatched in the meantime; the poll result for it is stale.
#[derive(Debug, Clone)]
pub struct PollTicket {
    generations: HashMap<Language, u64>,
}

/// Outcome of merging one poll response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Languages whose local status changed.
    pub changed: Vec<Language>,
    /// Languages whose poll result was discarded because they were re-dispatched.
    pub stale: Vec<Language>,
}

/// Snapshot handed to observers after each change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub statuses: BTreeMap<Language, JobStatus>,
    /// Set after several poll ticks in a row failed.
    pub degraded: bool,
    /// True while a poller is attached to the run.
    pub polling: bool,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.statuses.values().all(|s| s.is_terminal())
    }

    pub fn failed(&self) -> Vec<Language> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == JobStatus::Failed)
            .map(|(lang, _)| *lang)
            .collect()
    }
}

/// All translation jobs of one episode, keyed by language.
#[derive(Debug, Clone)]
pub struct TranslationJobSet {
    source: Language,
    jobs: BTreeMap<Language, TranslationJob>,
}

impl TranslationJobSet {
    /// Builds the initial state: source DONE, every target PENDING.
    ///
    /// Duplicate targets and the source language are ignored.
    pub fn new(source: Language, targets: &[Language]) -> Self {
        let mut jobs = BTreeMap::new();
        jobs.insert(source, TranslationJob::new(source, JobStatus::Done));
        for &lang in targets {
            if lang != source {
                jobs.entry(lang)
                    .or_insert_with(|| TranslationJob::new(lang, JobStatus::Pending));
            }
        }
        Self { source, jobs }
    }

    pub fn source(&self) -> Language {
        self.source
    }

    /// Target languages in order, excluding the source.
    pub fn targets(&self) -> Vec<Language> {
        self.jobs
            .keys()
            .copied()
            .filter(|&lang| lang != self.source)
            .collect()
    }

    pub fn contains_target(&self, language: Language) -> bool {
        language != self.source && self.jobs.contains_key(&language)
    }

    pub fn get(&self, language: Language) -> Option<&TranslationJob> {
        self.jobs.get(&language)
    }

    pub fn status(&self, language: Language) -> Option<JobStatus> {
        self.jobs.get(&language).map(|job| job.local)
    }

    fn target_jobs(&self) -> impl Iterator<Item = &TranslationJob> {
        self.jobs.values().filter(|job| job.language != self.source)
    }

    /// Number of targets whose status is DONE.
    pub fn completed(&self) -> usize {
        self.target_jobs()
            .filter(|job| job.local == JobStatus::Done)
            .count()
    }

    /// Number of target languages.
    pub fn total(&self) -> usize {
        self.jobs.len() - 1
    }

    /// True once every target is DONE or FAILED.
    pub fn is_terminal(&self) -> bool {
        self.target_jobs().all(|job| job.local.is_terminal())
    }

    /// Targets that have not reached a terminal status.
    pub fn outstanding(&self) -> Vec<Language> {
        self.target_jobs()
            .filter(|job| !job.local.is_terminal())
            .map(|job| job.language)
            .collect()
    }

    /// Targets currently FAILED.
    pub fn failed(&self) -> Vec<Language> {
        self.target_jobs()
            .filter(|job| job.local == JobStatus::Failed)
            .map(|job| job.language)
            .collect()
    }

    /// Optimistically marks a target PENDING for a fresh dispatch and
    /// returns its new generation.
    pub fn mark_dispatched(&mut self, language: Language) -> Option<u64> {
        if language == self.source {
            return None;
        }
        let job = self.jobs.get_mut(&language)?;
        job.local = JobStatus::Pending;
        job.generation += 1;
        Some(job.generation)
    }

    /// Marks a target FAILED after its dispatch call failed.
    ///
    /// Ignored when the language was re-dispatched after `generation`.
    pub fn mark_dispatch_failed(&mut self, language: Language, generation: u64) -> bool {
        match self.jobs.get_mut(&language) {
            Some(job) if language != self.source && job.generation == generation => {
                job.local = JobStatus::Failed;
                true
            }
            _ => false,
        }
    }

    /// Captures generations before a poll request goes out.
    pub fn poll_ticket(&self) -> PollTicket {
        PollTicket {
            generations: self
                .jobs
                .values()
                .map(|job| (job.language, job.generation))
                .collect(),
        }
    }

    /// Merges a poll response into the set.
    ///
    /// The server wins, with three exceptions: languages missing from the
    /// response are left alone, a DONE job never goes back, and languages
    /// re-dispatched after the ticket was taken keep their optimistic state.
    pub fn merge(
        &mut self,
        ticket: &PollTicket,
        statuses: &HashMap<Language, JobStatus>,
    ) -> MergeReport {
        let mut report = MergeReport::default();

        for (&language, &remote) in statuses {
            if language == self.source {
                continue;
            }
            let Some(job) = self.jobs.get_mut(&language) else {
                continue;
            };
            if ticket.generations.get(&language) != Some(&job.generation) {
                report.stale.push(language);
                continue;
            }

            job.confirmed = Some(remote);
            if job.local == JobStatus::Done || job.local == remote {
                continue;
            }
            job.local = remote;
            report.changed.push(language);
        }

        report.changed.sort();
        report.stale.sort();
        report
    }

    /// Marks FAILED every target the server has never reported.
    ///
    /// Used when adopting an existing episode: a language the service does
    /// not know about was never registered and can only be retried.
    pub fn fail_unconfirmed(&mut self) -> Vec<Language> {
        let source = self.source;
        let mut failed = Vec::new();
        for job in self.jobs.values_mut() {
            if job.language != source && job.confirmed.is_none() {
                job.local = JobStatus::Failed;
                failed.push(job.language);
            }
        }
        failed
    }

    /// Builds a progress snapshot of the targets.
    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed(),
            total: self.total(),
            statuses: self
                .target_jobs()
                .map(|job| (job.language, job.local))
                .collect(),
            degraded: false,
            polling: false,
        }
    }
}
