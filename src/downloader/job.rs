use std::fmt;
use std::path::PathBuf;

use crate::converter::Format;
use crate::domain::{Chapter, SelectionSet};
use crate::downloader::naming::NamingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

/// Position of a job inside its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub chapter: Chapter,
    /// 1-based position in the selection the batch was built from.
    pub ordinal: usize,
    pub format: Format,
    pub output_path: PathBuf,
    pub status: JobStatus,
}

#[derive(Debug, Clone)]
pub struct DownloadBatch {
    pub id: BatchId,
    pub jobs: Vec<DownloadJob>,
    pub succeeded: usize,
    pub failed: usize,
    /// Set when stop-on-error halted the queue.
    pub aborted: bool,
    pub cancelled: bool,
}

impl DownloadBatch {
    /// Builds one job per selected chapter, numbered in selection order.
    pub fn new(
        id: BatchId,
        selection: &SelectionSet,
        format: Format,
        naming: &NamingSettings,
    ) -> Self {
        let width = selection.padding_width();
        let jobs = selection
            .ordered()
            .iter()
            .enumerate()
            .map(|(i, chapter)| {
                let ordinal = i + 1;
                let stem = naming.output_stem(chapter, ordinal, width);
                DownloadJob {
                    id: JobId(i),
                    chapter: chapter.clone(),
                    ordinal,
                    format,
                    output_path: format.output_path(&stem),
                    status: JobStatus::Pending,
                }
            })
            .collect();

        Self::from_jobs(id, jobs)
    }

    fn from_jobs(id: BatchId, jobs: Vec<DownloadJob>) -> Self {
        Self {
            id,
            jobs,
            succeeded: 0,
            failed: 0,
            aborted: false,
            cancelled: false,
        }
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn has_failures(&self) -> bool {
        self.jobs
            .iter()
            .any(|job| matches!(job.status, JobStatus::Failed(_)))
    }

    pub fn succeeded_jobs(&self) -> Vec<&DownloadJob> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Succeeded)
            .collect()
    }

    pub fn failed_jobs(&self) -> Vec<&DownloadJob> {
        self.jobs
            .iter()
            .filter(|job| matches!(job.status, JobStatus::Failed(_)))
            .collect()
    }

    pub fn pending_jobs(&self) -> Vec<&DownloadJob> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Pending)
            .collect()
    }

    /// A new batch holding only the failed jobs, reset to pending.
    ///
    /// Ordinals and output paths carry over so retried chapters land where the first
    /// attempt would have put them.
    pub fn retry_failed(&self, id: BatchId) -> Option<DownloadBatch> {
        let jobs: Vec<DownloadJob> = self
            .failed_jobs()
            .into_iter()
            .enumerate()
            .map(|(i, job)| DownloadJob {
                id: JobId(i),
                status: JobStatus::Pending,
                ..job.clone()
            })
            .collect();

        if jobs.is_empty() {
            None
        } else {
            Some(Self::from_jobs(id, jobs))
        }
    }
}
