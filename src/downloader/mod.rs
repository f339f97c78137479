pub mod job;
pub mod naming;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::{Result, TankobonError};
use crate::config::DownloaderConfig;
use crate::converter::Converter;
use crate::domain::Chapter;
use crate::provider::Provider;

pub use job::{BatchId, DownloadBatch, DownloadJob, JobId, JobStatus};
pub use naming::NamingSettings;

/// Settings snapshot taken when a batch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSettings {
    pub workers: usize,
    pub stop_on_error: bool,
}

impl DownloadSettings {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        let workers = if config.async_enabled {
            config.workers.max(1)
        } else {
            1
        };
        Self {
            workers,
            stop_on_error: config.stop_on_error,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self::from_config(&DownloaderConfig::default())
    }
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Started {
        batch: BatchId,
        job: JobId,
        chapter: Chapter,
    },
    Progress {
        batch: BatchId,
        job: JobId,
        status: JobStatus,
        succeeded: usize,
        failed: usize,
        total: usize,
    },
    /// Always the last event of a batch.
    Finished { batch: DownloadBatch },
}

impl DownloadEvent {
    pub fn batch_id(&self) -> BatchId {
        match self {
            DownloadEvent::Started { batch, .. } | DownloadEvent::Progress { batch, .. } => *batch,
            DownloadEvent::Finished { batch } => batch.id,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedJob {
    id: JobId,
    chapter: Chapter,
    output_path: PathBuf,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedJob>,
    halted: bool,
    cancelled: bool,
}

/// FIFO of jobs shared by the workers of one batch.
#[derive(Debug, Default)]
struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    fn new(jobs: impl IntoIterator<Item = QueuedJob>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: jobs.into_iter().collect(),
                ..Default::default()
            }),
        }
    }

    /// Next job, or `None` once the queue is empty or halted.
    fn pop(&self) -> Option<QueuedJob> {
        let mut state = self.state.lock().ok()?;
        if state.halted {
            return None;
        }
        state.pending.pop_front()
    }

    fn halt(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.halted = true;
        }
    }

    fn cancel(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.halted = true;
            state.cancelled = true;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().map(|s| s.cancelled).unwrap_or(false)
    }
}

/// Stops a running batch from starting new jobs.
#[derive(Debug, Clone)]
pub struct DownloadCanceller {
    queue: Arc<JobQueue>,
}

impl DownloadCanceller {
    /// In-flight jobs still finish and their files stay on disk.
    pub fn cancel(&self) {
        self.queue.cancel();
    }
}

pub struct DownloadHandle {
    pub batch: BatchId,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    canceller: DownloadCanceller,
    task: JoinHandle<DownloadBatch>,
}

impl DownloadHandle {
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    pub fn canceller(&self) -> DownloadCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Waits for the batch and returns it with every job's final status.
    pub async fn join(self) -> Result<DownloadBatch> {
        self.task
            .await
            .map_err(|e| TankobonError::Other(format!("download task failed: {}", e)))
    }
}

enum WorkerReport {
    Started(JobId),
    Done(JobId, Result<PathBuf>),
}

/// Runs batches against one provider and one converter.
pub struct DownloadOrchestrator {
    provider: Arc<dyn Provider>,
    converter: Arc<dyn Converter>,
    settings: DownloadSettings,
}

impl DownloadOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        converter: Arc<dyn Converter>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            provider,
            converter,
            settings,
        }
    }

    /// Spawns the batch onto the runtime and returns immediately.
    pub fn start(&self, batch: DownloadBatch) -> DownloadHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(JobQueue::new(batch.jobs.iter().map(|job| QueuedJob {
            id: job.id,
            chapter: job.chapter.clone(),
            output_path: job.output_path.clone(),
        })));

        let id = batch.id;
        let task = tokio::spawn(run(
            batch,
            self.provider.clone(),
            self.converter.clone(),
            self.settings,
            queue.clone(),
            event_tx,
        ));

        DownloadHandle {
            batch: id,
            events: event_rx,
            canceller: DownloadCanceller { queue },
            task,
        }
    }
}

async fn run(
    mut batch: DownloadBatch,
    provider: Arc<dyn Provider>,
    converter: Arc<dyn Converter>,
    settings: DownloadSettings,
    queue: Arc<JobQueue>,
    events: mpsc::UnboundedSender<DownloadEvent>,
) -> DownloadBatch {
    let total = batch.total();
    let workers = settings.workers.max(1).min(total);
    info!(
        "Starting batch {:?}: {} chapters as {} with {} workers",
        batch.id,
        total,
        converter.format(),
        workers
    );

    let (report_tx, mut reports) = mpsc::unbounded_channel();
    for _ in 0..workers {
        tokio::spawn(worker(
            provider.clone(),
            converter.clone(),
            queue.clone(),
            report_tx.clone(),
            settings.stop_on_error,
        ));
    }
    drop(report_tx);

    // Single writer for job statuses and counters.
    while let Some(report) = reports.recv().await {
        match report {
            WorkerReport::Started(id) => {
                let job = &mut batch.jobs[id.0];
                job.status = JobStatus::InFlight;
                let _ = events.send(DownloadEvent::Started {
                    batch: batch.id,
                    job: id,
                    chapter: job.chapter.clone(),
                });
            }
            WorkerReport::Done(id, result) => {
                let status = match result {
                    Ok(path) => {
                        batch.succeeded += 1;
                        debug!("Job {} written to {}", id, path.display());
                        JobStatus::Succeeded
                    }
                    Err(e) => {
                        batch.failed += 1;
                        warn!("Job {} failed: {}", id, e);
                        if settings.stop_on_error {
                            batch.aborted = true;
                        }
                        JobStatus::Failed(e.to_string())
                    }
                };
                batch.jobs[id.0].status = status.clone();
                let _ = events.send(DownloadEvent::Progress {
                    batch: batch.id,
                    job: id,
                    status,
                    succeeded: batch.succeeded,
                    failed: batch.failed,
                    total,
                });
            }
        }
    }

    // A worker that panicked never reported its job.
    for job in batch.jobs.iter_mut() {
        if job.status == JobStatus::InFlight {
            error!("Job {} was interrupted", job.id);
            job.status = JobStatus::Failed("interrupted".into());
            batch.failed += 1;
        }
    }

    batch.cancelled = queue.is_cancelled();
    info!(
        "Batch {:?} finished: {} succeeded, {} failed, {} not started",
        batch.id,
        batch.succeeded,
        batch.failed,
        batch.pending_jobs().len()
    );

    let _ = events.send(DownloadEvent::Finished {
        batch: batch.clone(),
    });
    batch
}

async fn worker(
    provider: Arc<dyn Provider>,
    converter: Arc<dyn Converter>,
    queue: Arc<JobQueue>,
    reports: mpsc::UnboundedSender<WorkerReport>,
    stop_on_error: bool,
) {
    while let Some(job) = queue.pop() {
        let _ = reports.send(WorkerReport::Started(job.id));
        let result = attempt(provider.as_ref(), converter.clone(), &job).await;
        if result.is_err() && stop_on_error {
            queue.halt();
        }
        let _ = reports.send(WorkerReport::Done(job.id, result));
    }
}

async fn attempt(
    provider: &dyn Provider,
    converter: Arc<dyn Converter>,
    job: &QueuedJob,
) -> Result<PathBuf> {
    info!("Downloading {} ({})", job.chapter.name, job.id);

    let content = provider.content(&job.chapter).await.map_err(|e| match e {
        TankobonError::FetchFailed(_) => e,
        other => TankobonError::FetchFailed(format!("{}: {}", job.chapter.name, other)),
    })?;

    let target = job.output_path.clone();
    tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let staged = converter.save_temp(&content).map_err(|e| match e {
            TankobonError::ConvertFailed(_) => e,
            other => TankobonError::ConvertFailed(other.to_string()),
        })?;
        let moved = finalize(&staged, &target);
        discard_staging(&staged);
        moved.map(|_| target)
    })
    .await
    .map_err(|e| TankobonError::ConvertFailed(e.to_string()))?
}

/// Moves a staged file or directory to `target`, replacing what is there.
fn finalize(staged: &Path, target: &Path) -> Result<()> {
    let convert_failed =
        |e: std::io::Error| TankobonError::ConvertFailed(format!("{}: {}", target.display(), e));

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(convert_failed)?;
    }
    if target.is_dir() {
        fs::remove_dir_all(target).map_err(convert_failed)?;
    } else if target.exists() {
        fs::remove_file(target).map_err(convert_failed)?;
    }

    if fs::rename(staged, target).is_ok() {
        return Ok(());
    }

    // Staging may live on another filesystem.
    copy_recursive(staged, target).map_err(convert_failed)?;
    if staged.is_dir() {
        fs::remove_dir_all(staged).map_err(convert_failed)?;
    } else {
        fs::remove_file(staged).map_err(convert_failed)?;
    }
    Ok(())
}

/// Removes the per-attempt directory `staged` was written into.
fn discard_staging(staged: &Path) {
    if let Some(dir) = staged.parent() {
        if let Err(e) = fs::remove_dir_all(dir) {
            debug!("Failed to remove staging {}: {}", dir.display(), e);
        }
    }
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to)?;
    }
    Ok(())
}
