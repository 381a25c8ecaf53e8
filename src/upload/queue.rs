//! Upload task list and batch accounting

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::api::ApiError;

pub type TaskId = u64;

/// File selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time (unix milliseconds)
    pub modified: i64,
}

impl UploadFile {
    /// Read name, size and modification time from disk
    pub async fn from_path(path: &Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;

        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
            modified,
        })
    }

    /// Synthetic identity used for deduplication
    pub fn identity(&self) -> String {
        format!("{}{}{}", self.name, self.size, self.modified)
    }

    pub fn has_extension(&self, extensions: &[String]) -> bool {
        Path::new(&self.name)
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Queued,
    Active,
    Done,
    Error,
}

#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: TaskId,
    pub file: UploadFile,
    pub state: UploadState,
    pub error: Option<ApiError>,
    pub batch: u64,
}

impl UploadTask {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, UploadState::Queued | UploadState::Active)
    }
}

/// Aggregate progress of the current batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub sent: u64,
    pub total: u64,
}

impl BatchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.sent as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Ordered task list. Holds no transfer handles; the runner drives it.
#[derive(Debug)]
pub struct UploadQueue {
    tasks: Vec<UploadTask>,
    extensions: Vec<String>,
    next_id: TaskId,
    batch: u64,
    /// Bytes sent by the active task
    in_flight: u64,
}

impl UploadQueue {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            tasks: Vec::new(),
            extensions,
            next_id: 1,
            batch: 0,
            in_flight: 0,
        }
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn batch(&self) -> u64 {
        self.batch
    }

    pub fn active(&self) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.state == UploadState::Active)
    }

    pub fn is_busy(&self) -> bool {
        self.tasks.iter().any(UploadTask::is_pending)
    }

    /// Add files to the queue, returning the ids of the tasks created.
    /// Files with other extensions and files already in the current batch
    /// are skipped. A new batch starts only when the queue was idle and at
    /// least one file was accepted.
    pub fn enqueue(&mut self, files: Vec<UploadFile>) -> Vec<TaskId> {
        let fresh = !self.is_busy();
        let batch = if fresh { self.batch + 1 } else { self.batch };

        let mut added = Vec::new();
        for file in files {
            if !file.has_extension(&self.extensions) {
                debug!("Skipping {}: unsupported extension", file.name);
                continue;
            }

            let identity = file.identity();
            let duplicate = self
                .tasks
                .iter()
                .any(|t| t.batch == batch && t.file.identity() == identity);
            if duplicate {
                debug!("Skipping {}: already queued", file.name);
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;
            self.tasks.push(UploadTask {
                id,
                file,
                state: UploadState::Queued,
                error: None,
                batch,
            });
            added.push(id);
        }

        if fresh && !added.is_empty() {
            self.batch = batch;
            self.in_flight = 0;
        }
        added
    }

    /// Mark the first queued task active and return it
    pub fn activate_next(&mut self) -> Option<UploadTask> {
        if self.active().is_some() {
            return None;
        }
        let task = self.tasks.iter_mut().find(|t| t.state == UploadState::Queued)?;
        task.state = UploadState::Active;
        self.in_flight = 0;
        Some(task.clone())
    }

    pub fn set_progress(&mut self, id: TaskId, sent: u64) {
        if self.active().is_some_and(|t| t.id == id) {
            self.in_flight = sent;
        }
    }

    /// Record the outcome of the active task
    pub fn settle(&mut self, id: TaskId, result: Result<(), ApiError>) -> bool {
        let Some(task) = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.state == UploadState::Active)
        else {
            return false;
        };

        match result {
            Ok(()) => task.state = UploadState::Done,
            Err(err) => {
                task.state = UploadState::Error;
                task.error = Some(err);
            }
        }
        self.in_flight = 0;
        true
    }

    pub fn remove(&mut self, id: TaskId) -> Option<UploadTask> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(index);
        if task.state == UploadState::Active {
            self.in_flight = 0;
        }
        Some(task)
    }

    /// Drop completed tasks from the list
    pub fn clear_finished(&mut self) {
        self.tasks.retain(|t| t.state != UploadState::Done);
    }

    /// Settled bytes of this batch plus the active task's sent bytes, over
    /// the batch total
    pub fn progress(&self) -> BatchProgress {
        let batch_tasks = self.tasks.iter().filter(|t| t.batch == self.batch);

        let mut progress = BatchProgress::default();
        for task in batch_tasks {
            progress.total += task.file.size;
            if !task.is_pending() {
                progress.sent += task.file.size;
            }
        }
        progress.sent += self.in_flight;
        progress
    }
}
