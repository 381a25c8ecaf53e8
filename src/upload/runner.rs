//! Serial upload runner

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::ftp::FtpImport;
use super::queue::{BatchProgress, TaskId, UploadFile, UploadQueue, UploadTask};
use crate::api::{ApiError, MutationApi, ProgressFn};

/// Completion and progress reports from a spawned transfer
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress { id: TaskId, sent: u64 },
    Settled { id: TaskId, result: Result<(), ApiError> },
}

/// What a handled event meant for the queue
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Progress(BatchProgress),
    Done(TaskId),
    Failed { id: TaskId, error: ApiError },
}

/// Runs at most one upload at a time, in FIFO order
pub struct UploadQueueManager {
    api: Arc<dyn MutationApi>,
    queue: UploadQueue,
    ftp: FtpImport,
    events: UnboundedSender<UploadEvent>,
    active: Option<(TaskId, AbortHandle)>,
}

impl UploadQueueManager {
    pub fn new(
        api: Arc<dyn MutationApi>,
        extensions: Vec<String>,
    ) -> (Self, UnboundedReceiver<UploadEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            api,
            queue: UploadQueue::new(extensions),
            ftp: FtpImport::default(),
            events,
            active: None,
        };
        (manager, rx)
    }

    pub fn tasks(&self) -> &[UploadTask] {
        self.queue.tasks()
    }

    pub fn active(&self) -> Option<&UploadTask> {
        self.queue.active()
    }

    pub fn progress(&self) -> BatchProgress {
        self.queue.progress()
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    pub fn ftp(&self) -> &FtpImport {
        &self.ftp
    }

    pub fn ftp_mut(&mut self) -> &mut FtpImport {
        &mut self.ftp
    }

    /// Queue files and start the runner if idle
    pub fn enqueue(&mut self, files: Vec<UploadFile>) -> Vec<TaskId> {
        let added = self.queue.enqueue(files);
        info!("Queued {} file(s) for upload", added.len());
        self.kick();
        added
    }

    /// Remove a task. Cancelling the active task aborts its transfer and
    /// starts the next queued one right away.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let Some(task) = self.queue.remove(id) else {
            return false;
        };
        debug!("Cancelled upload {} ({:?})", task.file.name, task.state);

        if self.active.as_ref().is_some_and(|(active, _)| *active == id) {
            if let Some((_, handle)) = self.active.take() {
                handle.abort();
            }
            self.kick();
        }
        true
    }

    pub fn clear_finished(&mut self) {
        self.queue.clear_finished();
    }

    /// Apply a transfer report. Reports from cancelled transfers are ignored.
    pub fn handle_event(&mut self, event: UploadEvent) -> Option<UploadOutcome> {
        match event {
            UploadEvent::Progress { id, sent } => {
                if !self.is_running(id) {
                    return None;
                }
                self.queue.set_progress(id, sent);
                Some(UploadOutcome::Progress(self.queue.progress()))
            }
            UploadEvent::Settled { id, result } => {
                if !self.is_running(id) {
                    debug!("Ignoring stale result for upload {}", id);
                    return None;
                }
                self.active = None;
                self.queue.settle(id, result.clone());
                self.kick();

                Some(match result {
                    Ok(()) => UploadOutcome::Done(id),
                    Err(error) => {
                        warn!("Upload {} failed: {}", id, error);
                        UploadOutcome::Failed { id, error }
                    }
                })
            }
        }
    }

    fn is_running(&self, id: TaskId) -> bool {
        self.active.as_ref().is_some_and(|(active, _)| *active == id)
    }

    /// Start the next queued task when nothing is in flight
    fn kick(&mut self) {
        if self.active.is_some() {
            return;
        }
        let Some(task) = self.queue.activate_next() else {
            return;
        };
        debug!("Uploading {}", task.file.name);

        let api = self.api.clone();
        let events = self.events.clone();
        let id = task.id;

        let handle = tokio::spawn(async move {
            let progress_events = events.clone();
            let progress: ProgressFn = Arc::new(move |sent| {
                let _ = progress_events.send(UploadEvent::Progress { id, sent });
            });

            let result = api.upload_track(&task.file, progress).await;
            let _ = events.send(UploadEvent::Settled { id, result });
        });

        self.active = Some((id, handle.abort_handle()));
    }
}

impl Drop for UploadQueueManager {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.active.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeApi};
    use crate::upload::queue::tests::file;
    use crate::upload::UploadState;

    fn manager(api: Arc<FakeApi>) -> (UploadQueueManager, UnboundedReceiver<UploadEvent>) {
        UploadQueueManager::new(api, vec!["mp3".to_string()])
    }

    /// Feed events back until the task settles
    async fn run_until_settled(
        manager: &mut UploadQueueManager,
        rx: &mut UnboundedReceiver<UploadEvent>,
    ) -> UploadOutcome {
        loop {
            let event = rx.recv().await.unwrap();
            if let Some(outcome @ (UploadOutcome::Done(_) | UploadOutcome::Failed { .. })) =
                manager.handle_event(event)
            {
                return outcome;
            }
        }
    }

    #[tokio::test]
    async fn test_runs_one_at_a_time_in_order() {
        let api = Arc::new(FakeApi::new());
        let (mut manager, mut rx) = manager(api.clone());

        let ids = manager.enqueue(vec![file("a.mp3", 10), file("b.mp3", 10)]);
        assert_eq!(manager.active().unwrap().id, ids[0]);
        assert_eq!(manager.tasks()[1].state, UploadState::Queued);

        assert_eq!(run_until_settled(&mut manager, &mut rx).await, UploadOutcome::Done(ids[0]));
        assert_eq!(manager.active().unwrap().id, ids[1]);
        assert_eq!(run_until_settled(&mut manager, &mut rx).await, UploadOutcome::Done(ids[1]));

        assert!(!manager.is_busy());
        assert_eq!(
            api.calls(),
            vec![Call::Upload("a.mp3".to_string()), Call::Upload("b.mp3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_queue() {
        let api = Arc::new(FakeApi::new());
        api.fail("upload", 1);
        let (mut manager, mut rx) = manager(api);

        let ids = manager.enqueue(vec![file("a.mp3", 10), file("b.mp3", 10)]);
        let outcome = run_until_settled(&mut manager, &mut rx).await;
        assert!(matches!(outcome, UploadOutcome::Failed { id, .. } if id == ids[0]));
        assert_eq!(run_until_settled(&mut manager, &mut rx).await, UploadOutcome::Done(ids[1]));

        assert_eq!(manager.tasks()[0].state, UploadState::Error);
        assert_eq!(manager.tasks()[0].error.as_ref().unwrap().key, "db");
    }

    #[tokio::test]
    async fn test_cancel_active_starts_next_immediately() {
        let api = Arc::new(FakeApi::new());
        let (mut manager, mut rx) = manager(api);

        let ids = manager.enqueue(vec![file("a.mp3", 10), file("b.mp3", 10)]);
        assert!(manager.cancel(ids[0]));

        let active = manager.active().unwrap();
        assert_eq!(active.id, ids[1]);
        assert_eq!(manager.tasks().len(), 1);

        // Anything the aborted transfer managed to report is ignored
        let outcome = run_until_settled(&mut manager, &mut rx).await;
        assert_eq!(outcome, UploadOutcome::Done(ids[1]));
    }

    #[tokio::test]
    async fn test_cancel_queued_task() {
        let api = Arc::new(FakeApi::new());
        let (mut manager, _rx) = manager(api);

        let ids = manager.enqueue(vec![file("a.mp3", 10), file("b.mp3", 10)]);
        assert!(manager.cancel(ids[1]));
        assert_eq!(manager.tasks().len(), 1);
        assert_eq!(manager.active().unwrap().id, ids[0]);
        assert!(!manager.cancel(ids[1]));
    }

    #[tokio::test]
    async fn test_stale_settle_is_ignored() {
        let api = Arc::new(FakeApi::new());
        let (mut manager, _rx) = manager(api);

        let ids = manager.enqueue(vec![file("a.mp3", 10)]);
        manager.cancel(ids[0]);
        let outcome = manager.handle_event(UploadEvent::Settled {
            id: ids[0],
            result: Ok(()),
        });
        assert_eq!(outcome, None);
        assert!(manager.tasks().is_empty());
    }
}
