//! Upload pipeline: task queue, serial runner and FTP import status

mod ftp;
mod queue;
mod runner;

pub use ftp::FtpImport;
pub use queue::{BatchProgress, TaskId, UploadFile, UploadQueue, UploadState, UploadTask};
pub use runner::{UploadEvent, UploadOutcome, UploadQueueManager};
