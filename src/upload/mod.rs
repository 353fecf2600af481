#![allow(dead_code)]
//! Upload lifecycle: per-file state machine from intake to a terminal outcome.
//!
//! A task starts `uploading`, advances on a repeating tick until progress hits
//! 100, then settles to `completed` or `error` after a fixed delay. Timers come
//! from a [`Scheduler`] and progress/outcomes from a [`ProgressSource`], so the
//! same state machine runs under a fake clock in tests and tokio in the server.

pub mod intake;
pub mod lifecycle;
pub mod progress;
pub mod scheduler;

pub use intake::{DropzonePolicy, IntakeRejection};
pub use lifecycle::{LifecycleTiming, UploadLifecycle, UploadSnapshot};
pub use progress::{ProgressSource, RandomProgress};
pub use scheduler::{TimerEvent, TokioScheduler};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle to the file behind an upload. The lifecycle never reads its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Uploading)
    }
}

/// Terminal result of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Completed,
    Error,
}

impl UploadOutcome {
    pub fn status(self) -> UploadStatus {
        match self {
            Self::Completed => UploadStatus::Completed,
            Self::Error => UploadStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadTask {
    pub id: String,
    pub file: FileRef,
    /// Percentage in [0, 100]; exactly 100 once the task is terminal.
    pub progress: f64,
    pub status: UploadStatus,
}

impl UploadTask {
    pub(crate) fn start(file: FileRef) -> Self {
        Self {
            id: format!("upl_{}", Uuid::new_v4().simple()),
            file,
            progress: 0.0,
            status: UploadStatus::Uploading,
        }
    }

    /// Whole-percent progress for progress bars.
    pub fn display_progress(&self) -> u8 {
        self.progress.clamp(0.0, 100.0).round() as u8
    }
}

/// Emitted once per task when its outcome is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadNotification {
    pub task_id: String,
    pub file_name: String,
    pub outcome: UploadOutcome,
}
