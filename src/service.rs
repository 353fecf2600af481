//! Upload service actor.
//!
//! One tokio task owns the [`UploadLifecycle`] and serializes every mutation:
//! commands from HTTP handlers and timer events from the scheduler are
//! handled in a single `select!` loop.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::notifications::NotificationSink;
use crate::upload::{
    FileRef, LifecycleTiming, ProgressSource, RandomProgress, TimerEvent, TokioScheduler,
    UploadLifecycle, UploadSnapshot, UploadTask,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("upload service is not running")]
    Stopped,
}

enum Command {
    Intake {
        files: Vec<FileRef>,
        reply: oneshot::Sender<Vec<UploadTask>>,
    },
    Remove {
        task_id: String,
        reply: oneshot::Sender<Option<UploadTask>>,
    },
    Retry {
        task_id: String,
        reply: oneshot::Sender<Option<UploadTask>>,
    },
    Snapshot {
        reply: oneshot::Sender<UploadSnapshot>,
    },
}

/// Cloneable client for the upload service.
#[derive(Debug, Clone)]
pub struct UploadHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intake { files, .. } => write!(f, "Intake({} files)", files.len()),
            Self::Remove { task_id, .. } => write!(f, "Remove({})", task_id),
            Self::Retry { task_id, .. } => write!(f, "Retry({})", task_id),
            Self::Snapshot { .. } => f.write_str("Snapshot"),
        }
    }
}

impl UploadHandle {
    pub async fn intake(&self, files: Vec<FileRef>) -> Result<Vec<UploadTask>, ServiceError> {
        self.request(|reply| Command::Intake { files, reply }).await
    }

    pub async fn remove(&self, task_id: &str) -> Result<Option<UploadTask>, ServiceError> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Remove { task_id, reply }).await
    }

    pub async fn retry(&self, task_id: &str) -> Result<Option<UploadTask>, ServiceError> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Retry { task_id, reply }).await
    }

    pub async fn snapshot(&self) -> Result<UploadSnapshot, ServiceError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }
}

/// Start the service with the randomized progress simulator.
pub fn spawn<N>(timing: LifecycleTiming, failure_rate: f64, sink: N) -> UploadHandle
where
    N: NotificationSink + Send + 'static,
{
    spawn_with(timing, RandomProgress::from_entropy(failure_rate), sink)
}

/// Start the service with any progress source. Must be called inside a tokio runtime.
pub fn spawn_with<P, N>(timing: LifecycleTiming, progress: P, sink: N) -> UploadHandle
where
    P: ProgressSource + Send + 'static,
    N: NotificationSink + Send + 'static,
{
    let (scheduler, timers) = TokioScheduler::new();
    let lifecycle = UploadLifecycle::new(scheduler, progress, sink, timing);
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run(lifecycle, rx, timers));
    info!(
        "Upload service started (tick {:?}, settle {:?})",
        timing.tick_interval, timing.settle_delay
    );
    UploadHandle { commands: tx }
}

async fn run<P, N>(
    mut lifecycle: UploadLifecycle<TokioScheduler, P, N>,
    mut commands: mpsc::Receiver<Command>,
    mut timers: mpsc::UnboundedReceiver<TimerEvent>,
) where
    P: ProgressSource,
    N: NotificationSink,
{
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle(&mut lifecycle, command),
                None => break,
            },
            Some(event) = timers.recv() => lifecycle.dispatch(event),
        }
    }
    info!("Upload service stopped with {} tasks", lifecycle.len());
}

fn handle<P, N>(lifecycle: &mut UploadLifecycle<TokioScheduler, P, N>, command: Command)
where
    P: ProgressSource,
    N: NotificationSink,
{
    debug!("Upload service: {:?}", command);
    // A dropped reply receiver means the caller went away; the mutation stands.
    match command {
        Command::Intake { files, reply } => {
            let _ = reply.send(lifecycle.intake(files));
        }
        Command::Remove { task_id, reply } => {
            let _ = reply.send(lifecycle.remove(&task_id));
        }
        Command::Retry { task_id, reply } => {
            let _ = reply.send(lifecycle.retry(&task_id));
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(lifecycle.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationLog;
    use crate::upload::{UploadOutcome, UploadStatus};
    use std::time::Duration;

    fn timing() -> LifecycleTiming {
        LifecycleTiming::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_runs_to_completion() {
        let log = NotificationLog::new(10);
        let handle = spawn_with(timing(), RandomProgress::seeded(1, 0.0), log.clone());

        let tasks = handle
            .intake(vec![FileRef::new("a.pdf", 10), FileRef::new("b.png", 20)])
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.uploading, 2);
        assert_eq!(snapshot.total, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.uploading + snapshot.completed + snapshot.error, snapshot.total);
        assert!(snapshot.tasks.iter().all(|t| t.progress == 100.0));
        assert_eq!(log.len(), 2);
        assert!(log.recent(10).iter().all(|n| n.outcome == UploadOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_stops_resolution() {
        let log = NotificationLog::new(10);
        let handle = spawn_with(timing(), RandomProgress::seeded(2, 0.1), log.clone());

        let task = handle.intake(vec![FileRef::new("a.pdf", 10)]).await.unwrap().remove(0);
        tokio::time::sleep(Duration::from_millis(450)).await;
        let removed = handle.remove(&task.id).await.unwrap().unwrap();
        assert_eq!(removed.id, task.id);
        assert!(handle.remove(&task.id).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.total, 0);
        assert!(log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_error() {
        let log = NotificationLog::new(10);
        let handle = spawn_with(timing(), RandomProgress::seeded(3, 1.0), log.clone());

        let task = handle.intake(vec![FileRef::new("bad.pdf", 10)]).await.unwrap().remove(0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.error, 1);

        let fresh = handle.retry(&task.id).await.unwrap().unwrap();
        assert_ne!(fresh.id, task.id);
        assert_eq!(fresh.status, UploadStatus::Uploading);
        assert_eq!(fresh.progress, 0.0);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.tasks[0].id, fresh.id);
        assert!(handle.retry("upl_missing").await.unwrap().is_none());
    }
}
