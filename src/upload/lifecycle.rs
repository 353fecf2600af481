//! The upload state machine.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::progress::ProgressSource;
use super::scheduler::{ManualScheduler, Scheduler, TimerEvent, TimerId};
use super::{FileRef, UploadNotification, UploadOutcome, UploadStatus, UploadTask};
use crate::notifications::NotificationSink;

/// Tick interval and settle delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    pub tick_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
struct TaskEntry {
    task: UploadTask,
    tick: Option<TimerId>,
    settle: Option<TimerId>,
    /// Resolved at 100% but not yet committed to `task.status`.
    pending_outcome: Option<UploadOutcome>,
}

impl TaskEntry {
    fn is_advancing(&self) -> bool {
        self.task.status == UploadStatus::Uploading && self.pending_outcome.is_none()
    }
}

/// Point-in-time view of every managed task plus partition counts.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSnapshot {
    pub tasks: Vec<UploadTask>,
    pub uploading: usize,
    pub completed: usize,
    pub error: usize,
    pub total: usize,
}

/// Owns the managed upload tasks and drives them through their states.
///
/// Every timer callback re-checks that its task still exists and is in the
/// expected state, so late ticks and settles after `remove`/`retry` are inert.
pub struct UploadLifecycle<S, P, N> {
    scheduler: S,
    progress: P,
    sink: N,
    timing: LifecycleTiming,
    entries: Vec<TaskEntry>,
}

impl<S, P, N> UploadLifecycle<S, P, N>
where
    S: Scheduler,
    P: ProgressSource,
    N: NotificationSink,
{
    pub fn new(scheduler: S, progress: P, sink: N, timing: LifecycleTiming) -> Self {
        Self {
            scheduler,
            progress,
            sink,
            timing,
            entries: Vec::new(),
        }
    }

    /// Accept files, one independent `uploading` task each.
    pub fn intake<I>(&mut self, files: I) -> Vec<UploadTask>
    where
        I: IntoIterator<Item = FileRef>,
    {
        files.into_iter().map(|file| self.intake_one(file)).collect()
    }

    fn intake_one(&mut self, file: FileRef) -> UploadTask {
        let task = UploadTask::start(file);
        let tick = self
            .scheduler
            .schedule_repeating(self.timing.tick_interval, TimerEvent::Tick(task.id.clone()));
        info!("Upload {} started: {}", task.id, task.file.name);
        self.entries.push(TaskEntry {
            task: task.clone(),
            tick: Some(tick),
            settle: None,
            pending_outcome: None,
        });
        task
    }

    /// Route a fired timer to its handler.
    pub fn dispatch(&mut self, event: TimerEvent) {
        debug!("Timer fired for upload {}: {:?}", event.task_id(), event);
        match event {
            TimerEvent::Tick(id) => self.advance(&id),
            TimerEvent::Settle(id) => self.settle(&id),
        }
    }

    /// Add one progress increment. No-op unless the task is still advancing.
    pub fn advance(&mut self, task_id: &str) {
        let Some(idx) = self.position(task_id) else {
            debug!("Tick for unknown upload {}", task_id);
            return;
        };
        if !self.entries[idx].is_advancing() {
            return;
        }

        let step = self.progress.next_increment(&self.entries[idx].task).max(0.0);
        let entry = &mut self.entries[idx];
        entry.task.progress = (entry.task.progress + step).min(100.0);
        debug!("Upload {} at {:.1}%", task_id, entry.task.progress);
        if entry.task.progress < 100.0 {
            return;
        }

        if let Some(tick) = entry.tick.take() {
            self.scheduler.cancel(tick);
        }
        let outcome = self.progress.resolve(&self.entries[idx].task);
        let settle = self
            .scheduler
            .schedule_once(self.timing.settle_delay, TimerEvent::Settle(task_id.to_string()));
        let entry = &mut self.entries[idx];
        entry.pending_outcome = Some(outcome);
        entry.settle = Some(settle);
        debug!("Upload {} reached 100%, settling as {:?}", task_id, outcome);
    }

    fn settle(&mut self, task_id: &str) {
        let Some(idx) = self.position(task_id) else {
            debug!("Settle for unknown upload {}", task_id);
            return;
        };
        let entry = &mut self.entries[idx];
        let Some(outcome) = entry.pending_outcome.take() else {
            return;
        };
        if let Some(settle) = entry.settle.take() {
            self.scheduler.cancel(settle);
        }

        let entry = &mut self.entries[idx];
        entry.task.progress = 100.0;
        entry.task.status = outcome.status();
        info!(
            "Upload {} finished as {:?}: {}",
            task_id, outcome, entry.task.file.name
        );
        let notification = UploadNotification {
            task_id: entry.task.id.clone(),
            file_name: entry.task.file.name.clone(),
            outcome,
        };
        self.sink.notify(&notification);
    }

    /// Drop a task in any state and cancel its pending timers.
    pub fn remove(&mut self, task_id: &str) -> Option<UploadTask> {
        let idx = self.position(task_id)?;
        let entry = self.entries.remove(idx);
        for timer in [entry.tick, entry.settle].into_iter().flatten() {
            self.scheduler.cancel(timer);
        }
        info!("Upload {} removed ({:?})", task_id, entry.task.status);
        Some(entry.task)
    }

    /// Replace a task with a fresh upload of the same file.
    pub fn retry(&mut self, task_id: &str) -> Option<UploadTask> {
        let old = self.remove(task_id)?;
        let task = self.intake_one(old.file);
        info!("Upload {} retried as {}", task_id, task.id);
        Some(task)
    }

    pub fn get(&self, task_id: &str) -> Option<&UploadTask> {
        self.entries
            .iter()
            .find(|e| e.task.id == task_id)
            .map(|e| &e.task)
    }

    /// Tasks in intake order.
    pub fn tasks(&self) -> impl Iterator<Item = &UploadTask> {
        self.entries.iter().map(|e| &e.task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn uploading_count(&self) -> usize {
        self.count(UploadStatus::Uploading)
    }

    pub fn completed_count(&self) -> usize {
        self.count(UploadStatus::Completed)
    }

    pub fn error_count(&self) -> usize {
        self.count(UploadStatus::Error)
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        UploadSnapshot {
            tasks: self.tasks().cloned().collect(),
            uploading: self.uploading_count(),
            completed: self.completed_count(),
            error: self.error_count(),
            total: self.len(),
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    fn count(&self, status: UploadStatus) -> usize {
        self.entries.iter().filter(|e| e.task.status == status).count()
    }

    fn position(&self, task_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.task.id == task_id)
    }
}

impl<P, N> UploadLifecycle<ManualScheduler, P, N>
where
    P: ProgressSource,
    N: NotificationSink,
{
    /// Advance the fake clock by `duration`, dispatching every timer that
    /// comes due along the way.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.scheduler.now() + duration;
        while let Some(event) = self.scheduler.pop_due(deadline) {
            self.dispatch(event);
        }
        self.scheduler.advance_to(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationLog;
    use crate::upload::progress::RandomProgress;
    use std::collections::VecDeque;

    /// Replays fixed increments and outcomes.
    struct Scripted {
        steps: VecDeque<f64>,
        outcomes: VecDeque<UploadOutcome>,
    }

    impl Scripted {
        fn new(steps: &[f64], outcomes: &[UploadOutcome]) -> Self {
            Self {
                steps: steps.iter().copied().collect(),
                outcomes: outcomes.iter().copied().collect(),
            }
        }
    }

    impl ProgressSource for Scripted {
        fn next_increment(&mut self, _task: &UploadTask) -> f64 {
            self.steps.pop_front().unwrap_or(10.0)
        }

        fn resolve(&mut self, _task: &UploadTask) -> UploadOutcome {
            self.outcomes.pop_front().unwrap_or(UploadOutcome::Completed)
        }
    }

    type TestLifecycle<P> = UploadLifecycle<ManualScheduler, P, NotificationLog>;

    fn lifecycle<P: ProgressSource>(progress: P) -> TestLifecycle<P> {
        UploadLifecycle::new(
            ManualScheduler::new(),
            progress,
            NotificationLog::new(100),
            LifecycleTiming::default(),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn assert_partition<S: Scheduler, P: ProgressSource, N: NotificationSink>(lc: &UploadLifecycle<S, P, N>) {
        assert_eq!(
            lc.uploading_count() + lc.completed_count() + lc.error_count(),
            lc.len()
        );
    }

    #[test]
    fn test_intake_creates_independent_tasks() {
        let mut lc = lifecycle(Scripted::new(&[], &[]));
        let tasks = lc.intake(vec![FileRef::new("a.pdf", 1), FileRef::new("b.png", 2)]);
        assert_eq!(tasks.len(), 2);
        assert_ne!(tasks[0].id, tasks[1].id);
        assert!(tasks.iter().all(|t| t.progress == 0.0 && t.status == UploadStatus::Uploading));
        assert_eq!(lc.scheduler().pending(), 2);
        assert_eq!(lc.uploading_count(), 2);
        assert_partition(&lc);
    }

    #[test]
    fn test_progress_clamps_and_settles_after_delay() {
        let mut lc = lifecycle(Scripted::new(&[60.0, 60.0], &[UploadOutcome::Completed]));
        let id = lc.intake([FileRef::new("report.pdf", 1)])[0].id.clone();

        lc.run_for(ms(200));
        assert_eq!(lc.get(&id).unwrap().progress, 60.0);

        lc.run_for(ms(200));
        let task = lc.get(&id).unwrap();
        assert_eq!(task.progress, 100.0);
        assert_eq!(task.status, UploadStatus::Uploading);
        assert_eq!(lc.sink().len(), 0);

        lc.run_for(ms(499));
        assert_eq!(lc.get(&id).unwrap().status, UploadStatus::Uploading);

        lc.run_for(ms(1));
        let task = lc.get(&id).unwrap();
        assert_eq!(task.status, UploadStatus::Completed);
        assert_eq!(task.progress, 100.0);
        assert_eq!(lc.scheduler().pending(), 0);

        let notes = lc.sink().recent(10);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].task_id, id);
        assert_eq!(notes[0].file_name, "report.pdf");
        assert_eq!(notes[0].outcome, UploadOutcome::Completed);
    }

    #[test]
    fn test_error_outcome_keeps_progress_pinned() {
        let mut lc = lifecycle(Scripted::new(&[100.0], &[UploadOutcome::Error]));
        let id = lc.intake([FileRef::new("scan.tiff", 1)])[0].id.clone();
        lc.run_for(ms(700));
        let task = lc.get(&id).unwrap();
        assert_eq!(task.status, UploadStatus::Error);
        assert_eq!(task.progress, 100.0);
        assert_eq!(lc.error_count(), 1);
        assert_eq!(lc.sink().recent(1)[0].outcome, UploadOutcome::Error);
    }

    #[test]
    fn test_advance_on_resolved_task_is_noop() {
        let mut lc = lifecycle(Scripted::new(&[100.0], &[UploadOutcome::Completed]));
        let id = lc.intake([FileRef::new("a.pdf", 1)])[0].id.clone();
        lc.run_for(ms(200));

        // Resolved but unsettled: extra ticks must not re-resolve.
        lc.advance(&id);
        lc.dispatch(TimerEvent::Tick(id.clone()));
        assert_eq!(lc.scheduler().pending(), 1);

        lc.run_for(ms(500));
        lc.advance(&id);
        lc.dispatch(TimerEvent::Settle(id.clone()));
        assert_eq!(lc.get(&id).unwrap().status, UploadStatus::Completed);
        assert_eq!(lc.sink().len(), 1);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut lc = lifecycle(Scripted::new(&[], &[]));
        lc.advance("missing");
        lc.dispatch(TimerEvent::Settle("missing".into()));
        assert!(lc.remove("missing").is_none());
        assert!(lc.retry("missing").is_none());
        assert!(lc.is_empty());
        assert_eq!(lc.sink().len(), 0);
    }

    #[test]
    fn test_remove_immediately_cancels_everything() {
        let mut lc = lifecycle(RandomProgress::seeded(3, 0.1));
        let id = lc.intake([FileRef::new("a.pdf", 1)])[0].id.clone();
        let removed = lc.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(lc.scheduler().pending(), 0);

        // Stray callbacks that were already in flight.
        lc.dispatch(TimerEvent::Tick(id.clone()));
        lc.dispatch(TimerEvent::Settle(id.clone()));
        lc.run_for(Duration::from_secs(60));

        assert!(lc.get(&id).is_none());
        assert_eq!(lc.len(), 0);
        assert_eq!(lc.uploading_count() + lc.completed_count() + lc.error_count(), 0);
        assert_eq!(lc.sink().len(), 0);
    }

    #[test]
    fn test_remove_while_settling_suppresses_notification() {
        let mut lc = lifecycle(Scripted::new(&[100.0], &[UploadOutcome::Completed]));
        let id = lc.intake([FileRef::new("a.pdf", 1)])[0].id.clone();
        lc.run_for(ms(200));
        assert_eq!(lc.scheduler().pending(), 1);

        lc.remove(&id);
        assert_eq!(lc.scheduler().pending(), 0);
        lc.run_for(Duration::from_secs(5));
        assert_eq!(lc.sink().len(), 0);
    }

    #[test]
    fn test_remove_terminal_task() {
        let mut lc = lifecycle(Scripted::new(&[100.0], &[UploadOutcome::Completed]));
        let id = lc.intake([FileRef::new("a.pdf", 1)])[0].id.clone();
        lc.run_for(Duration::from_secs(1));
        assert_eq!(lc.completed_count(), 1);
        assert_eq!(lc.remove(&id).unwrap().status, UploadStatus::Completed);
        assert_eq!(lc.completed_count(), 0);
        assert_partition(&lc);
    }

    #[test]
    fn test_retry_after_error_starts_fresh() {
        let mut lc = lifecycle(Scripted::new(
            &[100.0, 100.0],
            &[UploadOutcome::Error, UploadOutcome::Completed],
        ));
        let file = FileRef::new("contract.pdf", 2048).with_content_type("application/pdf");
        let old = lc.intake([file.clone()])[0].id.clone();
        lc.run_for(Duration::from_secs(1));
        assert_eq!(lc.get(&old).unwrap().status, UploadStatus::Error);

        let fresh = lc.retry(&old).unwrap();
        assert_ne!(fresh.id, old);
        assert_eq!(fresh.status, UploadStatus::Uploading);
        assert_eq!(fresh.progress, 0.0);
        assert_eq!(fresh.file, file);
        assert!(lc.get(&old).is_none());
        assert_eq!(lc.len(), 1);

        lc.run_for(Duration::from_secs(1));
        assert_eq!(lc.get(&fresh.id).unwrap().status, UploadStatus::Completed);
        let notes = lc.sink().recent(10);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].task_id, fresh.id);
        assert_eq!(notes[1].task_id, old);
    }

    #[test]
    fn test_retry_while_settling_old_never_resolves() {
        let mut lc = lifecycle(Scripted::new(&[100.0, 10.0], &[UploadOutcome::Completed]));
        let old = lc.intake([FileRef::new("a.pdf", 1)])[0].id.clone();
        lc.run_for(ms(200));
        let fresh = lc.retry(&old).unwrap();

        lc.dispatch(TimerEvent::Settle(old.clone()));
        lc.run_for(ms(500));
        assert!(lc.get(&old).is_none());
        assert_eq!(lc.get(&fresh.id).unwrap().status, UploadStatus::Uploading);
        assert!(lc.sink().recent(10).iter().all(|n| n.task_id != old));
    }

    #[test]
    fn test_negative_increment_is_ignored() {
        let mut lc = lifecycle(Scripted::new(&[30.0, -50.0, 5.0], &[]));
        let id = lc.intake([FileRef::new("a.pdf", 1)])[0].id.clone();
        lc.run_for(ms(600));
        assert_eq!(lc.get(&id).unwrap().progress, 35.0);
    }

    #[test]
    fn test_progress_monotonic_and_bounded() {
        let mut lc = lifecycle(RandomProgress::seeded(42, 0.1));
        let ids: Vec<String> = lc
            .intake((0..8).map(|i| FileRef::new(format!("f{}.pdf", i), 1)))
            .into_iter()
            .map(|t| t.id)
            .collect();

        let mut last = vec![0.0; ids.len()];
        for _ in 0..100 {
            lc.run_for(ms(50));
            for (i, id) in ids.iter().enumerate() {
                let task = lc.get(id).unwrap();
                assert!((0.0..=100.0).contains(&task.progress));
                assert!(task.progress >= last[i]);
                if task.status.is_terminal() {
                    assert_eq!(task.progress, 100.0);
                }
                last[i] = task.progress;
            }
            assert_partition(&lc);
        }
        assert_eq!(lc.uploading_count(), 0);
        assert_eq!(lc.sink().len(), ids.len());
    }

    #[test]
    fn test_error_rate_over_many_resolutions() {
        let mut lc = lifecycle(RandomProgress::seeded(2024, 0.1));
        let total = 10_000;
        let mut errors = 0;
        for i in 0..total {
            let id = lc.intake([FileRef::new(format!("doc{}.pdf", i), 1)])[0].id.clone();
            while lc.get(&id).map(|t| t.progress < 100.0).unwrap_or(false) {
                lc.advance(&id);
            }
            lc.dispatch(TimerEvent::Settle(id.clone()));
            let task = lc.remove(&id).unwrap();
            assert!(task.status.is_terminal());
            if task.status == UploadStatus::Error {
                errors += 1;
            }
        }

        let rate = errors as f64 / total as f64;
        // sigma is 0.3% at n = 10k; allow about 5 sigma.
        assert!((rate - 0.10).abs() < 0.015, "error rate {}", rate);
        assert!(lc.is_empty());
        assert_eq!(lc.scheduler().pending(), 0);
    }
}
