//! Timer sources for the upload lifecycle.
//!
//! The lifecycle never sleeps; it asks a [`Scheduler`] for repeating ticks and
//! one-shot settle callbacks, and is handed the resulting [`TimerEvent`]s back.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identifies a scheduled timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// What a timer delivers when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Advance the task's progress.
    Tick(String),
    /// Commit the task's resolved outcome.
    Settle(String),
}

impl TimerEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Tick(id) | Self::Settle(id) => id,
        }
    }
}

pub trait Scheduler {
    /// Fire `event` every `period`, starting one period from now.
    fn schedule_repeating(&mut self, period: Duration, event: TimerEvent) -> TimerId;
    /// Fire `event` once after `delay`.
    fn schedule_once(&mut self, delay: Duration, event: TimerEvent) -> TimerId;
    /// Stop a timer. Unknown or already-fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

// A zero period would fire forever without the clock moving.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct PendingTimer {
    due: Duration,
    period: Option<Duration>,
    event: TimerEvent,
}

/// Deterministic fake clock. Nothing fires until [`ManualScheduler::pop_due`].
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, PendingTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the fake clock.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of live timers.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Pop the earliest timer due at or before `deadline`, moving the clock to
    /// its due time. Repeating timers are re-armed one period later. Ties fire
    /// in scheduling order.
    pub fn pop_due(&mut self, deadline: Duration) -> Option<TimerEvent> {
        let id = self
            .timers
            .iter()
            .filter(|(_, t)| t.due <= deadline)
            .min_by_key(|(id, t)| (t.due, **id))
            .map(|(id, _)| *id)?;

        let timer = self.timers.get(&id)?;
        let (due, period, event) = (timer.due, timer.period, timer.event.clone());
        match period {
            Some(period) => {
                if let Some(timer) = self.timers.get_mut(&id) {
                    timer.due = due + period;
                }
            }
            None => {
                self.timers.remove(&id);
            }
        }
        self.now = self.now.max(due);
        Some(event)
    }

    /// Move the clock forward without firing anything.
    pub fn advance_to(&mut self, deadline: Duration) {
        self.now = self.now.max(deadline);
    }

    fn insert(&mut self, due: Duration, period: Option<Duration>, event: TimerEvent) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(id, PendingTimer { due, period, event });
        id
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&mut self, period: Duration, event: TimerEvent) -> TimerId {
        let period = period.max(MIN_PERIOD);
        self.insert(self.now + period, Some(period), event)
    }

    fn schedule_once(&mut self, delay: Duration, event: TimerEvent) -> TimerId {
        self.insert(self.now + delay, None, event)
    }

    fn cancel(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }
}

/// Tokio-backed timers delivering events over an unbounded channel.
///
/// Must be used from within a tokio runtime. Cancelling aborts the timer task,
/// but an event already sitting in the channel is still delivered; consumers
/// check task state before acting on it.
#[derive(Debug)]
pub struct TokioScheduler {
    events: mpsc::UnboundedSender<TimerEvent>,
    next_id: u64,
    handles: HashMap<TimerId, AbortHandle>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            events: tx,
            next_id: 0,
            handles: HashMap::new(),
        };
        (scheduler, rx)
    }

    /// Number of timers not yet cancelled.
    pub fn active(&self) -> usize {
        self.handles.len()
    }

    fn next_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&mut self, period: Duration, event: TimerEvent) -> TimerId {
        let period = period.max(MIN_PERIOD);
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(event.clone()).is_err() {
                    break;
                }
            }
        });
        let id = self.next_id();
        self.handles.insert(id, handle.abort_handle());
        id
    }

    fn schedule_once(&mut self, delay: Duration, event: TimerEvent) -> TimerId {
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
        let id = self.next_id();
        self.handles.insert(id, handle.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.handles.remove(&id) {
            handle.abort();
            debug!("TokioScheduler: cancelled timer {:?}", id);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
