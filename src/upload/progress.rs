//! Where upload progress and outcomes come from.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{UploadOutcome, UploadTask};

/// Supplies per-tick progress and the final outcome of a task.
///
/// The simulator draws both at random; a real transport would report bytes
/// sent and the backend's verdict through the same two calls.
pub trait ProgressSource {
    /// Percentage points to add on this tick. Negative values are treated as zero.
    fn next_increment(&mut self, task: &UploadTask) -> f64;
    /// Called once, when the task reaches 100%.
    fn resolve(&mut self, task: &UploadTask) -> UploadOutcome;
}

pub const MAX_INCREMENT: f64 = 20.0;

/// Simulated transfer: uniform increments in `[0, 20)`, and an `error`
/// outcome whenever a uniform roll in `[0, 1)` falls below `failure_rate`.
#[derive(Debug, Clone)]
pub struct RandomProgress<R = StdRng> {
    rng: R,
    failure_rate: f64,
}

impl RandomProgress<StdRng> {
    pub fn from_entropy(failure_rate: f64) -> Self {
        Self::new(StdRng::from_entropy(), failure_rate)
    }

    pub fn seeded(seed: u64, failure_rate: f64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), failure_rate)
    }
}

impl<R: Rng> RandomProgress<R> {
    pub fn new(rng: R, failure_rate: f64) -> Self {
        Self {
            rng,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl<R: Rng> ProgressSource for RandomProgress<R> {
    fn next_increment(&mut self, _task: &UploadTask) -> f64 {
        self.rng.gen_range(0.0..MAX_INCREMENT)
    }

    fn resolve(&mut self, _task: &UploadTask) -> UploadOutcome {
        let roll: f64 = self.rng.gen();
        if roll >= self.failure_rate {
            UploadOutcome::Completed
        } else {
            UploadOutcome::Error
        }
    }
}
