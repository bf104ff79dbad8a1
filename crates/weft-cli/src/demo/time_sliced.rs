use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};
use tokio::time::sleep;
use weft_core::{TaskContext, TaskError, TaskWork};

const SLICE: Duration = Duration::from_millis(125);

/// Work that needs a fixed amount of time, spent in 1/8 s slices, and may
/// fail at a random point along the way.
#[derive(Debug, Clone)]
pub struct TimeSlicedWork {
    required: Duration,
    failure_probability: f64,
}

impl TimeSlicedWork {
    pub fn new(required: Duration, failure_probability: f64) -> Self {
        Self {
            required,
            failure_probability: failure_probability.clamp(0.0, 1.0),
        }
    }

    /// Whether this run fails, and after how much work.
    fn roll(&self) -> (bool, Duration) {
        let mut rng = rand::thread_rng();
        let fails = rng.gen_bool(self.failure_probability);
        let at = self.required.mul_f64(rng.gen_range(0.0..1.0));
        (fails, at)
    }
}

#[async_trait]
impl TaskWork for TimeSlicedWork {
    async fn run(&self, ctx: TaskContext) -> Result<Value, TaskError> {
        let (fails, failure_at) = self.roll();
        let failure = || TaskError::new(format!("{} hit a random error", ctx.name()));

        let mut taken = Duration::ZERO;
        while taken < self.required {
            if fails && taken > failure_at {
                return Err(failure());
            }

            tokio::select! {
                _ = sleep(SLICE) => {}
                _ = ctx.cancelled() => return Err(TaskError::cancelled()),
            }
            taken += SLICE;
            ctx.report_progress(taken.as_secs_f64() / self.required.as_secs_f64())
                .await;
        }

        // Failure scheduled inside the last slice
        if fails {
            return Err(failure());
        }
        Ok(json!({ "task": ctx.name(), "seconds": taken.as_secs_f64() }))
    }
}
