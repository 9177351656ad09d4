//! Fixed-interval polling loop with cooperative shutdown.
//!
//! The loop has two event sources, the ticker and the cancellation token, and
//! serializes them: a cycle always runs to completion and is folded before the
//! token is looked at again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cycle::CycleRunner;
use crate::errors::CycleError;
use crate::invoker::RunId;
use crate::report::{Accumulator, FinalReport};
use crate::summary::RunSummary;

pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    accumulator: Accumulator,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        interval: Duration,
        accumulator: Accumulator,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runner,
            interval,
            accumulator,
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled, then emit the final report.
    pub async fn run(mut self) -> FinalReport {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        log::info!("shutdown requested, finishing up");
        self.accumulator.finish()
    }

    async fn tick(&mut self) {
        let run = RunId::new();
        let runner = Arc::clone(&self.runner);
        let result = match task::spawn_blocking(move || runner.run_cycle(run)).await {
            Ok(result) => result,
            Err(err) => Err(CycleError::join(run, err)),
        };

        let summary = match result {
            Ok(summary) => summary,
            Err(err) => {
                log::error!("error processing files: {err}");
                RunSummary::default()
            }
        };

        self.accumulator.record_run(&summary);
    }
}
