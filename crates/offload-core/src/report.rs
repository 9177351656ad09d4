//! Windowed and session-lifetime bookkeeping of run summaries.

use std::fmt;
use std::time::Duration;

use chrono::Utc;

use crate::metrics::{self, MetricsSink};
use crate::summary::RunSummary;

/// Number of ticks between periodic reports: `max(1, floor(window / interval))`.
pub fn runs_per_report(window: Duration, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 1;
    }
    let runs = window.as_nanos() / interval.as_nanos();
    u64::try_from(runs).unwrap_or(u64::MAX).max(1)
}

/// Periodic report covering one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub runs: u64,
    pub window: Duration,
    pub totals: RunSummary,
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary over last {} runs (~{:?}): {} files transferred, {} files deleted, {:.2} MB, {} files failed to delete.",
            self.runs,
            self.window,
            self.totals.files_transferred,
            self.totals.files_deleted,
            self.totals.megabytes(),
            self.totals.failed_count(),
        )
    }
}

/// Terminal report produced once at shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalReport {
    /// Runs since the last periodic reset.
    pub runs: u64,
    /// Totals since the last periodic reset.
    pub totals: RunSummary,
    pub session_runs: u64,
    pub session: RunSummary,
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Final summary: {} files transferred, {} files deleted, {:.2} MB, {} files failed to delete over {} runs (session: {} files transferred, {:.2} MB over {} runs).",
            self.totals.files_transferred,
            self.totals.files_deleted,
            self.totals.megabytes(),
            self.totals.failed_count(),
            self.runs,
            self.session.files_transferred,
            self.session.megabytes(),
            self.session_runs,
        )
    }
}

/// Folds run summaries and decides when to report.
///
/// Owned by the scheduler loop; nothing else mutates it.
pub struct Accumulator {
    window: Duration,
    runs_per_report: u64,
    window_totals: RunSummary,
    window_runs: u64,
    session_totals: RunSummary,
    session_runs: u64,
    metrics: Option<Box<dyn MetricsSink>>,
    metrics_prefix: String,
}

impl Accumulator {
    pub fn new(window: Duration, interval: Duration) -> Self {
        Self {
            window,
            runs_per_report: runs_per_report(window, interval),
            window_totals: RunSummary::default(),
            window_runs: 0,
            session_totals: RunSummary::default(),
            session_runs: 0,
            metrics: None,
            metrics_prefix: metrics::DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_metrics(mut self, sink: Box<dyn MetricsSink>, prefix: impl Into<String>) -> Self {
        self.metrics = Some(sink);
        self.metrics_prefix = prefix.into();
        self
    }

    pub fn runs_per_report(&self) -> u64 {
        self.runs_per_report
    }

    pub fn window_runs(&self) -> u64 {
        self.window_runs
    }

    pub fn window_totals(&self) -> &RunSummary {
        &self.window_totals
    }

    pub fn session_runs(&self) -> u64 {
        self.session_runs
    }

    pub fn session_totals(&self) -> &RunSummary {
        &self.session_totals
    }

    /// Fold one run and count the tick. Returns the periodic report when due,
    /// after which window totals and the tick counter are back to zero.
    ///
    /// The per-run snapshot is the only periodic metric; window totals are
    /// logged but never emitted as series.
    pub fn record_run(&mut self, summary: &RunSummary) -> Option<WindowReport> {
        if let Some(sink) = &self.metrics {
            let now = Utc::now().timestamp();
            let batch = metrics::run_snapshot(&self.metrics_prefix, summary, now);
            if let Err(err) = sink.emit(&batch) {
                log::debug!("error sending run metrics: {err:#}");
            }
        }

        self.window_totals.accumulate(summary);
        self.session_totals.accumulate(summary);
        self.window_runs += 1;
        self.session_runs += 1;

        if self.window_runs < self.runs_per_report {
            return None;
        }

        let report = WindowReport {
            runs: self.window_runs,
            window: self.window,
            totals: std::mem::take(&mut self.window_totals),
        };
        self.window_runs = 0;

        if report.totals.is_empty() {
            log::debug!("{report}");
        } else {
            log::info!("{report}");
        }
        Some(report)
    }

    /// Terminal report. Does not reset anything.
    pub fn finish(&self) -> FinalReport {
        let report = FinalReport {
            runs: self.window_runs,
            totals: self.window_totals.clone(),
            session_runs: self.session_runs,
            session: self.session_totals.clone(),
        };

        if let Some(sink) = &self.metrics {
            let batch = metrics::shutdown_snapshot(
                &self.metrics_prefix,
                &self.session_totals,
                self.session_runs,
            );
            match sink.emit(&batch) {
                Ok(()) => log::info!("final metrics sent"),
                Err(err) => log::warn!("error sending final metrics: {err:#}"),
            }
        }

        log::info!("{report}");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metric;
    use eyre::{bail, Result};
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl MetricsSink for Recorder {
        fn emit(&self, batch: &[Metric]) -> Result<()> {
            self.batches
                .lock()
                .push(batch.iter().map(ToString::to_string).collect());
            Ok(())
        }
    }

    struct Broken;

    impl MetricsSink for Broken {
        fn emit(&self, _batch: &[Metric]) -> Result<()> {
            bail!("connection refused")
        }
    }

    fn one_file(bytes: u64) -> RunSummary {
        let mut summary = RunSummary::default();
        summary.add_deleted(bytes);
        summary
    }

    #[test]
    fn runs_per_report_floors_and_clamps() {
        let s = Duration::from_secs;
        assert_eq!(runs_per_report(s(60), s(1)), 60);
        assert_eq!(runs_per_report(s(60), s(7)), 8);
        assert_eq!(runs_per_report(s(60), s(120)), 1);
        assert_eq!(runs_per_report(s(60), Duration::ZERO), 1);
        assert_eq!(runs_per_report(s(60), Duration::from_millis(250)), 240);
    }

    #[test]
    fn periodic_report_fires_every_n_ticks_and_resets() {
        let mut acc = Accumulator::new(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(acc.runs_per_report(), 3);

        let mut fired = Vec::new();
        for tick in 1..=7u64 {
            if let Some(report) = acc.record_run(&one_file(10)) {
                fired.push(tick);
                assert_eq!(report.runs, 3);
                assert_eq!(report.totals.files_transferred, 3);
                assert_eq!(report.totals.total_bytes, 30);
                assert_eq!(acc.window_runs(), 0);
                assert_eq!(acc.window_totals(), &RunSummary::default());
            }
        }
        assert_eq!(fired, vec![3, 6]);
        assert_eq!(acc.window_runs(), 1);
        assert_eq!(acc.session_runs(), 7);
        assert_eq!(acc.session_totals().files_transferred, 7);
    }

    #[test]
    fn window_report_line() {
        let mut acc = Accumulator::new(Duration::from_secs(3), Duration::from_secs(1));
        let mut failed = RunSummary::default();
        failed.add_failed_deletion(1024 * 1024, PathBuf::from("/spool/stuck.gz"));
        assert!(acc.record_run(&one_file(512 * 1024)).is_none());
        assert!(acc.record_run(&failed).is_none());
        let report = acc.record_run(&one_file(1024 * 1024)).expect("third run reports");
        assert_eq!(
            report.to_string(),
            "Summary over last 3 runs (~3s): 3 files transferred, 2 files deleted, 2.50 MB, 1 files failed to delete."
        );
    }

    #[test]
    fn final_report_covers_partial_window_without_resetting() {
        let mut acc = Accumulator::new(Duration::from_secs(2), Duration::from_secs(1));
        acc.record_run(&one_file(1));
        acc.record_run(&one_file(1));
        let mut failed = RunSummary::default();
        failed.add_failed_deletion(5, PathBuf::from("/spool/stuck.gz"));
        acc.record_run(&failed);

        let report = acc.finish();
        assert_eq!(report.runs, 1);
        assert_eq!(report.totals, failed);
        assert_eq!(report.session_runs, 3);
        assert_eq!(report.session.files_transferred, 3);
        assert_eq!(
            report.session.failed_deletions,
            vec![PathBuf::from("/spool/stuck.gz")]
        );
        assert_eq!(acc.finish(), report);
        assert!(report
            .to_string()
            .starts_with("Final summary: 1 files transferred, 0 files deleted"));
    }

    #[test]
    fn metrics_are_emitted_per_run_and_at_shutdown() {
        let recorder = Recorder::default();
        let mut acc = Accumulator::new(Duration::from_secs(60), Duration::from_secs(1))
            .with_metrics(Box::new(recorder.clone()), "svc");
        acc.record_run(&one_file(1024 * 1024));
        acc.record_run(&RunSummary::default());
        acc.finish();

        let batches = recorder.batches.lock();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0][0], "svc.current.files_transferred:1|g");
        assert_eq!(batches[0][2], "svc.current.megabytes_transferred:1.00|g");
        assert_eq!(batches[1][0], "svc.current.files_transferred:0|g");
        assert!(batches[2].contains(&"svc.session.final_files_transferred:1|g".to_string()));
        assert!(batches[2].contains(&"svc.session.total_runs:2|g".to_string()));
        assert_eq!(batches[2].last().map(String::as_str), Some("svc.shutdown:1|c"));
    }

    #[test]
    fn metric_failures_do_not_disturb_bookkeeping() {
        let mut acc = Accumulator::new(Duration::from_secs(1), Duration::from_secs(1))
            .with_metrics(Box::new(Broken), "svc");
        let report = acc.record_run(&one_file(3)).expect("window of one run");
        assert_eq!(report.totals.files_deleted, 1);
        let last = acc.finish();
        assert_eq!(last.session.total_bytes, 3);
    }
}
