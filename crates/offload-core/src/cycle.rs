use std::path::PathBuf;

use crate::errors::{CycleError, CycleResult};
use crate::invoker::{CopyJob, RunId, SinkFile};
use crate::protocol;
use crate::reconcile::reconcile;
use crate::summary::RunSummary;

/// One invoke → parse → reconcile pass.
///
/// Implementations block for the whole pass; the scheduler runs them on a
/// blocking thread and never starts a second pass before the first returns.
pub trait CycleRunner: Send + Sync + 'static {
    fn run_cycle(&self, run: RunId) -> CycleResult<RunSummary>;
}

/// Cycle backed by the external copy tool.
#[derive(Debug, Clone)]
pub struct OffloadCycle {
    job: CopyJob,
    sink_dir: PathBuf,
}

impl OffloadCycle {
    pub fn new(job: CopyJob, sink_dir: PathBuf) -> Self {
        Self { job, sink_dir }
    }

    pub fn job(&self) -> &CopyJob {
        &self.job
    }
}

impl CycleRunner for OffloadCycle {
    fn run_cycle(&self, run: RunId) -> CycleResult<RunSummary> {
        let (sink, output) = SinkFile::create(self.sink_dir.join(run.sink_file_name()))
            .map_err(|err| CycleError::sink(run, err))?;

        let status = self
            .job
            .run(output)
            .map_err(|err| CycleError::spawn(run, &self.job.binary, &err))?;

        if !status.success() {
            let envelope = protocol::read_error_envelope(sink.path())
                .map_err(|err| CycleError::sink(run, format!("{err:#}")))?;
            return match envelope {
                Some(message) if protocol::is_no_match(&message) => {
                    log::trace!("run {run}: no files matched");
                    Ok(RunSummary::default())
                }
                other => Err(CycleError::tool_failed(run, status, other)),
            };
        }

        let records = protocol::read_records(sink.path())
            .map_err(|err| CycleError::sink(run, format!("{err:#}")))?;
        let outcome = reconcile(records);
        if let Some(err) = outcome.read_error {
            log::warn!(
                "run {run}: stopped reading job results early ({err}); {} files already reconciled",
                outcome.summary.files_transferred
            );
        }

        let summary = outcome.summary;
        if !summary.failed_deletions.is_empty() {
            log::warn!(
                "run {run}: {} uploaded files could not be deleted locally: {}",
                summary.failed_deletions.len(),
                summary
                    .failed_deletions
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(summary)
    }
}
