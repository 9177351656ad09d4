//! Orchestration core for offloading spooled files to object storage.
//!
//! Each cycle runs the external copy tool once, reads its line-delimited JSON
//! results and deletes local files only for uploads the tool confirmed.

pub mod cycle;
pub mod errors;
pub mod invoker;
pub mod metrics;
pub mod protocol;
pub mod reconcile;
pub mod report;
pub mod scheduler;
pub mod summary;

pub use cycle::{CycleRunner, OffloadCycle};
pub use errors::{CycleError, CycleErrorKind};
pub use invoker::{CopyJob, Credentials, RunId};
pub use metrics::{MetricsSink, NoopSink, StatsdSink};
pub use report::{Accumulator, FinalReport, WindowReport};
pub use scheduler::Scheduler;
pub use summary::RunSummary;
