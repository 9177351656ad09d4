mod logging;
mod runtime;
mod signals;

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use offload_core::{Accumulator, Credentials, OffloadCycle, Scheduler, StatsdSink};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::runtime::{load_runtime, DaemonArgs};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = DaemonArgs::parse();
    logging::init_logging(args.verbose)?;

    let runtime = load_runtime(&args)?;
    for warning in &runtime.warnings {
        warn!("{warning}");
    }

    match &runtime.job.credentials {
        Credentials::Environment { default_region, .. } => {
            info!("using AWS credentials from environment variables (region: {default_region})")
        }
        Credentials::File { path, profile } => info!(
            "using AWS credentials from file: {} (profile: {profile})",
            path.display()
        ),
    }
    info!("using s5cmd binary: {}", runtime.job.binary.display());

    let mut accumulator = Accumulator::new(runtime.report_interval, runtime.process_interval);
    if let Some(metrics) = &runtime.metrics {
        match StatsdSink::connect(&metrics.address) {
            Ok(sink) => {
                info!("sending metrics to {}", sink.target());
                accumulator = accumulator.with_metrics(Box::new(sink), metrics.prefix.clone());
            }
            Err(err) => warn!("metrics disabled: {err:#}"),
        }
    }

    let shutdown = CancellationToken::new();
    signals::spawn_shutdown_listener(shutdown.clone());

    let cycle = OffloadCycle::new(runtime.job, runtime.sink_dir);
    info!(
        "s5-offload started, processing {} every {:?}",
        cycle.job().source_glob().display(),
        runtime.process_interval
    );

    let scheduler = Scheduler::new(
        Arc::new(cycle),
        runtime.process_interval,
        accumulator,
        shutdown,
    );
    scheduler.run().await;

    info!("s5-offload shutdown complete");
    Ok(())
}
