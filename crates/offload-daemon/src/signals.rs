use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on the first SIGINT or SIGTERM. The scheduler only looks at
/// the token between cycles, so a run in progress always finishes first.
pub(crate) fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let signal = wait_for_termination().await;
        info!("received {signal}, initiating graceful shutdown");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            warn!("failed to install SIGTERM handler: {err}");
            return match tokio::signal::ctrl_c().await {
                Ok(()) => "SIGINT",
                Err(_) => std::future::pending().await,
            };
        }
    };

    tokio::select! {
        _ = term.recv() => "SIGTERM",
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => "SIGINT",
            Err(err) => {
                warn!("failed to listen for SIGINT: {err}");
                term.recv().await;
                "SIGTERM"
            }
        },
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "Ctrl-C",
        Err(err) => {
            warn!("failed to listen for Ctrl-C: {err}");
            std::future::pending().await
        }
    }
}
