//! volsyncd: on-demand volume synchronization daemon.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use volsyncd::SyncOrchestrator;
use volsyncd_server::config::Config;
use volsyncd_server::http;

/// How long shutdown waits for a running job before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    let orchestrator = Arc::new(SyncOrchestrator::new(config.default_timeout));

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(
        "listening on port {} (default sync timeout {:?})",
        config.port,
        config.default_timeout
    );

    let server = tokio::spawn(http::serve(listener, Arc::clone(&orchestrator)));

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received, stopping listener");
    server.abort();

    // Let a running job drain; its cleanup is RAII-guaranteed either way.
    let grace_until = Instant::now() + SHUTDOWN_GRACE;
    while orchestrator.is_busy() && Instant::now() < grace_until {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if orchestrator.is_busy() {
        tracing::warn!(
            "abandoning synchronization still running after {:?} grace period",
            SHUTDOWN_GRACE
        );
    }

    tracing::info!("server exited");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
