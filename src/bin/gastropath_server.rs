use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use gastropath::trigger::{router, TriggerState};
use gastropath::{init_tracing, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    info!(profile = ?config.public_profile(), "loaded configuration");
    if config.trigger_shared_secret.is_none() {
        warn!("TRIGGER_SHARED_SECRET is not set; every add request will be rejected");
    }

    let app = router(TriggerState::from_config(&config));
    let listener = TcpListener::bind(&config.trigger_bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.trigger_bind_addr))?;
    info!(addr = %listener.local_addr()?, "trigger server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("trigger server error")?;

    info!("trigger server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(?err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
