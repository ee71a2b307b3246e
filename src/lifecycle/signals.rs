//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM / SIGINT (Ctrl+C) trigger graceful shutdown
//! - SIGHUP requests a configuration reload
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a snapshot reload, never a shutdown

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::shutdown::Shutdown;

/// Resolve on Ctrl+C, or SIGTERM on unix.
pub async fn terminate_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Trigger shutdown on a terminate signal and forward SIGHUP as reload
/// requests, until shutdown.
pub async fn listen(shutdown: Arc<Shutdown>, reload_tx: mpsc::UnboundedSender<()>) {
    let mut stopping = shutdown.subscribe();
    let reloads = forward_hangups(reload_tx);

    tokio::select! {
        _ = terminate_signal() => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        }
        _ = stopping.recv() => {}
        _ = reloads => {}
    }
}

#[cfg(unix)]
async fn forward_hangups(reload_tx: mpsc::UnboundedSender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler, reload by signal disabled");
            return std::future::pending().await;
        }
    };
    while hangups.recv().await.is_some() {
        tracing::info!("SIGHUP received, requesting configuration reload");
        if reload_tx.send(()).is_err() {
            break;
        }
    }
    std::future::pending().await
}

#[cfg(not(unix))]
async fn forward_hangups(_reload_tx: mpsc::UnboundedSender<()>) {
    std::future::pending().await
}
