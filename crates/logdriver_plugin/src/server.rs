use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use logdriver::LogDriver;
use tokio::net::{TcpListener, UnixListener};
use tracing::{error, info};

use crate::config::ListenAddr;

/// Serves `app` on `listen` until `shutdown` resolves.
///
/// A stale socket file left by a previous run is removed before binding, and
/// the socket file is removed again on the way out.
pub async fn serve<F>(app: Router, listen: &ListenAddr, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    match listen {
        ListenAddr::Unix(path) => {
            remove_stale_socket(path).await?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let listener = UnixListener::bind(path)?;
            info!(listen = %listen, "plugin API listening");
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await;
            remove_stale_socket(path).await?;
            served
        }
        ListenAddr::Tcp(addr) => {
            let listener = TcpListener::bind(addr).await?;
            info!(listen = %listen, "plugin API listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        }
    }
}

async fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Waits for `signal`, then winds `driver` down.
///
/// Used as the server's shutdown future: graceful shutdown waits for open
/// responses, and a following read-back only ends once the driver stops it.
pub async fn shutdown_driver_on<F>(signal: F, driver: Arc<LogDriver>)
where
    F: Future<Output = ()>,
{
    signal.await;
    info!("stopping log driver");
    driver.shutdown().await;
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_socket_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        remove_stale_socket(&dir.path().join("absent.sock"))
            .await
            .expect("nothing to remove");
    }

    #[tokio::test]
    async fn stale_socket_file_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"").expect("create stale file");

        remove_stale_socket(&path).await.expect("remove");
        assert!(!path.exists());
    }
}
