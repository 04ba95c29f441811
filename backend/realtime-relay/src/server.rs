use actix_web::dev::Server;
use std::future::Future;
use tokio::signal;

use crate::websocket::SessionRegistry;

/// Drive `server` until it exits on its own or `shutdown` resolves.
///
/// On shutdown, sessions are closed through the registry first so every
/// client gets a close frame; only then does the server stop accepting and
/// drain its workers.
pub async fn run_until<F>(
    server: Server,
    registry: SessionRegistry,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);

    tokio::select! {
        res = &mut server_task => {
            registry.shutdown();
            return flatten(res);
        }
        _ = shutdown => {}
    }

    registry.shutdown();
    handle.stop(true).await;
    flatten(server_task.await)
}

fn flatten(res: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    res.map_err(std::io::Error::other)?
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
