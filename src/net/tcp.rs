mod connection;

pub use connection::handle_connection;

use crate::error::{SessionError, StartupError};
use crate::net::AppCtx;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn bind(addr: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr).await.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Accept loop. Every connection gets its own task; only ends if the task is dropped.
pub async fn serve(listener: TcpListener, app: Arc<AppCtx>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "client connected");

                let app = app.clone();
                tokio::spawn(async move {
                    let (read_half, write_half) = stream.into_split();
                    match handle_connection(read_half, write_half, Some(peer), app).await {
                        Ok(()) => {}
                        Err(SessionError::Handshake(e)) => {
                            tracing::info!(%peer, error = %e, "handshake rejected");
                        }
                        Err(SessionError::ConnectionLost(e)) => {
                            tracing::debug!(%peer, error = %e, "connection lost");
                        }
                        Err(e) => {
                            tracing::warn!(%peer, error = %e, "connection error");
                        }
                    }
                    tracing::info!(%peer, "client disconnected");
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to accept connection");
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}
