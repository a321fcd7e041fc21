//! WebSocket console server.
//!
//! The server:
//! - Listens on a TCP address for admin console connections
//! - Accepts the HTTP upgrade only on the admin endpoint path
//! - Spawns a ConnectionHandler for each upgraded socket
//! - Supports graceful shutdown via CancellationToken
//!
//! Framing, ping/pong and close handshakes belong to `tokio-tungstenite`;
//! this module only decides whether an upgrade is acceptable and hands the
//! stream to the per-connection handler.

mod connection;

pub use connection::ConnectionHandler;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::admin::AdminHandle;
use crate::config::Credentials;

/// Upgrade path served by the admin console endpoint.
pub const ADMIN_ENDPOINT: &str = "/adminws";

/// Static check consumed by the upgrade acceptance callback: only the admin
/// endpoint may be upgraded, everything else gets a plain HTTP error.
pub fn accepts_upgrade(path: &str) -> bool {
    path == ADMIN_ENDPOINT
}

/// WebSocket console server.
pub struct AdminServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    admin: AdminHandle,
    credentials: Arc<Credentials>,
    cancel_token: CancellationToken,
    connection_counter: AtomicU64,
}

impl AdminServer {
    /// Binds the console listener.
    pub async fn bind(
        addr: &str,
        admin: AdminHandle,
        credentials: Credentials,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;

        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            admin,
            credentials: Arc::new(credentials),
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the cancellation token fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, endpoint = ADMIN_ENDPOINT, "Admin console server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Console server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.handle_connection(stream, peer),
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Keep accepting other connections
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Upgrades one TCP stream and spawns its handler task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let connection_number = self.connection_counter.fetch_add(1, Ordering::Relaxed);
        let admin = self.admin.clone();
        let credentials = Arc::clone(&self.credentials);

        tokio::spawn(async move {
            let callback = |request: &Request, response: Response| {
                let path = request.uri().path();
                if accepts_upgrade(path) {
                    Ok(response)
                } else {
                    debug!(%peer, path, "Rejected upgrade outside admin endpoint");
                    let mut reject = ErrorResponse::new(Some("not found".to_string()));
                    *reject.status_mut() = StatusCode::NOT_FOUND;
                    Err(reject)
                }
            };

            match accept_hdr_async(stream, callback).await {
                Ok(ws) => {
                    ConnectionHandler::new(ws, admin, credentials, connection_number)
                        .run()
                        .await;
                }
                Err(e) => {
                    debug!(%peer, error = %e, "WebSocket upgrade failed");
                }
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind console listener on {addr}: {error}")]
    Bind { addr: String, error: String },
}
