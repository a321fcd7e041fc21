//! Per-connection admin console protocol handler.
//!
//! Each upgraded socket runs one handler with a three-state lifecycle:
//! `Unauthenticated -> Authenticated -> Closed`. The first inbound text
//! frame must be a credential frame; anything else closes the connection
//! before any state is exposed. Once authenticated, the handler is a dumb
//! relay: inbound text goes verbatim to the event loop's command dispatch,
//! outbound text drains from the queue the loop pushes broadcasts into.
//!
//! Ping/pong, close handshakes and fragment reassembly are transport
//! concerns handled by `tokio-tungstenite`; text frames arrive here whole.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use admon_protocol::{AdminCommand, AdminMessage};

use crate::admin::AdminHandle;
use crate::config::Credentials;

/// What the unauthenticated phase decided.
enum AuthOutcome {
    /// Valid credential frame received
    Authenticated,

    /// Invalid credentials or a non-credential first message
    Rejected,

    /// Peer went away before authenticating
    Disconnected,
}

/// Protocol handler for a single console connection.
pub struct ConnectionHandler {
    ws: WebSocketStream<TcpStream>,
    admin: AdminHandle,
    credentials: Arc<Credentials>,
    connection_number: u64,
}

impl ConnectionHandler {
    /// Creates a handler for an upgraded socket.
    pub fn new(
        ws: WebSocketStream<TcpStream>,
        admin: AdminHandle,
        credentials: Arc<Credentials>,
        connection_number: u64,
    ) -> Self {
        Self {
            ws,
            admin,
            credentials,
            connection_number,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, "Console connected");

        match self.authenticate().await {
            AuthOutcome::Authenticated => {}
            AuthOutcome::Rejected => {
                let _ = self.ws.close(None).await;
                return;
            }
            AuthOutcome::Disconnected => return,
        }

        let Ok((session_id, outbound)) = self.admin.attach().await else {
            warn!(
                connection = self.connection_number,
                "Admin loop unavailable, dropping console"
            );
            let _ = self.ws.close(None).await;
            return;
        };

        info!(
            connection = self.connection_number,
            session_id, "Console authenticated"
        );

        self.relay(session_id, outbound).await;

        let _ = self.admin.detach(session_id).await;
        let _ = self.ws.close(None).await;
        info!(session_id, "Console disconnected");
    }

    /// Unauthenticated phase: the first text frame decides everything.
    ///
    /// Invalid credentials get one generic failure message, deliberately
    /// silent about which half was wrong. Any non-credential text or binary
    /// frame closes the connection immediately with no message at all.
    async fn authenticate(&mut self) -> AuthOutcome {
        while let Some(frame) = self.ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return match AdminCommand::parse(text.as_str()) {
                        AdminCommand::Auth { username, secret }
                            if self.credentials.verify(&username, &secret) =>
                        {
                            AuthOutcome::Authenticated
                        }
                        AdminCommand::Auth { username, .. } => {
                            warn!(
                                connection = self.connection_number,
                                username = %username,
                                "Console authentication failed"
                            );
                            self.send_error("authentication failed").await;
                            AuthOutcome::Rejected
                        }
                        _ => {
                            warn!(
                                connection = self.connection_number,
                                "Message before authentication, closing"
                            );
                            AuthOutcome::Rejected
                        }
                    };
                }
                Ok(Message::Binary(_)) => {
                    warn!(
                        connection = self.connection_number,
                        "Binary frame before authentication, closing"
                    );
                    return AuthOutcome::Rejected;
                }
                Ok(Message::Close(_)) => return AuthOutcome::Disconnected,
                // Ping/pong are answered by the transport layer
                Ok(_) => continue,
                Err(e) => {
                    debug!(
                        connection = self.connection_number,
                        error = %e,
                        "Connection error before authentication"
                    );
                    return AuthOutcome::Disconnected;
                }
            }
        }

        AuthOutcome::Disconnected
    }

    /// Authenticated phase: relay inbound commands and outbound broadcasts
    /// until either side goes away.
    async fn relay(
        &mut self,
        session_id: u64,
        mut outbound: tokio::sync::mpsc::UnboundedReceiver<String>,
    ) {
        loop {
            tokio::select! {
                frame = self.ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        // Forwarded verbatim; the loop parses and logs
                        // anything it does not recognize.
                        if self.admin.update(session_id, text.as_str()).await.is_err() {
                            debug!(session_id, "Admin loop gone, closing console");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary after auth carries no commands; ping/pong are
                    // transport traffic.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session_id, error = %e, "Console read error");
                        break;
                    }
                },

                msg = outbound.recv() => match msg {
                    Some(text) => {
                        if let Err(e) = self.ws.send(Message::text(text)).await {
                            debug!(session_id, error = %e, "Console write error");
                            break;
                        }
                    }
                    // Event loop dropped our queue
                    None => break,
                },
            }
        }
    }

    async fn send_error(&mut self, message: &str) {
        if let Ok(text) = serde_json::to_string(&AdminMessage::error(message)) {
            let _ = self.ws.send(Message::text(text)).await;
        }
    }
}
