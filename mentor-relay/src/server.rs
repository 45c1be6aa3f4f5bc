use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tracing::{error, info};

use crate::connection::handle_connection;
use crate::state::RelayState;

/// Accept WebSocket connections until `shutdown` resolves.
///
/// Each connection runs on its own task; connections already accepted keep
/// running after the accept loop stops.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RelayState>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(online = state.online_users().len(), "Relay stopped accepting connections");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        info!(peer = %peer_addr, "New connection");
                        let state = state.clone();
                        tokio::spawn(async move {
                            match accept_async(stream).await {
                                Ok(ws_stream) => handle_connection(ws_stream, state).await,
                                Err(e) => {
                                    error!(peer = %peer_addr, error = %e, "WebSocket handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
}
