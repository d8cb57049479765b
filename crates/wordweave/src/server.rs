//! WebSocket server loop.
//!
//! One accept loop; each accepted socket gets its own handler task. The
//! server owns nothing but the listener and a cloneable engine handle —
//! all game state lives behind the engine's store.

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use wordweave_engine::{Engine, WordProvider};
use wordweave_store::SnapshotStore;

use crate::conn::handle_connection;
use crate::ServerError;

pub struct WordweaveServer<S, P> {
    listener: TcpListener,
    engine: Engine<S, P>,
}

impl<S: SnapshotStore, P: WordProvider> WordweaveServer<S, P> {
    /// Binds the listener. `addr` may use port 0 for an ephemeral port
    /// (the tests do).
    pub async fn bind(
        addr: &str,
        engine: Engine<S, P>,
    ) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        info!(addr, "wordweave server listening");
        Ok(Self { listener, engine })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        let ws = match tokio_tungstenite::accept_async(stream)
                            .await
                        {
                            Ok(ws) => ws,
                            Err(e) => {
                                debug!(%addr, error = %e, "websocket handshake failed");
                                return;
                            }
                        };
                        handle_connection(ws, engine).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}
