//! Per-connection handler: decode, dispatch, reply.
//!
//! The handler owns both directions of one socket. Inbound frames are
//! decoded into [`ClientMessage`] and dispatched to the engine; the
//! outbound half is a task draining the connection's message channel.
//! The engine addresses replies and broadcasts by connection id, so the
//! handler never decides who hears what — it only ships frames.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use wordweave_engine::{Engine, EngineError, WordProvider};
use wordweave_protocol::{ClientMessage, ConnectionId, ServerMessage};
use wordweave_store::SnapshotStore;

pub(crate) async fn handle_connection<S: SnapshotStore, P: WordProvider>(
    ws: WebSocketStream<TcpStream>,
    engine: Engine<S, P>,
) {
    let (connection, mut outbound) = engine.clients().connect().await;
    debug!(%connection, "connection open");

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Outbound pump. Ends when the engine drops the sender (disconnect)
    // or the socket rejects a write.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    debug!(%connection, error = %e, "failed to encode message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        let bytes = match frame {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue, // ping/pong handled by tungstenite
        };

        let message: ClientMessage = match serde_json::from_slice(&bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(%connection, error = %e, "undecodable frame");
                engine
                    .clients()
                    .send(
                        connection,
                        ServerMessage::Error {
                            message: "could not understand that message"
                                .to_string(),
                        },
                    )
                    .await;
                continue;
            }
        };

        trace!(%connection, ?message, "dispatching");
        dispatch(&engine, connection, message).await;
    }

    // Socket gone: treat as a leave and tear the channel down.
    engine.disconnect(connection).await;
    writer.abort();
    debug!(%connection, "connection closed");
}

/// Routes one decoded message to the engine. Failures go back to the
/// sender only; which failure variant depends on what they were doing.
async fn dispatch<S: SnapshotStore, P: WordProvider>(
    engine: &Engine<S, P>,
    connection: ConnectionId,
    message: ClientMessage,
) {
    let result: Result<(), EngineError> = match message {
        ClientMessage::CreateSession {
            name,
            bots,
            seconds_per_phase,
        } => {
            let result = engine
                .create_session(connection, &name, bots, seconds_per_phase)
                .await;
            if let Err(e) = result {
                engine
                    .clients()
                    .send(
                        connection,
                        ServerMessage::CreateFailed {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
            return;
        }
        ClientMessage::JoinSession { code, name } => {
            let result = engine.join_session(connection, &code, &name).await;
            if let Err(e) = result {
                engine
                    .clients()
                    .send(
                        connection,
                        ServerMessage::JoinFailed {
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
            return;
        }
        ClientMessage::StartSession => engine.start_session(connection).await,
        ClientMessage::SubmitWord { word } => {
            engine.submit_word(connection, &word).await
        }
        ClientMessage::Vote { sentence } => {
            engine.vote(connection, sentence).await
        }
        ClientMessage::LeaveSession => engine.leave_session(connection).await,
        ClientMessage::RemovePlayer { player } => {
            engine.remove_player(connection, player).await
        }
        ClientMessage::RejoinSession { session, player } => {
            engine.rejoin_session(connection, session, player).await
        }
        ClientMessage::CancelSession => {
            engine.cancel_session(connection).await
        }
    };

    if let Err(e) = result {
        engine
            .clients()
            .send(
                connection,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
    }
}
