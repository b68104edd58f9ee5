//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameCommand;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

type WsSink = futures::stream::SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Where a parsed client message goes
#[derive(Debug)]
enum Dispatch {
    /// Answered by the connection itself
    Reply(ServerMsg),
    /// Forwarded to the tick loop
    Command(GameCommand),
}

fn dispatch(id: Uuid, msg: ClientMsg) -> Dispatch {
    match msg.sanitized() {
        ClientMsg::Ping(payload) => Dispatch::Reply(ServerMsg::Pong(payload)),
        ClientMsg::Update(input) => Dispatch::Command(GameCommand::Input { id, input }),
        ClientMsg::Chat(message) => Dispatch::Command(GameCommand::Chat { id, message }),
        ClientMsg::Name(name) => Dispatch::Command(GameCommand::Rename { id, name }),
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    info!(player_id = %id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Subscribe before connecting so our own join is not missed
    let broadcast_rx = state.arena.subscribe();
    let (direct_tx, direct_rx) = mpsc::unbounded_channel();
    let command_tx = state.arena.command_tx.clone();

    let connect = GameCommand::Connect {
        id,
        outbound: direct_tx.clone(),
    };
    if command_tx.send(connect).await.is_err() {
        error!(player_id = %id, "Arena loop is gone, dropping connection");
        return;
    }

    let writer_handle = tokio::spawn(run_writer(id, ws_sink, direct_rx, broadcast_rx));

    let rate_limiter = ConnectionRateLimiter::new();
    let mut ws_stream = ws_stream;

    // Reader loop: WebSocket -> direct reply or tick loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_inbound() {
                    debug!(player_id = %id, "Rate limited inbound message");
                    continue;
                }

                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(player_id = %id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                match dispatch(id, msg) {
                    Dispatch::Reply(reply) => {
                        let _ = direct_tx.send(reply);
                    }
                    Dispatch::Command(command) => {
                        if command_tx.send(command).await.is_err() {
                            debug!(player_id = %id, "Command channel closed");
                            break;
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(player_id = %id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(player_id = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    let _ = command_tx.send(GameCommand::Disconnect { id }).await;
    writer_handle.abort();

    info!(player_id = %id, "WebSocket connection closed");
}

/// Forward direct replies and broadcasts to the socket
async fn run_writer(
    id: Uuid,
    mut ws_sink: WsSink,
    mut direct_rx: mpsc::UnboundedReceiver<ServerMsg>,
    mut broadcast_rx: broadcast::Receiver<ServerMsg>,
) {
    loop {
        let msg = tokio::select! {
            // Welcome bundle must precede anything broadcast after it
            biased;
            direct = direct_rx.recv() => match direct {
                Some(msg) => msg,
                None => break,
            },
            shared = broadcast_rx.recv() => match shared {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(player_id = %id, lagged_count = n, "Client lagged, skipping messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %id, "Broadcast channel closed");
                    break;
                }
            },
        };

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{MoveInput, MAX_NAME_LEN};
    use serde_json::json;

    #[test]
    fn test_ping_is_answered_locally() {
        let id = Uuid::new_v4();
        let Dispatch::Reply(reply) = dispatch(id, ClientMsg::Ping(json!({"t": 5}))) else {
            panic!("expected reply");
        };
        assert_eq!(reply, ServerMsg::Pong(json!({"t": 5})));
    }

    #[test]
    fn test_gameplay_messages_become_commands() {
        let id = Uuid::new_v4();
        assert!(matches!(
            dispatch(id, ClientMsg::Update(MoveInput::Keys(vec![0]))),
            Dispatch::Command(GameCommand::Input { id: got, .. }) if got == id
        ));
        assert!(matches!(
            dispatch(id, ClientMsg::Chat("hi".into())),
            Dispatch::Command(GameCommand::Chat { message, .. }) if message == "hi"
        ));

        let long = "n".repeat(MAX_NAME_LEN + 10);
        let Dispatch::Command(GameCommand::Rename { name, .. }) = dispatch(id, ClientMsg::Name(long))
        else {
            panic!("expected rename");
        };
        assert_eq!(name.len(), MAX_NAME_LEN);
    }
}
