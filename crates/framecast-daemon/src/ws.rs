//! WebSocket handler for frame streaming and viewer controls

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::control::{ControlChannel, ControlEvent, PointerInput};
use crate::session::{Readiness, Session};
use crate::state::AppState;

/// Server to viewer text messages; frames travel as binary messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "build_failed")]
    BuildFailed { error: String },
    #[serde(rename = "pong")]
    Pong,
}

/// Viewer to server messages
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ClientMessage {
    Pause,
    Resume,
    UserInteraction(PointerInput),
    ResetCam,
    Ping,
}

impl ClientMessage {
    fn parse(text: &str) -> Option<Self> {
        if text == "ping" {
            return Some(ClientMessage::Ping);
        }
        match serde_json::from_str(text) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed viewer message");
                None
            }
        }
    }

    fn into_control(self) -> Option<ControlEvent> {
        match self {
            ClientMessage::Pause => Some(ControlEvent::Pause),
            ClientMessage::Resume => Some(ControlEvent::Resume),
            ClientMessage::UserInteraction(input) => Some(ControlEvent::UserInteraction(input)),
            ClientMessage::ResetCam => Some(ControlEvent::ResetCam),
            ClientMessage::Ping => None,
        }
    }
}

/// Text message announcing a readiness change, if viewers care about it
fn readiness_message(readiness: &Readiness) -> Option<WsMessage> {
    match readiness {
        Readiness::Ready => Some(WsMessage::Ready),
        Readiness::Failed { error } => Some(WsMessage::BuildFailed {
            error: error.clone(),
        }),
        Readiness::Pending | Readiness::Terminated => None,
    }
}

fn to_text(msg: &WsMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            None
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    serve_viewer(state.session.clone(), sender, receiver).await;
}

/// Stream frames to one viewer and apply its controls until either side
/// goes away
async fn serve_viewer<S, R, E>(session: Arc<Session>, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut frames = session.subscribe();
    let mut readiness = session.watch_readiness();
    let mut control = ControlChannel::new(session.clone());

    info!(viewers = session.viewer_count(), "Viewer connected");

    // Announce current readiness, then show something right away. Real frames
    // only go out after `ready` was sent; a build finishing meanwhile is
    // picked up by the readiness branch below.
    let initial = readiness.borrow_and_update().clone();
    if initial == Readiness::Terminated {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }
    if let Some(msg) = readiness_message(&initial).as_ref().and_then(to_text) {
        if sender.send(msg).await.is_err() {
            return;
        }
    }
    let first = if initial.is_ready() {
        session.current_frame().await
    } else {
        session.placeholder()
    };
    if sender.send(Message::Binary(first)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            // Readiness first, so `ready` always precedes the first real frame
            biased;

            changed = readiness.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = readiness.borrow_and_update().clone();
                if current == Readiness::Terminated {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                if let Some(msg) = readiness_message(&current).as_ref().and_then(to_text) {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }

            frame = frames.recv() => {
                match frame {
                    Ok(bytes) => {
                        if sender.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Viewer lagging, frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        let Some(msg) = ClientMessage::parse(text.as_str()) else {
                            continue;
                        };
                        match msg.into_control() {
                            Some(event) => {
                                let outcome = control.handle(event).await;
                                debug!(?event, ?outcome, "Control event handled");
                            }
                            None => {
                                if let Some(pong) = to_text(&WsMessage::Pong) {
                                    if sender.send(pong).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    drop(frames);
    info!(viewers = session.viewer_count(), "Viewer disconnected");
}
