//! WebSocket route handler
//!
//! Upgrades the request and hands the socket to the hub's connection driver.
//! axum and tokio-tungstenite use distinct message types, so frames are
//! converted at the boundary.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{stream, SinkExt, StreamExt};
use nexus_services::serve_connection;
use tokio_tungstenite::tungstenite::Message as WireMessage;
use tracing::info;

use crate::AppState;

/// Create WebSocket routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    let max_frame_bytes = state.hub.config().max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();

    let sink = sender.with_flat_map(|msg: WireMessage| stream::iter(to_axum(msg).map(Ok)));
    let frames = receiver.map(|result| result.map(from_axum));

    serve_connection(state.hub.clone(), state.authenticator.clone(), sink, frames).await;
}

fn from_axum(msg: Message) -> WireMessage {
    match msg {
        Message::Text(text) => WireMessage::Text(text.to_string().into()),
        Message::Binary(data) => WireMessage::Binary(data.to_vec().into()),
        Message::Ping(data) => WireMessage::Ping(data.to_vec().into()),
        Message::Pong(data) => WireMessage::Pong(data.to_vec().into()),
        Message::Close(_) => WireMessage::Close(None),
    }
}

/// Raw frames have no axum counterpart and are dropped
fn to_axum(msg: WireMessage) -> Option<Message> {
    match msg {
        WireMessage::Text(text) => Some(Message::Text(text.to_string().into())),
        WireMessage::Binary(data) => Some(Message::Binary(Bytes::from(data.to_vec()))),
        WireMessage::Ping(data) => Some(Message::Ping(Bytes::from(data.to_vec()))),
        WireMessage::Pong(data) => Some(Message::Pong(Bytes::from(data.to_vec()))),
        WireMessage::Close(_) => Some(Message::Close(None)),
        WireMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frames_survive_conversion() {
        let wire = from_axum(Message::Text("hello".to_string().into()));
        assert!(matches!(&wire, WireMessage::Text(t) if t.as_str() == "hello"));

        match to_axum(wire) {
            Some(Message::Text(t)) => assert_eq!(t.as_str(), "hello"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_close_frames_map_to_plain_close() {
        assert!(matches!(from_axum(Message::Close(None)), WireMessage::Close(None)));
        assert!(matches!(to_axum(WireMessage::Close(None)), Some(Message::Close(None))));
    }
}
