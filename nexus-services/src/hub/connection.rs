//! Connection driver
//!
//! Takes one transport through `Connecting -> Registered -> Unregistering ->
//! Closed`. The first text frame must authenticate the client; after that an
//! inbound pump enforces liveness and frame limits while an outbound pump
//! drains the connection's queue and sends pings. Whichever pump stops first
//! tears the other down.

use std::fmt::Display;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use nexus_core::{ClientMessage, ConnectedPayload, ConnectionPhase, ServerEvent};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{ConnectionId, Hub, HubConfig, Registration};
use crate::auth::Authenticator;

/// Drive one connection until it closes
pub async fn serve_connection<Tx, Rx, TxErr, RxErr>(
    hub: Arc<Hub>,
    authenticator: Arc<dyn Authenticator>,
    mut sink: Tx,
    mut stream: Rx,
) where
    Tx: Sink<Message, Error = TxErr> + Unpin + Send,
    Rx: Stream<Item = Result<Message, RxErr>> + Unpin + Send,
    TxErr: Display,
    RxErr: Display,
{
    let config = hub.config().clone();
    debug!("Connection phase: {:?}", ConnectionPhase::Connecting);

    let user_id = match authenticate(&mut stream, authenticator.as_ref(), &config).await {
        Ok(user_id) => user_id,
        Err(reason) => {
            warn!("Rejected connection: {}", reason);
            close(&mut sink, &config).await;
            return;
        }
    };

    let Registration {
        connection_id,
        mut queue,
    } = match hub.register(user_id.clone()) {
        Ok(registration) => registration,
        Err(e) => {
            info!("Refusing connection for {}: {}", user_id, e);
            close(&mut sink, &config).await;
            return;
        }
    };
    debug!(
        "Connection {} phase: {:?}",
        connection_id,
        ConnectionPhase::Registered
    );

    match ConnectedPayload::new(user_id.clone()) {
        Ok(payload) => {
            hub.send_to_connection(connection_id, &ServerEvent::Connected(payload));
        }
        Err(e) => warn!("Skipping greeting for {}: {}", connection_id, e),
    }

    let outcome = tokio::select! {
        result = inbound(&mut stream, connection_id, &config) => ("inbound", result),
        result = outbound(&mut sink, &mut queue, connection_id, &config) => ("outbound", result),
    };
    match outcome {
        (side, Ok(())) => debug!("Connection {} {} pump finished", connection_id, side),
        (side, Err(reason)) => info!("Connection {} {} pump failed: {}", connection_id, side, reason),
    }

    debug!(
        "Connection {} phase: {:?}",
        connection_id,
        ConnectionPhase::Unregistering
    );
    hub.unregister(connection_id);
    close(&mut sink, &config).await;
    info!(
        "Connection {} for user {} phase: {:?}",
        connection_id,
        user_id,
        ConnectionPhase::Closed
    );
}

/// Wait for the auth frame and resolve it to a user id
async fn authenticate<Rx, E>(
    stream: &mut Rx,
    authenticator: &dyn Authenticator,
    config: &HubConfig,
) -> Result<String, String>
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let deadline = Instant::now() + config.auth_timeout;
    loop {
        let frame = match time::timeout_at(deadline, stream.next()).await {
            Err(_) => return Err("no auth frame before deadline".to_string()),
            Ok(None) => return Err("closed before authenticating".to_string()),
            Ok(Some(Err(e))) => return Err(format!("read error: {}", e)),
            Ok(Some(Ok(frame))) => frame,
        };
        if frame.len() > config.max_frame_bytes {
            return Err(format!("auth frame too large ({} bytes)", frame.len()));
        }

        match frame {
            Message::Text(text) => {
                let ClientMessage::Auth { token } = serde_json::from_str(text.as_str())
                    .map_err(|e| format!("invalid auth frame: {}", e))?;
                return authenticator
                    .authenticate(&token)
                    .await
                    .map_err(|e| e.to_string());
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return Err("closed before authenticating".to_string()),
            Message::Binary(_) | Message::Frame(_) => {
                return Err("expected a text auth frame".to_string())
            }
        }
    }
}

/// Read until close, error, oversized frame or liveness timeout
async fn inbound<Rx, E>(
    stream: &mut Rx,
    connection_id: ConnectionId,
    config: &HubConfig,
) -> Result<(), String>
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + config.read_deadline;
    loop {
        let frame = match time::timeout_at(deadline, stream.next()).await {
            Err(_) => return Err("read deadline exceeded".to_string()),
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(format!("read error: {}", e)),
            Ok(Some(Ok(frame))) => frame,
        };
        if frame.len() > config.max_frame_bytes {
            return Err(format!("frame too large ({} bytes)", frame.len()));
        }

        match frame {
            Message::Pong(_) => {
                deadline = Instant::now() + config.read_deadline;
            }
            Message::Close(_) => {
                debug!("Received close from {}", connection_id);
                return Ok(());
            }
            Message::Text(text) => {
                debug!("Ignoring text frame from {}: {}", connection_id, text.as_str());
            }
            Message::Ping(_) => {
                // answered by the transport
                debug!("Received ping from {}", connection_id);
            }
            Message::Binary(_) | Message::Frame(_) => {
                debug!("Ignoring non-text frame from {}", connection_id);
            }
        }
    }
}

/// Drain the queue and keep the peer alive with pings
async fn outbound<Tx, E>(
    sink: &mut Tx,
    queue: &mut mpsc::Receiver<Message>,
    connection_id: ConnectionId,
    config: &HubConfig,
) -> Result<(), String>
where
    Tx: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut ping = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(frame) => write(sink, frame, config).await?,
                None => {
                    debug!("Queue closed for {}, sending close frame", connection_id);
                    write(sink, Message::Close(None), config).await?;
                    return Ok(());
                }
            },
            _ = ping.tick() => {
                write(sink, Message::Ping(Default::default()), config).await?;
            }
        }
    }
}

async fn write<Tx, E>(sink: &mut Tx, frame: Message, config: &HubConfig) -> Result<(), String>
where
    Tx: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    match time::timeout(config.write_deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("write error: {}", e)),
        Err(_) => Err("write deadline exceeded".to_string()),
    }
}

async fn close<Tx, E>(sink: &mut Tx, config: &HubConfig)
where
    Tx: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    if let Ok(Err(e)) = time::timeout(config.write_deadline, sink.close()).await {
        debug!("Error closing transport: {}", e);
    }
}
