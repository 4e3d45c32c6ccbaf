//! WebSocket transport.
//!
//! Splits an upgraded socket into a reader that feeds the [`Dispatcher`] and a
//! writer task that owns the sink and drains the connection's outbound queue,
//! each frame bounded by the write deadline.

use crate::dispatcher::Dispatcher;
use crate::domain::timestamp::millis;
use crate::registry::ConnectionHandle;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::{future, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("socket error: {0}")]
    Socket(String),

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Serve one upgraded socket until either side closes it.
pub async fn handle_socket(socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let config = dispatcher.config();
    let write_timeout = config.protocol.write_timeout;
    let (handle, outbound) = ConnectionHandle::channel(config.server.outbound_queue);

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_frames(sink, outbound, handle.clone(), write_timeout));

    dispatcher.serve_connection(text_frames(stream), handle).await;

    if let Err(e) = writer.await {
        warn!(error = %e, "Writer task failed");
    }
}

/// Text payloads of inbound messages. Binary frames are accepted if they hold
/// UTF-8; control frames are skipped; a close frame ends the stream.
fn text_frames(stream: SplitStream<WebSocket>) -> BoxStream<'static, Result<String, FrameError>> {
    stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => Some(String::from_utf8(data).map_err(|_| FrameError::NotUtf8)),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
                Err(e) => Some(Err(FrameError::Socket(e.to_string()))),
            })
        })
        .boxed()
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    handle: ConnectionHandle,
    write_timeout: Duration,
) {
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if !write_one(&mut sink, frame, write_timeout, &handle).await {
                    handle.close();
                    return;
                }
            }
            _ = handle.closed() => break,
        }
    }

    // Flush what was queued before the close, e.g. a final error frame.
    while let Ok(frame) = outbound.try_recv() {
        if !write_one(&mut sink, frame, write_timeout, &handle).await {
            return;
        }
    }
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(connection_id = %handle.id(), error = %e, "Close frame not sent");
    }
}

async fn write_one(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: String,
    write_timeout: Duration,
    handle: &ConnectionHandle,
) -> bool {
    match tokio::time::timeout(write_timeout, sink.send(Message::Text(frame))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(connection_id = %handle.id(), error = %e, "Error writing frame");
            false
        }
        Err(_) => {
            warn!(
                connection_id = %handle.id(),
                timeout_ms = millis(write_timeout),
                "Write deadline exceeded, closing connection"
            );
            false
        }
    }
}
