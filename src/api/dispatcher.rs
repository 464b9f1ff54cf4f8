//! The per-connection pump.
//!
//! One task per connection reads every inbound message, answers pings, sends
//! keepalive pings when the link has been idle, and tears the session down
//! when the socket fails or the client asks it to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::api::client::Shared;
use crate::api::error::ApiError;
use crate::websocket::error::WsResult;
use crate::websocket::{ConnectionReader, ConnectionWriter, OpCode};

/// Owns the inbound half of a connection for its whole life
pub(crate) struct Dispatcher {
    reader: ConnectionReader,
    writer: ConnectionWriter,
    shared: Arc<Shared>,
    keepalive: Duration,
    mask: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        reader: ConnectionReader,
        writer: ConnectionWriter,
        shared: Arc<Shared>,
        keepalive: Duration,
        mask: bool,
    ) -> Self {
        Self {
            reader,
            writer,
            shared,
            keepalive,
            mask,
        }
    }

    /// Pump messages until the connection fails or `shutdown` fires (or its
    /// sender is dropped), then fail outstanding requests and report the loss.
    pub(crate) async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let Dispatcher {
            mut reader,
            writer,
            shared,
            keepalive,
            mask,
        } = self;

        let outcome = pump(&mut reader, &writer, &shared, keepalive, mask, &mut shutdown).await;

        // No closing handshake: the socket is just shut down.
        if let Err(e) = writer.close().await {
            tracing::debug!("Socket shutdown failed: {}", e);
        }
        drop(reader);

        let cause = outcome.err().map(ApiError::from);
        match &cause {
            Some(e) => tracing::error!("Connection lost: {}", e),
            None => tracing::info!("Disconnected"),
        }
        shared.finish(cause);
    }
}

async fn pump(
    reader: &mut ConnectionReader,
    writer: &ConnectionWriter,
    shared: &Shared,
    keepalive: Duration,
    mask: bool,
    shutdown: &mut oneshot::Receiver<()>,
) -> WsResult<()> {
    let mut payload = Vec::new();
    loop {
        let wait = shared.keepalive_remaining(keepalive);
        if wait.is_zero() {
            tracing::debug!("Idle for {:?}, sending keepalive ping", keepalive);
            writer.send(OpCode::Ping, mask, &[]).await?;
            shared.touch();
            continue;
        }

        let next = tokio::select! {
            biased;
            _ = &mut *shutdown => return Ok(()),
            next = reader.next_message(Some(wait)) => next?,
        };
        let Some(mut message) = next else {
            continue;
        };
        shared.touch();

        match message.opcode() {
            OpCode::Text => {
                payload.clear();
                message.read_to_end(&mut payload).await?;
                shared.handler.handle_text(&payload);
            }
            OpCode::Ping => {
                payload.clear();
                message.read_to_end(&mut payload).await?;
                writer.send(OpCode::Pong, mask, &payload).await?;
            }
            opcode => {
                tracing::debug!("Ignoring {:?} message", opcode);
                message.close().await?;
            }
        }
    }
}
