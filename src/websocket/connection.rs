//! Socket ownership for one WebSocket session.
//!
//! A [`Connection`] is produced only by a successful handshake. It can be used
//! directly or split into a [`ConnectionReader`] for the single consumer of
//! inbound messages and a cloneable [`ConnectionWriter`] whose internal mutex
//! keeps outbound messages from interleaving.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::network::{CONNECTION_TIMEOUT, HANDSHAKE_TIMEOUT, INTRA_FRAME_TIMEOUT};
use crate::websocket::error::{WebSocketError, WsResult};
use crate::websocket::frame::OpCode;
use crate::websocket::handshake::{self, HandshakeTarget};
use crate::websocket::reader::{FrameReader, MessageReader, DEFAULT_MAX_MESSAGE_SIZE};
use crate::websocket::writer::{MessageWriter, DEFAULT_BUFFER_CAPACITY};

/// Any bidirectional byte stream a connection can run over
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Type-erased TCP or TLS stream
pub type BoxedStream = Box<dyn AsyncStream>;

type InboundSource = BufReader<ReadHalf<BoxedStream>>;
type OutboundSink = WriteHalf<BoxedStream>;

/// Inbound message borrowed from a [`ConnectionReader`]
pub type InboundMessage<'a> = MessageReader<'a, InboundSource>;

/// Outbound message holding the connection's write lock until closed or dropped
pub type OutboundMessage = MessageWriter<OwnedMutexGuard<OutboundSink>>;

/// Transport settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Time allowed for the TCP connect
    pub connect_timeout: Duration,
    /// Time allowed for TLS negotiation plus the HTTP upgrade
    pub handshake_timeout: Duration,
    /// Per-read timeout once a message has started. `None` waits forever.
    pub intra_frame_timeout: Option<Duration>,
    /// Payload bytes buffered per outbound frame
    pub write_buffer_capacity: usize,
    /// Upper bound for a reassembled inbound message
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECTION_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            intra_frame_timeout: Some(INTRA_FRAME_TIMEOUT),
            write_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// An established WebSocket session
pub struct Connection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl Connection {
    /// Connect over TCP (and TLS for `wss`) and perform the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported URL, a failed or timed-out connect,
    /// a TLS failure, or any handshake rejection. No connection exists afterwards.
    pub async fn connect(url: &str, config: &ConnectionConfig) -> WsResult<Self> {
        let target = HandshakeTarget::parse(url)?;

        let tcp = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await?
        .map_err(|e| {
            WebSocketError::ConnectionFailed(format!("{}:{}: {}", target.host, target.port, e))
        })?;
        tcp.set_nodelay(true)?;

        tokio::time::timeout(config.handshake_timeout, async {
            let stream = wrap_stream(&target, tcp).await?;
            Self::upgrade(&target, stream, config).await
        })
        .await?
    }

    /// Perform the handshake over a stream the caller has already connected.
    ///
    /// `url` supplies the `Host` header and request path; its scheme only needs
    /// to be `ws` or `wss`.
    pub async fn handshake<S>(url: &str, stream: S, config: &ConnectionConfig) -> WsResult<Self>
    where
        S: AsyncStream + 'static,
    {
        let target = HandshakeTarget::parse(url)?;
        tokio::time::timeout(
            config.handshake_timeout,
            Self::upgrade(&target, Box::new(stream), config),
        )
        .await?
    }

    async fn upgrade(
        target: &HandshakeTarget,
        stream: BoxedStream,
        config: &ConnectionConfig,
    ) -> WsResult<Self> {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut source = BufReader::new(read_half);
        handshake::perform(&mut source, &mut write_half, target).await?;

        let mut frames = FrameReader::new(source);
        frames.set_read_timeout(config.intra_frame_timeout);
        frames.set_max_message_size(config.max_message_size);

        Ok(Self {
            reader: ConnectionReader { frames },
            writer: ConnectionWriter {
                sink: Arc::new(Mutex::new(write_half)),
                capacity: config.write_buffer_capacity,
            },
        })
    }

    /// See [`ConnectionReader::next_message`].
    pub async fn next_message(
        &mut self,
        initial_timeout: Option<Duration>,
    ) -> WsResult<Option<InboundMessage<'_>>> {
        self.reader.next_message(initial_timeout).await
    }

    /// See [`ConnectionWriter::open_message`].
    pub async fn open_message(
        &self,
        flags: u8,
        opcode: OpCode,
        masked: bool,
    ) -> WsResult<OutboundMessage> {
        self.writer.open_message(flags, opcode, masked).await
    }

    /// Shut the socket down without a closing handshake.
    pub async fn close(self) -> WsResult<()> {
        self.writer.close().await
    }

    /// Separate the inbound and outbound halves.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

/// Inbound half of a [`Connection`]
pub struct ConnectionReader {
    frames: FrameReader<InboundSource>,
}

impl ConnectionReader {
    /// Wait up to `initial_timeout` for the next message.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. Once a message has
    /// started, reads are bounded by the intra-frame timeout instead.
    pub async fn next_message(
        &mut self,
        initial_timeout: Option<Duration>,
    ) -> WsResult<Option<InboundMessage<'_>>> {
        if !self.frames.wait_for_data(initial_timeout).await? {
            return Ok(None);
        }
        self.frames.next_message().await.map(Some)
    }
}

/// Outbound half of a [`Connection`]
#[derive(Clone)]
pub struct ConnectionWriter {
    sink: Arc<Mutex<OutboundSink>>,
    capacity: usize,
}

impl ConnectionWriter {
    /// Lock the output and start a message. Other writers wait until it is closed or dropped.
    pub async fn open_message(
        &self,
        flags: u8,
        opcode: OpCode,
        masked: bool,
    ) -> WsResult<OutboundMessage> {
        let guard = Arc::clone(&self.sink).lock_owned().await;
        MessageWriter::new(guard, flags, opcode, masked, self.capacity)
    }

    /// Send a complete message in one call.
    pub async fn send(&self, opcode: OpCode, masked: bool, payload: &[u8]) -> WsResult<()> {
        let mut message = self.open_message(0, opcode, masked).await?;
        message.write(payload).await?;
        message.close().await
    }

    /// Shut down the write side of the socket.
    pub async fn close(&self) -> WsResult<()> {
        self.sink.lock().await.shutdown().await?;
        Ok(())
    }
}

#[cfg(feature = "tls")]
async fn wrap_stream(target: &HandshakeTarget, tcp: TcpStream) -> WsResult<BoxedStream> {
    if !target.secure {
        return Ok(Box::new(tcp));
    }
    let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
    let tls = connector.connect(&target.host, tcp).await?;
    Ok(Box::new(tls))
}

#[cfg(not(feature = "tls"))]
async fn wrap_stream(target: &HandshakeTarget, tcp: TcpStream) -> WsResult<BoxedStream> {
    if target.secure {
        return Err(WebSocketError::UnsupportedScheme(
            "wss (built without the `tls` feature)".to_string(),
        ));
    }
    Ok(Box::new(tcp))
}
