//! Inbound frame parsing and message reassembly.
//!
//! A [`FrameReader`] turns a buffered byte stream into a sequence of logical
//! messages. Each message is exposed as a [`MessageReader`] that pulls payload
//! bytes lazily across continuation frames. Whatever a caller leaves unread is
//! skipped before the next message is parsed, so the stream always stays
//! frame-aligned.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::websocket::error::{WebSocketError, WsResult};
use crate::websocket::frame::{apply_mask, FrameHeader, OpCode};

/// Default upper bound for [`MessageReader::read_to_end`].
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 4096;

/// Position inside the frame currently being consumed
#[derive(Debug, Default, Clone, Copy)]
struct FrameState {
    in_message: bool,
    fin: bool,
    remaining: u64,
    position: u64,
    mask: Option<[u8; 4]>,
}

impl FrameState {
    fn begin(header: &FrameHeader) -> Self {
        Self {
            in_message: true,
            fin: header.fin,
            remaining: header.payload_len,
            position: 0,
            mask: header.mask,
        }
    }
}

/// Parses frames from a buffered byte source
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    read_timeout: Option<Duration>,
    max_message_size: usize,
    frame: FrameState,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    /// Wrap a buffered source positioned at a frame boundary.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            read_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            frame: FrameState::default(),
        }
    }

    /// Bound every underlying read once a message has started. `None` waits forever.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Limit applied by [`MessageReader::read_to_end`].
    pub fn set_max_message_size(&mut self, limit: usize) {
        self.max_message_size = limit;
    }

    /// Get a reference to the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Get a mutable reference to the underlying source.
    ///
    /// Reading from it directly will desynchronize the frame stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Wait until the first byte of the next message is available, without consuming it.
    ///
    /// Any unread remainder of the previous message is skipped first. Returns
    /// `Ok(false)` if `timeout` elapses with nothing to read.
    ///
    /// # Errors
    ///
    /// [`WebSocketError::ConnectionClosed`] if the stream ended cleanly.
    pub async fn wait_for_data(&mut self, timeout: Option<Duration>) -> WsResult<bool> {
        self.skip_message().await?;

        let empty = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.fill_buf()).await {
                Ok(result) => result?.is_empty(),
                Err(_) => return Ok(false),
            },
            None => self.inner.fill_buf().await?.is_empty(),
        };

        if empty {
            return Err(WebSocketError::ConnectionClosed);
        }
        Ok(true)
    }

    /// Read the header of the next message and return a reader for its payload.
    ///
    /// # Errors
    ///
    /// - [`WebSocketError::ConnectionClosed`] if the stream ended at a message boundary
    /// - [`WebSocketError::Protocol`] if the message starts with a continuation frame
    /// - [`WebSocketError::PayloadTooLarge`] for a length with the sign bit set
    pub async fn next_message(&mut self) -> WsResult<MessageReader<'_, R>> {
        self.skip_message().await?;

        let header = self.read_header(true).await?;
        if header.opcode == OpCode::Continuation {
            return Err(WebSocketError::Protocol(
                "frame has unexpected opcode".to_string(),
            ));
        }
        self.frame = FrameState::begin(&header);

        Ok(MessageReader {
            opcode: header.opcode,
            flags: header.flags,
            frames: self,
        })
    }

    async fn read_header(&mut self, at_boundary: bool) -> WsResult<FrameHeader> {
        let limit = self.read_timeout;

        if at_boundary {
            let available = timed(limit, self.inner.fill_buf()).await?.len();
            if available == 0 {
                return Err(WebSocketError::ConnectionClosed);
            }
        }

        let mut prefix = [0u8; 2];
        timed(limit, self.inner.read_exact(&mut prefix)).await?;
        let (fin, flags, opcode, masked, short_len) = FrameHeader::split_prefix(prefix[0], prefix[1]);

        let payload_len = match short_len {
            126 => timed(limit, self.inner.read_u16()).await? as u64,
            127 => {
                let len = timed(limit, self.inner.read_u64()).await?;
                if len > i64::MAX as u64 {
                    return Err(WebSocketError::PayloadTooLarge);
                }
                len
            }
            len => len as u64,
        };

        let mask = if masked {
            let mut key = [0u8; 4];
            timed(limit, self.inner.read_exact(&mut key)).await?;
            Some(key)
        } else {
            None
        };

        Ok(FrameHeader {
            fin,
            flags,
            opcode,
            mask,
            payload_len,
        })
    }

    async fn advance_frame(&mut self) -> WsResult<()> {
        let header = self.read_header(false).await?;
        if header.opcode != OpCode::Continuation {
            return Err(WebSocketError::Protocol(
                "frame has unexpected opcode".to_string(),
            ));
        }
        self.frame = FrameState::begin(&header);
        Ok(())
    }

    async fn read_payload(&mut self, buf: &mut [u8]) -> WsResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.frame.in_message {
                return Ok(0);
            }
            if self.frame.remaining == 0 {
                if self.frame.fin {
                    self.frame.in_message = false;
                    return Ok(0);
                }
                // Empty non-final frames are skipped here as well.
                self.advance_frame().await?;
                continue;
            }

            let want = buf.len().min(clamp_len(self.frame.remaining));
            let limit = self.read_timeout;
            let n = timed(limit, self.inner.read(&mut buf[..want])).await?;
            if n == 0 {
                return Err(WebSocketError::UnexpectedEof);
            }

            if let Some(key) = self.frame.mask {
                apply_mask(key, (self.frame.position & 3) as usize, &mut buf[..n]);
            }
            self.frame.remaining -= n as u64;
            self.frame.position += n as u64;
            return Ok(n);
        }
    }

    async fn skip_message(&mut self) -> WsResult<()> {
        while self.frame.in_message {
            if self.frame.remaining == 0 {
                if self.frame.fin {
                    self.frame.in_message = false;
                } else {
                    self.advance_frame().await?;
                }
                continue;
            }

            let limit = self.read_timeout;
            let available = timed(limit, self.inner.fill_buf()).await?.len();
            if available == 0 {
                return Err(WebSocketError::UnexpectedEof);
            }
            let n = available.min(clamp_len(self.frame.remaining));
            self.inner.consume(n);
            self.frame.remaining -= n as u64;
            self.frame.position += n as u64;
        }
        Ok(())
    }
}

/// One inbound logical message
///
/// Dropping it without reading everything is allowed; the rest is skipped by
/// the next call on the owning [`FrameReader`].
#[derive(Debug)]
pub struct MessageReader<'a, R> {
    frames: &'a mut FrameReader<R>,
    opcode: OpCode,
    flags: u8,
}

impl<R: AsyncBufRead + Unpin> MessageReader<'_, R> {
    /// Opcode of the first frame.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Reserved bits of the first frame.
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Read payload bytes, returning 0 at the end of the message.
    pub async fn read(&mut self, buf: &mut [u8]) -> WsResult<usize> {
        self.frames.read_payload(buf).await
    }

    /// Append the rest of the message to `out`.
    ///
    /// # Errors
    ///
    /// [`WebSocketError::MessageTooLarge`] once more than the reader's maximum
    /// message size has been read by this call.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> WsResult<usize> {
        let limit = self.frames.max_message_size;
        let start = out.len();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            if out.len() - start + n > limit {
                return Err(WebSocketError::MessageTooLarge { limit });
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Skip whatever remains of the message.
    pub async fn close(self) -> WsResult<()> {
        self.frames.skip_message().await
    }
}

fn clamp_len(remaining: u64) -> usize {
    usize::try_from(remaining).unwrap_or(usize::MAX)
}

async fn timed<F, T>(limit: Option<Duration>, fut: F) -> WsResult<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => Ok(tokio::time::timeout(limit, fut).await??),
        None => Ok(fut.await?),
    }
}
