//! Outbound message framing.
//!
//! A [`MessageWriter`] buffers payload bytes and emits them as frames only when
//! the buffer overflows or the message is closed. Each frame header is written
//! into reserved space directly in front of the buffered payload so that every
//! frame leaves in a single write.

use std::ops::DerefMut;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::websocket::error::{WebSocketError, WsResult};
use crate::websocket::frame::{
    apply_mask, random_mask_key, FrameHeader, OpCode, MAX_HEADER_LEN, RESERVED_FLAGS,
};

/// Default payload capacity of the write buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Writes one logical message as one or more frames
///
/// `W` is anything that dereferences to the output sink, typically a mutex
/// guard; holding the writer is what keeps other messages off the wire.
pub struct MessageWriter<W> {
    out: W,
    /// Header space followed by `capacity` payload bytes.
    buf: Vec<u8>,
    len: usize,
    capacity: usize,
    flags: u8,
    opcode: OpCode,
    masked: bool,
    frames_sent: usize,
    closed: bool,
}

impl<W> MessageWriter<W>
where
    W: DerefMut,
    W::Target: AsyncWrite + Unpin,
{
    /// Start a message.
    ///
    /// # Arguments
    ///
    /// * `flags` - Reserved bits (RSV1-RSV3) carried on every frame
    /// * `opcode` - Message opcode, sent on the first frame only
    /// * `masked` - Mask each frame with a fresh random key
    /// * `capacity` - Payload bytes buffered before a frame is emitted
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::InvalidArgument`] for flag bits outside RSV1-RSV3,
    /// a continuation opcode, or a zero capacity.
    pub fn new(out: W, flags: u8, opcode: OpCode, masked: bool, capacity: usize) -> WsResult<Self> {
        if flags & !RESERVED_FLAGS != 0 {
            return Err(WebSocketError::InvalidArgument(format!(
                "invalid frame flags: {flags:#04x}"
            )));
        }
        if opcode == OpCode::Continuation {
            return Err(WebSocketError::InvalidArgument(
                "a message cannot start with a continuation opcode".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(WebSocketError::InvalidArgument(
                "write buffer capacity must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            out,
            buf: vec![0u8; MAX_HEADER_LEN + capacity],
            len: 0,
            capacity,
            flags,
            opcode,
            masked,
            frames_sent: 0,
            closed: false,
        })
    }

    /// Number of frames emitted so far.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Append payload bytes.
    pub async fn write(&mut self, mut data: &[u8]) -> WsResult<()> {
        if data.len() > self.capacity {
            return self.write_unbuffered(data).await;
        }

        while data.len() > self.capacity - self.len {
            let n = self.capacity - self.len;
            self.buffer(&data[..n]);
            data = &data[n..];
            self.emit_buffered(false).await?;
        }
        self.buffer(data);
        Ok(())
    }

    /// Does nothing: frames are emitted only when the buffer overflows or on [`close`](Self::close).
    pub async fn flush(&mut self) -> WsResult<()> {
        Ok(())
    }

    /// Emit the final frame (possibly empty) and flush the sink.
    pub async fn close(mut self) -> WsResult<()> {
        self.closed = true;
        self.emit_buffered(true).await?;
        self.out.flush().await?;
        Ok(())
    }

    fn buffer(&mut self, data: &[u8]) {
        let start = MAX_HEADER_LEN + self.len;
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.len += data.len();
    }

    fn next_header(&self, fin: bool, payload_len: u64) -> FrameHeader {
        FrameHeader {
            fin,
            flags: self.flags,
            opcode: if self.frames_sent == 0 {
                self.opcode
            } else {
                OpCode::Continuation
            },
            mask: self.masked.then(random_mask_key),
            payload_len,
        }
    }

    async fn emit_buffered(&mut self, fin: bool) -> WsResult<()> {
        let header = self.next_header(fin, self.len as u64);
        let (bytes, header_len) = header.encode();
        let start = MAX_HEADER_LEN - header_len;
        let end = MAX_HEADER_LEN + self.len;

        self.buf[start..MAX_HEADER_LEN].copy_from_slice(&bytes[..header_len]);
        if let Some(key) = header.mask {
            apply_mask(key, 0, &mut self.buf[MAX_HEADER_LEN..end]);
        }
        self.out.write_all(&self.buf[start..end]).await?;

        self.len = 0;
        self.frames_sent += 1;
        Ok(())
    }

    async fn write_unbuffered(&mut self, data: &[u8]) -> WsResult<()> {
        if self.len > 0 {
            self.emit_buffered(false).await?;
        }

        let header = self.next_header(false, data.len() as u64);
        let (bytes, header_len) = header.encode();
        self.out.write_all(&bytes[..header_len]).await?;

        match header.mask {
            None => self.out.write_all(data).await?,
            Some(key) => {
                for (i, chunk) in data.chunks(self.capacity).enumerate() {
                    let scratch = &mut self.buf[MAX_HEADER_LEN..MAX_HEADER_LEN + chunk.len()];
                    scratch.copy_from_slice(chunk);
                    apply_mask(key, i * self.capacity, scratch);
                    self.out.write_all(scratch).await?;
                }
            }
        }

        self.frames_sent += 1;
        Ok(())
    }
}

impl<W> Drop for MessageWriter<W> {
    fn drop(&mut self) {
        if !self.closed && self.frames_sent > 0 {
            tracing::warn!(
                "Message writer dropped after {} frame(s) without close; peer sees a truncated message",
                self.frames_sent
            );
        }
    }
}
