//! Wire protocol for monitor connections
//!
//! Defines the messages exchanged between `MonitorServer` and clients. Uses a
//! simple length-prefixed binary format so non-Rust clients can follow along.
//!
//! # Wire Format
//!
//! All messages are length-prefixed:
//! ```text
//! ┌──────────────┬──────────┬──────────────────────────┐
//! │ 4 bytes      │ 1 byte   │ N - 1 bytes              │
//! │ length (BE)  │ type     │ body                     │
//! └──────────────┴──────────┴──────────────────────────┘
//! ```
//!
//! # Message Types
//!
//! - `Request` (0x01): Client → Server, level and format of the stream
//! - `Envelope` (0x02): Server → Client, one log payload or the terminal error
//!
//! # Envelope Body
//!
//! ```text
//! flags u8          bit0 = payload present, bit1 = error present
//! [payload]         u32 length + bytes
//! [error]           u8 has_code, [i64 code], u32 length + UTF-8 message
//! ```
//!
//! A stream is a sequence of envelopes that ends when the connection closes or
//! after an envelope carrying an error.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{MonitorError, Result};
use crate::frame::LogFrame;

/// Message type discriminants
const MSG_REQUEST: u8 = 0x01;
const MSG_ENVELOPE: u8 = 0x02;

/// Envelope flags
const FLAG_PAYLOAD: u8 = 0b01;
const FLAG_ERROR: u8 = 0b10;

/// Largest accepted message body (16 MiB)
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Status code of the terminal error sent when streaming fails
pub const STATUS_INTERNAL_ERROR: i64 = 500;

/// Status code sent when a monitor request cannot be served
pub const STATUS_BAD_REQUEST: i64 = 400;

/// Messages exchanged between monitor server and clients
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorMessage {
    /// Client → Server: start streaming
    Request(MonitorRequest),
    /// Server → Client: log payload or terminal error
    Envelope(StreamEnvelope),
}

/// What a client wants to receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRequest {
    /// Most verbose level to stream (trace, debug, info, warn, error)
    pub log_level: String,
    /// Render records as JSON instead of console lines
    pub log_json: bool,
}

impl Default for MonitorRequest {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_json: false,
        }
    }
}

impl MonitorRequest {
    pub fn new(log_level: impl Into<String>) -> Self {
        Self {
            log_level: log_level.into(),
            log_json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.log_json = json;
        self
    }

    fn encoded_len(&self) -> usize {
        4 + self.log_level.len() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        encode_string(&self.log_level, buf);
        buf.put_u8(u8::from(self.log_json));
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let log_level = decode_string(buf)?;
        if buf.remaining() < 1 {
            return Err(MonitorError::Protocol("truncated monitor request".into()));
        }
        let log_json = buf.get_u8() != 0;
        Ok(Self {
            log_level,
            log_json,
        })
    }
}

/// Error carried by the terminal envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub message: String,
    pub code: Option<i64>,
}

impl RpcError {
    pub fn new(message: impl Into<String>, code: Option<i64>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    fn encoded_len(&self) -> usize {
        1 + self.code.map_or(0, |_| 8) + 4 + self.message.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self.code {
            Some(code) => {
                buf.put_u8(1);
                buf.put_i64(code);
            }
            None => buf.put_u8(0),
        }
        encode_string(&self.message, buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(MonitorError::Protocol("truncated error".into()));
        }
        let code = if buf.get_u8() == 0 {
            None
        } else {
            if buf.remaining() < 8 {
                return Err(MonitorError::Protocol("truncated error code".into()));
            }
            Some(buf.get_i64())
        };
        let message = decode_string(buf)?;
        Ok(Self { message, code })
    }
}

/// One streamed message: a log payload, a terminal error, or (in principle)
/// both
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamEnvelope {
    pub payload: Option<Bytes>,
    pub error: Option<RpcError>,
}

impl StreamEnvelope {
    /// Data envelope for one frame
    pub fn payload(frame: LogFrame) -> Self {
        Self {
            payload: Some(frame.into_bytes()),
            error: None,
        }
    }

    /// Terminal error envelope
    pub fn error(message: impl Into<String>, code: i64) -> Self {
        Self {
            payload: None,
            error: Some(RpcError::new(message, Some(code))),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn encoded_len(&self) -> usize {
        1 + self.payload.as_ref().map_or(0, |p| 4 + p.len())
            + self.error.as_ref().map_or(0, RpcError::encoded_len)
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut flags = 0;
        if self.payload.is_some() {
            flags |= FLAG_PAYLOAD;
        }
        if self.error.is_some() {
            flags |= FLAG_ERROR;
        }
        buf.put_u8(flags);

        if let Some(ref payload) = self.payload {
            buf.put_u32(payload.len() as u32);
            buf.put_slice(payload);
        }
        if let Some(ref error) = self.error {
            error.encode(buf);
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(MonitorError::Protocol("truncated envelope".into()));
        }
        let flags = buf.get_u8();
        if flags & !(FLAG_PAYLOAD | FLAG_ERROR) != 0 {
            return Err(MonitorError::Protocol(format!(
                "unknown envelope flags: {flags:#04x}"
            )));
        }

        let payload = if flags & FLAG_PAYLOAD != 0 {
            if buf.remaining() < 4 {
                return Err(MonitorError::Protocol("truncated payload length".into()));
            }
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(MonitorError::Protocol("truncated payload".into()));
            }
            Some(buf.split_to(len))
        } else {
            None
        };

        let error = if flags & FLAG_ERROR != 0 {
            Some(RpcError::decode(buf)?)
        } else {
            None
        };

        Ok(Self { payload, error })
    }
}

impl MonitorMessage {
    /// Encode message to bytes with length prefix
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Body length on the wire, type byte included
    fn encoded_len(&self) -> usize {
        1 + match self {
            MonitorMessage::Request(req) => req.encoded_len(),
            MonitorMessage::Envelope(envelope) => envelope.encoded_len(),
        }
    }

    /// Append the length-prefixed message to `buf`
    ///
    /// Bodies over [`MAX_MESSAGE_LEN`] are not rejected here;
    /// [`EnvelopeEncoder`] checks before anything reaches the wire.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let start = buf.len();

        // Reserve space for length prefix (filled in at end)
        buf.put_u32(0);

        match self {
            MonitorMessage::Request(req) => {
                buf.put_u8(MSG_REQUEST);
                req.encode(buf);
            }
            MonitorMessage::Envelope(envelope) => {
                buf.put_u8(MSG_ENVELOPE);
                envelope.encode(buf);
            }
        }

        // Length excludes the 4-byte length field itself
        let len = (buf.len() - start - 4) as u32;
        buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }

    /// Decode message from bytes (without length prefix)
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(MonitorError::Protocol("empty message".into()));
        }

        let msg_type = buf.get_u8();
        let msg = match msg_type {
            MSG_REQUEST => MonitorMessage::Request(MonitorRequest::decode(&mut buf)?),
            MSG_ENVELOPE => MonitorMessage::Envelope(StreamEnvelope::decode(&mut buf)?),
            _ => {
                return Err(MonitorError::Protocol(format!(
                    "unknown message type: {msg_type}"
                )));
            }
        };

        if buf.has_remaining() {
            return Err(MonitorError::Protocol(format!(
                "{} trailing bytes after message",
                buf.remaining()
            )));
        }
        Ok(msg)
    }
}

// ============================================================================
// Stream codec
// ============================================================================

/// Writes length-prefixed messages to an async writer
///
/// The scratch buffer is reused across messages.
#[derive(Debug)]
pub struct EnvelopeEncoder<W> {
    writer: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> EnvelopeEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Encode one envelope and flush it to the writer
    ///
    /// An envelope whose body exceeds [`MAX_MESSAGE_LEN`] is rejected with a
    /// protocol error before any byte is written.
    pub async fn encode(&mut self, envelope: &StreamEnvelope) -> Result<()> {
        let len = checked_body_len(1 + envelope.encoded_len())?;
        self.buf.clear();
        self.buf.reserve(4 + len as usize);
        self.buf.put_u32(len);
        self.buf.put_u8(MSG_ENVELOPE);
        envelope.encode(&mut self.buf);
        self.flush_buf().await
    }

    /// Encode any message and flush it to the writer
    pub async fn send(&mut self, msg: &MonitorMessage) -> Result<()> {
        checked_body_len(msg.encoded_len())?;
        self.buf.clear();
        msg.encode_into(&mut self.buf);
        self.flush_buf().await
    }

    async fn flush_buf(&mut self) -> Result<()> {
        self.writer.write_all(&self.buf).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Reads length-prefixed messages from an async reader
#[derive(Debug)]
pub struct MessageReader<R> {
    reader: R,
    read_buf: BytesMut,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_buf: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Receive the next message
    ///
    /// Returns `Ok(None)` if the connection closed between messages.
    pub async fn next(&mut self) -> Result<Option<MonitorMessage>> {
        loop {
            // Try to parse a complete message from the buffer
            if let Some(len) = read_length_prefix(&self.read_buf) {
                let len = len as usize;
                if len > MAX_MESSAGE_LEN {
                    return Err(MonitorError::Protocol(format!(
                        "message too large: {len} bytes"
                    )));
                }

                if self.read_buf.len() >= 4 + len {
                    self.read_buf.advance(4);
                    let payload = self.read_buf.split_to(len).freeze();
                    return MonitorMessage::decode(payload).map(Some);
                }
            }

            // Need more data
            let n = self.reader.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(MonitorError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-message",
                )));
            }
        }
    }
}

// ============================================================================
// Encoding helpers
// ============================================================================

/// Length prefix for a body of `len` bytes, if the reader side would accept it
fn checked_body_len(len: usize) -> Result<u32> {
    if len > MAX_MESSAGE_LEN {
        return Err(MonitorError::Protocol(format!(
            "message too large: {len} bytes"
        )));
    }
    u32::try_from(len)
        .map_err(|_| MonitorError::Protocol(format!("message too large: {len} bytes")))
}

fn encode_string(s: &str, buf: &mut BytesMut) {
    let bytes = s.as_bytes();
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn decode_string(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 4 {
        return Err(MonitorError::Protocol("truncated string length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(MonitorError::Protocol("truncated string".into()));
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MonitorError::Protocol(format!("invalid UTF-8: {e}")))
}

/// Read the 4-byte length prefix, if present
pub fn read_length_prefix(buf: &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
