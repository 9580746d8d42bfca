//! Monitor client - connects to a `MonitorServer` and reads its stream

use std::path::Path;

use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{MonitorError, Result};
use crate::frame::LogFrame;
use crate::protocol::{
    EnvelopeEncoder, MessageReader, MonitorMessage, MonitorRequest, StreamEnvelope,
};

/// Client for one monitor stream
///
/// The write half stays open for the life of the client: the server reads
/// end-of-stream on it as the client going away.
pub struct MonitorClient {
    reader: MessageReader<OwnedReadHalf>,
    writer: EnvelopeEncoder<OwnedWriteHalf>,
}

impl MonitorClient {
    /// Connect to the monitor server at the given socket path
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: MessageReader::new(read_half),
            writer: EnvelopeEncoder::new(write_half),
        })
    }

    /// Send the request that starts the stream
    pub async fn request(&mut self, request: &MonitorRequest) -> Result<()> {
        self.writer
            .send(&MonitorMessage::Request(request.clone()))
            .await
    }

    /// Receive the next envelope
    ///
    /// Returns `Ok(None)` if the connection is closed.
    pub async fn recv(&mut self) -> Result<Option<StreamEnvelope>> {
        match self.reader.next().await? {
            Some(MonitorMessage::Envelope(envelope)) => Ok(Some(envelope)),
            Some(MonitorMessage::Request(_)) => Err(MonitorError::Protocol(
                "unexpected Request message from server".into(),
            )),
            None => Ok(None),
        }
    }

    /// Receive the next log record
    ///
    /// An error envelope ends the stream and is returned as
    /// [`MonitorError::Remote`]. Envelopes without payload are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<LogFrame>> {
        loop {
            let Some(envelope) = self.recv().await? else {
                return Ok(None);
            };

            if let Some(error) = envelope.error {
                return Err(MonitorError::Remote {
                    code: error.code,
                    message: error.message,
                });
            }

            if let Some(payload) = envelope.payload {
                return Ok(Some(LogFrame::new(payload)));
            }
        }
    }
}
