//! Message Framer (C3, §4.3): wraps a bidirectional byte stream with a
//! length-prefixed JSON codec and turns it into `NewMessage`/`Eof` events.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::warn;

use crate::error::ProtocolError;
use crate::message::{CoordinatorMessage, WorkerMessage};

/// The two event kinds the framer delivers to the loop (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum FramerEvent {
    NewMessage(WorkerMessage),
    Eof,
}

/// Length-prefixed JSON message channel over any `AsyncRead + AsyncWrite`
/// stream. `S` is generic so production code can frame a `TcpStream` while
/// tests frame one half of `tokio::io::duplex`.
pub struct Framer<S> {
    inner: Framed<S, LengthDelimitedCodec>,
}

impl<S> Framer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: Framed::new(stream, LengthDelimitedCodec::new()),
        }
    }

    /// Reads and decodes the next frame. Both a transport-level read error
    /// and a JSON decode error collapse into `Eof` (§4.3: "on decode error
    /// emit Eof (treated as disconnect)"); a clean close (`None`) is `Eof`
    /// too.
    pub async fn recv(&mut self) -> FramerEvent {
        match self.inner.next().await {
            Some(Ok(bytes)) => match serde_json::from_slice::<WorkerMessage>(&bytes) {
                Ok(msg) => FramerEvent::NewMessage(msg),
                Err(err) => {
                    warn!(error = %err, "failed to decode worker message, treating as eof");
                    FramerEvent::Eof
                }
            },
            Some(Err(err)) => {
                warn!(error = %err, "framer read error, treating as eof");
                FramerEvent::Eof
            }
            None => FramerEvent::Eof,
        }
    }

    /// Serializes and writes `msg`. §4.3: "failure on write is surfaced as
    /// Eof" — callers treat an `Err` here the same way they treat a
    /// `FramerEvent::Eof` from [`recv`](Self::recv).
    pub async fn send(&mut self, msg: &CoordinatorMessage) -> Result<(), ProtocolError> {
        let encoded = serde_json::to_vec(msg)?;
        self.inner.send(encoded.into()).await?;
        Ok(())
    }
}

#[path = "framer_tests.rs"]
#[cfg(test)]
mod tests;
