//! Legacy bounded-message channel.
//!
//! An older fixed-size text-message exchange kept for backward
//! compatibility with existing peers; it is independent of the packet
//! framer and must not be used for new protocol traffic. Every message
//! occupies exactly [`LEGACY_MESSAGE_SIZE`] bytes on the wire,
//! zero-padded, and the text is read back up to the first NUL.
//!
//! The failure contract intentionally differs from the framer's: a
//! clean peer close is reported as the [`None`] sentinel rather than an
//! error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::constants::LEGACY_MESSAGE_SIZE;
use crate::core::error::{ContractError, Error, Result, TransportError};

/// Fixed-capacity message channel over one byte stream.
#[derive(Debug)]
pub struct LegacyChannel<S> {
    stream: S,
}

impl<S> LegacyChannel<S> {
    /// Wrap a byte stream in a legacy channel.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Consume the channel, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LegacyChannel<S> {
    /// Send one message, zero-padded to the fixed capacity.
    ///
    /// A message longer than [`LEGACY_MESSAGE_SIZE`] is a
    /// [`ContractError`]; nothing is transmitted and the message is
    /// never truncated.
    pub async fn send(&mut self, msg: &str) -> Result<()> {
        if msg.len() > LEGACY_MESSAGE_SIZE {
            return Err(ContractError::MessageTooLarge {
                len: msg.len(),
                max: LEGACY_MESSAGE_SIZE,
            }
            .into());
        }

        let mut buf = [0u8; LEGACY_MESSAGE_SIZE];
        buf[..msg.len()].copy_from_slice(msg.as_bytes());
        self.stream.write_all(&buf).await.map_err(transport)?;
        self.stream.flush().await.map_err(transport)?;
        Ok(())
    }

    /// Receive one message of exactly the fixed capacity.
    ///
    /// Returns the text up to the first NUL, or `None` if the peer
    /// closed the connection cleanly. The clean close is the legacy
    /// sentinel, not an error.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; LEGACY_MESSAGE_SIZE];
        let mut filled = 0;
        while filled < LEGACY_MESSAGE_SIZE {
            let n = self
                .stream
                .read(&mut buf[filled..])
                .await
                .map_err(transport)?;
            if n == 0 {
                return Ok(None);
            }
            filled += n;
        }

        let end = buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(LEGACY_MESSAGE_SIZE);
        Ok(Some(String::from_utf8_lossy(&buf[..end]).into_owned()))
    }
}

fn transport(e: std::io::Error) -> Error {
    Error::Transport(TransportError::Io(e))
}
