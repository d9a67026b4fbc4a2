//! Exact-length packet framing over a secure session.
//!
//! Every payload transfer is preceded by exactly one [`PacketHeader`]
//! whose `size` field equals the number of payload bytes that follow on
//! the same stream. Header-then-body framing lets either side determine
//! payload length deterministically and keeps allocation bounded to
//! declared sizes, at the cost of requiring the sender to know the exact
//! payload length up front; streaming payloads are not supported.
//!
//! The header is transmitted per-field in native byte order with no
//! padding. Both peers are assumed to share a native integer
//! representation; deployments mixing architectures must pin an explicit
//! byte order first.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::constants::HEADER_SIZE;
use crate::core::error::{ContractError, Error, FramingError, Result, TransportError};

/// Fixed-layout packet header.
///
/// `id` correlates related exchanges (e.g. request/response); `kind`
/// selects how the payload is interpreted (see
/// [`constants`](crate::core::constants)); `size` is the exact byte
/// count of the payload that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Correlation id for related exchanges.
    pub id: u64,
    /// Packet kind discriminant.
    pub kind: u32,
    /// Byte count of the payload following this header.
    pub size: u64,
}

impl PacketHeader {
    /// Create a header for a payload of `size` bytes.
    pub fn new(id: u64, kind: u32, size: u64) -> Self {
        Self { id, kind, size }
    }

    /// Create a header for a control packet carrying no payload.
    pub fn control(id: u64, kind: u32) -> Self {
        Self { id, kind, size: 0 }
    }

    /// Encode the header into its fixed wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.id.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.kind.to_ne_bytes());
        buf[12..20].copy_from_slice(&self.size.to_ne_bytes());
        buf
    }

    /// Decode a header from its fixed wire form.
    ///
    /// # Panics
    ///
    /// Cannot panic: the `expect` calls on slice conversions are guarded
    /// by the fixed input size.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let id = u64::from_ne_bytes(bytes[0..8].try_into().expect("id field is exactly 8 bytes"));
        let kind =
            u32::from_ne_bytes(bytes[8..12].try_into().expect("kind field is exactly 4 bytes"));
        let size =
            u64::from_ne_bytes(bytes[12..20].try_into().expect("size field is exactly 8 bytes"));
        Self { id, kind, size }
    }
}

/// Packet framer layered over one byte stream.
///
/// All operations are sequential; the framer is not safe for concurrent
/// invocation from multiple tasks against the same stream. After any
/// [`FramingError`] the stream is considered corrupt and must not be
/// reused.
#[derive(Debug)]
pub struct Framer<S> {
    stream: S,
}

impl<S> Framer<S> {
    /// Wrap a byte stream in a framer.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Consume the framer, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Get a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Framer<S> {
    /// Send exactly the fixed-size header representation.
    pub async fn write_header(&mut self, header: &PacketHeader) -> Result<()> {
        self.stream
            .write_all(&header.to_bytes())
            .await
            .map_err(write_err)?;
        self.stream.flush().await.map_err(write_err)?;
        Ok(())
    }

    /// Send `header` followed by exactly `header.size` bytes from `buf`.
    ///
    /// Precondition: `buf.len() >= header.size`. Violations are a
    /// [`ContractError`] and fail before any bytes touch the wire; the
    /// payload is never silently truncated.
    pub async fn write_payload(&mut self, buf: &[u8], header: &PacketHeader) -> Result<()> {
        if (buf.len() as u64) < header.size {
            return Err(ContractError::BufferTooSmall {
                needed: header.size,
                len: buf.len(),
            }
            .into());
        }

        self.stream
            .write_all(&header.to_bytes())
            .await
            .map_err(write_err)?;
        // The cast is lossless: size <= buf.len() holds here.
        self.stream
            .write_all(&buf[..header.size as usize])
            .await
            .map_err(write_err)?;
        self.stream.flush().await.map_err(write_err)?;
        Ok(())
    }

    /// Send a control packet carrying no payload.
    pub async fn write_control(&mut self, id: u64, kind: u32) -> Result<()> {
        self.write_header(&PacketHeader::control(id, kind)).await
    }

    /// Send `buf` as one packet, inferring `size` from its length.
    pub async fn write_buf(&mut self, id: u64, kind: u32, buf: &[u8]) -> Result<()> {
        self.write_payload(buf, &PacketHeader::new(id, kind, buf.len() as u64))
            .await
    }

    /// Block for exactly the header's byte count and decode it.
    pub async fn read_header(&mut self) -> Result<PacketHeader> {
        let mut buf = [0u8; HEADER_SIZE];
        self.stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| read_err(e, FramingError::TruncatedHeader))?;
        Ok(PacketHeader::from_bytes(&buf))
    }

    /// Read a header, then exactly `header.size` payload bytes.
    ///
    /// Any discrepancy between bytes received and the declared size is
    /// protocol-fatal.
    pub async fn read_payload(&mut self) -> Result<(PacketHeader, Vec<u8>)> {
        let header = self.read_header().await?;
        let size = usize::try_from(header.size)
            .map_err(|_| FramingError::OversizedPayload(header.size))?;
        let mut buf = vec![0u8; size];
        self.stream.read_exact(&mut buf).await.map_err(|e| {
            read_err(
                e,
                FramingError::TruncatedPayload {
                    expected: header.size,
                },
            )
        })?;
        Ok((header, buf))
    }
}

fn write_err(e: io::Error) -> Error {
    Error::Transport(TransportError::Io(e))
}

fn read_err(e: io::Error, truncated: FramingError) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Framing(truncated)
    } else {
        Error::Transport(TransportError::Io(e))
    }
}
