//! Error types for the worklink protocol.
//!
//! The taxonomy mirrors the layering of the crate: transport failures,
//! framing violations, caller contract violations, and synchronization
//! failures each get their own enum, aggregated into the top-level
//! [`Error`]. Nothing in this crate retries internally; every failure
//! surfaces to the immediate caller, which owns any retry policy.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_rustls::rustls;

/// Errors in the secure session layer.
///
/// All variants are fatal to the current operation and are never retried
/// internally.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket or handshake I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// TLS configuration or protocol failure.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// The credential bundle could not be used.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The requested peer name is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// An ephemeral port request resolved to 0.
    ///
    /// Port 0 is never a usable bound port; this is a fatal
    /// initialization error.
    #[error("ephemeral port resolved to 0")]
    PortUnresolved,

    /// No peer connected within the accept deadline.
    #[error("accept timed out after {0:?}")]
    AcceptTimeout(Duration),
}

/// Framing violations on the packet stream.
///
/// A framing error means the stream is corrupt; the session MUST NOT be
/// reused afterward.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The stream ended before a complete header arrived.
    ///
    /// Peer EOF is not valid mid-header, so a clean close here is still
    /// a framing violation.
    #[error("connection closed mid-header")]
    TruncatedHeader,

    /// The stream ended before the declared payload arrived.
    #[error("connection closed mid-payload (expected {expected} bytes)")]
    TruncatedPayload {
        /// Payload size the header declared.
        expected: u64,
    },

    /// The declared payload size does not fit in this platform's address
    /// space.
    #[error("declared payload size {0} exceeds addressable memory")]
    OversizedPayload(u64),
}

/// Caller contract violations.
///
/// These fail immediately, before any bytes touch the wire.
#[derive(Debug, Error)]
pub enum ContractError {
    /// `write_payload` was given a buffer shorter than the declared size.
    #[error("buffer of {len} bytes is smaller than declared payload size {needed}")]
    BufferTooSmall {
        /// Byte count the header declared.
        needed: u64,
        /// Actual buffer length supplied.
        len: usize,
    },

    /// A legacy-channel message exceeds the fixed capacity.
    #[error("message of {len} bytes exceeds legacy capacity of {max}")]
    MessageTooLarge {
        /// Length of the rejected message.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Errors in the directory synchronization layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source path does not name a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Scanning a directory's entries failed.
    #[error("failed to scan {path}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Stat, read, or write of one file failed.
    ///
    /// Aborts the remaining sequence for the round; there is no
    /// skip-and-continue.
    #[error("failed to access file {name}")]
    File {
        /// Name of the file within the synchronized directory.
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A peer-supplied filename is not a plain entry name.
    ///
    /// Index and update-list entries name immediate children of one
    /// directory; a name carrying a path separator or a `..` component
    /// would escape it.
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),

    /// An entry queued for transfer is not a regular file.
    #[error("not a regular file: {0}")]
    NotRegularFile(String),

    /// A file's size changed between stat and transfer.
    #[error("file {0} changed size during transfer")]
    SizeChanged(String),

    /// The peer sent a packet kind other than the one the protocol
    /// requires at this point.
    #[error("unexpected packet kind {got} (expected {expected})")]
    UnexpectedPacket {
        /// Kind the protocol state machine required.
        expected: u32,
        /// Kind actually received.
        got: u32,
    },

    /// A file descriptor named a different file than the update list.
    #[error("descriptor for {got} arrived while expecting {expected}")]
    FileMismatch {
        /// Name the update list requires next.
        expected: String,
        /// Name the descriptor carried.
        got: String,
    },

    /// Structured payload encoding or decoding failed.
    #[error("payload codec error: {0}")]
    Codec(#[from] postcard::Error),
}

/// Top-level worklink errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Contract error.
    #[error("contract violation: {0}")]
    Contract(#[from] ContractError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
