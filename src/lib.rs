//! # worklink
//!
//! Secure packet transport and directory synchronization for a
//! distributed test-execution dispatcher: a central coordinator
//! exchanges structured binary messages and synchronizes files with
//! remote workers over an authenticated, encrypted channel.
//!
//! The crate is layered, leaves first:
//!
//! - [`session`]: one mutually-authenticated TLS byte stream per peer,
//!   listener-accepted or connector-initiated, with ephemeral-port
//!   resolution and best-effort teardown
//! - [`framer`]: fixed-size header (`id`/`kind`/`size`) plus
//!   exact-length send/receive primitives; every higher protocol is
//!   built on it
//! - [`sync`]: a two-round, timestamp-based directory reconciliation
//!   protocol layered on the framer
//! - [`legacy`]: an older fixed-size message exchange kept only for
//!   backward compatibility
//!
//! Sessions are strictly sequential. A second logical exchange waits
//! for the first or uses a distinct session; concurrency across peers
//! is one session per connection. There are no internal retries: every
//! transport, framing, contract, or sync failure surfaces to the caller
//! as a distinguishable [`Error`] variant, and any retry policy belongs
//! to the layer above.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use worklink::{Framer, SessionListener, TlsCredentials};
//!
//! # async fn run() -> worklink::Result<()> {
//! let credentials = TlsCredentials::load(Path::new("worklink.pem"))?;
//!
//! // Port 0 requests an ephemeral port, resolved at bind time.
//! let listener = SessionListener::bind(0, &credentials).await?;
//! println!("listening on {}", listener.port());
//!
//! let session = listener.accept().await?;
//! let mut framer = Framer::new(session);
//! let sent = worklink::sync::sender::push_directory(
//!     &mut framer,
//!     Path::new("test-cases"),
//!     "/home/worker/test-cases",
//! )
//! .await?;
//! println!("transferred {} files", sent.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod framer;
pub mod legacy;
pub mod session;
pub mod sync;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::constants::*;
    pub use crate::core::error::{
        ContractError, Error, FramingError, Result, SyncError, TransportError,
    };
    pub use crate::framer::{Framer, PacketHeader};
    pub use crate::legacy::LegacyChannel;
    pub use crate::session::{SecureSession, SessionListener, TlsCredentials};
    pub use crate::sync::{FileDescriptor, FileKind, FileTimestampIndex, UpdateQuery};
}

// Re-export commonly used items at crate root
pub use crate::core::error::{ContractError, Error, FramingError, Result, SyncError, TransportError};
pub use framer::{Framer, PacketHeader};
pub use legacy::LegacyChannel;
pub use session::{SecureSession, SessionListener, TlsCredentials};
