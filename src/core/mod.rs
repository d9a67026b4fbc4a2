//! Core constants and error types.

pub mod constants;
pub mod error;

pub use constants::*;
pub use error::{ContractError, Error, FramingError, Result, SyncError, TransportError};
