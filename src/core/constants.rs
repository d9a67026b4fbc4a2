//! Protocol constants shared by both endpoints.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed
//! without coordinating both ends of a deployment.

// =============================================================================
// PACKET FRAMING
// =============================================================================

/// Packet header size on the wire: id (8) + kind (4) + size (8).
pub const HEADER_SIZE: usize = 20;

/// Maximum bytes of file content carried by one `FILE_DATA` packet.
pub const FILE_CHUNK_SIZE: usize = 1024 * 1024;

// =============================================================================
// PACKET KINDS
//
// The kind space is an extensible small-integer enumeration; new payload
// kinds are added by reserving new values. Payload encoding itself is
// delegated to the structured serialization both peers agree on.
// =============================================================================

/// Control packet carrying no payload.
pub const PACKET_KIND_CONTROL: u32 = 0;

/// Directory update query (serialized [`UpdateQuery`](crate::sync::UpdateQuery)).
pub const PACKET_KIND_UPDATE_QUERY: u32 = 1;

/// Update list response (serialized `Vec<String>` of stale filenames).
pub const PACKET_KIND_UPDATE_LIST: u32 = 2;

/// File metadata (serialized [`FileDescriptor`](crate::sync::FileDescriptor)).
pub const PACKET_KIND_FILE_INFO: u32 = 3;

/// Raw file content chunk.
pub const PACKET_KIND_FILE_DATA: u32 = 4;

// =============================================================================
// LEGACY CHANNEL
// =============================================================================

/// Fixed wire size of one legacy bounded-channel message.
pub const LEGACY_MESSAGE_SIZE: usize = 128;
