//! Destination-side synchronization: compare the peer's index against
//! the local directory, report stale files, and apply the transfers.
//!
//! This endpoint owns the comparison policy: a source filename is stale
//! at the destination if no file of that name exists locally, or the
//! local file's modification timestamp differs from the recorded source
//! value. The list it returns is authoritative for the round.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::{build_timestamp_index, mtime_from_nanos, validate_entry_name, FileDescriptor, UpdateQuery};
use crate::core::constants::{
    PACKET_KIND_FILE_DATA, PACKET_KIND_FILE_INFO, PACKET_KIND_UPDATE_LIST,
    PACKET_KIND_UPDATE_QUERY,
};
use crate::core::error::{Result, SyncError};
use crate::framer::Framer;

/// Serve one synchronization round initiated by the peer.
///
/// Reads the peer's [`UpdateQuery`], answers with the names stale at
/// the destination, then receives each listed file in order (descriptor
/// first, then content), writing it to the destination
/// directory with the descriptor's permission bits and the source's
/// recorded modification time (so the next round compares clean).
///
/// Returns the names that were applied.
pub async fn receive_update<S>(framer: &mut Framer<S>) -> Result<Vec<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (header, payload) = framer.read_payload().await?;
    if header.kind != PACKET_KIND_UPDATE_QUERY {
        return Err(SyncError::UnexpectedPacket {
            expected: PACKET_KIND_UPDATE_QUERY,
            got: header.kind,
        }
        .into());
    }
    let query: UpdateQuery = postcard::from_bytes(&payload).map_err(SyncError::Codec)?;
    // Every index key will be joined onto the destination path later;
    // reject names that could escape it before touching the filesystem.
    for name in query.index.keys() {
        validate_entry_name(name)?;
    }
    let destination = PathBuf::from(&query.destination);

    if !destination.exists() {
        tokio::fs::create_dir_all(&destination)
            .await
            .map_err(|e| SyncError::Scan {
                path: destination.clone(),
                source: e,
            })?;
    }
    let local = build_timestamp_index(&destination)?;

    let stale: Vec<String> = query
        .index
        .iter()
        .filter(|(name, mtime)| local.get(*name) != Some(*mtime))
        .map(|(name, _)| name.clone())
        .collect();
    let encoded = postcard::to_stdvec(&stale).map_err(SyncError::Codec)?;
    framer
        .write_buf(header.id, PACKET_KIND_UPDATE_LIST, &encoded)
        .await?;
    debug!(stale = stale.len(), destination = %destination.display(), "update list sent");

    for name in &stale {
        let mtime = query.index.get(name).copied();
        receive_file(framer, &destination, name, mtime).await?;
    }
    Ok(stale)
}

/// Receive one file: descriptor, then content until exactly the
/// declared size has arrived.
async fn receive_file<S>(
    framer: &mut Framer<S>,
    destination: &Path,
    name: &str,
    mtime: Option<u64>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (header, payload) = framer.read_payload().await?;
    if header.kind != PACKET_KIND_FILE_INFO {
        return Err(SyncError::UnexpectedPacket {
            expected: PACKET_KIND_FILE_INFO,
            got: header.kind,
        }
        .into());
    }
    let descriptor: FileDescriptor = postcard::from_bytes(&payload).map_err(SyncError::Codec)?;
    if descriptor.name != name {
        return Err(SyncError::FileMismatch {
            expected: name.to_string(),
            got: descriptor.name,
        }
        .into());
    }

    let mut content = Vec::new();
    let mut received: u64 = 0;
    while received < descriptor.size {
        let (chunk_header, chunk) = framer.read_payload().await?;
        if chunk_header.kind != PACKET_KIND_FILE_DATA {
            return Err(SyncError::UnexpectedPacket {
                expected: PACKET_KIND_FILE_DATA,
                got: chunk_header.kind,
            }
            .into());
        }
        received += chunk.len() as u64;
        if received > descriptor.size {
            return Err(SyncError::SizeChanged(name.to_string()).into());
        }
        content.extend_from_slice(&chunk);
    }

    let file_err = |e| SyncError::File {
        name: name.to_string(),
        source: e,
    };

    let path = destination.join(name);
    tokio::fs::write(&path, &content).await.map_err(file_err)?;

    // Set the recorded source mtime before restricting permissions; the
    // handle needs write access.
    if let Some(nanos) = mtime {
        let file = std::fs::File::options()
            .write(true)
            .open(&path)
            .map_err(file_err)?;
        file.set_times(std::fs::FileTimes::new().set_modified(mtime_from_nanos(nanos)))
            .map_err(file_err)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(descriptor.mode))
            .await
            .map_err(file_err)?;
    }

    info!(name, size = descriptor.size, "file updated");
    Ok(())
}
