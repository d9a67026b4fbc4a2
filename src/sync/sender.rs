//! Source-side synchronization: query the peer, then transfer the
//! files it reports stale.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info};

use super::{build_timestamp_index, mode_bits, validate_entry_name, FileDescriptor, FileKind, UpdateQuery};
use crate::core::constants::{
    FILE_CHUNK_SIZE, PACKET_KIND_FILE_DATA, PACKET_KIND_FILE_INFO, PACKET_KIND_UPDATE_LIST,
    PACKET_KIND_UPDATE_QUERY,
};
use crate::core::error::{Result, SyncError};
use crate::framer::Framer;

/// Reconcile `source` against `destination` on the peer, transferring
/// only stale files.
///
/// Sends an [`UpdateQuery`] built from `source`'s immediate entries,
/// waits for the peer's authoritative update list (it is never
/// re-derived locally), then for each listed name in order sends a
/// [`FileDescriptor`] followed by the file's content, fully draining
/// one file before the next descriptor.
///
/// Returns the names that were transferred. Any failure aborts the
/// whole round; no partial application is assumed safe.
pub async fn push_directory<S>(
    framer: &mut Framer<S>,
    source: &Path,
    destination: &str,
) -> Result<Vec<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let index = build_timestamp_index(source)?;
    let query = UpdateQuery {
        destination: destination.to_string(),
        index,
    };
    let encoded = postcard::to_stdvec(&query).map_err(SyncError::Codec)?;
    framer
        .write_buf(0, PACKET_KIND_UPDATE_QUERY, &encoded)
        .await?;
    debug!(entries = query.index.len(), destination, "update query sent");

    let (header, payload) = framer.read_payload().await?;
    if header.kind != PACKET_KIND_UPDATE_LIST {
        return Err(SyncError::UnexpectedPacket {
            expected: PACKET_KIND_UPDATE_LIST,
            got: header.kind,
        }
        .into());
    }
    let stale: Vec<String> = postcard::from_bytes(&payload).map_err(SyncError::Codec)?;
    debug!(stale = stale.len(), "update list received");

    for name in &stale {
        // The list comes from the peer; a crafted entry must not read
        // files outside the source directory.
        validate_entry_name(name)?;
        send_file(framer, source, name).await?;
    }
    Ok(stale)
}

/// Send one file's descriptor and content.
async fn send_file<S>(framer: &mut Framer<S>, source: &Path, name: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let file_err = |e| SyncError::File {
        name: name.to_string(),
        source: e,
    };

    let path = source.join(name);
    let metadata = tokio::fs::symlink_metadata(&path).await.map_err(file_err)?;
    if !metadata.is_file() {
        return Err(SyncError::NotRegularFile(name.to_string()).into());
    }

    let descriptor = FileDescriptor {
        name: name.to_string(),
        size: metadata.len(),
        kind: FileKind::Regular,
        mode: mode_bits(&metadata),
    };
    let encoded = postcard::to_stdvec(&descriptor).map_err(SyncError::Codec)?;
    framer
        .write_buf(0, PACKET_KIND_FILE_INFO, &encoded)
        .await?;
    info!(name, size = descriptor.size, "sending file");

    let mut file = File::open(&path).await.map_err(file_err)?;
    let mut remaining = descriptor.size;
    let mut chunk = vec![0u8; remaining.min(FILE_CHUNK_SIZE as u64) as usize];
    while remaining > 0 {
        let want = remaining.min(FILE_CHUNK_SIZE as u64) as usize;
        let n = file.read(&mut chunk[..want]).await.map_err(file_err)?;
        if n == 0 {
            // The file shrank between stat and read; the declared size
            // can no longer be honored.
            return Err(SyncError::SizeChanged(name.to_string()).into());
        }
        framer
            .write_buf(0, PACKET_KIND_FILE_DATA, &chunk[..n])
            .await?;
        remaining -= n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use std::fs;
    use tempdir::TempDir;

    #[tokio::test]
    async fn test_escaping_update_list_entry_is_rejected() {
        let src = TempDir::new("worklink-src").unwrap();
        fs::write(src.path().join("seed"), b"x").unwrap();

        let (a, b) = tokio::io::duplex(4096);
        let mut source_framer = Framer::new(a);
        let mut peer = Framer::new(b);

        // The peer answers the query with a name outside the source
        // directory; the sender must abort instead of reading it.
        let answer = async {
            let (header, _) = peer.read_payload().await.unwrap();
            let list = vec!["../../etc/passwd".to_string()];
            let encoded = postcard::to_stdvec(&list).unwrap();
            peer.write_buf(header.id, PACKET_KIND_UPDATE_LIST, &encoded)
                .await
                .unwrap();
        };
        let (result, ()) = tokio::join!(
            push_directory(&mut source_framer, src.path(), "/tmp/dest"),
            answer,
        );
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Sync(SyncError::InvalidName(_))));
    }
}
