//! Directory synchronization over the packet framer.
//!
//! A two-round protocol reconciles a source directory against a
//! destination directory known to the peer, using modification
//! timestamps at whole-file granularity instead of content hashing.
//! Only the immediate entries of a directory participate; nested
//! directories are not traversed.
//!
//! The source side lives in [`sender`], the destination side in
//! [`receiver`]. Both run over one [`Framer`](crate::framer::Framer)
//! and abort the whole round on the first transport or framing error;
//! there is no skip-and-continue and no partial-application guarantee.

pub mod receiver;
pub mod sender;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::error::SyncError;

/// Mapping from filename to last-modification time in nanoseconds since
/// the Unix epoch, covering one directory's immediate entries.
pub type FileTimestampIndex = BTreeMap<String, u64>;

/// Outbound comparison request: the destination path on the peer and
/// the source directory's timestamp index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQuery {
    /// Destination directory path, as understood by the peer.
    pub destination: String,
    /// Timestamp index of the source directory.
    pub index: FileTimestampIndex,
}

/// File-type tag carried in a [`FileDescriptor`].
///
/// Only [`Regular`](FileKind::Regular) entries are transferred today;
/// the remaining variants reserve wire values for the other entry
/// types a directory scan can encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Anything else (socket, fifo, device, ...).
    Other,
}

/// Metadata sent ahead of one file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Filename within the synchronized directory.
    pub name: String,
    /// Content size in bytes.
    pub size: u64,
    /// File-type tag.
    pub kind: FileKind,
    /// Unix permission bits (0 on non-unix platforms).
    pub mode: u32,
}

/// Build the timestamp index of `dir`'s immediate entries.
///
/// The scan is flat: subdirectories appear as entries but their
/// contents do not.
pub fn build_timestamp_index(dir: &Path) -> Result<FileTimestampIndex, SyncError> {
    if !dir.is_dir() {
        return Err(SyncError::NotADirectory(dir.to_path_buf()));
    }

    let scan_err = |e| SyncError::Scan {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut index = FileTimestampIndex::new();
    for entry in fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| SyncError::File {
                name: name.clone(),
                source: e,
            })?;
        index.insert(name, mtime_nanos(modified));
    }
    Ok(index)
}

/// Require `name` to be a plain entry name of one directory.
///
/// Peer-supplied names are joined onto a local directory path; anything
/// other than a single normal path component (a separator, `..`, `.`,
/// or an empty name) is rejected before it reaches the filesystem.
pub(crate) fn validate_entry_name(name: &str) -> Result<(), SyncError> {
    use std::path::Component;

    let mut components = Path::new(name).components();
    let plain = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if !plain {
        return Err(SyncError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Convert a modification time to the wire representation.
pub(crate) fn mtime_nanos(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Convert a wire timestamp back to a [`SystemTime`].
pub(crate) fn mtime_from_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

#[cfg(unix)]
pub(crate) fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
pub(crate) fn mode_bits(_metadata: &fs::Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_index_missing_directory() {
        let err = build_timestamp_index(Path::new("/nonexistent/worklink")).unwrap_err();
        assert!(matches!(err, SyncError::NotADirectory(_)));
    }

    #[test]
    fn test_index_lists_immediate_entries() {
        let tmp = TempDir::new("worklink").unwrap();
        fs::write(tmp.path().join("alpha"), b"a").unwrap();
        fs::write(tmp.path().join("beta"), b"b").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("gamma"), b"c").unwrap();

        let index = build_timestamp_index(tmp.path()).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.contains_key("alpha"));
        assert!(index.contains_key("beta"));
        // The nested directory itself is an immediate entry; its
        // contents are not.
        assert!(index.contains_key("nested"));
        assert!(!index.contains_key("gamma"));
    }

    #[test]
    fn test_index_reflects_modification_time() {
        let tmp = TempDir::new("worklink").unwrap();
        let path = tmp.path().join("file");
        fs::write(&path, b"x").unwrap();

        let expected = mtime_nanos(fs::metadata(&path).unwrap().modified().unwrap());
        let index = build_timestamp_index(tmp.path()).unwrap();
        assert_eq!(index.get("file"), Some(&expected));
    }

    #[test]
    fn test_entry_name_validation() {
        validate_entry_name("case-001.bin").unwrap();
        validate_entry_name("with spaces and.dots").unwrap();

        for bad in ["../escape", "..", ".", "", "nested/name", "/absolute"] {
            let err = validate_entry_name(bad).unwrap_err();
            assert!(matches!(err, SyncError::InvalidName(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_mtime_round_trip() {
        let now = SystemTime::now();
        let nanos = mtime_nanos(now);
        assert_eq!(mtime_nanos(mtime_from_nanos(nanos)), nanos);
    }
}
