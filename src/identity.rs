//! Stable file identity: the `(device id, inode-or-equivalent)` pair that
//! survives a rename within one filesystem (spec.md Glossary).
//!
//! Grounded on the `file-id` crate's `FileId` enum from the retrieval pack
//! (`notify-rs-notify/file-id/src/lib.rs`), reconstructed inline here since
//! this crate is a single package rather than a workspace with `file-id` as
//! a separate member.

use std::fs;
use std::io;
use std::path::Path;

/// A stable identifier for a file or directory on one machine, for as long
/// as the underlying inode/device pair is not reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    /// Device id + inode number, available on all Unix-like platforms.
    Inode { device_id: u64, inode_number: u64 },
    /// Volume serial number + file index, available on Windows.
    VolumeFile {
        volume_serial_number: u64,
        file_index: u64,
    },
}

impl Identity {
    /// The device (or volume) component of this identity, used for
    /// device-isolation filtering (spec.md §4.3, "Device isolation").
    pub fn device_id(&self) -> u64 {
        match self {
            Identity::Inode { device_id, .. } => *device_id,
            Identity::VolumeFile {
                volume_serial_number,
                ..
            } => *volume_serial_number,
        }
    }

    /// Reduces this identity to its inode-or-equivalent component alone,
    /// dropping the device/volume component. Used by the "ignore-device"
    /// snapshot option (spec.md §4.3) so that entries surviving a device-id
    /// reassignment aren't spuriously reported as deleted+created.
    pub fn ignoring_device(&self) -> Identity {
        match self {
            Identity::Inode { inode_number, .. } => Identity::Inode {
                device_id: 0,
                inode_number: *inode_number,
            },
            Identity::VolumeFile { file_index, .. } => Identity::VolumeFile {
                volume_serial_number: 0,
                file_index: *file_index,
            },
        }
    }
}

/// Reads the stable identity of `path`, following symlinks per the standard
/// library's `metadata` (callers wanting link-following control should
/// `lstat`/`symlink_metadata` separately, as [`crate::snapshot`] does).
#[cfg(unix)]
pub fn identity_of(metadata: &fs::Metadata) -> Identity {
    use std::os::unix::fs::MetadataExt;
    Identity::Inode {
        device_id: metadata.dev(),
        inode_number: metadata.ino(),
    }
}

#[cfg(windows)]
pub fn identity_of(_metadata: &fs::Metadata) -> Identity {
    // Windows file IDs require an open handle (GetFileInformationByHandle);
    // `std::fs::Metadata` doesn't expose one portably pre-1.0 MSRV bumps, so
    // the Windows backend (C11) resolves identity via `windows.rs` directly
    // rather than through this helper. Kept here only so generic snapshot
    // code compiles on every platform.
    Identity::VolumeFile {
        volume_serial_number: 0,
        file_index: 0,
    }
}

/// Convenience: stat `path` (following symlinks) and extract its identity.
pub fn identity_of_path(path: &Path) -> io::Result<Identity> {
    let metadata = fs::metadata(path)?;
    Ok(identity_of(&metadata))
}
