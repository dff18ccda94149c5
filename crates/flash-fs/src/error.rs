use std::result::Result as StdResult;

use thiserror::Error;

use flash_fs_device::DeviceError;


/// The result type returned by every fallible operation in this crate.
pub type Result<T> = StdResult<T, Error>;

/// A caller-visible error from the filesystem's public API.
///
/// Conditions the scanner heals on its own — a torn write, a CRC mismatch — are not represented
/// here; by the time a caller can observe a `Result`, those records have already been treated as
/// dead. See the crate-level docs for the boundary between a propagated `Error` and an internally
/// healed inconsistency.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A [`Device`](flash_fs_device::Device) primitive failed.
    #[error("device fault: {0}")]
    Device(#[from] DeviceError),

    /// `store_file_data` could not free enough trailing space even after compaction ran.
    #[error("out of space: {requested} byte(s) requested, {available} available after compaction")]
    OutOfSpace {
        requested: u64,
        available:  u64,
    },

    /// The superblock was unreadable or corrupt, and the region was not recognizably erased.
    #[error("mount failed: region at offset {offset} is neither a valid superblock nor erased")]
    MountFailed {
        offset: u64,
    },

    /// A path exceeded [`FsConfig::max_path`](crate::config_constants::FsConfig::max_path).
    #[error("path of {len} byte(s) exceeds the configured maximum of {max}")]
    PathTooLong {
        len: usize,
        max: u16,
    },

    /// A payload exceeded `data_len`'s 16-bit range (§3's record codec).
    #[error("payload of {len} byte(s) exceeds the maximum of {max} representable by a record's data_len", max = u16::MAX)]
    PayloadTooLong {
        len: usize,
    },

    /// The index is at `max_index_entries` and the path being stored is not already present.
    #[error("index is full at {capacity} entries")]
    IndexFull {
        capacity: usize,
    },

    /// The scratch device supplied for compaction is smaller than the live-byte count it would
    /// need to hold.
    #[error("scratch area of {scratch_capacity} byte(s) cannot hold {live_bytes} live byte(s)")]
    ScratchTooSmall {
        scratch_capacity: u64,
        live_bytes:       u64,
    },
}

/// The outcome of [`FlashFs::initialize`](crate::FlashFs::initialize).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// The region had no valid superblock and was not recognizably erased either; it was erased
    /// and a fresh superblock was written.
    Initialized,

    /// A valid superblock of the current version was already present; the existing log was
    /// scanned and the index rebuilt from it.
    AlreadyInitialized,
}
