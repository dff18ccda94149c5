//! A power-loss-tolerant, log-structured filesystem for small byte-addressable flash and
//! battery-backed SRAM.
//!
//! The filesystem occupies a contiguous byte range on a host-supplied [`Device`], starting at a
//! caller-chosen offset. It offers a tiny POSIX-like surface — store a file by path, read it back,
//! delete it, enumerate the live set — on top of a medium whose only native operations are
//! "write bytes" and "erase a region to `0xFF`". See [`FlashFs`] for the entry point.
//!
//! # Example
//!
//! ```
//! use flash_fs::{FlashFs, FsConfig};
//! use flash_fs_device::MemoryDevice;
//!
//! let device = MemoryDevice::new(4096);
//! let scratch = MemoryDevice::new(4096);
//! let mut fs = FlashFs::new(device, scratch, FsConfig::new(0, 4096));
//!
//! fs.initialize().unwrap();
//! fs.store_file_data(b"/greeting.txt", b"hello, flash").unwrap();
//!
//! let mut buf = Vec::new();
//! fs.read_file_data(b"/greeting.txt", &mut buf).unwrap();
//! assert_eq!(buf, b"hello, flash");
//! ```
//!
//! # Non-goals
//!
//! Concurrent multi-writer access, hierarchical directories as a first-class concept (paths are
//! opaque byte strings that may contain `/`), file permissions, partial-file random writes,
//! append-in-place, and resistance to arbitrary media corruption beyond end-of-record detection.

mod compaction;
mod config_constants;
mod error;
mod filter;
mod format;
mod index;
mod scanner;
mod superblock;
mod writer;

pub mod info_logger;

pub use crate::config_constants::{
    FsConfig, DEFAULT_BLOOM_BITS, DEFAULT_MAX_INDEX_ENTRIES, DEFAULT_MAX_PATH,
};
pub use crate::error::{Error, InitStatus, Result};
pub use crate::info_logger::LogSink;

use flash_fs_device::{CriticalSection, Device, NoopCriticalSection};

use crate::format::{record_len, HEADER_LEN};
use crate::index::PathIndex;
use crate::info_logger::LogGate;
use crate::superblock::{Superblock, SUPERBLOCK_LEN};


/// Aggregate space usage for a mounted region, returned by [`FlashFs::statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Total on-disk footprint (header, name, payload, padding) of every currently live record.
    pub bytes_used:      u64,
    /// Bytes between the frontier and the end of the device; a ceiling on what can be appended
    /// before compaction runs, not on what compaction can eventually reclaim.
    pub bytes_available: u64,
}

/// A mounted filesystem region, generic over the main [`Device`], the scratch [`Device`] used by
/// the compactor, and the [`CriticalSection`] guarding writes and erases.
///
/// `C` defaults to [`NoopCriticalSection`] for hosts with nothing to fence off; use
/// [`FlashFs::with_critical_section`] to supply a real one.
#[derive(Debug)]
pub struct FlashFs<D: Device, S: Device, C: CriticalSection = NoopCriticalSection> {
    device:           D,
    scratch:          S,
    critical_section: C,
    config:           FsConfig,
    index:            PathIndex,
    frontier:         u64,
    log:              LogGate,
}

impl<D: Device, S: Device> FlashFs<D, S, NoopCriticalSection> {
    /// Creates an unmounted filesystem over `device`, with `scratch` reserved for compaction.
    ///
    /// Call [`initialize`](Self::initialize) before performing any other operation.
    #[must_use]
    pub fn new(device: D, scratch: S, config: FsConfig) -> Self {
        Self::with_critical_section(device, scratch, config, NoopCriticalSection)
    }
}

impl<D: Device, S: Device, C: CriticalSection> FlashFs<D, S, C> {
    /// Creates an unmounted filesystem using a caller-supplied [`CriticalSection`], for hosts that
    /// must mask interrupts around each write and erase.
    #[must_use]
    pub fn with_critical_section(
        device:           D,
        scratch:          S,
        config:           FsConfig,
        critical_section: C,
    ) -> Self {
        Self {
            device,
            scratch,
            critical_section,
            index: PathIndex::new(config.max_index_entries, config.bloom_bits),
            frontier: config.offset() + SUPERBLOCK_LEN,
            config,
            log: LogGate::new(None),
        }
    }

    /// Attaches a [`LogSink`] that receives every event this crate also reports through
    /// [`tracing`].
    #[must_use]
    pub fn with_log_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.log = LogGate::new(Some(sink));
        self
    }

    /// Overrides the [`FsConfig`] on an as-yet-unmounted filesystem, resetting the in-memory
    /// index and frontier to match. Call before [`initialize`](Self::initialize); has no effect
    /// on anything already written to the device.
    #[must_use]
    pub fn with_config(mut self, config: FsConfig) -> Self {
        self.index = PathIndex::new(config.max_index_entries, config.bloom_bits);
        self.frontier = config.offset() + SUPERBLOCK_LEN;
        self.config = config;
        self
    }

    pub(crate) fn log_event(&self, level: tracing::Level, message: impl FnOnce() -> String) {
        self.log.log_event(level, message);
    }

    /// Mounts the configured region: validates or (re)writes the superblock, resumes any
    /// compaction left in progress by a prior crash, and rebuilds the path index by scanning the
    /// log (§4.3).
    ///
    /// # Errors
    /// [`Error::MountFailed`] if the region is neither a valid superblock of the current version
    /// nor recognizably erased.
    pub fn initialize(&mut self) -> Result<InitStatus> {
        let offset = self.config.offset();
        let sb = Superblock::read(&self.device, offset)?;

        let status = if sb.is_valid_magic_and_version() {
            if sb.compaction_in_progress() {
                let result = compaction::resume(self)?;
                self.index = result.index;
                self.frontier = result.frontier;
            } else {
                self.rescan(offset)?;
            }
            InitStatus::AlreadyInitialized
        } else if sb.has_flash_fs_magic() || Superblock::region_is_erased(&self.device, offset)? {
            // Either a known region written by a prior (incompatible) version, or an untouched,
            // recognizably-erased region. Both get the same treatment: erase and start fresh.
            self.write_fresh_superblock_and_reset(offset)?;
            InitStatus::Initialized
        } else {
            return Err(Error::MountFailed { offset });
        };

        self.log_event(tracing::Level::INFO, || format!("mounted at offset {offset}: {status:?}"));
        Ok(status)
    }

    fn rescan(&mut self, offset: u64) -> Result<()> {
        let result = scanner::scan(
            &mut self.device,
            &mut self.critical_section,
            &self.config,
            offset + SUPERBLOCK_LEN,
            self.device.capacity(),
        )?;
        self.index = result.index;
        self.frontier = result.frontier;
        Ok(())
    }

    /// Erases the whole region and writes a fresh superblock. Erasing even when the region
    /// already reads as all-`0xFF` is deliberate: a region left behind by an incompatible prior
    /// version may have bits cleared to `0` that a plain write could never restore to `1` on real
    /// flash, so only an actual erase makes the "start fresh" guarantee safe to give in general.
    fn write_fresh_superblock_and_reset(&mut self, offset: u64) -> Result<()> {
        let region_len = self.device.capacity() - offset;
        let guard = self.critical_section.enter();
        let erase_result = self.device.erase_region(offset, region_len);
        self.critical_section.exit(guard);
        erase_result.map_err(Error::Device)?;

        Superblock::fresh().write(&mut self.device, &mut self.critical_section, offset)?;
        self.index.clear();
        self.frontier = offset + SUPERBLOCK_LEN;
        Ok(())
    }

    /// Appends `path`'s payload bytes to `out` and returns the number of bytes read, or `0` if
    /// `path` has no live record.
    pub fn read_file_data(&self, path: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let Some(entry) = self.index.lookup(path) else {
            return Ok(0);
        };

        let payload_offset = entry.offset + HEADER_LEN as u64 + path.len() as u64 + 1;
        let start = out.len();
        out.resize(start + entry.data_len as usize, 0);
        self.device.read(payload_offset, &mut out[start..]).map_err(Error::Device)?;
        Ok(entry.data_len as usize)
    }

    #[must_use]
    pub fn file_exists(&self, path: &[u8]) -> bool {
        self.index.lookup(path).is_some()
    }

    #[must_use]
    pub fn file_size(&self, path: &[u8]) -> u64 {
        self.index.lookup(path).map_or(0, |entry| u64::from(entry.data_len))
    }

    /// Invokes `visit` once per currently live path, in unspecified order.
    pub fn walk(&self, mut visit: impl FnMut(&[u8])) {
        self.index.walk(|path, _entry| visit(path));
    }

    /// Invokes `visit` once, with the remainder after `prefix`, for each live path that starts
    /// with `prefix` and has at least one byte beyond it — the opaque-path analogue of listing a
    /// directory. A path equal to `prefix` exactly is not visited, since there is no remainder to
    /// report.
    pub fn walk_prefix(&self, prefix: &[u8], mut visit: impl FnMut(&[u8])) {
        self.index.walk(|path, _entry| {
            if let Some(remainder) = path.strip_prefix(prefix) {
                if !remainder.is_empty() {
                    visit(remainder);
                }
            }
        });
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let mut bytes_used = 0u64;
        self.index.walk(|path, entry| {
            #[expect(clippy::cast_possible_truncation, reason = "path length bounded by max_path")]
            { bytes_used += record_len(path.len() as u16, entry.data_len); }
        });

        Statistics {
            bytes_used,
            bytes_available: self.device.capacity().saturating_sub(self.frontier),
        }
    }

    /// Unmounts the filesystem, dropping the in-memory index. The underlying device is untouched
    /// but not returned; use [`into_parts`](Self::into_parts) if the host wants it back.
    pub fn destroy(self) {}

    /// Unmounts the filesystem and hands back the main and scratch devices, discarding only the
    /// in-memory index. Useful for a host that wants to repurpose the device (or reopen it under
    /// a different [`FsConfig`]) without a round trip through real storage.
    #[must_use]
    pub fn into_parts(self) -> (D, S) {
        (self.device, self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use flash_fs_device::MemoryDevice;

    use super::*;

    fn fresh_fs(capacity: u64) -> FlashFs<MemoryDevice, MemoryDevice> {
        FlashFs::new(MemoryDevice::new(capacity), MemoryDevice::new(capacity), FsConfig::new(0, capacity))
    }

    #[test]
    fn initialize_on_erased_device_succeeds() {
        let mut fs = fresh_fs(1024);
        assert_eq!(fs.initialize().unwrap(), InitStatus::Initialized);
    }

    #[test]
    fn remount_after_writes_reports_already_initialized_and_keeps_data() {
        let mut fs = fresh_fs(1024);
        fs.initialize().unwrap();
        fs.store_file_data(b"/a.txt", b"hello").unwrap();

        assert_eq!(fs.initialize().unwrap(), InitStatus::AlreadyInitialized);
        let mut buf = Vec::new();
        fs.read_file_data(b"/a.txt", &mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn store_read_unlink_round_trip() {
        let mut fs = fresh_fs(1024);
        fs.initialize().unwrap();

        fs.store_file_data(b"/a.txt", b"v1").unwrap();
        assert!(fs.file_exists(b"/a.txt"));
        assert_eq!(fs.file_size(b"/a.txt"), 2);

        fs.unlink_file(b"/a.txt").unwrap();
        assert!(!fs.file_exists(b"/a.txt"));

        let mut buf = Vec::new();
        assert_eq!(fs.read_file_data(b"/a.txt", &mut buf).unwrap(), 0);
    }

    #[test]
    fn overwrite_is_last_writer_wins() {
        let mut fs = fresh_fs(1024);
        fs.initialize().unwrap();

        fs.store_file_data(b"/a.txt", b"v1").unwrap();
        fs.store_file_data(b"/a.txt", b"v2-longer").unwrap();

        let mut buf = Vec::new();
        fs.read_file_data(b"/a.txt", &mut buf).unwrap();
        assert_eq!(buf, b"v2-longer");
    }

    #[test]
    fn path_too_long_is_rejected() {
        let config = FsConfig::new(0, 1024).with_max_path(4);
        let mut fs = FlashFs::new(MemoryDevice::new(1024), MemoryDevice::new(1024), config);
        fs.initialize().unwrap();
        assert!(matches!(
            fs.store_file_data(b"/too/long.txt", b"x"),
            Err(Error::PathTooLong { .. })
        ));
    }

    #[test]
    fn walk_and_statistics_reflect_live_set() {
        let mut fs = fresh_fs(1024);
        fs.initialize().unwrap();
        fs.store_file_data(b"/a.txt", b"hello").unwrap();
        fs.store_file_data(b"/b.txt", b"world!").unwrap();

        let mut seen = Vec::new();
        fs.walk(|path| seen.push(path.to_vec()));
        seen.sort();
        assert_eq!(seen, vec![b"/a.txt".to_vec(), b"/b.txt".to_vec()]);

        let stats = fs.statistics();
        assert!(stats.bytes_used > 0);
        assert!(stats.bytes_available < 1024);
    }
}
