//! The fixed record at the start of a mounted region: magic, version, and the compaction-in-
//! progress marker that makes the compactor's multi-step rewrite (§ compaction module docs)
//! resumable after a power loss.
//!
//! The superblock itself carries only the flag bit §6 documents (plus magic/version/padding);
//! the byte count of whatever is staged in the scratch area lives in the scratch area itself
//! (see `compaction::read_staged_records`), since that area can be erased and freely rewritten
//! while the superblock's own bytes, once cleared, cannot be set back without another erase.

use flash_fs_device::{CriticalSection, Device};

use crate::config_constants::{SUPERBLOCK_MAGIC, SUPERBLOCK_VERSION};
use crate::error::{Error, Result};


/// On-disk length of the superblock: magic (4) + version (1) + compaction flag (1) +
/// reserved (2), already a multiple of [`RECORD_ALIGN`](crate::config_constants::RECORD_ALIGN).
pub(crate) const SUPERBLOCK_LEN: u64 = 8;

/// `0xFF` (asserted/erased) means no compaction is in flight; cleared to `0x00` once the
/// compactor has durably staged the scratch copy. Only an erase can set this back to `0xFF`, so
/// the compactor never attempts to clear it back to idle by writing over it directly — see
/// `compaction::rewrite_main_from_scratch`, which relies on the region erase it performs to leave
/// this byte erased rather than writing `0xFF` over a `0x00`.
const COMPACTION_IDLE: u8 = 0xFF;
const COMPACTION_IN_PROGRESS: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Superblock {
    pub(crate) magic:           u32,
    pub(crate) version:         u8,
    pub(crate) compaction_flag: u8,
}

impl Superblock {
    #[must_use]
    pub(crate) const fn fresh() -> Self {
        Self {
            magic: SUPERBLOCK_MAGIC,
            version: SUPERBLOCK_VERSION,
            compaction_flag: COMPACTION_IDLE,
        }
    }

    /// A superblock recording that compaction has durably staged its payload in the scratch area
    /// and must be resumed from there if mount is interrupted.
    #[must_use]
    pub(crate) const fn in_progress() -> Self {
        Self {
            magic: SUPERBLOCK_MAGIC,
            version: SUPERBLOCK_VERSION,
            compaction_flag: COMPACTION_IN_PROGRESS,
        }
    }

    #[must_use]
    pub(crate) const fn is_valid_magic_and_version(&self) -> bool {
        self.magic == SUPERBLOCK_MAGIC && self.version == SUPERBLOCK_VERSION
    }

    /// Whether the magic tag identifies this region as a `flash-fs` region at all, regardless of
    /// whether its version is one this build understands. Distinguishes "known format, stale
    /// version" (§4.3 step 2: reinitialize) from "not a superblock at all" (step 4: fail unless
    /// recognizably erased).
    #[must_use]
    pub(crate) const fn has_flash_fs_magic(&self) -> bool {
        self.magic == SUPERBLOCK_MAGIC
    }

    #[must_use]
    pub(crate) const fn compaction_in_progress(&self) -> bool {
        self.compaction_flag == COMPACTION_IN_PROGRESS
    }

    pub(crate) fn encode(&self) -> [u8; SUPERBLOCK_LEN as usize] {
        let mut buf = [0u8; SUPERBLOCK_LEN as usize];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4] = self.version;
        buf[5] = self.compaction_flag;
        // buf[6..8] reserved, left zeroed
        buf
    }

    pub(crate) fn decode(buf: &[u8; SUPERBLOCK_LEN as usize]) -> Self {
        Self {
            magic:           u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            version:         buf[4],
            compaction_flag: buf[5],
        }
    }

    pub(crate) fn read<D: Device>(device: &D, offset: u64) -> Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_LEN as usize];
        device.read(offset, &mut buf).map_err(Error::Device)?;
        Ok(Self::decode(&buf))
    }

    pub(crate) fn write<D: Device, C: CriticalSection>(
        &self,
        device: &mut D,
        critical_section: &mut C,
        offset: u64,
    ) -> Result<()> {
        let buf = self.encode();
        let guard = critical_section.enter();
        let result = device.write(offset, &buf);
        critical_section.exit(guard);
        result.map_err(Error::Device)
    }

    /// Whether every byte from `offset` to the end of the device reads as erased (`0xFF`), i.e.
    /// the whole region has never been touched.
    ///
    /// Checking only the superblock's own bytes would pass for a region that was zeroed (or
    /// otherwise clobbered) everywhere past that window, which is exactly the "partially written,
    /// no valid superblock" case §4.3 requires to fail mount rather than silently look fresh; this
    /// scans the whole candidate region instead of just the superblock's footprint.
    pub(crate) fn region_is_erased<D: Device>(device: &D, offset: u64) -> Result<bool> {
        const CHUNK_LEN: usize = 64;

        let mut remaining = device.capacity().saturating_sub(offset);
        let mut cursor = offset;
        let mut buf = [0u8; CHUNK_LEN];

        while remaining > 0 {
            #[expect(clippy::cast_possible_truncation, reason = "bounded by CHUNK_LEN")]
            let len = remaining.min(CHUNK_LEN as u64) as usize;
            device.read(cursor, &mut buf[..len]).map_err(Error::Device)?;
            if buf[..len].iter().any(|&b| b != 0xFF) {
                return Ok(false);
            }
            cursor += len as u64;
            remaining -= len as u64;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let sb = Superblock::in_progress();
        assert_eq!(sb, Superblock::decode(&sb.encode()));
    }

    #[test]
    fn fresh_is_valid_and_idle() {
        let sb = Superblock::fresh();
        assert!(sb.is_valid_magic_and_version());
        assert!(!sb.compaction_in_progress());
    }

    #[test]
    fn in_progress_is_valid_and_not_idle() {
        let sb = Superblock::in_progress();
        assert!(sb.is_valid_magic_and_version());
        assert!(sb.compaction_in_progress());
    }
}
