//! The boot-time log walk: validates every record from the start of the log to the frontier,
//! rebuilds the path index, and heals any duplicate-live-record inconsistency left by a crash
//! between a write's commit and its invalidation of the prior version (§4.3, §4.5).

use flash_fs_device::{CriticalSection, Device};

use crate::config_constants::FsConfig;
use crate::error::{Error, Result};
use crate::format::{flag_bits, payload_crc, RecordHeader, RecordStatus, HEADER_LEN};
use crate::index::{IndexEntry, PathIndex};


/// The outcome of walking a region's log from just past the superblock.
pub(crate) struct ScanResult {
    pub(crate) index:    PathIndex,
    pub(crate) frontier: u64,
}

/// Walks records starting at `start` (the first byte after the superblock) up to `region_end`,
/// populating a fresh [`PathIndex`] and returning the frontier offset: the first aligned position
/// whose header reads as the end-of-log sentinel, or `region_end` if the region is entirely full
/// of records.
pub(crate) fn scan<D: Device, C: CriticalSection>(
    device:           &mut D,
    critical_section: &mut C,
    config:           &FsConfig,
    start:            u64,
    region_end:       u64,
) -> Result<ScanResult> {
    let mut index = PathIndex::new(config.max_index_entries, config.bloom_bits);
    let mut pos = start;

    while pos + HEADER_LEN as u64 <= region_end {
        let mut header_buf = [0u8; HEADER_LEN];
        device.read(pos, &mut header_buf).map_err(Error::Device)?;
        let header = RecordHeader::decode(&header_buf);

        if header.is_end_of_log() {
            break;
        }

        // A header whose declared lengths don't fit in the remaining region can't be trusted any
        // further; treat this position as the frontier rather than risk walking off into
        // unrelated memory with a garbage length.
        if header.name_len > config.max_path
            || pos + header.total_len() > region_end
        {
            break;
        }

        let record_len = header.total_len();
        let name_start = pos + HEADER_LEN as u64;
        let mut name_buf = vec![0u8; header.name_len as usize + 1];
        device.read(name_start, &mut name_buf).map_err(Error::Device)?;

        let payload_start = name_start + name_buf.len() as u64;
        let mut payload = vec![0u8; header.data_len as usize];
        device.read(payload_start, &mut payload).map_err(Error::Device)?;

        let mut status = header.status();
        if status == RecordStatus::Live && payload_crc(&payload) != header.crc {
            status = RecordStatus::Dead;
        }

        if status == RecordStatus::Live {
            // Trim the trailing NUL before treating the bytes as a path.
            let path = &name_buf[..name_buf.len() - 1];

            if let Some(prior) = index.lookup(path) {
                heal_duplicate(device, critical_section, prior.offset)?;
            }

            index.insert(path, IndexEntry { offset: pos, data_len: header.data_len });
        }

        pos += record_len;
    }

    Ok(ScanResult { index, frontier: pos })
}

/// Clears the `invalidated` bit of the record at `prior_offset`, healing the log after a crash
/// left two live records for the same path (the higher-offset one, discovered later in the scan,
/// wins; see §4.3's recovery rule).
fn heal_duplicate<D: Device, C: CriticalSection>(
    device:           &mut D,
    critical_section: &mut C,
    prior_offset:     u64,
) -> Result<()> {
    let flags_offset = prior_offset + 6; // byte 6 of the header is `flags`
    let mut flags_buf = [0u8; 1];
    device.read(flags_offset, &mut flags_buf).map_err(Error::Device)?;
    flags_buf[0] &= !flag_bits::INVALIDATED;

    let guard = critical_section.enter();
    let result = device.write(flags_offset, &flags_buf);
    critical_section.exit(guard);
    result.map_err(Error::Device)
}

#[cfg(test)]
mod tests {
    use flash_fs_device::{MemoryDevice, NoopCriticalSection};

    use super::*;
    use crate::superblock::SUPERBLOCK_LEN;
    use crate::writer::append_record;

    fn fresh(capacity: u64) -> (MemoryDevice, NoopCriticalSection, FsConfig) {
        (MemoryDevice::new(capacity), NoopCriticalSection, FsConfig::new(0, capacity))
    }

    #[test]
    fn empty_region_scans_to_frontier_at_superblock_end() {
        let (mut device, mut cs, config) = fresh(256);
        let result = scan(&mut device, &mut cs, &config, SUPERBLOCK_LEN, device.capacity()).unwrap();
        assert_eq!(result.frontier, SUPERBLOCK_LEN);
        assert_eq!(result.index.len(), 0);
    }

    #[test]
    fn single_live_record_is_indexed_and_frontier_advances() {
        let (mut device, mut cs, config) = fresh(256);
        let end = append_record(&mut device, &mut cs, SUPERBLOCK_LEN, b"/a.txt", b"hi").unwrap();

        let result = scan(&mut device, &mut cs, &config, SUPERBLOCK_LEN, device.capacity()).unwrap();
        assert_eq!(result.frontier, end);
        assert_eq!(result.index.len(), 1);
        let entry = result.index.lookup(b"/a.txt").unwrap();
        assert_eq!(entry.data_len, 2);
    }

    #[test]
    fn duplicate_live_records_heal_to_higher_offset() {
        let (mut device, mut cs, config) = fresh(256);
        let after_first = append_record(&mut device, &mut cs, SUPERBLOCK_LEN, b"/a.txt", b"v1").unwrap();
        // Simulate a crash between committing the new record and invalidating the old one: write
        // a second live record for the same path without clearing the first's `invalidated` bit.
        append_record(&mut device, &mut cs, after_first, b"/a.txt", b"v2").unwrap();

        let result = scan(&mut device, &mut cs, &config, SUPERBLOCK_LEN, device.capacity()).unwrap();
        assert_eq!(result.index.len(), 1);
        let entry = result.index.lookup(b"/a.txt").unwrap();
        assert_eq!(entry.offset, after_first);
    }
}
