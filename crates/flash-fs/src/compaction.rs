//! Reclaiming space by copying every live record to a scratch area, erasing the filesystem
//! region, and rewriting a compact log (§4.6).
//!
//! The multi-step rewrite is made power-loss-tolerant by staging the whole compacted log in the
//! scratch area first, behind a whole-buffer CRC-32, and recording a compaction-in-progress
//! marker in the superblock before the destructive erase begins. [`FlashFs::initialize`] checks
//! that marker before doing anything else, and [`resume`] replays steps 4 through 6 below from
//! the scratch area if it finds one set.
//!
//! The scratch area's own framing — a length prefix, the records, and the trailing CRC-32 — is
//! deliberately kept entirely on the scratch device rather than partly in the main superblock:
//! unlike the superblock's single compaction-in-progress bit, the byte count varies from one
//! compaction to the next, and the scratch area (unlike the main region's superblock, which the
//! compactor can only ever clear bits of between erases) is freely erasable before every use.

use crc::{Crc, CRC_32_ISO_HDLC};
use flash_fs_device::{CriticalSection, Device};

use crate::config_constants::RECORD_ALIGN;
use crate::error::{Error, Result};
use crate::format::{align_up, flag_bits, record_len, RecordHeader, HEADER_LEN};
use crate::scanner::{scan, ScanResult};
use crate::superblock::{Superblock, SUPERBLOCK_LEN};
use crate::FlashFs;


static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Width of the scratch frame's leading record-byte-count field.
const LEN_PREFIX_LEN: u64 = 4;
/// Width of the scratch frame's trailing CRC-32.
const CRC_LEN: u64 = 4;

impl<D: Device, S: Device, C: CriticalSection> FlashFs<D, S, C> {
    /// Runs compaction now, regardless of how much trailing space remains.
    ///
    /// Ordinarily triggered automatically by [`FlashFs::store_file_data`] when the frontier would
    /// overrun the region; exposed publicly so a host can compact proactively (e.g. on an idle
    /// timer) rather than only on the write that happens to need it.
    ///
    /// # Errors
    /// [`Error::ScratchTooSmall`] if the scratch device cannot hold every currently live record.
    pub fn compact(&mut self) -> Result<()> {
        let records = self.stage_live_records_to_scratch()?;

        let marker = Superblock::in_progress();
        marker.write(&mut self.device, &mut self.critical_section, self.config.offset())?;

        self.log_event(tracing::Level::INFO, || {
            format!("compaction staged {} byte(s)", records.len())
        });

        let result = self.rewrite_main_from_scratch(&records)?;
        self.index = result.index;
        self.frontier = result.frontier;

        self.log_event(tracing::Level::INFO, || "compaction complete".to_owned());

        Ok(())
    }

    /// Builds every currently live record, re-encoded in fully committed form (no torn-write
    /// window, since the whole buffer is assembled in memory before any of it is written), laid
    /// out with no gaps in ascending original-offset order, and durably frames it onto the
    /// scratch device as `[len: u32][records...][crc32 of the foregoing: u32]`. The scratch area
    /// is erased first so the frame's bytes never depend on a prior write's bits happening to
    /// already be clear. Returns the in-memory record bytes (without the frame) for immediate use
    /// by [`rewrite_main_from_scratch`](Self::rewrite_main_from_scratch).
    fn stage_live_records_to_scratch(&mut self) -> Result<Vec<u8>> {
        let mut live = Vec::new();
        self.index.walk(|path, entry| live.push((path.to_vec(), entry.offset, entry.data_len)));
        live.sort_by_key(|&(_, offset, _)| offset);

        let total_records_len: u64 = live.iter()
            .map(|(path, _, data_len)| record_len(path.len() as u16, *data_len))
            .sum();
        let scratch_needed = LEN_PREFIX_LEN + total_records_len + CRC_LEN;

        if scratch_needed > self.scratch.capacity() {
            return Err(Error::ScratchTooSmall {
                scratch_capacity: self.scratch.capacity(),
                live_bytes: total_records_len,
            });
        }

        let mut records = Vec::with_capacity(total_records_len as usize);
        for (path, offset, data_len) in &live {
            let payload_offset = *offset
                + HEADER_LEN as u64
                + path.len() as u64
                + 1;
            let mut payload = vec![0u8; *data_len as usize];
            self.device.read(payload_offset, &mut payload).map_err(Error::Device)?;

            #[expect(clippy::cast_possible_truncation, reason = "path length bounded by max_path")]
            let mut header = RecordHeader::new(path.len() as u16, *data_len, &payload);
            header.flags &= !flag_bits::WRITTEN_COMPLETE;

            records.extend_from_slice(&header.encode());
            records.extend_from_slice(path);
            records.push(0);
            records.extend_from_slice(&payload);

            let written = HEADER_LEN as u64 + path.len() as u64 + 1 + *data_len as u64;
            let padded = align_up(written, RECORD_ALIGN);
            records.resize(records.len() + (padded - written) as usize, 0xFF);
        }

        let mut framed = Vec::with_capacity(LEN_PREFIX_LEN as usize + records.len());
        #[expect(clippy::cast_possible_truncation, reason = "bounded by scratch_needed check above")]
        framed.extend_from_slice(&(records.len() as u32).to_le_bytes());
        framed.extend_from_slice(&records);
        let crc = CRC32.checksum(&framed);

        let guard = self.critical_section.enter();
        let write_result = self.scratch.erase_region(0, self.scratch.capacity())
            .and_then(|()| self.scratch.write(0, &framed))
            .and_then(|()| self.scratch.write(framed.len() as u64, &crc.to_le_bytes()));
        self.critical_section.exit(guard);
        write_result.map_err(Error::Device)?;

        Ok(records)
    }

    /// Steps 4–6 of §4.6: erase the filesystem region, rewrite it with the compacted `records`,
    /// then write the superblock fresh. The superblock is written only after the erase and the
    /// records are both durably in place: the erase already leaves the compaction flag in its
    /// erased (idle) state, so the closing write only needs to assert the magic and version,
    /// never a 0→1 transition on a bit a plain write cannot perform.
    fn rewrite_main_from_scratch(&mut self, records: &[u8]) -> Result<ScanResult> {
        let offset = self.config.offset();
        let region_len = self.device.capacity() - offset;

        let guard = self.critical_section.enter();
        let erase_result = self.device.erase_region(offset, region_len);
        self.critical_section.exit(guard);
        erase_result.map_err(Error::Device)?;

        let guard = self.critical_section.enter();
        let write_result = self.device.write(offset + SUPERBLOCK_LEN, records);
        self.critical_section.exit(guard);
        write_result.map_err(Error::Device)?;

        let idle = Superblock::fresh();
        idle.write(&mut self.device, &mut self.critical_section, offset)?;

        scan(
            &mut self.device,
            &mut self.critical_section,
            &self.config,
            offset + SUPERBLOCK_LEN,
            self.device.capacity(),
        )
    }
}

/// Reads and validates the compaction payload currently framed on `scratch`: a little-endian
/// `u32` record-byte-count, that many bytes of compacted records, and a trailing CRC-32 covering
/// both. Returns `Ok(None)` if the frame's length doesn't fit the device or its CRC doesn't
/// match — either means the scratch write that staged it was itself interrupted.
fn read_staged_records<S: Device>(scratch: &S) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; LEN_PREFIX_LEN as usize];
    scratch.read(0, &mut len_buf).map_err(Error::Device)?;
    let records_len = u64::from(u32::from_le_bytes(len_buf));

    if LEN_PREFIX_LEN + records_len + CRC_LEN > scratch.capacity() {
        return Ok(None);
    }

    let mut framed = vec![0u8; (LEN_PREFIX_LEN + records_len) as usize];
    scratch.read(0, &mut framed).map_err(Error::Device)?;
    let mut crc_buf = [0u8; CRC_LEN as usize];
    scratch.read(LEN_PREFIX_LEN + records_len, &mut crc_buf).map_err(Error::Device)?;
    let stored_crc = u32::from_le_bytes(crc_buf);

    if CRC32.checksum(&framed) != stored_crc {
        return Ok(None);
    }

    Ok(Some(framed[LEN_PREFIX_LEN as usize..].to_vec()))
}

/// Resumes a compaction found in progress at mount time (§4.6's crash recovery).
///
/// If the scratch area's frame no longer validates (the scratch write itself was interrupted),
/// and the main region has not yet been erased, compaction is abandoned and the pre-compaction
/// log is scanned normally. If the main region *has* been erased, the filesystem state cannot be
/// recovered and [`Error::MountFailed`] is returned.
pub(crate) fn resume<D: Device, S: Device, C: CriticalSection>(
    flash_fs: &mut FlashFs<D, S, C>,
) -> Result<ScanResult> {
    if let Some(records) = read_staged_records(&flash_fs.scratch)? {
        return flash_fs.rewrite_main_from_scratch(&records);
    }

    let offset = flash_fs.config.offset();
    let main_region_erased = Superblock::region_is_erased(&flash_fs.device, offset + SUPERBLOCK_LEN)?;

    if main_region_erased {
        return Err(Error::MountFailed { offset });
    }

    // Erase hadn't begun: the pre-compaction log is intact. Abandon this attempt.
    let idle = Superblock::fresh();
    idle.write(&mut flash_fs.device, &mut flash_fs.critical_section, offset)?;
    scan(
        &mut flash_fs.device,
        &mut flash_fs.critical_section,
        &flash_fs.config,
        offset + SUPERBLOCK_LEN,
        flash_fs.device.capacity(),
    )
}
