//! Appending and invalidating records (§4.5). `append_record` is the low-level primitive shared
//! by [`FlashFs::store_file_data`], the compactor's rewrite pass, and the scanner's test fixtures;
//! everything else in this module is the higher-level policy layered on top of it.

use flash_fs_device::{CriticalSection, Device};

use crate::error::{Error, Result};
use crate::format::{flag_bits, RecordHeader, HEADER_LEN};
use crate::index::IndexEntry;
use crate::FlashFs;


/// Writes one record at `offset`: header with every flag asserted, then name, NUL, payload, and
/// alignment padding in a single write, followed by the separate commit write that clears
/// `written_complete`. Returns the offset just past the record (the new frontier, if this was the
/// last record appended).
///
/// This function does not touch the index, does not invalidate any prior record, and does not
/// check available space; callers are responsible for all three.
pub(crate) fn append_record<D: Device, C: CriticalSection>(
    device:           &mut D,
    critical_section: &mut C,
    offset:           u64,
    path:             &[u8],
    payload:          &[u8],
) -> Result<u64> {
    #[expect(clippy::cast_possible_truncation, reason = "caller validates path/payload lengths")]
    let header = RecordHeader::new(path.len() as u16, payload.len() as u16, payload);
    let record_len = header.total_len();

    let mut buf = Vec::with_capacity(record_len as usize);
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(path);
    buf.push(0); // NUL terminator
    buf.extend_from_slice(payload);
    buf.resize(record_len as usize, 0xFF); // alignment padding, left erased

    write_guarded(device, critical_section, offset, &buf)?;

    // Commit: clear `written_complete` as a distinct, final write.
    let flags_buf = [flag_bits::ALL_ASSERTED & !flag_bits::WRITTEN_COMPLETE];
    write_guarded(device, critical_section, offset + 6, &flags_buf)?;

    Ok(offset + record_len)
}

/// Clears the `invalidated` bit of the record at `offset`, retiring it.
pub(crate) fn invalidate_record<D: Device, C: CriticalSection>(
    device:           &mut D,
    critical_section: &mut C,
    offset:           u64,
) -> Result<()> {
    let flags_offset = offset + 6;
    let mut flags_buf = [0u8; 1];
    device.read(flags_offset, &mut flags_buf).map_err(Error::Device)?;
    flags_buf[0] &= !flag_bits::INVALIDATED;
    write_guarded(device, critical_section, flags_offset, &flags_buf)
}

fn write_guarded<D: Device, C: CriticalSection>(
    device:           &mut D,
    critical_section: &mut C,
    offset:           u64,
    buf:              &[u8],
) -> Result<()> {
    let guard = critical_section.enter();
    let result = device.write(offset, buf);
    critical_section.exit(guard);
    result.map_err(Error::Device)
}

impl<D: Device, S: Device, C: CriticalSection> FlashFs<D, S, C> {
    /// Creates or overwrites the file at `path` with `bytes`.
    ///
    /// Runs compaction automatically if there is not enough trailing space, then retries once.
    ///
    /// # Errors
    /// [`Error::PathTooLong`] if `path` exceeds [`FsConfig::max_path`](crate::FsConfig::max_path).
    /// [`Error::PayloadTooLong`] if `bytes` exceeds `u16::MAX`, the width of a record's `data_len`.
    /// [`Error::IndexFull`] if `path` is new and the index is already at capacity.
    /// [`Error::OutOfSpace`] if compaction could not free enough room.
    pub fn store_file_data(&mut self, path: &[u8], bytes: &[u8]) -> Result<()> {
        if path.len() > usize::from(self.config.max_path()) {
            return Err(Error::PathTooLong { len: path.len(), max: self.config.max_path() });
        }
        if bytes.len() > usize::from(u16::MAX) {
            return Err(Error::PayloadTooLong { len: bytes.len() });
        }
        if self.index.is_full_for_new_path(path) {
            return Err(Error::IndexFull { capacity: self.config.max_index_entries });
        }

        #[expect(clippy::cast_possible_truncation, reason = "path length checked above")]
        let record_len = crate::format::record_len(path.len() as u16, bytes.len() as u16);

        if self.frontier + record_len > self.region_end() {
            self.compact()?;

            if self.frontier + record_len > self.region_end() {
                return Err(Error::OutOfSpace {
                    requested: record_len,
                    available: self.region_end().saturating_sub(self.frontier),
                });
            }
        }

        let prior = self.index.lookup(path);

        let new_offset = self.frontier;
        self.frontier = append_record(
            &mut self.device,
            &mut self.critical_section,
            self.frontier,
            path,
            bytes,
        )?;

        if let Some(prior) = prior {
            invalidate_record(&mut self.device, &mut self.critical_section, prior.offset)?;
        }

        #[expect(clippy::cast_possible_truncation, reason = "path length checked above")]
        let data_len = bytes.len() as u16;
        self.index.insert(path, IndexEntry { offset: new_offset, data_len });

        self.log_event(tracing::Level::DEBUG, || {
            format!("stored {} byte(s) at {path:?}", bytes.len())
        });

        Ok(())
    }

    /// Removes the file at `path`, if present. A subsequent read sees zero bytes.
    pub fn unlink_file(&mut self, path: &[u8]) -> Result<()> {
        if let Some(entry) = self.index.lookup(path) {
            invalidate_record(&mut self.device, &mut self.critical_section, entry.offset)?;
            self.index.remove(path);
            self.log_event(tracing::Level::DEBUG, || format!("unlinked {path:?}"));
        }
        Ok(())
    }

    #[must_use]
    pub(crate) fn region_end(&self) -> u64 {
        self.device.capacity()
    }
}
