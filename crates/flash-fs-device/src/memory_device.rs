//! An in-memory [`Device`] backed by a `Vec<u8>`, for tests and host-side tooling.

use crate::{error::DeviceError, traits::Device};


/// A [`Device`] whose storage lives in a heap-allocated buffer rather than on real hardware.
///
/// The buffer is initialized to `0xFF` (the erased state most flash and SRAM parts power up or
/// settle into), and [`erase_region`](Device::erase_region) restores that value rather than
/// zeroing it, matching the convention `flash-fs` assumes throughout.
///
/// `MemoryDevice` does not model the "only 1→0 transitions stick" constraint real flash imposes;
/// a write here simply overwrites the targeted bytes. Tests that need to catch a caller writing
/// over live data without erasing first should check for that separately.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    bytes: Vec<u8>,
}

impl MemoryDevice {
    /// Creates a device of `capacity` bytes, every byte initialized to `0xFF`.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            bytes: vec![0xFF; usize::try_from(capacity).unwrap_or(usize::MAX)],
        }
    }

    /// Returns the full backing buffer, for tests that want to inspect raw device contents.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<(usize, usize), DeviceError> {
        let capacity = self.capacity();
        let end = offset.checked_add(len).ok_or(DeviceError::OutOfRange {
            offset,
            len,
            capacity,
        })?;
        if end > capacity {
            return Err(DeviceError::OutOfRange {
                offset,
                len,
                capacity,
            });
        }
        // The checked_add above plus the `end > capacity` check bound both `offset` and `end`
        // within `self.bytes.len()`, which fits in a usize since the buffer was allocated from it.
        #[expect(clippy::cast_possible_truncation, reason = "bounded above by self.bytes.len()")]
        Ok((offset as usize, end as usize))
    }
}

impl Device for MemoryDevice {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        let (start, end) = self.check_range(offset, buf.len() as u64)?;
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<(), DeviceError> {
        let (start, end) = self.check_range(offset, buf.len() as u64)?;
        self.bytes[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn erase_region(&mut self, offset: u64, len: u64) -> Result<(), DeviceError> {
        let (start, end) = self.check_range(offset, len)?;
        self.bytes[start..end].fill(0xFF);
        Ok(())
    }

    #[inline]
    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_device_reads_as_erased() {
        let device = MemoryDevice::new(64);
        let mut buf = [0u8; 64];
        device.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut device = MemoryDevice::new(16);
        device.write(4, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        device.read(4, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn erase_region_restores_erased_state() {
        let mut device = MemoryDevice::new(16);
        device.write(0, &[1, 2, 3, 4]).unwrap();
        device.erase_region(0, 4).unwrap();
        let mut buf = [0u8; 4];
        device.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let device = MemoryDevice::new(16);
        let mut buf = [0u8; 4];
        assert_eq!(
            device.read(15, &mut buf),
            Err(DeviceError::OutOfRange {
                offset: 15,
                len: 4,
                capacity: 16,
            })
        );
    }

    #[test]
    fn offset_overflow_is_rejected_not_panicking() {
        let device = MemoryDevice::new(16);
        let mut buf = [0u8; 4];
        assert!(device.read(u64::MAX, &mut buf).is_err());
    }
}
