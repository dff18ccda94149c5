use crate::error::DeviceError;


/// The four primitives a host exposes for a byte-addressable non-volatile memory region.
///
/// A `Device` has no notion of files, paths, or records; it is a flat byte array `[0, capacity())`
/// whose erased state is `0xFF`, writable a byte at a time, and erasable only as a whole region.
/// `flash-fs` is generic over this trait so the same core runs against real flash, a
/// memory-mapped save file, or [`MemoryDevice`](crate::MemoryDevice) in tests.
///
/// Implementations are not required to be `Send` or `Sync`; the core assumes single-threaded,
/// cooperative access (see the crate-level docs of `flash-fs`).
pub trait Device {
    /// Copies `buf.len()`-many bytes from the device into `buf`, starting at `offset`.
    ///
    /// # Errors
    /// Returns [`DeviceError::OutOfRange`] if `offset + buf.len()` exceeds [`capacity`].
    ///
    /// [`capacity`]: Device::capacity
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Commits `buf` to the device at `offset`.
    ///
    /// On real flash, only 1→0 bit transitions are guaranteed to take effect; writing a 1 over
    /// an already-0 bit has no defined effect on such hardware. `flash-fs` never relies on being
    /// able to set a bit back to 1 outside of [`erase_region`].
    ///
    /// Writes are assumed durable by the time this call returns; `flash-fs` does not issue a
    /// separate flush.
    ///
    /// # Errors
    /// Returns [`DeviceError::OutOfRange`] if `offset + buf.len()` exceeds [`capacity`].
    ///
    /// [`capacity`]: Device::capacity
    /// [`erase_region`]: Device::erase_region
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<(), DeviceError>;

    /// Sets every byte in `offset..offset + len` to `0xFF`.
    ///
    /// Real hardware erases in whole sectors at a time and may be orders of magnitude slower
    /// than a write; callers should treat this as an expensive, coarse-grained operation and
    /// avoid calling it more often than the compaction protocol requires.
    ///
    /// # Errors
    /// Returns [`DeviceError::OutOfRange`] if `offset + len` exceeds [`capacity`].
    ///
    /// [`capacity`]: Device::capacity
    fn erase_region(&mut self, offset: u64, len: u64) -> Result<(), DeviceError>;

    /// The total number of addressable bytes on this device.
    fn capacity(&self) -> u64;
}

/// A capability for disabling interrupts (or otherwise fencing off concurrent access) around a
/// write or erase.
///
/// Some flash and battery-backed SRAM parts cannot tolerate any other bus activity while a write
/// or erase is in flight. On a platform with that constraint, the host's [`CriticalSection`]
/// implementation disables interrupts in [`enter`] and restores them in [`exit`]; on a desktop
/// host backed by a regular file, [`NoopCriticalSection`] is sufficient.
///
/// `flash-fs` calls [`enter`]/[`exit`] around each individual write or erase primitive, not
/// around an entire public API call, so that the duration spent with interrupts masked is as
/// short as the underlying device allows.
///
/// [`enter`]: CriticalSection::enter
/// [`exit`]: CriticalSection::exit
pub trait CriticalSection {
    /// Opaque state produced by [`enter`](CriticalSection::enter) and consumed by
    /// [`exit`](CriticalSection::exit), e.g. the previous interrupt-mask register value.
    type Guard;

    /// Disables interrupts (or the platform's equivalent) and returns state to restore them.
    fn enter(&mut self) -> Self::Guard;

    /// Restores the state captured by a prior [`enter`](CriticalSection::enter) call.
    fn exit(&mut self, guard: Self::Guard);
}

/// A [`CriticalSection`] that does nothing, for hosts (e.g. a desktop test harness) with no
/// concurrent interrupt activity to fence off.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoopCriticalSection;

impl CriticalSection for NoopCriticalSection {
    type Guard = ();

    #[inline]
    fn enter(&mut self) -> Self::Guard {}

    #[inline]
    fn exit(&mut self, (): Self::Guard) {}
}
