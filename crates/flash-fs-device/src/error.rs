use thiserror::Error;


/// An error reported by a [`Device`] primitive.
///
/// [`Device`]: crate::Device
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// A read or write addressed bytes outside `0..capacity()`.
    #[error("access of {len} byte(s) at offset {offset} exceeds device capacity {capacity}")]
    OutOfRange {
        offset:   u64,
        len:      u64,
        capacity: u64,
    },

    /// The underlying medium reported a fault (a bad sector, a bus error, and so on).
    ///
    /// `flash-fs` treats this identically regardless of which primitive failed: the operation
    /// is abandoned and no assumption is made about what, if anything, reached the medium.
    #[error("the device reported a fault")]
    MediumFault,
}
