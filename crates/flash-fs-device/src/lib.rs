//! Device and critical-section capabilities consumed by `flash-fs`.
//!
//! This crate deliberately knows nothing about records, paths, or logs; it exposes the four
//! primitives a flash or battery-backed SRAM chip actually offers (read, write, erase, capacity),
//! plus the critical-section capability a host disables interrupts for during a write or erase.
//! `flash-fs` is generic over [`Device`] so that the same core can run against real hardware,
//! a memory-mapped save file on a desktop host, or the in-memory [`MemoryDevice`] used by tests.

mod error;
mod traits;

pub mod memory_device;

pub use self::{
    error::DeviceError,
    traits::{CriticalSection, Device, NoopCriticalSection},
};
pub use self::memory_device::MemoryDevice;
