//! raidvol Storage - Physical disks
//!
//! This crate implements the physical side of raidvol including:
//! - The `BlockDevice` abstraction (one fixed-size block per transfer)
//! - File-backed and sparse in-memory disks
//! - The member disk set addressed by physical id
//! - The superblock replica stored in block 0 of every disk

pub mod array;
pub mod device;
pub mod layout;
pub mod mem;
pub mod raw_io;

// Re-exports
pub use array::DiskArray;
pub use device::{BlockDevice, DiskStats};
pub use layout::{FIRST_DATA_BLOCK, SUPERBLOCK_BLOCK, SUPERBLOCK_LEN, Superblock};
pub use mem::MemDisk;
pub use raw_io::FileDisk;
