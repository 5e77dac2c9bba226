//! Error types for raidvol
//!
//! This module defines the error taxonomy shared by the storage backends,
//! the RAID engine and the numeric entry points.

use crate::types::{DiskId, LogicalBlock, RaidLevel};
use thiserror::Error;

/// Common result type for raidvol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for raidvol
#[derive(Debug, Error)]
pub enum Error {
    // Argument errors
    #[error("invalid disk id: {0}")]
    InvalidDisk(DiskId),

    #[error("invalid RAID level: {0}")]
    InvalidLevel(u32),

    #[error("insufficient disks for {level}: have {available}, need {required}")]
    InsufficientDisks {
        level: RaidLevel,
        available: u32,
        required: u32,
    },

    #[error("block {block} is out of range (max {max})")]
    OutOfRange { block: LogicalBlock, max: u64 },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    #[error("bad user address: {0:#x}")]
    BadAddress(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Volume state errors
    #[error("RAID volume is not initialized")]
    VolumeNotInitialized,

    #[error("corrupt superblock: {0}")]
    CorruptSuperblock(String),

    #[error("all disks have failed")]
    AllDisksFailed,

    // Redundancy errors
    #[error("data lost: no healthy copy of block {block}")]
    DataLost { block: LogicalBlock },

    #[error("disk {disk} cannot be recovered: {reason}")]
    Unrecoverable { disk: DiskId, reason: String },

    // I/O errors
    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unrecoverable error for the given disk
    pub fn unrecoverable(disk: DiskId, reason: impl Into<String>) -> Self {
        Self::Unrecoverable {
            disk,
            reason: reason.into(),
        }
    }

    /// Check if this error was reported by the physical I/O layer
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::DiskIo(_) | Self::Storage(_))
    }

    /// Check if redundancy could not satisfy the request
    #[must_use]
    pub const fn is_data_loss(&self) -> bool {
        matches!(self, Self::DataLost { .. } | Self::Unrecoverable { .. })
    }

    /// Negative status code returned by the numeric entry points
    #[must_use]
    pub const fn errno(&self) -> i64 {
        match self {
            Self::OutOfRange { .. } => -1,
            Self::VolumeNotInitialized => -2,
            Self::InvalidLevel(_) => -3,
            Self::InsufficientDisks { .. } => -4,
            Self::InvalidDisk(_) => -5,
            Self::DataLost { .. } => -6,
            Self::Unrecoverable { .. } => -7,
            Self::DiskIo(_) | Self::Storage(_) => -8,
            Self::CorruptSuperblock(_) => -9,
            Self::BufferSize { .. } | Self::BadAddress(_) | Self::InvalidArgument(_) => -10,
            Self::AllDisksFailed => -11,
            Self::Configuration(_) => -12,
        }
    }
}
