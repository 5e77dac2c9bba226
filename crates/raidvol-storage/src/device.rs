//! Block device abstraction
//!
//! The RAID engine talks to physical disks only through [`BlockDevice`]:
//! synchronous transfer of exactly one fixed-size block. A failure always
//! means a hardware or transport problem, never a logical one.

use raidvol_common::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// A physical disk addressed in fixed-size blocks
pub trait BlockDevice: Send + Sync {
    /// Block size in bytes
    fn block_size(&self) -> usize;

    /// Number of blocks on the device
    fn block_count(&self) -> u64;

    /// Read one block into `buf`
    ///
    /// `buf` must be exactly one block long.
    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<()>;

    /// Write one block from `buf`
    ///
    /// `buf` must be exactly one block long.
    fn write_block(&self, block: u64, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Human readable name for logs
    fn name(&self) -> String;

    /// I/O statistics
    fn stats(&self) -> &DiskStats;
}

/// Check a transfer against the device geometry
pub(crate) fn check_transfer(
    device: &dyn BlockDevice,
    block: u64,
    len: usize,
) -> Result<()> {
    if len != device.block_size() {
        return Err(Error::BufferSize {
            expected: device.block_size(),
            actual: len,
        });
    }
    if block >= device.block_count() {
        return Err(Error::storage(format!(
            "block {} exceeds {} blocks on {}",
            block,
            device.block_count(),
            device.name()
        )));
    }
    Ok(())
}

/// Disk statistics
#[derive(Debug, Default)]
pub struct DiskStats {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
}

impl DiskStats {
    pub(crate) fn record_read(&self, bytes: usize, ok: bool) {
        if ok {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        } else {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_write(&self, bytes: usize, ok: bool) {
        if ok {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        } else {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of successful block reads
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful block writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}
