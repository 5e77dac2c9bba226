//! In-memory block device
//!
//! Blocks are allocated on first write; unwritten blocks read back as zeros,
//! so large virtual disks cost nothing until used. Fault injection makes
//! every transfer fail, standing in for a dead disk or a broken transport.

use crate::device::{BlockDevice, DiskStats, check_transfer};
use parking_lot::RwLock;
use raidvol_common::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sparse in-memory disk
#[derive(Debug)]
pub struct MemDisk {
    name: String,
    block_size: usize,
    block_count: u64,
    blocks: RwLock<HashMap<u64, Box<[u8]>>>,
    failing: AtomicBool,
    stats: DiskStats,
}

impl MemDisk {
    /// Create a zeroed disk of `block_count` blocks
    pub fn new(name: impl Into<String>, block_size: usize, block_count: u64) -> Self {
        Self {
            name: name.into(),
            block_size,
            block_count,
            blocks: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
            stats: DiskStats::default(),
        }
    }

    /// Make every subsequent transfer fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Read a block without touching statistics or fault injection
    pub fn peek(&self, block: u64) -> Vec<u8> {
        self.blocks
            .read()
            .get(&block)
            .map_or_else(|| vec![0u8; self.block_size], |data| data.to_vec())
    }

    /// Number of blocks that have been written at least once
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.read().len()
    }

    fn check_fault(&self, op: &str, block: u64) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::DiskIo(std::io::Error::other(format!(
                "injected {op} failure on {} block {block}",
                self.name
            ))));
        }
        Ok(())
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<()> {
        check_transfer(self, block, buf.len())?;
        if let Err(e) = self.check_fault("read", block) {
            self.stats.record_read(0, false);
            return Err(e);
        }

        match self.blocks.read().get(&block) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        self.stats.record_read(buf.len(), true);
        Ok(())
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> Result<()> {
        check_transfer(self, block, buf.len())?;
        if let Err(e) = self.check_fault("write", block) {
            self.stats.record_write(0, false);
            return Err(e);
        }

        self.blocks.write().insert(block, buf.into());
        self.stats.record_write(buf.len(), true);
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn stats(&self) -> &DiskStats {
        &self.stats
    }
}
