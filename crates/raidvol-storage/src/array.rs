//! Physical disk set
//!
//! Holds the member disks of the volume by physical id (`1..=N`) and
//! validates ids before any transfer.

use crate::device::BlockDevice;
use crate::mem::MemDisk;
use crate::raw_io::FileDisk;
use raidvol_common::{DiskId, Error, FIRST_DISK, RaidConfig, Result};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed set of physical disks sharing one geometry
pub struct DiskArray {
    disks: Vec<Arc<dyn BlockDevice>>,
    block_size: usize,
    blocks_per_disk: u64,
}

impl DiskArray {
    /// Build an array from devices ordered by disk id
    ///
    /// All devices must share the same block size and block count.
    pub fn new(disks: Vec<Arc<dyn BlockDevice>>) -> Result<Self> {
        let first = disks
            .first()
            .ok_or_else(|| Error::config("disk array needs at least one disk"))?;
        let block_size = first.block_size();
        let blocks_per_disk = first.block_count();

        for disk in &disks {
            if disk.block_size() != block_size || disk.block_count() != blocks_per_disk {
                return Err(Error::config(format!(
                    "disk {} has geometry {}x{}, expected {}x{}",
                    disk.name(),
                    disk.block_count(),
                    disk.block_size(),
                    blocks_per_disk,
                    block_size
                )));
            }
        }

        Ok(Self {
            disks,
            block_size,
            blocks_per_disk,
        })
    }

    /// Array of sparse in-memory disks
    ///
    /// The concrete disks are returned alongside so callers can inspect
    /// them or inject faults.
    pub fn in_memory(
        count: u32,
        block_size: usize,
        blocks_per_disk: u64,
    ) -> Result<(Self, Vec<Arc<MemDisk>>)> {
        let mems: Vec<Arc<MemDisk>> = (FIRST_DISK..FIRST_DISK + count)
            .map(|id| Arc::new(MemDisk::new(format!("mem{id}"), block_size, blocks_per_disk)))
            .collect();
        let disks = mems
            .iter()
            .map(|m| Arc::clone(m) as Arc<dyn BlockDevice>)
            .collect();
        Ok((Self::new(disks)?, mems))
    }

    /// Open (creating where missing) the file-backed disks named by `config`
    pub fn open_files(config: &RaidConfig) -> Result<Self> {
        config.validate()?;

        let mut disks: Vec<Arc<dyn BlockDevice>> = Vec::with_capacity(config.disk_count as usize);
        for id in FIRST_DISK..=config.last_disk() {
            let path = config.disk_path(id);
            let disk = FileDisk::open_or_create(&path, config.disk_size, config.block_size as usize)?;
            debug!("Opened disk {} at {}", id, path.display());
            disks.push(Arc::new(disk));
        }

        let array = Self::new(disks)?;
        info!(
            "Opened {} disks of {} blocks in {}",
            array.len(),
            array.blocks_per_disk(),
            config.disk_dir.display()
        );
        Ok(array)
    }

    /// Number of physical disks
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> u32 {
        self.disks.len() as u32
    }

    /// Check if the array has no disks
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// Valid physical disk ids
    pub fn ids(&self) -> RangeInclusive<DiskId> {
        FIRST_DISK..=self.len()
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Blocks per disk, including the superblock
    pub fn blocks_per_disk(&self) -> u64 {
        self.blocks_per_disk
    }

    /// Fail with `InvalidDisk` unless `id` names a member disk
    pub fn check(&self, id: DiskId) -> Result<()> {
        if self.ids().contains(&id) {
            Ok(())
        } else {
            Err(Error::InvalidDisk(id))
        }
    }

    /// Get a member disk
    pub fn disk(&self, id: DiskId) -> Result<&Arc<dyn BlockDevice>> {
        self.check(id)?;
        Ok(&self.disks[(id - FIRST_DISK) as usize])
    }

    /// Read one block from a member disk
    pub fn read(&self, id: DiskId, block: u64, buf: &mut [u8]) -> Result<()> {
        self.disk(id)?.read_block(block, buf)
    }

    /// Write one block to a member disk
    pub fn write(&self, id: DiskId, block: u64, buf: &[u8]) -> Result<()> {
        self.disk(id)?.write_block(block, buf)
    }

    /// Allocate a zeroed block buffer
    pub fn block_buf(&self) -> Vec<u8> {
        vec![0u8; self.block_size]
    }

    /// Flush every member disk
    pub fn sync_all(&self) -> Result<()> {
        for disk in &self.disks {
            disk.sync()?;
        }
        Ok(())
    }
}
