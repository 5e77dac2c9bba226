//! RAID device handle
//!
//! [`RaidDevice`] owns the disk set, the volume metadata, the health registry
//! and the volume locks, and exposes the block and administration entry
//! points. It is constructed explicitly and shared by reference; every method
//! takes `&self` and may be called from many threads.

use crate::geometry::Geometry;
use crate::health::HealthRegistry;
use crate::io::RedundancyEngine;
use crate::locks::VolumeLocks;
use crate::metadata::{MetadataManager, Volume};
use crate::recovery;
use raidvol_common::{
    DiskHealth, DiskId, Error, LogicalBlock, RaidConfig, RaidLevel, Result,
};
use raidvol_storage::{DiskArray, SUPERBLOCK_BLOCK, Superblock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Volume summary reported by [`RaidDevice::info`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidInfo {
    pub level: RaidLevel,
    pub max_blknum: u64,
    pub blk_size: u32,
    pub num_of_disks: u32,
    /// Logical blocks that map inside the data region
    pub addressable_blocks: u64,
    /// Disk whose replica the figures were read from
    pub source_disk: DiskId,
}

/// Handle to a RAID volume over a fixed disk set
pub struct RaidDevice {
    disks: Arc<DiskArray>,
    health: HealthRegistry,
    metadata: MetadataManager,
    locks: VolumeLocks,
    format_on_init: bool,
}

impl RaidDevice {
    /// Wrap an already opened disk set
    ///
    /// The disks must match the geometry in `config`. Nothing is read until
    /// the first operation needs the volume.
    pub fn new(config: &RaidConfig, disks: DiskArray) -> Result<Self> {
        config.validate()?;
        if disks.len() != config.disk_count
            || disks.block_size() != config.block_size as usize
            || disks.blocks_per_disk() != config.blocks_per_disk()
        {
            return Err(Error::config(format!(
                "disk set is {} disks of {}x{} bytes, configuration expects {} disks of {}x{} bytes",
                disks.len(),
                disks.blocks_per_disk(),
                disks.block_size(),
                config.disk_count,
                config.blocks_per_disk(),
                config.block_size
            )));
        }
        if disks.len() < 2 {
            warn!(
                "Only {} disk available, mirrored and parity levels cannot be initialized",
                disks.len()
            );
        }

        let disks = Arc::new(disks);
        Ok(Self {
            health: HealthRegistry::new(Arc::clone(&disks)),
            metadata: MetadataManager::new(Arc::clone(&disks), config.bootstrap_disk)?,
            locks: VolumeLocks::new(config.stripe_locks),
            format_on_init: config.format_on_init,
            disks,
        })
    }

    /// Open the file-backed disks named by `config`
    pub fn open(config: &RaidConfig) -> Result<Self> {
        let disks = DiskArray::open_files(config)?;
        Self::new(config, disks)
    }

    /// Member disks
    pub fn disks(&self) -> &DiskArray {
        &self.disks
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.disks.block_size()
    }

    /// Loaded volume, reading it from disk if needed
    pub fn volume(&self) -> Result<Arc<Volume>> {
        self.metadata.load()
    }

    /// Create a new volume of `level` over every disk
    ///
    /// Any previous volume is overwritten and every disk becomes healthy.
    pub fn init(&self, level: RaidLevel) -> Result<()> {
        let geometry = Geometry::plan(level, self.disks.len(), self.disks.blocks_per_disk())?;

        let _repair = self.locks.repair();
        let _gate = self.locks.rebuild_gate();

        if self.format_on_init {
            self.zero_fill()?;
        }
        self.metadata.create(geometry)?;
        self.health.seed_all(DiskHealth::Healthy);
        Ok(())
    }

    /// Read logical `block` into `buf`
    pub fn read_block(&self, block: LogicalBlock, buf: &mut [u8]) -> Result<()> {
        let volume = self.metadata.load()?;
        let placement = volume.geometry.locate(block)?;
        check_buffer(&volume, buf.len())?;
        self.engine().read(block, placement, buf)
    }

    /// Write `buf` to logical `block`
    pub fn write_block(&self, block: LogicalBlock, buf: &[u8]) -> Result<()> {
        let volume = self.metadata.load()?;
        let placement = volume.geometry.locate(block)?;
        check_buffer(&volume, buf.len())?;
        self.engine().write(block, placement, buf)
    }

    /// Mark a disk as failed
    pub fn fail_disk(&self, id: DiskId) -> Result<()> {
        self.health.set(id, DiskHealth::Unhealthy)?;
        warn!("Disk {} marked unhealthy", id);
        Ok(())
    }

    /// Rebuild a failed disk from the survivors and return it to service
    ///
    /// A healthy disk is left alone. If the volume cannot tolerate the loss
    /// the disk stays unhealthy and `Unrecoverable` is returned.
    pub fn repair_disk(&self, id: DiskId) -> Result<()> {
        if self.health.get(id)?.is_healthy() {
            debug!("Disk {} is healthy, nothing to repair", id);
            return Ok(());
        }
        let volume = self.metadata.load()?;

        let _repair = self.locks.repair();
        let _gate = self.locks.rebuild_gate();
        let mut target = self.health.lock(id)?;
        if target.health()?.is_healthy() {
            return Ok(());
        }

        let failed_others = self.health.count_failed_except(id)?;
        let plan = recovery::plan(&volume.geometry, id, failed_others)?;

        info!("Repairing disk {} ({:?})", id, plan);
        target.set(DiskHealth::Recovery)?;

        match recovery::rebuild(&self.disks, &self.health, &volume.geometry, id, plan) {
            Ok(()) => {
                target.install_replica(&volume.superblock, DiskHealth::Healthy)?;
                info!("Disk {} repaired", id);
                Ok(())
            }
            Err(e) => {
                warn!("Rebuild of disk {} aborted: {}", id, e);
                if let Err(mark) = target.set(DiskHealth::Unhealthy) {
                    warn!("Could not mark disk {} unhealthy: {}", id, mark);
                }
                Err(e)
            }
        }
    }

    /// Volume figures as recorded on the first healthy disk
    pub fn info(&self) -> Result<RaidInfo> {
        let volume = self.metadata.load()?;

        for id in self.disks.ids() {
            match self.health.get(id) {
                Ok(state) if state.is_healthy() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping disk {} for volume info: {}", id, e);
                    continue;
                }
            }

            let mut buf = self.disks.block_buf();
            let replica = self
                .disks
                .read(id, SUPERBLOCK_BLOCK, &mut buf)
                .and_then(|()| Superblock::from_bytes(&buf));
            match replica {
                Ok(Some(sb)) => {
                    return Ok(RaidInfo {
                        level: sb.raid_level,
                        max_blknum: sb.max_blknum,
                        blk_size: sb.blk_size,
                        num_of_disks: sb.num_of_disks,
                        addressable_blocks: volume.geometry.addressable_blocks(),
                        source_disk: id,
                    });
                }
                Ok(None) => debug!("Disk {} carries no replica", id),
                Err(e) => warn!("Skipping disk {} for volume info: {}", id, e),
            }
        }

        Err(Error::AllDisksFailed)
    }

    /// Wipe the volume metadata from every disk
    ///
    /// Data blocks are left in place. Calling it on an uninitialized device
    /// is not an error.
    pub fn destroy(&self) -> Result<()> {
        let _repair = self.locks.repair();
        let _gate = self.locks.rebuild_gate();

        let result = self.metadata.destroy();
        self.health.invalidate_all();
        result
    }

    /// Zero every block of every disk, metadata included
    pub fn format_disks(&self) -> Result<()> {
        let _repair = self.locks.repair();
        let _gate = self.locks.rebuild_gate();

        self.zero_fill()?;
        self.metadata.reset();
        self.health.invalidate_all();
        Ok(())
    }

    /// Health of one disk
    pub fn disk_health(&self, id: DiskId) -> Result<DiskHealth> {
        self.health.get(id)
    }

    /// Health of every disk in id order
    pub fn health_report(&self) -> Result<Vec<(DiskId, DiskHealth)>> {
        self.health.snapshot()
    }

    fn engine(&self) -> RedundancyEngine<'_> {
        RedundancyEngine::new(&self.disks, &self.health, &self.locks)
    }

    fn zero_fill(&self) -> Result<()> {
        let zero = self.disks.block_buf();
        for id in self.disks.ids() {
            for block in 0..self.disks.blocks_per_disk() {
                self.disks.write(id, block, &zero)?;
            }
        }
        self.disks.sync_all()?;
        info!(
            "Formatted {} disks of {} blocks",
            self.disks.len(),
            self.disks.blocks_per_disk()
        );
        Ok(())
    }
}

fn check_buffer(volume: &Volume, len: usize) -> Result<()> {
    if len == volume.block_size() {
        Ok(())
    } else {
        Err(Error::BufferSize {
            expected: volume.block_size(),
            actual: len,
        })
    }
}
