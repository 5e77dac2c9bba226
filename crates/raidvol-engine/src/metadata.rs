//! Volume metadata
//!
//! Owns the single active superblock. It is loaded lazily from the bootstrap
//! disk on first use, written to every member disk when a volume is created
//! and wiped when it is destroyed.

use crate::geometry::Geometry;
use parking_lot::Mutex;
use raidvol_common::{DiskId, Error, Result};
use raidvol_storage::{DiskArray, SUPERBLOCK_BLOCK, Superblock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loaded volume: its superblock and the layout derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub superblock: Superblock,
    pub geometry: Geometry,
}

impl Volume {
    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.superblock.blk_size as usize
    }
}

#[derive(Debug)]
enum VolumeState {
    NotLoaded,
    Loaded(Arc<Volume>),
}

/// Loaded state plus a counter bumped on every create, reset and destroy
#[derive(Debug)]
struct VolumeSlot {
    generation: u64,
    state: VolumeState,
}

impl VolumeSlot {
    fn install(&mut self, state: VolumeState) {
        self.generation = self.generation.wrapping_add(1);
        self.state = state;
    }
}

/// Owner of the active superblock
pub struct MetadataManager {
    disks: Arc<DiskArray>,
    bootstrap: DiskId,
    slot: Mutex<VolumeSlot>,
}

impl MetadataManager {
    pub fn new(disks: Arc<DiskArray>, bootstrap: DiskId) -> Result<Self> {
        disks.check(bootstrap)?;
        Ok(Self {
            disks,
            bootstrap,
            slot: Mutex::new(VolumeSlot {
                generation: 0,
                state: VolumeState::NotLoaded,
            }),
        })
    }

    /// Loaded volume, if any, without touching the disks
    pub fn current(&self) -> Option<Arc<Volume>> {
        match &self.slot.lock().state {
            VolumeState::Loaded(volume) => Some(Arc::clone(volume)),
            VolumeState::NotLoaded => None,
        }
    }

    /// Get the volume, reading it from the bootstrap disk if not yet loaded
    ///
    /// The state lock is not held while reading. A copy read before a
    /// concurrent create, reset or destroy is discarded and the disk is read
    /// again, so a destroyed volume is never reinstalled.
    pub fn load(&self) -> Result<Arc<Volume>> {
        loop {
            let generation = {
                let slot = self.slot.lock();
                if let VolumeState::Loaded(volume) = &slot.state {
                    return Ok(Arc::clone(volume));
                }
                slot.generation
            };

            let volume = self.read_volume()?;

            let mut slot = self.slot.lock();
            if let VolumeState::Loaded(current) = &slot.state {
                return Ok(Arc::clone(current));
            }
            if slot.generation != generation {
                debug!("Volume changed while loading from disk {}, retrying", self.bootstrap);
                continue;
            }
            debug!(
                "Loaded {} volume from disk {} (max block {})",
                volume.superblock.raid_level, self.bootstrap, volume.superblock.max_blknum
            );
            let volume = Arc::new(volume);
            slot.state = VolumeState::Loaded(Arc::clone(&volume));
            return Ok(volume);
        }
    }

    fn read_volume(&self) -> Result<Volume> {
        let mut buf = self.disks.block_buf();
        self.disks.read(self.bootstrap, SUPERBLOCK_BLOCK, &mut buf)?;
        let superblock = Superblock::from_bytes(&buf)?.ok_or(Error::VolumeNotInitialized)?;

        if superblock.blk_size as usize != self.disks.block_size() {
            return Err(Error::CorruptSuperblock(format!(
                "volume block size {} does not match disk block size {}",
                superblock.blk_size,
                self.disks.block_size()
            )));
        }
        let geometry = Geometry::from_superblock(
            &superblock,
            self.disks.len(),
            self.disks.blocks_per_disk(),
        )?;
        Ok(Volume {
            superblock,
            geometry,
        })
    }

    /// Write a replica of the volume to every disk and install it
    ///
    /// On failure the manager is left unloaded.
    pub fn create(&self, geometry: Geometry) -> Result<Arc<Volume>> {
        #[allow(clippy::cast_possible_truncation)]
        let superblock = geometry.superblock(self.disks.block_size() as u32);

        self.slot.lock().install(VolumeState::NotLoaded);
        for id in self.disks.ids() {
            let replica = superblock.replica_for(id);
            self.disks.write(
                id,
                SUPERBLOCK_BLOCK,
                &replica.to_bytes(self.disks.block_size()),
            )?;
        }

        let volume = Arc::new(Volume {
            superblock,
            geometry,
        });
        self.slot
            .lock()
            .install(VolumeState::Loaded(Arc::clone(&volume)));
        info!(
            "Created {} volume: {} members, max block {}",
            volume.geometry.level, volume.geometry.num_of_disks, volume.geometry.max_blknum
        );
        Ok(volume)
    }

    /// Drop the loaded volume without touching the disks
    pub fn reset(&self) {
        self.slot.lock().install(VolumeState::NotLoaded);
    }

    /// Zero block 0 of every disk and unload
    ///
    /// Every disk is attempted; the first failure is returned.
    pub fn destroy(&self) -> Result<()> {
        let zero = self.disks.block_buf();
        let mut first_err = None;
        for id in self.disks.ids() {
            if let Err(e) = self.disks.write(id, SUPERBLOCK_BLOCK, &zero) {
                warn!("Failed to clear superblock on disk {}: {}", id, e);
                first_err.get_or_insert(e);
            }
        }
        self.reset();
        info!("Destroyed volume");
        first_err.map_or(Ok(()), Err)
    }
}
