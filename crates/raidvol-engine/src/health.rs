//! Disk health registry
//!
//! One cached health slot per physical disk. A slot starts out empty and is
//! filled on first use from the `disk_status` field of the disk's superblock
//! replica. Transitions write through to the replica under the slot's lock,
//! so a reader holding a [`HealthGuard`] sees a state that cannot change
//! until the guard is dropped.

use parking_lot::{Mutex, MutexGuard};
use raidvol_common::{DiskHealth, DiskId, FIRST_DISK, Result};
use raidvol_storage::{DiskArray, SUPERBLOCK_BLOCK, Superblock};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-disk health cache backed by the superblock replicas
pub struct HealthRegistry {
    disks: Arc<DiskArray>,
    slots: Vec<Mutex<Option<DiskHealth>>>,
}

impl HealthRegistry {
    /// Create a registry with every slot uninitialized
    pub fn new(disks: Arc<DiskArray>) -> Self {
        let slots = disks.ids().map(|_| Mutex::new(None)).collect();
        Self { disks, slots }
    }

    /// Lock the health slot of one disk
    pub fn lock(&self, id: DiskId) -> Result<HealthGuard<'_>> {
        self.disks.check(id)?;
        Ok(HealthGuard {
            disks: &self.disks,
            id,
            slot: self.slots[(id - FIRST_DISK) as usize].lock(),
        })
    }

    /// Current health of a disk, loading it on a cache miss
    pub fn get(&self, id: DiskId) -> Result<DiskHealth> {
        self.lock(id)?.health()
    }

    /// Move a disk to `state`, persisting it to the disk's replica
    pub fn set(&self, id: DiskId, state: DiskHealth) -> Result<()> {
        self.lock(id)?.set(state)
    }

    /// Forget every cached state; the next access re-reads the disks
    pub fn invalidate_all(&self) {
        for slot in &self.slots {
            *slot.lock() = None;
        }
    }

    /// Set every cached slot without touching the disks
    ///
    /// Used right after the replicas were written with the same state.
    pub fn seed_all(&self, state: DiskHealth) {
        for slot in &self.slots {
            *slot.lock() = Some(state);
        }
    }

    /// Number of disks other than `except` that are not healthy
    ///
    /// A disk left in `Recovery` by an interrupted rebuild holds partial data
    /// and counts as failed. Each slot is locked only while it is inspected.
    pub fn count_failed_except(&self, except: DiskId) -> Result<u32> {
        let mut failed = 0;
        for id in self.disks.ids().filter(|id| *id != except) {
            if !self.get(id)?.is_healthy() {
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Health of every disk in id order
    pub fn snapshot(&self) -> Result<Vec<(DiskId, DiskHealth)>> {
        self.disks
            .ids()
            .map(|id| Ok((id, self.get(id)?)))
            .collect()
    }
}

/// Exclusive access to one disk's health slot
pub struct HealthGuard<'a> {
    disks: &'a DiskArray,
    id: DiskId,
    slot: MutexGuard<'a, Option<DiskHealth>>,
}

impl HealthGuard<'_> {
    /// Cached health, read from the replica on a miss
    ///
    /// A blank replica counts as healthy.
    pub fn health(&mut self) -> Result<DiskHealth> {
        if let Some(state) = *self.slot {
            return Ok(state);
        }

        let state = self
            .read_replica()?
            .map_or(DiskHealth::Healthy, |sb| sb.disk_status);
        debug!("Loaded health of disk {}: {}", self.id, state);
        *self.slot = Some(state);
        Ok(state)
    }

    /// Transition to `state`, rewriting the replica's `disk_status`
    ///
    /// A blank replica is left alone and only the cache changes. Marking a
    /// disk unhealthy always succeeds: if the replica cannot be updated the
    /// failure is logged and the cached state still changes.
    pub fn set(&mut self, state: DiskHealth) -> Result<()> {
        if let Err(e) = self.persist(state) {
            if state != DiskHealth::Unhealthy {
                return Err(e);
            }
            warn!(
                "Could not record failure on disk {}, marking unhealthy in memory only: {}",
                self.id, e
            );
        }
        *self.slot = Some(state);
        Ok(())
    }

    /// Write a fresh replica of `superblock` with `state` and cache it
    ///
    /// Used after a rebuild, when the disk may have been replaced and carry
    /// no replica at all.
    pub fn install_replica(&mut self, superblock: &Superblock, state: DiskHealth) -> Result<()> {
        let mut replica = superblock.replica_for(self.id);
        replica.disk_status = state;
        self.disks.write(
            self.id,
            SUPERBLOCK_BLOCK,
            &replica.to_bytes(self.disks.block_size()),
        )?;
        *self.slot = Some(state);
        Ok(())
    }

    fn read_replica(&self) -> Result<Option<Superblock>> {
        let mut buf = self.disks.block_buf();
        self.disks.read(self.id, SUPERBLOCK_BLOCK, &mut buf)?;
        Superblock::from_bytes(&buf)
    }

    fn persist(&self, state: DiskHealth) -> Result<()> {
        let Some(mut sb) = self.read_replica()? else {
            return Ok(());
        };
        if sb.disk_status == state {
            return Ok(());
        }
        sb.disk_status = state;
        self.disks.write(
            self.id,
            SUPERBLOCK_BLOCK,
            &sb.to_bytes(self.disks.block_size()),
        )
    }
}
