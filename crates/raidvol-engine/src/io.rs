//! Redundancy-aware block I/O
//!
//! Executes one logical block transfer against its [`Placement`]: falls back
//! to the mirror when the primary copy is on a failed disk, and keeps the
//! parity row consistent on RAID4/RAID5 writes.

use crate::geometry::Placement;
use crate::health::HealthRegistry;
use crate::locks::VolumeLocks;
use crate::parity::updated_parity;
use raidvol_common::{DiskId, Error, LogicalBlock, Result};
use raidvol_storage::DiskArray;
use tracing::{debug, warn};

/// Borrowed view of the device used for one transfer
pub struct RedundancyEngine<'a> {
    disks: &'a DiskArray,
    health: &'a HealthRegistry,
    locks: &'a VolumeLocks,
}

impl<'a> RedundancyEngine<'a> {
    pub fn new(disks: &'a DiskArray, health: &'a HealthRegistry, locks: &'a VolumeLocks) -> Self {
        Self {
            disks,
            health,
            locks,
        }
    }

    /// Read logical `block` into `buf`
    pub fn read(&self, block: LogicalBlock, placement: Placement, buf: &mut [u8]) -> Result<()> {
        match placement {
            Placement::Striped { disk, block: phys } | Placement::Parity { disk, block: phys, .. } => {
                self.require_healthy(disk, block)?;
                self.disks.read(disk, phys, buf)
            }
            Placement::Mirrored {
                primary,
                mirror,
                block: phys,
            } => {
                if self.is_healthy(primary)? {
                    return self.disks.read(primary, phys, buf);
                }
                if self.is_healthy(mirror)? {
                    debug!(
                        "Block {} primary disk {} failed, reading mirror {}",
                        block, primary, mirror
                    );
                    return self.disks.read(mirror, phys, buf);
                }
                Err(Error::DataLost { block })
            }
        }
    }

    /// Write `buf` to logical `block`, maintaining redundancy
    pub fn write(&self, block: LogicalBlock, placement: Placement, buf: &[u8]) -> Result<()> {
        let _gate = self.locks.write_gate();

        match placement {
            Placement::Striped { disk, block: phys } => {
                self.require_healthy(disk, block)?;
                self.disks.write(disk, phys, buf)
            }
            Placement::Mirrored {
                primary,
                mirror,
                block: phys,
            } => self.write_mirrored(block, primary, mirror, phys, buf),
            Placement::Parity {
                disk,
                parity,
                block: phys,
            } => self.write_with_parity(block, disk, parity, phys, buf),
        }
    }

    fn write_mirrored(
        &self,
        block: LogicalBlock,
        primary: DiskId,
        mirror: DiskId,
        phys: u64,
        buf: &[u8],
    ) -> Result<()> {
        let mut written = 0;
        for disk in [primary, mirror] {
            if self.is_healthy(disk)? {
                self.disks.write(disk, phys, buf)?;
                written += 1;
            } else {
                debug!("Block {} skipping failed disk {}", block, disk);
            }
        }

        if written == 0 {
            return Err(Error::DataLost { block });
        }
        Ok(())
    }

    fn write_with_parity(
        &self,
        block: LogicalBlock,
        disk: DiskId,
        parity: DiskId,
        phys: u64,
        buf: &[u8],
    ) -> Result<()> {
        self.require_healthy(disk, block)?;
        let parity_healthy = self.is_healthy(parity)?;

        let _row = self.locks.row(phys);

        let mut old = self.disks.block_buf();
        self.disks.read(disk, phys, &mut old)?;
        if old == buf {
            debug!("Block {} unchanged, skipping write", block);
            return Ok(());
        }

        if parity_healthy {
            let mut parity_block = self.disks.block_buf();
            self.disks.read(parity, phys, &mut parity_block)?;
            let new_parity = updated_parity(&old, buf, &parity_block);
            self.disks.write(parity, phys, &new_parity)?;
        } else {
            warn!(
                "Parity disk {} failed, writing block {} without parity",
                parity, block
            );
        }

        self.disks.write(disk, phys, buf)
    }

    fn is_healthy(&self, disk: DiskId) -> Result<bool> {
        Ok(self.health.get(disk)?.is_healthy())
    }

    fn require_healthy(&self, disk: DiskId, block: LogicalBlock) -> Result<()> {
        if self.is_healthy(disk)? {
            Ok(())
        } else {
            debug!("Block {} lives on failed disk {}", block, disk);
            Err(Error::DataLost { block })
        }
    }
}
