//! Disk reconstruction
//!
//! Decides how a repaired disk can be refilled from the survivors and copies
//! or recomputes its data region. The caller owns the locking: it holds the
//! rebuild gate exclusively and the target's health slot for the whole run.

use crate::geometry::Geometry;
use crate::health::HealthRegistry;
use crate::parity::ParityAccumulator;
use raidvol_common::{DiskId, Error, RaidLevel, Result};
use raidvol_storage::DiskArray;
use tracing::{debug, info};

/// How a disk's contents are restored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPlan {
    /// The disk holds no data (spare of an odd mirrored set)
    Nothing,
    /// Copy every data block from the mirror partner
    CopyFrom(DiskId),
    /// Recompute every data block as the XOR of all other members
    XorOthers,
}

/// Choose a rebuild plan for `target`
///
/// `failed_others` counts unhealthy disks other than the target.
pub fn plan(geometry: &Geometry, target: DiskId, failed_others: u32) -> Result<RebuildPlan> {
    match geometry.level {
        RaidLevel::Raid0 => Err(Error::unrecoverable(target, "RAID0 has no redundancy")),
        RaidLevel::Raid1 | RaidLevel::Raid0_1 => Ok(geometry
            .mirror_of(target)
            .map_or(RebuildPlan::Nothing, RebuildPlan::CopyFrom)),
        RaidLevel::Raid4 => {
            if geometry.parity_disk == Some(target) {
                Err(Error::unrecoverable(target, "RAID4 parity disk cannot be rebuilt"))
            } else if failed_others > 0 {
                Err(Error::unrecoverable(
                    target,
                    format!("{failed_others} other disk(s) have failed"),
                ))
            } else {
                Ok(RebuildPlan::XorOthers)
            }
        }
        RaidLevel::Raid5 => {
            if failed_others > 0 {
                Err(Error::unrecoverable(
                    target,
                    format!("{failed_others} other disk(s) have failed"),
                ))
            } else {
                Ok(RebuildPlan::XorOthers)
            }
        }
    }
}

/// Refill the data region of `target` according to `plan`
///
/// Every source disk must be healthy; the target's own health slot is not
/// consulted.
pub fn rebuild(
    disks: &DiskArray,
    health: &HealthRegistry,
    geometry: &Geometry,
    target: DiskId,
    plan: RebuildPlan,
) -> Result<()> {
    match plan {
        RebuildPlan::Nothing => {
            debug!("Disk {} holds no data, nothing to rebuild", target);
            Ok(())
        }
        RebuildPlan::CopyFrom(source) => {
            require_source(health, target, source)?;
            let mut buf = disks.block_buf();
            for block in geometry.data_region() {
                disks.read(source, block, &mut buf)?;
                disks.write(target, block, &buf)?;
            }
            info!(
                "Rebuilt disk {} from mirror {} ({} blocks)",
                target,
                source,
                geometry.data_blocks_per_disk()
            );
            Ok(())
        }
        RebuildPlan::XorOthers => {
            let sources: Vec<DiskId> = geometry.members().filter(|id| *id != target).collect();
            for source in &sources {
                require_source(health, target, *source)?;
            }

            let mut buf = disks.block_buf();
            for block in geometry.data_region() {
                let mut acc = ParityAccumulator::new(disks.block_size());
                for source in &sources {
                    disks.read(*source, block, &mut buf)?;
                    acc.absorb(&buf);
                }
                disks.write(target, block, &acc.finish())?;
            }
            info!(
                "Rebuilt disk {} from {} surviving members ({} blocks)",
                target,
                sources.len(),
                geometry.data_blocks_per_disk()
            );
            Ok(())
        }
    }
}

fn require_source(health: &HealthRegistry, target: DiskId, source: DiskId) -> Result<()> {
    if health.get(source)?.is_healthy() {
        Ok(())
    } else {
        Err(Error::unrecoverable(
            target,
            format!("source disk {source} is not healthy"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidvol_common::DiskHealth;
    use raidvol_storage::MemDisk;
    use std::sync::Arc;

    const BPD: u64 = 8;

    fn setup(count: u32) -> (Arc<DiskArray>, Vec<Arc<MemDisk>>, HealthRegistry) {
        let (array, mems) = DiskArray::in_memory(count, 512, BPD).unwrap();
        let disks = Arc::new(array);
        let health = HealthRegistry::new(Arc::clone(&disks));
        health.seed_all(DiskHealth::Healthy);
        (disks, mems, health)
    }

    #[test]
    fn test_plan_per_level() {
        let raid0 = Geometry::plan(RaidLevel::Raid0, 3, BPD).unwrap();
        assert!(matches!(plan(&raid0, 1, 0), Err(Error::Unrecoverable { disk: 1, .. })));

        let raid1 = Geometry::plan(RaidLevel::Raid1, 5, BPD).unwrap();
        assert_eq!(plan(&raid1, 1, 0).unwrap(), RebuildPlan::CopyFrom(3));
        assert_eq!(plan(&raid1, 4, 0).unwrap(), RebuildPlan::CopyFrom(2));
        assert_eq!(plan(&raid1, 5, 0).unwrap(), RebuildPlan::Nothing);

        let raid4 = Geometry::plan(RaidLevel::Raid4, 4, BPD).unwrap();
        assert_eq!(plan(&raid4, 2, 0).unwrap(), RebuildPlan::XorOthers);
        assert!(plan(&raid4, 4, 0).is_err());
        assert!(plan(&raid4, 2, 1).is_err());

        let raid5 = Geometry::plan(RaidLevel::Raid5, 4, BPD).unwrap();
        assert_eq!(plan(&raid5, 4, 0).unwrap(), RebuildPlan::XorOthers);
        assert!(plan(&raid5, 1, 1).is_err());
    }

    #[test]
    fn test_copy_from_mirror() {
        let (disks, mems, health) = setup(2);
        let geometry = Geometry::plan(RaidLevel::Raid1, 2, BPD).unwrap();
        for block in geometry.data_region() {
            disks.write(2, block, &[block as u8; 512]).unwrap();
        }

        rebuild(&disks, &health, &geometry, 1, RebuildPlan::CopyFrom(2)).unwrap();
        for block in geometry.data_region() {
            assert_eq!(mems[0].peek(block), mems[1].peek(block));
        }
        // Superblock untouched
        assert_eq!(mems[0].allocated_blocks() as u64, BPD - 1);
    }

    #[test]
    fn test_xor_rebuild_restores_member() {
        let (disks, mems, health) = setup(4);
        let geometry = Geometry::plan(RaidLevel::Raid5, 4, BPD).unwrap();
        for block in geometry.data_region() {
            let mut parity = ParityAccumulator::new(512);
            let row_parity = geometry.parity_disk_for_row(block).unwrap();
            for id in geometry.members().filter(|id| *id != row_parity) {
                let data = vec![(id as u8) << 4 | block as u8; 512];
                disks.write(id, block, &data).unwrap();
                parity.absorb(&data);
            }
            disks.write(row_parity, block, &parity.finish()).unwrap();
        }

        let expected: Vec<Vec<u8>> = geometry.data_region().map(|b| mems[1].peek(b)).collect();
        for block in geometry.data_region() {
            disks.write(2, block, &[0u8; 512]).unwrap();
        }

        rebuild(&disks, &health, &geometry, 2, RebuildPlan::XorOthers).unwrap();
        let rebuilt: Vec<Vec<u8>> = geometry.data_region().map(|b| mems[1].peek(b)).collect();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn test_unhealthy_source_is_unrecoverable() {
        let (disks, _, health) = setup(2);
        let geometry = Geometry::plan(RaidLevel::Raid1, 2, BPD).unwrap();
        health.set(2, DiskHealth::Unhealthy).unwrap();
        assert!(matches!(
            rebuild(&disks, &health, &geometry, 1, RebuildPlan::CopyFrom(2)),
            Err(Error::Unrecoverable { disk: 1, .. })
        ));
    }
}
