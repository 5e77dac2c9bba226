//! Address translation for RAID volumes
//!
//! Maps logical block numbers to physical (disk, block) locations and
//! computes per-level capacity. Block 0 of every disk holds the superblock,
//! so every mapping starts its data at physical block 1.
//!
//! ```text
//! RAID5, 4 disks (3 data-disk equivalents), P = parity
//!
//!            disk 1   disk 2   disk 3   disk 4
//! block 1      b0       b1       b2       P      stripe 0
//! block 2      b4       b5       P        b3     stripe 1
//! block 3      b8       P        b6       b7     stripe 2
//! block 4      P        b9       b10      b11    stripe 3
//! ```

use raidvol_common::{DiskHealth, DiskId, Error, FIRST_DISK, LogicalBlock, RaidLevel, Result};
use raidvol_storage::{FIRST_DATA_BLOCK, Superblock};
use std::ops::RangeInclusive;

/// Physical location(s) backing one logical block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Single copy, no redundancy (RAID0)
    Striped { disk: DiskId, block: u64 },
    /// Primary copy and its mirror (RAID1, RAID0+1)
    Mirrored {
        primary: DiskId,
        mirror: DiskId,
        block: u64,
    },
    /// Data block protected by the parity block of the same row (RAID4, RAID5)
    Parity {
        disk: DiskId,
        parity: DiskId,
        block: u64,
    },
}

impl Placement {
    /// Physical block index shared by every copy
    #[must_use]
    pub const fn block(&self) -> u64 {
        match self {
            Self::Striped { block, .. }
            | Self::Mirrored { block, .. }
            | Self::Parity { block, .. } => *block,
        }
    }
}

/// Layout of a volume over a fixed disk set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// RAID level
    pub level: RaidLevel,
    /// Physical disks in the set
    pub disk_count: u32,
    /// Disks (RAID0), mirrored pairs (RAID1/0+1) or data disks (RAID4/5)
    pub num_of_disks: u32,
    /// Blocks on every disk, including the superblock
    pub blocks_per_disk: u64,
    /// Dedicated parity disk (RAID4)
    pub parity_disk: Option<DiskId>,
    /// Spare disk left over by an odd mirrored set
    pub swap_disk: Option<DiskId>,
    /// Highest logical block number reported for the volume
    pub max_blknum: u64,
}

impl Geometry {
    /// Lay out a new volume of `level` over `disk_count` disks
    pub fn plan(level: RaidLevel, disk_count: u32, blocks_per_disk: u64) -> Result<Self> {
        let required = level.min_disks();
        if disk_count < required {
            return Err(Error::InsufficientDisks {
                level,
                available: disk_count,
                required,
            });
        }

        let d = u64::from(disk_count);
        let bpd = blocks_per_disk;
        let (num_of_disks, max_blknum, parity_disk, swap_disk) = match level {
            RaidLevel::Raid0 => (disk_count, bpd * d - d, None, None),
            RaidLevel::Raid1 | RaidLevel::Raid0_1 => {
                let pairs = disk_count / 2;
                let p = u64::from(pairs);
                let swap = (disk_count % 2 == 1).then_some(disk_count);
                (pairs, bpd * p - p, None, swap)
            }
            RaidLevel::Raid4 => (disk_count - 1, bpd * (d - 1), Some(disk_count), None),
            RaidLevel::Raid5 => (disk_count - 1, bpd * (d - 1), None, None),
        };

        Ok(Self {
            level,
            disk_count,
            num_of_disks,
            blocks_per_disk,
            parity_disk,
            swap_disk,
            max_blknum,
        })
    }

    /// Rebuild the layout of a loaded volume and check it fits the disk set
    pub fn from_superblock(sb: &Superblock, disk_count: u32, blocks_per_disk: u64) -> Result<Self> {
        let geometry = Self::plan(sb.raid_level, disk_count, blocks_per_disk).map_err(|e| {
            Error::CorruptSuperblock(format!("volume does not fit the disk set: {e}"))
        })?;

        if geometry.num_of_disks != sb.num_of_disks
            || geometry.max_blknum != sb.max_blknum
            || geometry.parity_disk != sb.parity_disk
            || geometry.swap_disk != sb.swap_disk
        {
            return Err(Error::CorruptSuperblock(format!(
                "{} volume with {} members and max block {} was not created for {} disks of {} blocks",
                sb.raid_level, sb.num_of_disks, sb.max_blknum, disk_count, blocks_per_disk
            )));
        }

        Ok(geometry)
    }

    /// Superblock describing this layout, addressed to no disk in particular
    #[must_use]
    pub fn superblock(&self, blk_size: u32) -> Superblock {
        Superblock {
            raid_level: self.level,
            disk_status: DiskHealth::Healthy,
            parity_disk: self.parity_disk,
            swap_disk: self.swap_disk,
            max_blknum: self.max_blknum,
            blk_size,
            num_of_disks: self.num_of_disks,
            disk_id: 0,
        }
    }

    /// Member disk ids
    #[must_use]
    pub const fn members(&self) -> RangeInclusive<DiskId> {
        FIRST_DISK..=self.disk_count
    }

    /// Data blocks on each disk (everything but the superblock)
    #[must_use]
    pub const fn data_blocks_per_disk(&self) -> u64 {
        self.blocks_per_disk - FIRST_DATA_BLOCK
    }

    /// Physical block indexes of the data region
    #[must_use]
    pub const fn data_region(&self) -> std::ops::Range<u64> {
        FIRST_DATA_BLOCK..self.blocks_per_disk
    }

    /// Number of logical blocks that map inside the data region
    ///
    /// The capacity formulas count the superblock of every data disk (and
    /// one whole disk for RAID4/RAID5), so `max_blknum` is never below this
    /// and logical blocks past it have no physical home.
    #[must_use]
    pub const fn addressable_blocks(&self) -> u64 {
        self.num_of_disks as u64 * self.data_blocks_per_disk()
    }

    /// Partner copy of a disk in a mirrored set
    #[must_use]
    pub const fn mirror_of(&self, disk: DiskId) -> Option<DiskId> {
        if !self.level.is_mirrored() {
            return None;
        }
        let pairs = self.num_of_disks;
        if disk >= FIRST_DISK && disk <= pairs {
            Some(disk + pairs)
        } else if disk > pairs && disk <= 2 * pairs {
            Some(disk - pairs)
        } else {
            None
        }
    }

    /// Disk holding the parity of physical row `block`
    ///
    /// `None` for levels without parity and for rows outside the data region.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn parity_disk_for_row(&self, block: u64) -> Option<DiskId> {
        if block < FIRST_DATA_BLOCK || block >= self.blocks_per_disk {
            return None;
        }
        match self.level {
            RaidLevel::Raid4 => self.parity_disk,
            RaidLevel::Raid5 => {
                let d = self.num_of_disks as u64;
                let stripe = block - FIRST_DATA_BLOCK;
                Some((Self::raid5_parity_slot(d, stripe) + 1) as DiskId)
            }
            _ => None,
        }
    }

    /// Parity slot (0-based disk index) of a RAID5 stripe over `d + 1` disks
    const fn raid5_parity_slot(d: u64, stripe: u64) -> u64 {
        d - stripe % (d + 1)
    }

    /// Translate a logical block number
    #[allow(clippy::cast_possible_truncation)]
    pub fn locate(&self, block: LogicalBlock) -> Result<Placement> {
        if block > self.max_blknum || block >= self.addressable_blocks() {
            return Err(Error::OutOfRange {
                block,
                max: self.max_blknum,
            });
        }

        let d = u64::from(self.num_of_disks);
        let placement = match self.level {
            RaidLevel::Raid0 => Placement::Striped {
                disk: (block % d + 1) as DiskId,
                block: block / d + 1,
            },
            RaidLevel::Raid1 => {
                let per_disk = self.data_blocks_per_disk();
                let primary = (block / per_disk + 1) as DiskId;
                Placement::Mirrored {
                    primary,
                    mirror: primary + self.num_of_disks,
                    block: block % per_disk + 1,
                }
            }
            RaidLevel::Raid0_1 => {
                let primary = (block % d + 1) as DiskId;
                Placement::Mirrored {
                    primary,
                    mirror: primary + self.num_of_disks,
                    block: (block + d) / d,
                }
            }
            RaidLevel::Raid4 => Placement::Parity {
                disk: (block % d + 1) as DiskId,
                parity: self.parity_disk.unwrap_or(self.disk_count),
                block: block / d + 1,
            },
            RaidLevel::Raid5 => {
                let width = d + 1;
                let stripe = block / d;
                let offset = block % d;
                let parity_slot = Self::raid5_parity_slot(d, stripe);
                Placement::Parity {
                    disk: ((parity_slot + offset + 1) % width + 1) as DiskId,
                    parity: (parity_slot + 1) as DiskId,
                    block: stripe + 1,
                }
            }
        };

        Ok(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const BPD: u64 = 16;

    #[test]
    fn test_capacity_formulas() {
        let raid0 = Geometry::plan(RaidLevel::Raid0, 4, BPD).unwrap();
        assert_eq!(raid0.num_of_disks, 4);
        assert_eq!(raid0.max_blknum, BPD * 4 - 4);

        let raid1 = Geometry::plan(RaidLevel::Raid1, 4, BPD).unwrap();
        assert_eq!(raid1.num_of_disks, 2);
        assert_eq!(raid1.max_blknum, BPD * 2 - 2);
        assert_eq!(raid1.swap_disk, None);

        let raid01 = Geometry::plan(RaidLevel::Raid0_1, 5, BPD).unwrap();
        assert_eq!(raid01.num_of_disks, 2);
        assert_eq!(raid01.swap_disk, Some(5));

        let raid4 = Geometry::plan(RaidLevel::Raid4, 4, BPD).unwrap();
        assert_eq!(raid4.num_of_disks, 3);
        assert_eq!(raid4.max_blknum, BPD * 3);
        assert_eq!(raid4.parity_disk, Some(4));

        let raid5 = Geometry::plan(RaidLevel::Raid5, 4, BPD).unwrap();
        assert_eq!(raid5.num_of_disks, 3);
        assert_eq!(raid5.max_blknum, BPD * 3);
        assert_eq!(raid5.parity_disk, None);
    }

    #[test]
    fn test_insufficient_disks() {
        assert!(Geometry::plan(RaidLevel::Raid0, 1, BPD).is_ok());
        assert!(matches!(
            Geometry::plan(RaidLevel::Raid1, 1, BPD),
            Err(Error::InsufficientDisks { required: 2, .. })
        ));
        assert!(matches!(
            Geometry::plan(RaidLevel::Raid5, 2, BPD),
            Err(Error::InsufficientDisks { required: 3, .. })
        ));
    }

    #[test]
    fn test_raid0_striping() {
        let g = Geometry::plan(RaidLevel::Raid0, 3, BPD).unwrap();
        assert_eq!(g.locate(0).unwrap(), Placement::Striped { disk: 1, block: 1 });
        assert_eq!(g.locate(1).unwrap(), Placement::Striped { disk: 2, block: 1 });
        assert_eq!(g.locate(5).unwrap(), Placement::Striped { disk: 3, block: 2 });
    }

    #[test]
    fn test_raid1_fills_pairs_sequentially() {
        let g = Geometry::plan(RaidLevel::Raid1, 4, BPD).unwrap();
        assert_eq!(
            g.locate(0).unwrap(),
            Placement::Mirrored { primary: 1, mirror: 3, block: 1 }
        );
        assert_eq!(
            g.locate(BPD - 1).unwrap(),
            Placement::Mirrored { primary: 2, mirror: 4, block: 1 }
        );
        assert_eq!(g.mirror_of(1), Some(3));
        assert_eq!(g.mirror_of(4), Some(2));
    }

    #[test]
    fn test_raid01_stripes_across_pairs() {
        let g = Geometry::plan(RaidLevel::Raid0_1, 5, BPD).unwrap();
        assert_eq!(
            g.locate(0).unwrap(),
            Placement::Mirrored { primary: 1, mirror: 3, block: 1 }
        );
        assert_eq!(
            g.locate(3).unwrap(),
            Placement::Mirrored { primary: 2, mirror: 4, block: 2 }
        );
        assert_eq!(g.mirror_of(5), None);
    }

    #[test]
    fn test_raid4_dedicated_parity() {
        let g = Geometry::plan(RaidLevel::Raid4, 4, BPD).unwrap();
        assert_eq!(
            g.locate(4).unwrap(),
            Placement::Parity { disk: 2, parity: 4, block: 2 }
        );
        assert_eq!(g.parity_disk_for_row(7), Some(4));
    }

    #[test]
    fn test_parity_row_outside_data_region() {
        for level in [RaidLevel::Raid4, RaidLevel::Raid5] {
            let g = Geometry::plan(level, 4, BPD).unwrap();
            assert_eq!(g.parity_disk_for_row(0), None, "{level}");
            assert_eq!(g.parity_disk_for_row(BPD), None, "{level}");
            assert!(g.parity_disk_for_row(BPD - 1).is_some(), "{level}");
        }
        let raid0 = Geometry::plan(RaidLevel::Raid0, 4, BPD).unwrap();
        assert_eq!(raid0.parity_disk_for_row(3), None);
    }

    #[test]
    fn test_raid5_rotating_parity() {
        let g = Geometry::plan(RaidLevel::Raid5, 4, BPD).unwrap();
        // Stripe 0: parity on the last disk
        assert_eq!(
            g.locate(0).unwrap(),
            Placement::Parity { disk: 1, parity: 4, block: 1 }
        );
        // Stripe 1: parity on disk 3, data wraps after it
        assert_eq!(
            g.locate(3).unwrap(),
            Placement::Parity { disk: 4, parity: 3, block: 2 }
        );
        assert_eq!(
            g.locate(4).unwrap(),
            Placement::Parity { disk: 1, parity: 3, block: 2 }
        );
        // Stripe 4 wraps back to the last disk
        assert_eq!(g.parity_disk_for_row(5), Some(4));
    }

    #[test]
    fn test_raid5_stripe_members_are_distinct() {
        let g = Geometry::plan(RaidLevel::Raid5, 5, BPD).unwrap();
        let d = u64::from(g.num_of_disks);
        for stripe in 0..g.data_blocks_per_disk() {
            let mut seen = HashSet::new();
            for offset in 0..d {
                let Placement::Parity { disk, parity, block } = g.locate(stripe * d + offset).unwrap()
                else {
                    panic!("expected parity placement");
                };
                assert_eq!(block, stripe + 1);
                assert_eq!(Some(parity), g.parity_disk_for_row(block));
                assert_ne!(disk, parity);
                assert!(seen.insert(disk));
            }
            assert_eq!(seen.len() as u64, d);
        }
    }

    #[test]
    fn test_every_addressable_block_maps_uniquely() {
        for level in RaidLevel::ALL {
            let g = Geometry::plan(level, 5, BPD).unwrap();
            let mut seen = HashSet::new();
            for b in 0..g.addressable_blocks() {
                let placement = g.locate(b).unwrap();
                let (disk, block) = match placement {
                    Placement::Striped { disk, block }
                    | Placement::Mirrored { primary: disk, block, .. }
                    | Placement::Parity { disk, block, .. } => (disk, block),
                };
                assert!(g.data_region().contains(&block), "{level} block {b}");
                assert!(g.members().contains(&disk));
                assert!(seen.insert((disk, block)), "{level} block {b} collides");
            }
        }
    }

    #[test]
    fn test_out_of_range() {
        let g = Geometry::plan(RaidLevel::Raid4, 3, BPD).unwrap();
        assert!(matches!(
            g.locate(g.max_blknum + 1),
            Err(Error::OutOfRange { .. })
        ));
        // Past the data region but within the reported maximum
        assert!(matches!(
            g.locate(g.addressable_blocks()),
            Err(Error::OutOfRange { .. })
        ));
        assert!(g.locate(g.addressable_blocks() - 1).is_ok());
    }

    #[test]
    fn test_from_superblock_checks_disk_set() {
        let g = Geometry::plan(RaidLevel::Raid4, 4, BPD).unwrap();
        let sb = g.superblock(512);
        assert_eq!(Geometry::from_superblock(&sb, 4, BPD).unwrap(), g);
        assert!(Geometry::from_superblock(&sb, 5, BPD).is_err());
        assert!(Geometry::from_superblock(&sb, 4, BPD * 2).is_err());
    }
}
