//! Disk layout definitions
//!
//! Disk Layout:
//! ```text
//! +------------------+  Block 0
//! |   Superblock     |  Volume metadata replica + this disk's health
//! +------------------+  Block 1
//! |   Data Region    |  Data / mirror / parity blocks
//! |       ...        |
//! +------------------+  Block blocks_per_disk - 1
//! ```
//!
//! Every member disk carries an identical replica of the volume superblock
//! except for `disk_id` and `disk_status`, which describe the disk itself.
//! A block 0 that is entirely zero means the volume was never created.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use raidvol_common::{DiskHealth, DiskId, Error, RaidLevel, Result};

/// Magic number for raidvol superblocks
pub const MAGIC: [u8; 8] = *b"RAIDVOL1";

/// Current superblock format version
pub const FORMAT_VERSION: u32 = 1;

/// Physical block holding the superblock replica
pub const SUPERBLOCK_BLOCK: u64 = 0;

/// First physical block of the data region
pub const FIRST_DATA_BLOCK: u64 = 1;

/// Offset of the checksum field within the encoded superblock:
/// magic(8) + version(4) + raid_level(4) + disk_status(4) + parity_disk(4) +
/// swap_disk(4) + max_blknum(8) + blk_size(4) + num_of_disks(4) + disk_id(4)
const CHECKSUM_OFFSET: usize = 48;

/// Encoded length including the trailing checksum
pub const SUPERBLOCK_LEN: usize = CHECKSUM_OFFSET + 4;

/// Superblock replica stored in block 0 of each member disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Superblock {
    /// RAID level, immutable after creation
    pub raid_level: RaidLevel,
    /// Health of the disk holding this replica
    pub disk_status: DiskHealth,
    /// Dedicated parity disk (RAID4 only)
    pub parity_disk: Option<DiskId>,
    /// Reserved spare disk (mirrored levels with an odd disk count)
    pub swap_disk: Option<DiskId>,
    /// Highest logical block number reported for the volume
    pub max_blknum: u64,
    /// Block size in bytes
    pub blk_size: u32,
    /// Disks, mirrored pairs or data disks depending on the level
    pub num_of_disks: u32,
    /// Physical disk this replica was written for
    pub disk_id: DiskId,
}

impl Superblock {
    /// Copy of this superblock addressed to another member disk
    #[must_use]
    pub fn replica_for(&self, disk_id: DiskId) -> Self {
        Self {
            disk_id,
            ..self.clone()
        }
    }

    /// Check whether a raw block 0 is the never-formatted sentinel
    #[must_use]
    pub fn is_blank(data: &[u8]) -> bool {
        data.iter().all(|b| *b == 0)
    }

    /// Serialize into a full block of `block_size` bytes
    #[must_use]
    pub fn to_bytes(&self, block_size: usize) -> Bytes {
        let mut buf = BytesMut::with_capacity(block_size.max(SUPERBLOCK_LEN));

        buf.put_slice(&MAGIC);
        buf.put_u32_le(FORMAT_VERSION);
        buf.put_u32_le(self.raid_level.as_raw());
        buf.put_u32_le(self.disk_status.as_raw());
        buf.put_u32_le(self.parity_disk.unwrap_or(0));
        buf.put_u32_le(self.swap_disk.unwrap_or(0));
        buf.put_u64_le(self.max_blknum);
        buf.put_u32_le(self.blk_size);
        buf.put_u32_le(self.num_of_disks);
        buf.put_u32_le(self.disk_id);

        let checksum = crc32c::crc32c(&buf[..CHECKSUM_OFFSET]);
        buf.put_u32_le(checksum);

        // Pad to a full block
        buf.resize(block_size.max(SUPERBLOCK_LEN), 0);

        buf.freeze()
    }

    /// Parse a raw block 0
    ///
    /// Returns `Ok(None)` for a blank block.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        if Self::is_blank(data) {
            return Ok(None);
        }
        if data.len() < SUPERBLOCK_LEN {
            return Err(Error::CorruptSuperblock(format!(
                "superblock too small: {} bytes",
                data.len()
            )));
        }

        let stored = u32::from_le_bytes([
            data[CHECKSUM_OFFSET],
            data[CHECKSUM_OFFSET + 1],
            data[CHECKSUM_OFFSET + 2],
            data[CHECKSUM_OFFSET + 3],
        ]);

        let mut buf = &data[..CHECKSUM_OFFSET];

        let mut magic = [0u8; 8];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(Error::CorruptSuperblock("invalid superblock magic".into()));
        }

        let version = buf.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(Error::CorruptSuperblock(format!(
                "unsupported format version: {version}"
            )));
        }

        let computed = crc32c::crc32c(&data[..CHECKSUM_OFFSET]);
        if computed != stored {
            return Err(Error::CorruptSuperblock(format!(
                "checksum mismatch: computed={computed:08x}, stored={stored:08x}"
            )));
        }

        let raid_level = RaidLevel::from_raw(buf.get_u32_le())
            .map_err(|e| Error::CorruptSuperblock(e.to_string()))?;
        let disk_status = DiskHealth::from_raw(buf.get_u32_le())?;
        let parity_disk = Some(buf.get_u32_le()).filter(|d| *d != 0);
        let swap_disk = Some(buf.get_u32_le()).filter(|d| *d != 0);
        let max_blknum = buf.get_u64_le();
        let blk_size = buf.get_u32_le();
        let num_of_disks = buf.get_u32_le();
        let disk_id = buf.get_u32_le();

        Ok(Some(Self {
            raid_level,
            disk_status,
            parity_disk,
            swap_disk,
            max_blknum,
            blk_size,
            num_of_disks,
            disk_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Superblock {
        Superblock {
            raid_level: RaidLevel::Raid4,
            disk_status: DiskHealth::Healthy,
            parity_disk: Some(4),
            swap_disk: None,
            max_blknum: 3 * 128,
            blk_size: 512,
            num_of_disks: 3,
            disk_id: 2,
        }
    }

    #[test]
    fn test_superblock_roundtrip() {
        let sb = sample();
        let bytes = sb.to_bytes(512);
        assert_eq!(bytes.len(), 512);

        let sb2 = Superblock::from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(sb, sb2);
    }

    #[test]
    fn test_blank_block_is_uninitialized() {
        let zero = vec![0u8; 512];
        assert!(Superblock::is_blank(&zero));
        assert!(Superblock::from_bytes(&zero).unwrap().is_none());
    }

    #[test]
    fn test_replica_keeps_volume_fields() {
        let sb = sample();
        let replica = sb.replica_for(3);
        assert_eq!(replica.disk_id, 3);
        assert_eq!(replica.max_blknum, sb.max_blknum);
        assert_eq!(replica.parity_disk, Some(4));
    }

    #[test]
    fn test_corrupt_superblock_detected() {
        let mut bytes = sample().to_bytes(512).to_vec();
        bytes[20] ^= 0xff;
        assert!(matches!(
            Superblock::from_bytes(&bytes),
            Err(Error::CorruptSuperblock(_))
        ));

        let mut garbage = vec![0u8; 512];
        garbage[100] = 1;
        assert!(matches!(
            Superblock::from_bytes(&garbage),
            Err(Error::CorruptSuperblock(_))
        ));
    }
}
