//! Numeric entry points
//!
//! Thin wrappers over [`RaidDevice`] with the calling convention of the
//! system-call layer: raw integer arguments, caller buffers addressed through
//! [`UserMemory`], and a return value of `0` on success or a negative code
//! from [`Error::errno`].

use crate::device::RaidDevice;
use raidvol_common::{DiskId, Error, RaidLevel, Result};

/// Caller address space
pub trait UserMemory {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`
    fn copy_in(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Copy `data` to the caller starting at `addr`
    fn copy_out(&mut self, addr: u64, data: &[u8]) -> Result<()>;
}

/// Address space backed by one contiguous buffer starting at address 0
#[derive(Debug, Clone, Default)]
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl FlatMemory {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = usize::try_from(addr).map_err(|_| Error::BadAddress(addr))?;
        let end = start.checked_add(len).ok_or(Error::BadAddress(addr))?;
        if end > self.bytes.len() {
            return Err(Error::BadAddress(addr));
        }
        Ok(start..end)
    }
}

impl UserMemory for FlatMemory {
    fn copy_in(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn copy_out(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

fn status(result: Result<()>) -> i64 {
    match result {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

/// Create a volume; `raw_level` is the numeric RAID level
pub fn sys_init_raid(dev: &RaidDevice, raw_level: u32) -> i64 {
    status(RaidLevel::from_raw(raw_level).and_then(|level| dev.init(level)))
}

/// Read logical `block` into the caller buffer at `addr`
pub fn sys_read_raid(dev: &RaidDevice, mem: &mut impl UserMemory, block: u64, addr: u64) -> i64 {
    status(read_to_user(dev, mem, block, addr))
}

/// Write the caller buffer at `addr` to logical `block`
pub fn sys_write_raid(dev: &RaidDevice, mem: &impl UserMemory, block: u64, addr: u64) -> i64 {
    status(write_from_user(dev, mem, block, addr))
}

fn read_to_user(dev: &RaidDevice, mem: &mut impl UserMemory, block: u64, addr: u64) -> Result<()> {
    let mut buf = vec![0u8; dev.block_size()];
    dev.read_block(block, &mut buf)?;
    mem.copy_out(addr, &buf)
}

fn write_from_user(dev: &RaidDevice, mem: &impl UserMemory, block: u64, addr: u64) -> Result<()> {
    let mut buf = vec![0u8; dev.block_size()];
    mem.copy_in(addr, &mut buf)?;
    dev.write_block(block, &buf)
}

pub fn sys_disk_fail_raid(dev: &RaidDevice, disk: DiskId) -> i64 {
    status(dev.fail_disk(disk))
}

pub fn sys_disk_repaired_raid(dev: &RaidDevice, disk: DiskId) -> i64 {
    status(dev.repair_disk(disk))
}

/// Store max block number, block size and disk count as `u32` values at
/// the three caller addresses
///
/// A block count that does not fit saturates at `u32::MAX`.
pub fn sys_info_raid(
    dev: &RaidDevice,
    mem: &mut impl UserMemory,
    blk_num_addr: u64,
    blk_size_addr: u64,
    disk_num_addr: u64,
) -> i64 {
    status(info_to_user(dev, mem, [blk_num_addr, blk_size_addr, disk_num_addr]))
}

fn info_to_user(dev: &RaidDevice, mem: &mut impl UserMemory, addrs: [u64; 3]) -> Result<()> {
    let info = dev.info()?;
    let max_blknum = u32::try_from(info.max_blknum).unwrap_or(u32::MAX);
    for (addr, value) in addrs.into_iter().zip([max_blknum, info.blk_size, info.num_of_disks]) {
        mem.copy_out(addr, &value.to_le_bytes())?;
    }
    Ok(())
}

pub fn sys_destroy_raid(dev: &RaidDevice) -> i64 {
    status(dev.destroy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidvol_common::RaidConfig;
    use raidvol_storage::DiskArray;

    const BS: usize = 512;

    fn device(count: u32) -> RaidDevice {
        let config = RaidConfig::with_disks(count, 16 * BS as u64, BS as u32);
        let (array, _) = DiskArray::in_memory(count, BS, 16).unwrap();
        RaidDevice::new(&config, array).unwrap()
    }

    fn read_u32(mem: &FlatMemory, addr: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&mem.as_slice()[addr..addr + 4]);
        u32::from_le_bytes(raw)
    }

    #[test]
    fn test_flat_memory_bounds() {
        let mut mem = FlatMemory::new(8);
        mem.copy_out(4, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 2];
        mem.copy_in(5, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
        assert!(matches!(mem.copy_out(6, &[0; 4]), Err(Error::BadAddress(6))));
        assert!(mem.copy_in(u64::MAX, &mut buf).is_err());
    }

    #[test]
    fn test_init_read_write_info() {
        let dev = device(4);
        assert_eq!(sys_init_raid(&dev, 99), Error::InvalidLevel(99).errno());
        assert_eq!(sys_init_raid(&dev, RaidLevel::Raid5.as_raw()), 0);

        let mut mem = FlatMemory::new(2 * BS + 12);
        mem.as_mut_slice()[..BS].fill(0x5a);
        assert_eq!(sys_write_raid(&dev, &mem, 7, 0), 0);
        assert_eq!(sys_read_raid(&dev, &mut mem, 7, BS as u64), 0);
        assert_eq!(&mem.as_slice()[BS..2 * BS], &[0x5a; BS][..]);

        let base = 2 * BS;
        assert_eq!(
            sys_info_raid(&dev, &mut mem, base as u64, base as u64 + 4, base as u64 + 8),
            0
        );
        assert_eq!(read_u32(&mem, base), 48);
        assert_eq!(read_u32(&mem, base + 4), BS as u32);
        assert_eq!(read_u32(&mem, base + 8), 3);
    }

    #[test]
    fn test_error_codes() {
        let dev = device(3);
        let mut mem = FlatMemory::new(BS);
        assert_eq!(
            sys_read_raid(&dev, &mut mem, 0, 0),
            Error::VolumeNotInitialized.errno()
        );

        assert_eq!(sys_init_raid(&dev, RaidLevel::Raid0.as_raw()), 0);
        assert_eq!(
            sys_read_raid(&dev, &mut mem, 1000, 0),
            Error::OutOfRange { block: 0, max: 0 }.errno()
        );
        assert_eq!(
            sys_read_raid(&dev, &mut mem, 0, 1),
            Error::BadAddress(1).errno()
        );
        assert_eq!(sys_disk_fail_raid(&dev, 9), Error::InvalidDisk(9).errno());
        assert_eq!(sys_disk_fail_raid(&dev, 1), 0);
        assert_eq!(
            sys_disk_repaired_raid(&dev, 1),
            Error::unrecoverable(1, "").errno()
        );
        assert_eq!(sys_destroy_raid(&dev), 0);
        assert_eq!(sys_destroy_raid(&dev), 0);
    }
}
