//! Core type definitions for raidvol
//!
//! RAID levels, disk health states and the identifiers shared by the
//! storage and engine crates.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical disk identifier. Disks are numbered from 1.
pub type DiskId = u32;

/// Logical block number presented to callers of the volume.
pub type LogicalBlock = u64;

/// First physical disk id.
pub const FIRST_DISK: DiskId = 1;

/// RAID level of a logical volume
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidLevel {
    /// Striping, no redundancy
    Raid0 = 0,
    /// Mirrored pairs, each pair filled sequentially
    Raid1 = 1,
    /// Striping across mirrored pairs
    Raid0_1 = 2,
    /// Striping with a dedicated parity disk
    Raid4 = 3,
    /// Striping with rotating parity
    Raid5 = 4,
}

impl RaidLevel {
    /// All supported levels, in raw-value order
    pub const ALL: [Self; 5] = [
        Self::Raid0,
        Self::Raid1,
        Self::Raid0_1,
        Self::Raid4,
        Self::Raid5,
    ];

    /// Decode a raw level value as passed through the system-call layer
    pub fn from_raw(raw: u32) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_raw() == raw)
            .ok_or(Error::InvalidLevel(raw))
    }

    /// Raw value used on disk and across the system-call layer
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Get level name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raid0 => "RAID0",
            Self::Raid1 => "RAID1",
            Self::Raid0_1 => "RAID0+1",
            Self::Raid4 => "RAID4",
            Self::Raid5 => "RAID5",
        }
    }

    /// Minimum number of physical disks the level can be built on
    #[must_use]
    pub const fn min_disks(self) -> u32 {
        match self {
            Self::Raid0 => 1,
            Self::Raid1 | Self::Raid0_1 => 2,
            Self::Raid4 | Self::Raid5 => 3,
        }
    }

    /// Check if blocks are kept as mirrored copies
    #[must_use]
    pub const fn is_mirrored(self) -> bool {
        matches!(self, Self::Raid1 | Self::Raid0_1)
    }

    /// Check if the level maintains XOR parity
    #[must_use]
    pub const fn has_parity(self) -> bool {
        matches!(self, Self::Raid4 | Self::Raid5)
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RaidLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | '+' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        let digits = normalized.strip_prefix("raid").unwrap_or(&normalized);
        match digits {
            "0" => Ok(Self::Raid0),
            "1" => Ok(Self::Raid1),
            "01" | "10" => Ok(Self::Raid0_1),
            "4" => Ok(Self::Raid4),
            "5" => Ok(Self::Raid5),
            _ => Err(Error::invalid_argument(format!("unknown RAID level: {s}"))),
        }
    }
}

/// Health of a single physical disk
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskHealth {
    /// Disk is serving I/O
    #[default]
    Healthy = 0,
    /// Disk has failed and must not be used
    Unhealthy = 1,
    /// Disk is being rebuilt from redundant data
    Recovery = 2,
}

impl DiskHealth {
    /// Decode a raw health value read from a superblock replica
    pub fn from_raw(raw: u32) -> Result<Self, Error> {
        match raw {
            0 => Ok(Self::Healthy),
            1 => Ok(Self::Unhealthy),
            2 => Ok(Self::Recovery),
            other => Err(Error::CorruptSuperblock(format!(
                "unknown disk status {other}"
            ))),
        }
    }

    /// Raw value stored in a superblock replica
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Get state name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Recovery => "recovery",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for DiskHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_raw_values() {
        for level in RaidLevel::ALL {
            assert_eq!(RaidLevel::from_raw(level.as_raw()).unwrap(), level);
        }
        assert!(matches!(
            RaidLevel::from_raw(7),
            Err(Error::InvalidLevel(7))
        ));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("raid5".parse::<RaidLevel>().unwrap(), RaidLevel::Raid5);
        assert_eq!("RAID0+1".parse::<RaidLevel>().unwrap(), RaidLevel::Raid0_1);
        assert_eq!("raid_0_1".parse::<RaidLevel>().unwrap(), RaidLevel::Raid0_1);
        assert_eq!("1".parse::<RaidLevel>().unwrap(), RaidLevel::Raid1);
        assert!("raid6".parse::<RaidLevel>().is_err());
    }

    #[test]
    fn test_level_requirements() {
        assert_eq!(RaidLevel::Raid0.min_disks(), 1);
        assert_eq!(RaidLevel::Raid0_1.min_disks(), 2);
        assert_eq!(RaidLevel::Raid5.min_disks(), 3);
        assert!(RaidLevel::Raid4.has_parity());
        assert!(!RaidLevel::Raid1.has_parity());
        assert!(RaidLevel::Raid1.is_mirrored());
    }

    #[test]
    fn test_health_raw_values() {
        assert_eq!(DiskHealth::from_raw(1).unwrap(), DiskHealth::Unhealthy);
        assert!(DiskHealth::from_raw(9).is_err());
        assert!(DiskHealth::default().is_healthy());
    }
}
