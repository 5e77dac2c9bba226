//! Configuration types for raidvol
//!
//! The disk geometry is fixed when the device is constructed: every disk has
//! the same size and the block size is engine-wide.

use crate::error::{Error, Result};
use crate::types::{DiskId, FIRST_DISK};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest block that can hold an encoded superblock replica
pub const MIN_BLOCK_SIZE: u32 = 512;

/// Root configuration for raidvol
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaidConfig {
    /// Number of physical disks, numbered `1..=disk_count`
    #[serde(default = "default_disk_count")]
    pub disk_count: u32,
    /// Capacity of every disk in bytes
    #[serde(default = "default_disk_size")]
    pub disk_size: u64,
    /// Block size in bytes
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    /// Disk whose superblock replica is read to load the volume
    #[serde(default = "default_bootstrap_disk")]
    pub bootstrap_disk: DiskId,
    /// Number of row locks guarding parity read-modify-write
    #[serde(default = "default_stripe_locks")]
    pub stripe_locks: usize,
    /// Zero every disk before writing a new superblock
    #[serde(default)]
    pub format_on_init: bool,
    /// Directory holding file-backed disk images
    #[serde(default = "default_disk_dir")]
    pub disk_dir: PathBuf,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            disk_count: default_disk_count(),
            disk_size: default_disk_size(),
            block_size: default_block_size(),
            bootstrap_disk: default_bootstrap_disk(),
            stripe_locks: default_stripe_locks(),
            format_on_init: false,
            disk_dir: default_disk_dir(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_disk_count() -> u32 {
    4
}

fn default_disk_size() -> u64 {
    128 * 1024 * 1024
}

fn default_block_size() -> u32 {
    1024
}

fn default_bootstrap_disk() -> DiskId {
    FIRST_DISK
}

fn default_stripe_locks() -> usize {
    64
}

fn default_disk_dir() -> PathBuf {
    PathBuf::from("./raidvol-disks")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RaidConfig {
    /// Configuration for `disk_count` disks of `disk_size` bytes each
    #[must_use]
    pub fn with_disks(disk_count: u32, disk_size: u64, block_size: u32) -> Self {
        Self {
            disk_count,
            disk_size,
            block_size,
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Number of blocks on every disk, including the superblock
    #[must_use]
    pub const fn blocks_per_disk(&self) -> u64 {
        self.disk_size / self.block_size as u64
    }

    /// Last valid physical disk id
    #[must_use]
    pub const fn last_disk(&self) -> DiskId {
        self.disk_count
    }

    /// Image path of a file-backed disk
    #[must_use]
    pub fn disk_path(&self, disk: DiskId) -> PathBuf {
        self.disk_dir.join(format!("disk-{disk}.img"))
    }

    /// Check the geometry is usable
    pub fn validate(&self) -> Result<()> {
        if self.disk_count == 0 {
            return Err(Error::config("disk_count must be at least 1"));
        }
        if self.block_size < MIN_BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(Error::config(format!(
                "block_size {} must be a power of two of at least {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.disk_size % u64::from(self.block_size) != 0 {
            return Err(Error::config(format!(
                "disk_size {} is not a multiple of block_size {}",
                self.disk_size, self.block_size
            )));
        }
        if self.blocks_per_disk() < 2 {
            return Err(Error::config(
                "disk_size must hold the superblock and at least one data block",
            ));
        }
        if !(FIRST_DISK..=self.last_disk()).contains(&self.bootstrap_disk) {
            return Err(Error::config(format!(
                "bootstrap_disk {} is outside 1..={}",
                self.bootstrap_disk, self.disk_count
            )));
        }
        if self.stripe_locks == 0 {
            return Err(Error::config("stripe_locks must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RaidConfig::default();
        config.validate().unwrap();
        assert_eq!(config.blocks_per_disk(), 128 * 1024);
        assert_eq!(config.disk_path(3), PathBuf::from("./raidvol-disks/disk-3.img"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RaidConfig::from_toml_str(
            r#"
            disk_count = 5
            block_size = 512
            disk_size = 65536

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.disk_count, 5);
        assert_eq!(config.blocks_per_disk(), 128);
        assert_eq!(config.bootstrap_disk, 1);
        assert!(!config.format_on_init);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        assert!(RaidConfig::with_disks(0, 65536, 512).validate().is_err());
        assert!(RaidConfig::with_disks(2, 65536, 1000).validate().is_err());
        assert!(RaidConfig::with_disks(2, 65537, 512).validate().is_err());
        assert!(RaidConfig::with_disks(2, 512, 512).validate().is_err());

        let mut config = RaidConfig::with_disks(2, 65536, 512);
        config.bootstrap_disk = 3;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = RaidConfig::with_disks(2, 65536, 512);
        config.stripe_locks = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "disk_count = 3\nformat_on_init = true").unwrap();

        let config = RaidConfig::from_file(file.path()).unwrap();
        assert_eq!(config.disk_count, 3);
        assert!(config.format_on_init);

        assert!(RaidConfig::from_file("/nonexistent/raidvol.toml").is_err());
    }
}
