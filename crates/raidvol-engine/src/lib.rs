//! raidvol Engine - RAID volume over a fixed disk set
//!
//! This crate turns the physical disks of a [`raidvol_storage::DiskArray`]
//! into one logical block device at RAID level 0, 1, 0+1, 4 or 5.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ RaidDevice / sys entries │  read, write, fail, repair, info, destroy
//! └────────────┬─────────────┘
//!              │
//! ┌────────────▼─────────────┐
//! │  MetadataManager         │  lazy superblock load
//! │  Geometry                │  logical -> (disk, block)
//! │  RedundancyEngine        │  mirrors and parity
//! │  Recovery                │  rebuild a repaired disk
//! │  HealthRegistry          │  per-disk health cache
//! └────────────┬─────────────┘
//!              │
//! ┌────────────▼─────────────┐
//! │  DiskArray (disks 1..=N) │  block 0 = superblock replica
//! └──────────────────────────┘
//! ```

pub mod device;
pub mod geometry;
pub mod health;
pub mod io;
pub mod locks;
pub mod metadata;
pub mod parity;
pub mod recovery;
pub mod sys;

pub use device::{RaidDevice, RaidInfo};
pub use geometry::{Geometry, Placement};
pub use health::{HealthGuard, HealthRegistry};
pub use io::RedundancyEngine;
pub use locks::VolumeLocks;
pub use metadata::{MetadataManager, Volume};
pub use recovery::RebuildPlan;
pub use sys::{FlatMemory, UserMemory};
