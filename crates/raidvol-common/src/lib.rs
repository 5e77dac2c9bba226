//! raidvol Common - Shared types and utilities
//!
//! This crate provides the RAID level and disk health types, the error
//! taxonomy and the configuration used by every raidvol component.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LoggingConfig, RaidConfig};
pub use error::{Error, Result};
pub use types::*;
