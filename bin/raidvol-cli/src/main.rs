//! raidvol CLI - Admin Command Line Interface
//!
//! This binary drives a RAID volume stored in file-backed disk images.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use raidvol_common::{DiskId, LogicalBlock, RaidConfig, RaidLevel};
use raidvol_engine::RaidDevice;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "raidvol-cli")]
#[command(about = "raidvol Admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "RAIDVOL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the disk images
    #[arg(long)]
    disk_dir: Option<PathBuf>,

    /// Number of disks
    #[arg(long)]
    disks: Option<u32>,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a volume over every disk (raid0, raid1, raid0+1, raid4, raid5)
    Init {
        /// RAID level
        level: RaidLevel,
    },
    /// Read one logical block
    Read {
        /// Logical block number
        block: LogicalBlock,
        /// Write the raw block to a file instead of printing a hex dump
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Write one logical block, zero padded to the block size
    Write {
        /// Logical block number
        block: LogicalBlock,
        /// Text payload
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// File whose contents are the payload
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Mark a disk as failed
    Fail {
        /// Disk ID (1-based)
        disk: DiskId,
    },
    /// Rebuild a failed disk
    Repair {
        /// Disk ID (1-based)
        disk: DiskId,
    },
    /// Show volume geometry and disk health
    Info,
    /// Remove the volume metadata from every disk
    Destroy,
    /// Zero every block of every disk
    Format,
}

fn load_config(args: &Args) -> Result<RaidConfig> {
    let mut config = match &args.config {
        Some(path) => RaidConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RaidConfig::default(),
    };

    if let Some(dir) = &args.disk_dir {
        config.disk_dir.clone_from(dir);
    }
    if let Some(disks) = args.disks {
        config.disk_count = disks;
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    config.validate()?;
    Ok(config)
}

/// Pad `payload` with zeros to one block
fn block_payload(payload: &[u8], block_size: usize) -> Result<Vec<u8>> {
    if payload.len() > block_size {
        bail!(
            "payload is {} bytes, larger than the {} byte block",
            payload.len(),
            block_size
        );
    }
    let mut buf = vec![0u8; block_size];
    buf[..payload.len()].copy_from_slice(payload);
    Ok(buf)
}

fn hex_dump(data: &[u8]) -> String {
    data.chunks(32)
        .enumerate()
        .map(|(i, line)| format!("{:08x}  {}", i * 32, hex::encode(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let device = RaidDevice::open(&config).with_context(|| {
        format!("failed to open disks in {}", config.disk_dir.display())
    })?;

    match args.command {
        Commands::Init { level } => {
            device.init(level)?;
            let info = device.info()?;
            println!(
                "Created {} volume: {} blocks of {} bytes",
                info.level, info.addressable_blocks, info.blk_size
            );
        }
        Commands::Read { block, out } => {
            let mut buf = vec![0u8; device.block_size()];
            device.read_block(block, &mut buf)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &buf)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Wrote block {} to {}", block, path.display());
                }
                None => println!("{}", hex_dump(&buf)),
            }
        }
        Commands::Write { block, text, file } => {
            let payload = match (text, file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => read_payload(&path)?,
                (None, None) => bail!("either --text or --file is required"),
            };
            device.write_block(block, &block_payload(&payload, device.block_size())?)?;
            println!("Wrote {} bytes to block {block}", payload.len());
        }
        Commands::Fail { disk } => {
            device.fail_disk(disk)?;
            println!("Disk {disk} marked unhealthy");
        }
        Commands::Repair { disk } => {
            device.repair_disk(disk)?;
            println!("Disk {disk} is {}", device.disk_health(disk)?);
        }
        Commands::Info => {
            let info = device.info()?;
            println!("Volume");
            println!("======");
            println!("Level:          {}", info.level);
            println!("Max block:      {}", info.max_blknum);
            println!("Usable blocks:  {}", info.addressable_blocks);
            println!("Block size:     {}", info.blk_size);
            println!("Members:        {}", info.num_of_disks);
            println!();
            println!("{:<8} {:<12}", "DISK", "HEALTH");
            println!("{}", "-".repeat(20));
            for (id, health) in device.health_report()? {
                println!("{id:<8} {:<12}", health.name());
            }
        }
        Commands::Destroy => {
            device.destroy()?;
            println!("Volume destroyed");
        }
        Commands::Format => {
            device.format_disks()?;
            println!("Formatted {} disks", device.disks().len());
        }
    }

    Ok(())
}
