//! File-backed block device
//!
//! A disk image (or a real block device node) accessed with positional
//! reads and writes, one block at a time.

use crate::device::{BlockDevice, DiskStats, check_transfer};
use raidvol_common::{Error, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Disk backed by a file or block device node
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    path: String,
    block_size: usize,
    block_count: u64,
    stats: DiskStats,
}

impl FileDisk {
    /// Open an existing disk image
    ///
    /// The block count is derived from the current file or device size.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::storage(format!("failed to open {path_str}: {e}")))?;

        let size = Self::device_size(&file, &path_str)?;

        Ok(Self {
            file,
            path: path_str,
            block_size,
            block_count: size / block_size as u64,
            stats: DiskStats::default(),
        })
    }

    /// Open a disk image, creating it with `size` bytes if it does not exist
    ///
    /// Existing images and block devices keep their contents and size.
    pub fn open_or_create(path: impl AsRef<Path>, size: u64, block_size: usize) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        if !path.as_ref().exists() {
            if let Some(parent) = path.as_ref().parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::storage(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| Error::storage(format!("failed to create {path_str}: {e}")))?;
            file.set_len(size).map_err(|e| {
                Error::storage(format!("failed to set size for {path_str}: {e}"))
            })?;
        }

        Self::open(path, block_size)
    }

    /// Size of the underlying file or device in bytes
    fn device_size(file: &File, path: &str) -> Result<u64> {
        use std::io::{Seek, SeekFrom};
        use std::os::unix::fs::FileTypeExt;

        let metadata = file
            .metadata()
            .map_err(|e| Error::storage(format!("failed to get metadata for {path}: {e}")))?;

        if !metadata.file_type().is_block_device() {
            return Ok(metadata.len());
        }

        // Block device nodes report a zero length; seek to the end instead
        let mut f = file;
        let size = f
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::storage(format!("failed to get device size for {path}: {e}")))?;
        f.seek(SeekFrom::Start(0))
            .map_err(|e| Error::storage(format!("failed to seek to start for {path}: {e}")))?;
        Ok(size)
    }

    /// Get the file path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn offset(&self, block: u64) -> u64 {
        block * self.block_size as u64
    }
}

impl BlockDevice for FileDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<()> {
        check_transfer(self, block, buf.len())?;

        let result = self.file.read_exact_at(buf, self.offset(block));
        self.stats.record_read(buf.len(), result.is_ok());
        result.map_err(|e| {
            Error::storage(format!("read failed on {} block {block}: {e}", self.path))
        })
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> Result<()> {
        check_transfer(self, block, buf.len())?;

        let result = self.file.write_all_at(buf, self.offset(block));
        self.stats.record_write(buf.len(), result.is_ok());
        result.map_err(|e| {
            Error::storage(format!("write failed on {} block {block}: {e}", self.path))
        })
    }

    fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| Error::storage(format!("sync failed on {}: {e}", self.path)))
    }

    fn name(&self) -> String {
        self.path.clone()
    }

    fn stats(&self) -> &DiskStats {
        &self.stats
    }
}
