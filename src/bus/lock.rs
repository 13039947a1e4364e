// Cross-process bus arbitration
//
// The SPI bus has no native multiplexing, so every process talking to the
// board takes an advisory lock on a shared file around each transfer.
// flock() locks belong to an open file description: each acquire opens the
// file anew, so threads of one process contend exactly like separate
// processes do, and a second acquire on the same call stack blocks.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::config::DEFAULT_LOCK_PATH;
use crate::error::Result;

/// Whether the board handle locks the bus around each transfer
///
/// `Disabled` skips the lock entirely. Only use it when this process is the
/// sole user of the bus: overlapping transfers from another process will
/// corrupt frames on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockMode {
    PerTransfer(PathBuf),
    Disabled,
}

impl Default for LockMode {
    fn default() -> Self {
        LockMode::PerTransfer(PathBuf::from(DEFAULT_LOCK_PATH))
    }
}

/// Named, file-backed exclusive lock on the bus
#[derive(Debug, Clone)]
pub struct BusArbiter {
    path: PathBuf,
}

impl BusArbiter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(file)
    }

    /// Block until the bus is ours
    pub fn acquire(&self) -> Result<BusGuard> {
        let file = self.open()?;
        file.lock_exclusive()?;
        debug!("Bus lock acquired: {}", self.path.display());
        Ok(BusGuard { file: Some(file) })
    }

    /// Take the bus if nobody holds it, without waiting
    pub fn try_acquire(&self) -> Result<Option<BusGuard>> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(BusGuard { file: Some(file) })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether some holder currently owns the bus
    pub fn is_locked(&self) -> Result<bool> {
        Ok(self.try_acquire()?.is_none())
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Exclusive ownership of the bus; released on drop
#[derive(Debug)]
pub struct BusGuard {
    file: Option<File>,
}

impl BusGuard {
    /// Release explicitly (dropping the guard does the same)
    pub fn release(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)?;
        }
        Ok(())
    }
}

impl Drop for BusGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                // Closing the descriptor releases the lock regardless
                warn!("Failed to unlock bus: {}", e);
            }
        }
    }
}
