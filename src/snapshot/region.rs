//! Trait abstraction for the shared snapshot buffer to enable testing
//!
//! - [`MemoryRegion`]: in-process buffer behind a mutex (tests, single-process swarms)
//! - [`MmapRegion`]: named file mapped into every vehicle process (e.g. under `/dev/shm`)
//!
//! Regions move whole frames only. Nothing here locks across processes:
//! a concurrent reader may observe a partially written frame, which the
//! frame CRC exposes.

use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::frame::encode_frame;
use crate::error::{Result, SwarmError};
use crate::telemetry::state::SwarmSnapshot;

/// Fixed-capacity byte region shared by every vehicle
pub trait SharedRegion: Send + Sync {
    /// Region name (for logs)
    fn name(&self) -> &str;

    /// Capacity in bytes
    fn capacity(&self) -> usize;

    /// Copy the whole region
    fn load(&self) -> Vec<u8>;

    /// Overwrite the whole region with `frame`
    ///
    /// # Errors
    ///
    /// Returns `Region` if `frame` is not exactly `capacity` bytes
    fn store(&self, frame: &[u8]) -> Result<()>;
}

fn check_frame_len(name: &str, frame: &[u8], capacity: usize) -> Result<()> {
    if frame.len() != capacity {
        return Err(SwarmError::Region(format!(
            "Frame of {} bytes does not match capacity {} of region {}",
            frame.len(),
            capacity,
            name
        )));
    }
    Ok(())
}

/// Distinguishes staging files of concurrent attaches within one process
static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write a `capacity`-byte file holding an encoded empty snapshot
fn write_empty_region(path: &Path, capacity: usize) -> io::Result<()> {
    let frame = encode_frame(&SwarmSnapshot::new(), 0, capacity)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&frame)?;
    file.sync_all()
}

fn lock_buffer<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process region; clones share the same buffer
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    name: String,
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryRegion {
    /// Create a zero-filled region
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            buf: Arc::new(Mutex::new(vec![0u8; capacity])),
        }
    }
}

impl SharedRegion for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        lock_buffer(&self.buf).len()
    }

    fn load(&self) -> Vec<u8> {
        lock_buffer(&self.buf).clone()
    }

    fn store(&self, frame: &[u8]) -> Result<()> {
        let mut buf = lock_buffer(&self.buf);
        check_frame_len(&self.name, frame, buf.len())?;
        buf.copy_from_slice(frame);
        Ok(())
    }
}

/// Region backed by a memory-mapped file visible to other processes by name
pub struct MmapRegion {
    name: String,
    path: PathBuf,
    capacity: usize,
    map: Mutex<MmapMut>,
}

impl std::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl MmapRegion {
    /// Create the region, or attach to it if another process already did
    ///
    /// The creator builds a sized file holding an empty snapshot frame under
    /// a private temporary name, then hard-links it to `name`. The region
    /// therefore never appears under its name before it is complete, and of
    /// several processes racing to create it exactly one wins while the
    /// others attach. The region is never removed here; teardown is left to
    /// the host.
    ///
    /// # Arguments
    ///
    /// * `directory` - Directory holding the backing file (e.g. `/dev/shm`)
    /// * `name` - Region name, used as the file name
    /// * `capacity` - Region size in bytes
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created/opened/mapped or an
    /// existing file is smaller than `capacity`
    pub fn attach<P: AsRef<Path>>(directory: P, name: &str, capacity: usize) -> Result<Self> {
        let directory = directory.as_ref();
        let path = directory.join(name);

        if !path.exists() {
            match Self::publish_new(directory, &path, capacity) {
                Ok(true) => {
                    info!("Created shared region {} ({} bytes)", path.display(), capacity);
                }
                Ok(false) => debug!("Shared region {} created concurrently", path.display()),
                Err(e) => {
                    return Err(SwarmError::Region(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| SwarmError::Region(format!("Failed to open {}: {}", path.display(), e)))?;
        let len = file.metadata()?.len();
        if len < capacity as u64 {
            return Err(SwarmError::Region(format!(
                "Existing region {} is {} bytes, expected at least {}",
                path.display(),
                len,
                capacity
            )));
        }

        // SAFETY: the mapping stays valid as long as the file keeps at least
        // `capacity` bytes. Writers only ever copy whole frames in place, so
        // concurrent writers can tear a frame but never shrink the file. A
        // process outside this crate that truncates the file would make
        // accesses through the mapping fault (SIGBUS); that is not guarded
        // against.
        let map = unsafe { MmapOptions::new().len(capacity).map_mut(&file)? };
        debug!("Attached to shared region {}", path.display());

        Ok(Self {
            name: name.to_string(),
            path,
            capacity,
            map: Mutex::new(map),
        })
    }

    /// Build a complete region file next to `path` and link it into place
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - This call created the region
    /// * `Ok(false)` - Another process created it first
    fn publish_new(directory: &Path, path: &Path, capacity: usize) -> io::Result<bool> {
        let staging = directory.join(format!(
            ".{}.{}.{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("region"),
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = write_empty_region(&staging, capacity).and_then(|()| {
            match fs::hard_link(&staging, path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e),
            }
        });

        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove staging file {}: {}", staging.display(), e);
            }
        }

        result
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SharedRegion for MmapRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn load(&self) -> Vec<u8> {
        lock_buffer(&self.map).to_vec()
    }

    fn store(&self, frame: &[u8]) -> Result<()> {
        check_frame_len(&self.name, frame, self.capacity)?;
        lock_buffer(&self.map).copy_from_slice(frame);
        Ok(())
    }
}
