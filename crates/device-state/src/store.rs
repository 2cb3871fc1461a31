//! Thread-safe holder of the latest snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::snapshot::DeviceStateSnapshot;

/// Errors from reading or writing the snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Latest snapshot, swapped as a whole on every update.
///
/// Readers get an `Arc` to an immutable snapshot, so they never observe a
/// half-applied update. Disconnects do not clear it.
///
/// [`replace`](Self::replace) only touches memory. Mirroring to disk is a
/// separate, blocking [`persist_current`](Self::persist_current) call that
/// callers on an async runtime move off their task.
#[derive(Debug, Default)]
pub struct StateStore {
    current: RwLock<Option<Arc<DeviceStateSnapshot>>>,
    path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl StateStore {
    /// In-memory store, empty until the hub sends its state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store mirrored to `path`, seeded from it if the file exists.
    ///
    /// An unreadable file is logged and ignored.
    pub fn with_persistence(path: PathBuf) -> Self {
        let initial = match load_snapshot(&path) {
            Ok(Some(snap)) => {
                info!(
                    path = %path.display(),
                    devices = snap.device_count(),
                    received_at = %snap.received_at,
                    "restored device snapshot"
                );
                Some(Arc::new(snap))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable snapshot file: {e}");
                None
            }
        };
        Self {
            current: RwLock::new(initial),
            path: Some(path),
            persist_lock: Mutex::new(()),
        }
    }

    /// Replaces the stored snapshot and returns the new one.
    pub fn replace(&self, snapshot: DeviceStateSnapshot) -> Arc<DeviceStateSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        debug!(devices = snapshot.device_count(), "device snapshot replaced");
        snapshot
    }

    /// Writes the latest snapshot to the snapshot file. Blocks on file I/O.
    ///
    /// Returns `false` without touching disk when there is no file or no
    /// snapshot. Writes are serialised and always take the snapshot current
    /// at write time, so the file never goes back to an older state.
    pub fn persist_current(&self) -> Result<bool, StoreError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(snapshot) = self.current() else {
            return Ok(false);
        };
        save_snapshot(path, &snapshot)?;
        Ok(true)
    }

    /// Latest snapshot, or `None` if the hub never sent one.
    pub fn current(&self) -> Option<Arc<DeviceStateSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_snapshot(&self) -> bool {
        self.current().is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn load_snapshot(path: &Path) -> Result<Option<DeviceStateSnapshot>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Writes next to the target and renames, so a crash never leaves a
/// truncated file behind.
fn save_snapshot(path: &Path, snapshot: &DeviceStateSnapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "persisted device snapshot");
    Ok(())
}
