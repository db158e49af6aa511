//! Best-effort persistence of the bulb's durable subset.
//!
//! Only `isOn`, `brightness` and `totalEnergyWattHours` survive a restart.
//! Stores are allowed to fail: the controller keeps running in memory and
//! the failure is logged by the caller.
//!
//! ## Rust concepts
//! - Traits as a seam between the core and its storage collaborator
//! - `thiserror` for a small typed error enum
//! - `#[serde(default)]` for tolerant deserialization

use crate::bulb::{DEFAULT_BRIGHTNESS, clamp_brightness};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

// ── Record ───────────────────────────────────────────────────────────

/// The persisted record.
///
/// Missing fields fall back to the bulb defaults and unknown fields are
/// ignored. `brightness` is read as a wide integer so an out-of-range value
/// on disk is clamped instead of rejected.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedBulb {
    pub is_on: bool,
    pub brightness: i64,
    pub total_energy_watt_hours: f64,
}

impl PersistedBulb {
    /// Force every field into its valid domain.
    pub fn sanitized(self) -> Self {
        let energy = self.total_energy_watt_hours;
        Self {
            is_on: self.is_on,
            brightness: clamp_brightness(self.brightness) as i64,
            total_energy_watt_hours: if energy.is_finite() && energy > 0.0 {
                energy
            } else {
                0.0
            },
        }
    }
}

impl Default for PersistedBulb {
    fn default() -> Self {
        Self {
            is_on: false,
            brightness: DEFAULT_BRIGHTNESS as i64,
            total_energy_watt_hours: 0.0,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored state is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

// ── Stores ───────────────────────────────────────────────────────────

/// Storage collaborator for the persisted record.
///
/// `load` returns `Ok(None)` when nothing has been saved yet.
pub trait SnapshotStore: Send {
    fn load(&self) -> Result<Option<PersistedBulb>, PersistError>;
    fn save(&mut self, record: &PersistedBulb) -> Result<(), PersistError>;
}

/// Keeps the record in a JSON file, the native stand-in for browser
/// local storage.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedBulb>, PersistError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: PersistedBulb = serde_json::from_str(&raw)?;
        Ok(Some(record))
    }

    fn save(&mut self, record: &PersistedBulb) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory store for `--ephemeral` runs and tests.
///
/// Clones share the same slot, so a test can keep one clone to inspect
/// what the controller wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<PersistedBulb>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: PersistedBulb) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(record))),
        }
    }

    pub fn get(&self) -> Option<PersistedBulb> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedBulb>, PersistError> {
        Ok(self.get())
    }

    fn save(&mut self, record: &PersistedBulb) -> Result<(), PersistError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(*record);
        Ok(())
    }
}

/// Load the last record, treating any failure as "nothing saved".
pub fn load_or_default(store: &dyn SnapshotStore) -> Option<PersistedBulb> {
    match store.load() {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Ignoring unreadable saved state, starting from defaults: {}", e);
            None
        }
    }
}
