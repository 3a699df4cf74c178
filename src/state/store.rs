// SPDX-License-Identifier: MIT

//! Durable storage for the state record
//!
//! Writes go to a temporary file in the state directory and are renamed over
//! the state file, so a reader sees either the old or the new content and
//! never a mix. Reads never fail: a missing file is created from the
//! defaults and a corrupt one is replaced by them.

use log::{debug, error, info, warn};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::record::{Clock, StateRecord, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Corruption, StateError};

/// How `StateStore::load` arrived at the record it returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The stored record was complete and valid
    Loaded(StateRecord),
    /// No record existed; the default was created
    Created(StateRecord),
    /// Some fields were missing and have been filled with defaults
    Repaired {
        record: StateRecord,
        filled: Vec<&'static str>,
    },
    /// The stored content was unusable and has been replaced by the default
    Reinitialized {
        record: StateRecord,
        reason: Corruption,
    },
}

impl LoadOutcome {
    pub fn record(&self) -> &StateRecord {
        match self {
            Self::Loaded(record) | Self::Created(record) => record,
            Self::Repaired { record, .. } | Self::Reinitialized { record, .. } => record,
        }
    }

    pub fn into_record(self) -> StateRecord {
        match self {
            Self::Loaded(record) | Self::Created(record) => record,
            Self::Repaired { record, .. } | Self::Reinitialized { record, .. } => record,
        }
    }

    /// True when the record came off disk untouched
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Handle to the on-disk state record. Cheap to clone.
#[derive(Clone)]
pub struct StateStore {
    config: Arc<StoreConfig>,
    state_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        let state_path = config.state_path();
        Self {
            config: Arc::new(config),
            state_path,
            clock,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the current-format state file
    pub fn path(&self) -> &Path {
        &self.state_path
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create the storage directory if it does not exist yet
    pub fn ensure_location(&self) -> Result<(), StateError> {
        let dir = self.dir();
        fs::create_dir_all(dir).map_err(|e| StateError::storage("create directory", dir, e))
    }

    /// Promote the first existing legacy file to the current name.
    ///
    /// Returns the legacy path that was promoted, or `None` when the current
    /// file already exists, no legacy file exists, or every attempt failed.
    pub fn migrate_legacy_if_needed(&self) -> Option<PathBuf> {
        if self.state_path.exists() {
            return None;
        }

        for legacy in self.config.legacy_paths() {
            if !legacy.exists() {
                continue;
            }

            match fs::rename(&legacy, &self.state_path) {
                Ok(()) => {
                    info!(
                        "Migrated legacy state file {} to {}",
                        legacy.display(),
                        self.state_path.display()
                    );
                    return Some(legacy);
                }
                Err(e) => {
                    debug!("Rename of {} failed ({}), copying instead", legacy.display(), e);
                }
            }

            match self.copy_legacy(&legacy) {
                Ok(()) => {
                    info!(
                        "Copied legacy state file {} to {}",
                        legacy.display(),
                        self.state_path.display()
                    );
                    return Some(legacy);
                }
                Err(e) => warn!("Could not migrate {}: {}", legacy.display(), e),
            }
        }

        None
    }

    /// Atomically write the bytes of `legacy` to the current path, leaving
    /// `legacy` itself in place
    fn copy_legacy(&self, legacy: &Path) -> Result<(), StateError> {
        let bytes = fs::read(legacy).map_err(|e| StateError::storage("read", legacy, e))?;
        self.atomic_write_bytes(&bytes)
    }

    /// Return the current record, creating or repairing it as needed
    pub fn load(&self) -> LoadOutcome {
        if let Err(e) = self.ensure_location() {
            error!("{}", e);
        }
        self.migrate_legacy_if_needed();

        let bytes = match fs::read(&self.state_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let record = StateRecord::initial(self.clock.now());
                match self.create_initial(&record) {
                    Ok(true) => {
                        info!("Created state file {}", self.state_path.display());
                        return LoadOutcome::Created(record);
                    }
                    Ok(false) => {
                        debug!("State file appeared while creating it; reading it instead");
                        match fs::read(&self.state_path) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                return self.reinitialize(Corruption::Unreadable(e.to_string()))
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to persist state record: {}", e);
                        return LoadOutcome::Created(record);
                    }
                }
            }
            Err(e) => return self.reinitialize(Corruption::Unreadable(e.to_string())),
        };

        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => return self.reinitialize(Corruption::Malformed(e.to_string())),
        };

        match StateRecord::decode(&value, self.clock.now()) {
            Ok((record, filled)) if filled.is_empty() => LoadOutcome::Loaded(record),
            Ok((record, filled)) => {
                warn!(
                    "State file {} was missing {:?}; filled with defaults",
                    self.state_path.display(),
                    filled
                );
                self.persist_best_effort(&record);
                LoadOutcome::Repaired { record, filled }
            }
            Err(reason) => self.reinitialize(reason),
        }
    }

    /// Serialize `record` and atomically replace the state file with it
    pub fn atomic_write(&self, record: &StateRecord) -> Result<(), StateError> {
        let bytes = encode(record)?;
        self.atomic_write_bytes(&bytes)
    }

    /// Atomically replace the state file with `bytes`.
    ///
    /// The temporary file lives next to the target so the final rename
    /// stays on one filesystem. It is removed if anything fails before the
    /// rename.
    pub fn atomic_write_bytes(&self, bytes: &[u8]) -> Result<(), StateError> {
        let temp = self.write_temp(bytes)?;
        temp.persist(&self.state_path)
            .map_err(|e| StateError::storage("replace", &self.state_path, e.error))?;

        debug!("Wrote {} bytes to {}", bytes.len(), self.state_path.display());
        Ok(())
    }

    /// Write the default record only if no state file exists yet.
    ///
    /// Returns `Ok(false)` when another writer got there first, in which case
    /// its record is kept.
    fn create_initial(&self, record: &StateRecord) -> Result<bool, StateError> {
        let bytes = encode(record)?;
        let temp = self.write_temp(&bytes)?;
        match temp.persist_noclobber(&self.state_path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StateError::storage("create", &self.state_path, e.error)),
        }
    }

    /// Fully written and synced temporary file next to the state file
    fn write_temp(&self, bytes: &[u8]) -> Result<NamedTempFile, StateError> {
        let dir = self.dir();
        let mut temp = tempfile::Builder::new()
            .prefix("state_")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| StateError::storage("create temporary file in", dir, e))?;

        temp.write_all(bytes)
            .map_err(|e| StateError::storage("write", temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StateError::storage("sync", temp.path(), e))?;
        Ok(temp)
    }

    fn dir(&self) -> &Path {
        match self.state_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn reinitialize(&self, reason: Corruption) -> LoadOutcome {
        warn!(
            "State file {} is corrupt ({}); reinitializing with defaults",
            self.state_path.display(),
            reason
        );
        let record = StateRecord::initial(self.clock.now());
        self.persist_best_effort(&record);
        LoadOutcome::Reinitialized { record, reason }
    }

    fn persist_best_effort(&self, record: &StateRecord) {
        if let Err(e) = self.atomic_write(record) {
            error!("Failed to persist state record: {}", e);
        }
    }
}

fn encode(record: &StateRecord) -> Result<Vec<u8>, StateError> {
    serde_json::to_vec(record).map_err(|e| StateError::StorageUnavailable {
        context: "serialize state record".to_string(),
        source: e.into(),
    })
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("state_path", &self.state_path)
            .field("legacy_files", &self.config.legacy_files)
            .finish()
    }
}
