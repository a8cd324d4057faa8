//! Settings persistence.
//!
//! The gate reads its settings through the [`ConfigStore`] collaborator so the
//! host decides where snapshots live. Two implementations are provided: a
//! process-local store for tests and embedded use, and a redb-backed store
//! that survives restarts.

use std::path::Path;
use std::sync::{Arc, RwLock};

use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;

use super::settings::{GateSettings, GateSettingsPatch};

const SETTINGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("settings");
const SNAPSHOT_KEY: &str = "gate-settings";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("settings database error: {0}")]
    Database(#[from] redb::Error),
}

/// Key/value settings persistence consumed by the gate.
pub trait ConfigStore: Send + Sync {
    /// Current validated snapshot.
    fn get(&self) -> GateSettings;

    /// Validate and merge a partial update, persist, and return the result.
    fn set(&self, patch: GateSettingsPatch) -> Result<GateSettings, ConfigError>;

    /// Drop any persisted snapshot and revert to compiled-in defaults.
    fn clear(&self) -> Result<GateSettings, ConfigError>;
}

/// In-memory store with no persistence.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    current: RwLock<GateSettings>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: GateSettings) -> Self {
        Self {
            current: RwLock::new(settings),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> GateSettings {
        self.current.read().expect("settings lock poisoned").clone()
    }

    fn set(&self, patch: GateSettingsPatch) -> Result<GateSettings, ConfigError> {
        let mut guard = self.current.write().expect("settings lock poisoned");
        let merged = guard.apply_patch(patch);
        *guard = merged.clone();
        Ok(merged)
    }

    fn clear(&self) -> Result<GateSettings, ConfigError> {
        let mut guard = self.current.write().expect("settings lock poisoned");
        *guard = GateSettings::default();
        Ok(guard.clone())
    }
}

/// Durable store keeping one JSON snapshot in a redb table.
pub struct RedbConfigStore {
    db: Arc<Database>,
    cached: RwLock<GateSettings>,
}

impl RedbConfigStore {
    /// Open (or create) the settings database at `path`.
    ///
    /// A corrupt or unreadable snapshot falls back to defaults rather than
    /// failing the caller; configuration errors never take the gate down.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let db = Database::create(path).map_err(redb::Error::from)?;
        let store = Self {
            db: Arc::new(db),
            cached: RwLock::new(GateSettings::default()),
        };
        match store.load_snapshot() {
            Ok(Some(settings)) => {
                *store.cached.write().expect("settings lock poisoned") = settings;
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("failed to load persisted settings, using defaults: {err}");
            }
        }
        Ok(store)
    }

    fn load_snapshot(&self) -> Result<Option<GateSettings>, ConfigError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = match txn.open_table(SETTINGS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(redb::Error::from(err).into()),
        };
        let Some(raw) = table.get(SNAPSHOT_KEY).map_err(redb::Error::from)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(raw.value())?))
    }

    fn persist(&self, settings: &GateSettings) -> Result<(), ConfigError> {
        let payload = serde_json::to_string(settings)?;
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = txn.open_table(SETTINGS_TABLE).map_err(redb::Error::from)?;
            table
                .insert(SNAPSHOT_KEY, payload.as_str())
                .map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn remove_snapshot(&self) -> Result<(), ConfigError> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = txn.open_table(SETTINGS_TABLE).map_err(redb::Error::from)?;
            table.remove(SNAPSHOT_KEY).map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }
}

impl ConfigStore for RedbConfigStore {
    fn get(&self) -> GateSettings {
        self.cached.read().expect("settings lock poisoned").clone()
    }

    fn set(&self, patch: GateSettingsPatch) -> Result<GateSettings, ConfigError> {
        let mut guard = self.cached.write().expect("settings lock poisoned");
        let merged = guard.apply_patch(patch);
        self.persist(&merged)?;
        *guard = merged.clone();
        Ok(merged)
    }

    fn clear(&self) -> Result<GateSettings, ConfigError> {
        self.remove_snapshot()?;
        let mut guard = self.cached.write().expect("settings lock poisoned");
        *guard = GateSettings::default();
        Ok(guard.clone())
    }
}
