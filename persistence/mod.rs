/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Key-value storage areas behind the rule store and the launch-context broker.
//!
//! Architecture:
//! - [`KeyValueStore`] is a slot-addressed byte store (`get` / `set` / `remove`).
//! - [`RedbDatabase`] owns one redb file with two areas: `local` survives
//!   restarts, `session` is dropped every time the database is opened.
//! - [`MemoryStore`] keeps slots in process memory; [`DisabledStore`] refuses
//!   every call, for deployments that run without session storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use redb::{ReadableDatabase, TableDefinition};

const LOCAL_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("local");
const SESSION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("session");
const DATABASE_FILE_NAME: &str = "retitle.redb";

/// Slot-addressed byte storage. Every call is a single attempt.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, slot: &str, value: &[u8]) -> Result<(), StoreError>;
    fn remove(&self, slot: &str) -> Result<(), StoreError>;
}

/// redb database shared by the durable and the session area.
pub struct RedbDatabase {
    db: Arc<redb::Database>,
}

impl RedbDatabase {
    /// Open or create the database under `base_dir`, discarding the previous
    /// run's session area.
    pub fn open(base_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create dir: {e}")))?;
        let db = redb::Database::create(base_dir.join(DATABASE_FILE_NAME))
            .map_err(|e| StoreError::Redb(format!("{e}")))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let dropped = write_txn
            .delete_table(SESSION_TABLE)
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        if dropped {
            debug!("persistence: discarded session area from previous run");
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Area that survives restarts.
    pub fn local_area(&self) -> RedbArea {
        RedbArea {
            db: Arc::clone(&self.db),
            table: LOCAL_TABLE,
        }
    }

    /// Area that lives until the next [`RedbDatabase::open`].
    pub fn session_area(&self) -> RedbArea {
        RedbArea {
            db: Arc::clone(&self.db),
            table: SESSION_TABLE,
        }
    }

    /// Default directory for the database.
    pub fn default_data_dir() -> Option<PathBuf> {
        let mut dir = dirs::data_dir()?;
        dir.push("retitle");
        Some(dir)
    }
}

/// One table of a [`RedbDatabase`].
#[derive(Clone)]
pub struct RedbArea {
    db: Arc<redb::Database>,
    table: TableDefinition<'static, &'static str, &'static [u8]>,
}

impl KeyValueStore for RedbArea {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let table = match read_txn.open_table(self.table) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StoreError::Redb(format!("{e}"))),
        };
        let value = table
            .get(slot)
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn set(&self, slot: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(self.table)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            table
                .insert(slot, value)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))
    }

    fn remove(&self, slot: &str) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(self.table)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            table
                .remove(slot)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))
    }
}

/// In-process slots.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.slots.lock().get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &[u8]) -> Result<(), StoreError> {
        self.slots.lock().insert(slot.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), StoreError> {
        self.slots.lock().remove(slot);
        Ok(())
    }
}

/// Backend for a storage area the host does not provide.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledStore;

impl KeyValueStore for DisabledStore {
    fn get(&self, _slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unavailable)
    }

    fn set(&self, _slot: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    fn remove(&self, _slot: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }
}

/// Errors from a storage area
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io(String),
    Redb(String),
    Codec(String),
    Unavailable,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {e}"),
            StoreError::Redb(e) => write!(f, "Redb error: {e}"),
            StoreError::Codec(e) => write!(f, "Codec error: {e}"),
            StoreError::Unavailable => write!(f, "Storage area is unavailable"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_test_database() -> (RedbDatabase, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = RedbDatabase::open(dir.path()).unwrap();
        (db, dir)
    }

    #[test]
    fn missing_slot_reads_as_none() {
        let (db, _dir) = open_test_database();
        assert_eq!(db.local_area().get("nothing").unwrap(), None);
        assert_eq!(db.session_area().get("nothing").unwrap(), None);
    }

    #[test]
    fn set_get_remove() {
        let (db, _dir) = open_test_database();
        let area = db.local_area();
        area.set("slot", b"value").unwrap();
        assert_eq!(area.get("slot").unwrap().as_deref(), Some(&b"value"[..]));
        area.set("slot", b"other").unwrap();
        assert_eq!(area.get("slot").unwrap().as_deref(), Some(&b"other"[..]));
        area.remove("slot").unwrap();
        assert_eq!(area.get("slot").unwrap(), None);
    }

    #[test]
    fn removing_unknown_slot_is_ok() {
        let (db, _dir) = open_test_database();
        db.session_area().remove("never-written").unwrap();
    }

    #[test]
    fn areas_do_not_share_slots() {
        let (db, _dir) = open_test_database();
        db.local_area().set("slot", b"local").unwrap();
        assert_eq!(db.session_area().get("slot").unwrap(), None);
    }

    #[test]
    fn local_area_survives_reopen_and_session_area_does_not() {
        let dir = TempDir::new().unwrap();
        {
            let db = RedbDatabase::open(dir.path()).unwrap();
            db.local_area().set("rules", b"{}").unwrap();
            db.session_area().set("launch", b"{}").unwrap();
        }
        let db = RedbDatabase::open(dir.path()).unwrap();
        assert_eq!(db.local_area().get("rules").unwrap().as_deref(), Some(&b"{}"[..]));
        assert_eq!(db.session_area().get("launch").unwrap(), None);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.set("slot", b"1").unwrap();
        assert_eq!(store.get("slot").unwrap(), Some(b"1".to_vec()));
        store.remove("slot").unwrap();
        assert_eq!(store.get("slot").unwrap(), None);
    }

    #[test]
    fn disabled_store_refuses_everything() {
        let store = DisabledStore;
        assert_eq!(store.get("slot"), Err(StoreError::Unavailable));
        assert_eq!(store.set("slot", b"x"), Err(StoreError::Unavailable));
        assert_eq!(store.remove("slot"), Err(StoreError::Unavailable));
    }
}
