//! In-memory table store
//!
//! Holds tables behind a `RwLock` so reads can run concurrently. Besides
//! serving as a backend for tests, it can simulate the things a live host
//! does behind the pipeline's back: going offline, another writer touching a
//! table, and a table's columns changing.

use crate::error::{Error, Result};
use crate::store::{resolve_group, Groups, RawTable, StoredTable, TableStore, WriteOutcome, WriteRequest};
use crate::table::{Field, TableFields, TableInfo, TableKey};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Inner {
    tables: BTreeMap<TableKey, StoredTable>,
    groups: Groups,
    available: bool,
    writes: usize,
}

/// A table store living entirely in memory
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, reachable store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                tables: BTreeMap::new(),
                groups: Groups::new(),
                available: true,
                writes: 0,
            }),
        }
    }

    /// Add a table, replacing any table with the same key
    pub fn with_table(self, table: StoredTable) -> Self {
        self.insert_table(table);
        self
    }

    pub fn insert_table(&self, table: StoredTable) {
        self.write_lock().tables.insert(table.key.clone(), table);
    }

    /// Define a row group by the identities of its member rows
    pub fn add_group<I, S>(&self, name: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_lock()
            .groups
            .insert(name.into(), members.into_iter().map(Into::into).collect());
    }

    /// Make every call fail with `BackendUnavailable` until re-enabled
    pub fn set_available(&self, available: bool) {
        self.write_lock().available = available;
    }

    /// Advance a table's data version as if another writer had touched it
    pub fn bump(&self, key: &TableKey) -> Result<u64> {
        let mut inner = self.write_lock();
        let table = table_mut(&mut inner, key)?;
        table.data_version += 1;
        Ok(table.data_version)
    }

    /// Change a table's columns and advance its schema version
    pub fn alter_schema(&self, key: &TableKey, alter: impl FnOnce(&mut Vec<Field>)) -> Result<u64> {
        let mut inner = self.write_lock();
        let table = table_mut(&mut inner, key)?;
        alter(&mut table.fields);
        let width = table.fields.len();
        for row in &mut table.rows {
            row.resize(width, String::new());
        }
        table.schema_version += 1;
        Ok(table.schema_version)
    }

    /// Full-width rows of a table as currently stored
    pub fn rows(&self, key: &TableKey) -> Option<Vec<Vec<String>>> {
        self.read_lock().tables.get(key).map(|t| t.rows.clone())
    }

    /// Number of accepted writes so far
    pub fn write_count(&self) -> usize {
        self.read_lock().writes
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn online(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        let inner = self.read_lock();
        if inner.available {
            Ok(inner)
        } else {
            Err(offline())
        }
    }
}

fn offline() -> Error {
    Error::BackendUnavailable("in-memory store is offline".to_string())
}

fn table_mut<'a>(inner: &'a mut Inner, key: &TableKey) -> Result<&'a mut StoredTable> {
    inner.tables.get_mut(key).ok_or_else(|| Error::TableNotFound {
        table: key.to_string(),
    })
}

fn table_ref<'a>(inner: &'a Inner, key: &TableKey) -> Result<&'a StoredTable> {
    inner.tables.get(key).ok_or_else(|| Error::TableNotFound {
        table: key.to_string(),
    })
}

impl TableStore for MemoryStore {
    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let inner = self.online()?;
        Ok(inner.tables.values().map(StoredTable::info).collect())
    }

    fn read_schema(&self, key: &TableKey) -> Result<TableFields> {
        let inner = self.online()?;
        Ok(table_ref(&inner, key)?.table_fields())
    }

    fn read_table(&self, key: &TableKey, group: Option<&str>) -> Result<RawTable> {
        let inner = self.online()?;
        let table = table_ref(&inner, key)?;
        let members = resolve_group(&inner.groups, group)?;
        Ok(table.read(members))
    }

    fn write_table(&self, request: WriteRequest<'_>) -> Result<WriteOutcome> {
        let mut inner = self.write_lock();
        if !inner.available {
            return Err(offline());
        }
        let outcome = table_mut(&mut inner, request.key)?.write(&request)?;
        if outcome.accepted {
            inner.writes += 1;
        }
        Ok(outcome)
    }

    fn data_version(&self, key: &TableKey) -> Result<u64> {
        let inner = self.online()?;
        Ok(table_ref(&inner, key)?.data_version)
    }

    fn table_info(&self, key: &TableKey) -> Result<TableInfo> {
        let inner = self.online()?;
        Ok(table_ref(&inner, key)?.info())
    }

    fn ping(&self) -> Result<()> {
        self.online().map(|_| ())
    }
}
