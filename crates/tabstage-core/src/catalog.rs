//! Table discovery against the live store

use crate::error::Result;
use crate::store::TableStore;
use crate::table::{TableInfo, TableKey};
use tracing::debug;

/// Lists the tables a store currently holds.
///
/// Nothing is cached: table existence and emptiness change as edits are
/// applied, so each call asks the store again. A failed listing returns an
/// error, never a partial list.
pub struct TableCatalog<'s, S: TableStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: TableStore + ?Sized> TableCatalog<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Tables worth offering to a user: those holding data, plus importable
    /// ones that could receive data even while empty
    pub fn list_available(&self) -> Result<Vec<TableInfo>> {
        let tables: Vec<TableInfo> = self
            .store
            .list_tables()?
            .into_iter()
            .filter(|t| !t.is_empty || t.import_class.is_importable())
            .collect();
        debug!(count = tables.len(), "listed available tables");
        Ok(tables)
    }

    /// Every table, empty ones included
    pub fn list_all(&self) -> Result<Vec<TableInfo>> {
        let tables = self.store.list_tables()?;
        debug!(count = tables.len(), "listed all tables");
        Ok(tables)
    }

    /// Look up one table by key without listing the others
    pub fn find(&self, key: &TableKey) -> Result<TableInfo> {
        self.store.table_info(key)
    }
}
