//! One editing session over one store
//!
//! [`TableSession`] is the surface callers use. Reads go straight to the
//! store and may run concurrently. Staging, apply and cancel all take the
//! same lock, so at most one of them touches the staging area or writes to
//! the store at a time; apply holds it from start to finish.

use crate::apply::{ApplyCoordinator, ApplyOutcome};
use crate::catalog::TableCatalog;
use crate::error::Result;
use crate::schema::FieldSchema;
use crate::snapshot::{SnapshotReader, TableSnapshot};
use crate::staging::{EditStaging, StagedEdit};
use crate::store::TableStore;
use crate::table::{TableFields, TableInfo, TableKey};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

pub struct TableSession<S: TableStore> {
    store: S,
    staging: Mutex<EditStaging>,
}

impl<S: TableStore> TableSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            staging: Mutex::new(EditStaging::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn staging(&self) -> MutexGuard<'_, EditStaging> {
        self.staging.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list_available_tables(&self) -> Result<Vec<TableInfo>> {
        TableCatalog::new(&self.store).list_available()
    }

    pub fn list_all_tables(&self) -> Result<Vec<TableInfo>> {
        TableCatalog::new(&self.store).list_all()
    }

    pub fn get_fields(&self, key: &TableKey) -> Result<TableFields> {
        FieldSchema::new(&self.store).fields(key)
    }

    pub fn get_for_display(
        &self,
        key: &TableKey,
        field_keys: Option<&[String]>,
        group: Option<&str>,
    ) -> Result<TableSnapshot> {
        SnapshotReader::new(&self.store).for_display(key, field_keys, group)
    }

    pub fn get_for_editing(&self, key: &TableKey, group: Option<&str>) -> Result<TableSnapshot> {
        SnapshotReader::new(&self.store).for_editing(key, group)
    }

    /// Stage rows for a table, replacing any edit already pending for it
    pub fn stage_edit(
        &self,
        key: &TableKey,
        base_version: u64,
        field_keys: Vec<String>,
        rows: Vec<String>,
    ) -> Result<()> {
        self.submit(StagedEdit::new(key.clone(), base_version, field_keys, rows))
    }

    /// Stage a prepared edit
    pub fn submit(&self, edit: StagedEdit) -> Result<()> {
        let mut staging = self.staging();
        let table = TableCatalog::new(&self.store).find(&edit.table_key)?;
        let schema = FieldSchema::new(&self.store).fields(&edit.table_key)?;

        let key = edit.table_key.clone();
        let (base_version, rows) = (edit.base_version, edit.row_count());
        staging.submit(edit, &table, &schema)?;
        info!(table = %key, base_version, rows, "staged edit");
        Ok(())
    }

    /// Tables with a pending edit
    pub fn pending(&self) -> Vec<TableKey> {
        self.staging().pending()
    }

    /// Commit or reject every pending edit, one outcome per table.
    ///
    /// The staging area is empty afterwards whatever the outcomes were,
    /// unless the store was unreachable and no table was tried.
    pub fn apply(&self, detailed_log: bool) -> Result<Vec<ApplyOutcome>> {
        let mut staging = self.staging();
        ApplyCoordinator::new(&self.store).apply(&mut staging, detailed_log)
    }

    /// Discard every pending edit without touching the store
    pub fn cancel(&self) -> Result<usize> {
        let mut staging = self.staging();
        ApplyCoordinator::new(&self.store).cancel(&mut staging)
    }
}
