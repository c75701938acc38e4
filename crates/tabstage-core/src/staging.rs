//! In-memory holding area for pending edits, one per table

use crate::error::{Error, Result};
use crate::table::{ImportClass, TableFields, TableInfo, TableKey};
use crate::validation::ValidationService;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// A proposed replacement for some of a table's rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEdit {
    pub table_key: TableKey,
    /// Data version the rows were read against
    pub base_version: u64,
    pub field_keys: Vec<String>,
    /// Row-major cells, `field_keys.len()` per row
    pub rows: Vec<String>,
    /// Schema version seen at submit
    #[serde(default)]
    schema_version: Option<u64>,
}

impl StagedEdit {
    pub fn new(table_key: impl Into<TableKey>, base_version: u64, field_keys: Vec<String>, rows: Vec<String>) -> Self {
        Self {
            table_key: table_key.into(),
            base_version,
            field_keys,
            rows,
            schema_version: None,
        }
    }

    /// Schema version recorded when the edit was accepted for staging
    pub fn schema_version(&self) -> Option<u64> {
        self.schema_version
    }

    pub(crate) fn stamp_schema(&mut self, version: u64) {
        self.schema_version = Some(version);
    }

    /// Number of rows, once the shape has been validated
    pub fn row_count(&self) -> usize {
        match self.field_keys.len() {
            0 => 0,
            width => self.rows.len() / width,
        }
    }
}

/// Pending edits keyed by table. Never touches the store.
#[derive(Debug, Default)]
pub struct EditStaging {
    pending: BTreeMap<TableKey, StagedEdit>,
}

impl EditStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an edit after checking its shape, replacing any edit already
    /// pending for the same table.
    ///
    /// The base version is not compared with the store here; apply checks
    /// it in the same step as the commit.
    pub fn submit(&mut self, mut edit: StagedEdit, table: &TableInfo, schema: &TableFields) -> Result<()> {
        if !table.import_class.is_importable() {
            return Err(Error::TableNotImportable {
                table: table.key.to_string(),
            });
        }

        if let Some(err) = ValidationService::violations(&edit, schema).into_iter().next() {
            return Err(err);
        }

        if table.import_class == ImportClass::ImportableMerge {
            if let Some(missing) = schema
                .key_fields()
                .into_iter()
                .find(|k| !edit.field_keys.iter().any(|f| f == k))
            {
                return Err(Error::malformed(
                    &table.key,
                    format!("key field '{}' must be included to merge rows", missing),
                ));
            }
        }

        edit.stamp_schema(schema.schema_version);
        let replaced = self.pending.insert(edit.table_key.clone(), edit);

        if let Some(prior) = replaced {
            info!(table = %prior.table_key, base_version = prior.base_version, "replaced pending edit");
        }
        Ok(())
    }

    /// Keys of tables with a pending edit, in key order
    pub fn pending(&self) -> Vec<TableKey> {
        self.pending.keys().cloned().collect()
    }

    pub fn get(&self, key: &TableKey) -> Option<&StagedEdit> {
        self.pending.get(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending edit, returning how many there were
    pub fn discard_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Remove and return every pending edit in key order
    pub(crate) fn take_all(&mut self) -> Vec<StagedEdit> {
        std::mem::take(&mut self.pending).into_values().collect()
    }
}
