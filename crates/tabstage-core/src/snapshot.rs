//! Versioned, read-only materializations of a table
//!
//! Display reads are cheap and may be narrowed arbitrarily; their version
//! is informational only. Editing reads always return every importable
//! field and carry the version a later edit must be committed against.

use crate::catalog::TableCatalog;
use crate::error::{Error, Result};
use crate::store::{RawTable, TableStore};
use crate::table::TableKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPurpose {
    Display,
    Editing,
}

/// A table's rows at one point in time, flattened row-major.
///
/// `rows.len() == row_count * field_keys.len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub table_key: TableKey,
    /// Data version at read time
    pub version: u64,
    pub schema_version: u64,
    pub purpose: ReadPurpose,
    pub field_keys: Vec<String>,
    pub rows: Vec<String>,
    pub row_count: usize,
}

impl TableSnapshot {
    /// Version to commit an edit against; only editing reads have one
    pub fn commit_token(&self) -> Option<u64> {
        match self.purpose {
            ReadPurpose::Editing => Some(self.version),
            ReadPurpose::Display => None,
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_keys.len()
    }

    /// Column position of a field
    pub fn field_index(&self, key: &str) -> Option<usize> {
        self.field_keys.iter().position(|k| k == key)
    }

    /// Cells of one row
    pub fn row(&self, index: usize) -> Option<&[String]> {
        if index >= self.row_count {
            return None;
        }
        let width = self.field_count();
        Some(&self.rows[index * width..(index + 1) * width])
    }

    /// Iterate rows in order. Yields `row_count` empty rows when no field is
    /// included.
    pub fn rows_iter(&self) -> impl Iterator<Item = &[String]> + '_ {
        (0..self.row_count).filter_map(move |i| self.row(i))
    }

    /// One cell by row index and field key
    pub fn cell(&self, row: usize, field: &str) -> Option<&str> {
        let col = self.field_index(field)?;
        self.row(row).map(|cells| cells[col].as_str())
    }
}

/// Reads snapshots from a store
pub struct SnapshotReader<'s, S: TableStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: TableStore + ?Sized> SnapshotReader<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Read for presentation.
    ///
    /// `field_keys` narrows the columns, keeping the table's column order;
    /// keys the table does not have are ignored. Read-only tables are fine.
    pub fn for_display(
        &self,
        key: &TableKey,
        field_keys: Option<&[String]>,
        group: Option<&str>,
    ) -> Result<TableSnapshot> {
        self.read(key, group, ReadPurpose::Display, |field| match field_keys {
            None => true,
            Some(allowed) => allowed.iter().any(|k| k == field),
        })
    }

    /// Read for a later edit: every importable field, including the key
    /// fields that address each row.
    pub fn for_editing(&self, key: &TableKey, group: Option<&str>) -> Result<TableSnapshot> {
        let info = TableCatalog::new(self.store).find(key)?;
        if !info.import_class.is_importable() {
            return Err(Error::TableNotImportable {
                table: key.to_string(),
            });
        }

        let schema = self.store.read_schema(key)?;
        let importable = schema.importable_keys();
        self.read(key, group, ReadPurpose::Editing, |field| importable.contains(&field))
    }

    fn read(
        &self,
        key: &TableKey,
        group: Option<&str>,
        purpose: ReadPurpose,
        keep: impl Fn(&str) -> bool,
    ) -> Result<TableSnapshot> {
        let schema = self.store.read_schema(key)?;
        let raw = self.store.read_table(key, group)?;

        let columns: Vec<usize> = raw
            .field_keys
            .iter()
            .enumerate()
            .filter(|(_, k)| keep(k))
            .map(|(i, _)| i)
            .collect();
        let snapshot = project(key, &raw, &columns, schema.schema_version, purpose);

        debug!(
            table = %key,
            version = snapshot.version,
            rows = snapshot.row_count,
            fields = snapshot.field_count(),
            ?purpose,
            "read table snapshot"
        );
        Ok(snapshot)
    }
}

/// Keep only `columns` of a raw table, in the given order
fn project(key: &TableKey, raw: &RawTable, columns: &[usize], schema_version: u64, purpose: ReadPurpose) -> TableSnapshot {
    let width = raw.field_keys.len();
    let row_count = if width == 0 { 0 } else { raw.rows.len() / width };

    let rows = if width == 0 {
        Vec::new()
    } else {
        raw.rows
            .chunks(width)
            .flat_map(|row| columns.iter().map(move |&c| row[c].clone()))
            .collect()
    };

    TableSnapshot {
        table_key: key.clone(),
        version: raw.version,
        schema_version,
        purpose,
        field_keys: columns.iter().map(|&c| raw.field_keys[c].clone()).collect(),
        rows,
        row_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::StoredTable;
    use crate::table::{Field, ImportClass};

    fn store() -> MemoryStore {
        let store = MemoryStore::new()
            .with_table(
                StoredTable::new(
                    "Frame Sections",
                    ImportClass::ImportableMerge,
                    vec![
                        Field::new("Name").key_field(),
                        Field::new("Area").with_unit("in2").read_only(),
                        Field::new("Material"),
                    ],
                )
                .with_data_version(4)
                .with_rows([["W12X26", "7.65", "A992"], ["W14X30", "8.85", "A992"]]),
            )
            .with_table(
                StoredTable::new("Base Reactions", ImportClass::NotImportable, vec![Field::new("FX").read_only()])
                    .with_rows([["12.5"]]),
            );
        store.add_group("Light", ["W12X26"]);
        store
    }

    fn keys(snapshot: &TableSnapshot) -> Vec<&str> {
        snapshot.field_keys.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_display_read_all_columns() {
        let store = store();
        let snapshot = SnapshotReader::new(&store)
            .for_display(&"Frame Sections".into(), None, None)
            .unwrap();

        assert_eq!(keys(&snapshot), vec!["Name", "Area", "Material"]);
        assert_eq!(snapshot.row_count, 2);
        assert_eq!(snapshot.rows.len(), 6);
        assert_eq!(snapshot.commit_token(), None);
        assert_eq!(snapshot.cell(1, "Area"), Some("8.85"));
    }

    #[test]
    fn test_display_filter_keeps_table_order_and_ignores_unknown() {
        let store = store();
        let wanted = vec!["Material".to_string(), "Bogus".to_string(), "Name".to_string()];
        let snapshot = SnapshotReader::new(&store)
            .for_display(&"Frame Sections".into(), Some(wanted.as_slice()), None)
            .unwrap();

        assert_eq!(keys(&snapshot), vec!["Name", "Material"]);
        assert_eq!(snapshot.row(0).unwrap(), &["W12X26".to_string(), "A992".to_string()]);
    }

    #[test]
    fn test_display_read_allowed_for_read_only_table() {
        let store = store();
        let snapshot = SnapshotReader::new(&store)
            .for_display(&"Base Reactions".into(), None, None)
            .unwrap();
        assert_eq!(snapshot.row_count, 1);
    }

    #[test]
    fn test_editing_read_returns_importable_fields() {
        let store = store();
        let snapshot = SnapshotReader::new(&store)
            .for_editing(&"frame sections".into(), None)
            .unwrap();

        assert_eq!(keys(&snapshot), vec!["Name", "Material"]);
        assert_eq!(snapshot.commit_token(), Some(4));
        assert_eq!(snapshot.schema_version, 1);
        assert_eq!(snapshot.rows_iter().count(), 2);
    }

    #[test]
    fn test_editing_read_with_group() {
        let store = store();
        let snapshot = SnapshotReader::new(&store)
            .for_editing(&"Frame Sections".into(), Some("Light"))
            .unwrap();
        assert_eq!(snapshot.row_count, 1);
        assert_eq!(snapshot.cell(0, "Name"), Some("W12X26"));
    }

    #[test]
    fn test_editing_read_rejects_read_only_table() {
        let store = store();
        let err = SnapshotReader::new(&store)
            .for_editing(&"Base Reactions".into(), None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotImportable);
    }

    #[test]
    fn test_display_filter_with_no_matching_fields() {
        let store = store();
        let wanted = vec!["Bogus".to_string()];
        let snapshot = SnapshotReader::new(&store)
            .for_display(&"Frame Sections".into(), Some(wanted.as_slice()), None)
            .unwrap();
        assert_eq!(snapshot.field_count(), 0);
        assert!(snapshot.rows.is_empty());
        assert_eq!(snapshot.row_count, 2);
    }
}
