//! The external table store contract and the write semantics stores share
//!
//! A store owns the live data. The edit pipeline only ever talks to it
//! through [`TableStore`], so staging, validation and apply can be tested
//! against [`crate::memory::MemoryStore`] without a real backend.

use crate::error::{Error, Result};
use crate::table::{Field, ImportClass, TableFields, TableInfo, TableKey, ALL_GROUP};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Row groups by name, each holding the identities of its member rows
pub type Groups = BTreeMap<String, BTreeSet<String>>;

/// Rows as read from the store, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Data version at read time
    pub version: u64,
    pub field_keys: Vec<String>,
    pub rows: Vec<String>,
}

/// A version-gated write of whole rows
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub key: &'a TableKey,
    /// Data version the rows were read against
    pub expected_version: u64,
    pub field_keys: &'a [String],
    /// Row-major cells, `field_keys.len()` per row
    pub rows: &'a [String],
    /// Ask for per-row import diagnostics
    pub row_log: bool,
}

/// What the store did with a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// False when the version gate refused the write; nothing was written
    pub accepted: bool,
    /// Data version after the call
    pub version: u64,
    pub row_diagnostics: Vec<RowDiagnostic>,
}

/// Non-fatal issue with one written row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDiagnostic {
    pub row_index: usize,
    pub field: Option<String>,
    pub message: String,
}

/// Host data store holding the live tables
pub trait TableStore: Send + Sync {
    /// Every table the store knows about
    fn list_tables(&self) -> Result<Vec<TableInfo>>;

    fn read_schema(&self, key: &TableKey) -> Result<TableFields>;

    /// Read every column of a table, optionally narrowed to one row group
    fn read_table(&self, key: &TableKey, group: Option<&str>) -> Result<RawTable>;

    /// Write rows if the table is still at `expected_version`.
    ///
    /// The version check and the write are atomic from the caller's side.
    fn write_table(&self, request: WriteRequest<'_>) -> Result<WriteOutcome>;

    /// Current data version of a table
    fn data_version(&self, key: &TableKey) -> Result<u64> {
        Ok(self.read_table(key, None)?.version)
    }

    /// Catalog entry for one table
    fn table_info(&self, key: &TableKey) -> Result<TableInfo> {
        self.list_tables()?
            .into_iter()
            .find(|t| &t.key == key)
            .ok_or_else(|| Error::TableNotFound {
                table: key.to_string(),
            })
    }

    /// Fail with `BackendUnavailable` if the store cannot be reached
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: TableStore + ?Sized> TableStore for Arc<S> {
    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        (**self).list_tables()
    }

    fn read_schema(&self, key: &TableKey) -> Result<TableFields> {
        (**self).read_schema(key)
    }

    fn read_table(&self, key: &TableKey, group: Option<&str>) -> Result<RawTable> {
        (**self).read_table(key, group)
    }

    fn write_table(&self, request: WriteRequest<'_>) -> Result<WriteOutcome> {
        (**self).write_table(request)
    }

    fn data_version(&self, key: &TableKey) -> Result<u64> {
        (**self).data_version(key)
    }

    fn table_info(&self, key: &TableKey) -> Result<TableInfo> {
        (**self).table_info(key)
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}

/// Resolve a group filter name. `None` means no narrowing.
pub fn resolve_group<'a>(groups: &'a Groups, name: Option<&str>) -> Result<Option<&'a BTreeSet<String>>> {
    match name {
        None => Ok(None),
        Some(n) if n.eq_ignore_ascii_case(ALL_GROUP) => Ok(None),
        Some(n) => groups
            .iter()
            .find(|(g, _)| g.eq_ignore_ascii_case(n))
            .map(|(_, members)| Some(members))
            .ok_or_else(|| Error::GroupNotFound {
                group: n.to_string(),
            }),
    }
}

/// A table as a store keeps it: metadata, versions and full-width rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTable {
    pub key: TableKey,
    pub display_name: String,
    pub import_class: ImportClass,
    pub schema_version: u64,
    pub data_version: u64,
    pub fields: Vec<Field>,
    /// One cell per field for each row
    #[serde(skip)]
    pub rows: Vec<Vec<String>>,
}

impl StoredTable {
    /// Create an empty table at schema and data version 1
    pub fn new(key: impl Into<TableKey>, import_class: ImportClass, fields: Vec<Field>) -> Self {
        let key = key.into();
        Self {
            display_name: key.to_string(),
            key,
            import_class,
            schema_version: 1,
            data_version: 1,
            fields,
            rows: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_data_version(mut self, version: u64) -> Self {
        self.data_version = version;
        self
    }

    /// Replace the rows. Short rows are padded with blanks and long rows
    /// truncated to one cell per field.
    pub fn with_rows<R, C>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let width = self.fields.len();
        self.rows = rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row.into_iter().map(Into::into).collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();
        self
    }

    pub fn info(&self) -> TableInfo {
        TableInfo {
            key: self.key.clone(),
            display_name: self.display_name.clone(),
            import_class: self.import_class,
            is_empty: self.rows.is_empty(),
        }
    }

    /// Schema as callers see it. Key fields always accept imports, whatever
    /// the stored flag says.
    pub fn table_fields(&self) -> TableFields {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let mut field = f.clone();
                field.is_importable |= field.is_key;
                field
            })
            .collect();
        TableFields {
            schema_version: self.schema_version,
            fields,
        }
    }

    /// Identity of a full-width row: its key field values joined
    fn identity(&self, row: &[String]) -> Option<String> {
        let keys: Vec<&str> = self
            .fields
            .iter()
            .zip(row)
            .filter(|(f, _)| f.is_key)
            .map(|(_, v)| v.as_str())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(keys.join("\u{1f}"))
        }
    }

    /// Value of the first key field, which group membership is tested on
    fn group_key<'r>(&self, row: &'r [String]) -> Option<&'r str> {
        self.fields
            .iter()
            .zip(row)
            .find(|(f, _)| f.is_key)
            .map(|(_, v)| v.as_str())
    }

    /// Materialize every column, keeping only rows of `members` if given
    pub fn read(&self, members: Option<&BTreeSet<String>>) -> RawTable {
        let field_keys = self.fields.iter().map(|f| f.key.clone()).collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| match members {
                None => true,
                Some(m) => self.group_key(row).is_some_and(|id| m.contains(id)),
            })
            .flat_map(|row| row.iter().cloned())
            .collect();

        RawTable {
            version: self.data_version,
            field_keys,
            rows,
        }
    }

    /// Apply a version-gated write.
    ///
    /// A stale `expected_version` leaves the table untouched and returns
    /// `accepted: false`. Otherwise rows are replaced or merged by identity
    /// according to the import class and the data version advances by one.
    /// Columns a write leaves out keep their stored values on rows matched
    /// by key, and are blank on new rows.
    pub fn write(&mut self, request: &WriteRequest<'_>) -> Result<WriteOutcome> {
        let replace_all = match self.import_class {
            ImportClass::NotImportable => {
                return Err(Error::TableNotImportable {
                    table: self.key.to_string(),
                })
            }
            ImportClass::ImportableClearAllFirst => true,
            ImportClass::ImportableMerge => false,
        };

        if request.expected_version != self.data_version {
            return Ok(WriteOutcome {
                accepted: false,
                version: self.data_version,
                row_diagnostics: Vec::new(),
            });
        }

        let width = request.field_keys.len();
        if width == 0 {
            return Err(Error::malformed(&self.key, "no fields included"));
        }
        if request.rows.len() % width != 0 {
            return Err(Error::malformed(
                &self.key,
                format!("{} cells do not divide into rows of {}", request.rows.len(), width),
            ));
        }

        let schema = self.table_fields();

        // Map each incoming column onto the full-width layout
        let mut positions = Vec::with_capacity(width);
        for key in request.field_keys {
            let pos = self
                .fields
                .iter()
                .position(|f| &f.key == key)
                .ok_or_else(|| Error::FieldNotFound {
                    table: self.key.to_string(),
                    field: key.clone(),
                })?;
            if !schema.fields[pos].is_importable {
                return Err(Error::FieldNotImportable {
                    table: self.key.to_string(),
                    field: key.clone(),
                });
            }
            positions.push(pos);
        }

        let row_diagnostics = if request.row_log {
            inspect_rows(&schema, request.field_keys, request.rows)
        } else {
            Vec::new()
        };

        let incoming = request.rows.chunks(width);
        if replace_all {
            self.replace(&positions, incoming);
        } else {
            self.merge(&positions, incoming)?;
        }

        self.data_version += 1;

        Ok(WriteOutcome {
            accepted: true,
            version: self.data_version,
            row_diagnostics,
        })
    }

    /// Expand a partial row to full width on top of `base` (or blanks)
    fn widen(&self, positions: &[usize], cells: &[String], base: Option<&[String]>) -> Vec<String> {
        let mut row = match base {
            Some(b) => b.to_vec(),
            None => vec![String::new(); self.fields.len()],
        };
        for (&pos, cell) in positions.iter().zip(cells) {
            row[pos] = cell.clone();
        }
        row
    }

    /// Rebuild every row from `incoming`, carrying over the stored cells of
    /// the row each one matches by identity
    fn replace<'r>(&mut self, positions: &[usize], incoming: impl Iterator<Item = &'r [String]>) {
        let mut previous: HashMap<String, Vec<String>> = std::mem::take(&mut self.rows)
            .into_iter()
            .filter_map(|row| self.identity(&row).map(|id| (id, row)))
            .collect();

        let rows = incoming
            .map(|cells| {
                let blank = self.widen(positions, cells, None);
                let base = self.identity(&blank).and_then(|id| previous.remove(&id));
                match base {
                    Some(base) => self.widen(positions, cells, Some(&base)),
                    None => blank,
                }
            })
            .collect();
        self.rows = rows;
    }

    fn merge<'r>(&mut self, positions: &[usize], incoming: impl Iterator<Item = &'r [String]>) -> Result<()> {
        let has_keys = self.fields.iter().any(|f| f.is_key);
        if has_keys {
            if let Some(missing) = self
                .fields
                .iter()
                .enumerate()
                .find(|(i, f)| f.is_key && !positions.contains(i))
            {
                return Err(Error::malformed(
                    &self.key,
                    format!("key field '{}' must be included to merge rows", missing.1.key),
                ));
            }
        }

        let mut by_identity: HashMap<String, usize> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| self.identity(row).map(|id| (id, i)))
            .collect();

        for cells in incoming {
            let row = self.widen(positions, cells, None);
            match self.identity(&row) {
                Some(id) => match by_identity.get(&id) {
                    Some(&idx) => {
                        let merged = self.widen(positions, cells, Some(&self.rows[idx]));
                        self.rows[idx] = merged;
                    }
                    None => {
                        by_identity.insert(id, self.rows.len());
                        self.rows.push(row);
                    }
                },
                None => self.rows.push(row),
            }
        }

        Ok(())
    }
}

/// Look for per-row import problems that do not block a write: numeric
/// fields with non-numeric text, blank key cells, and identities repeated
/// within one write.
pub fn inspect_rows(schema: &TableFields, field_keys: &[String], rows: &[String]) -> Vec<RowDiagnostic> {
    let width = field_keys.len();
    if width == 0 {
        return Vec::new();
    }

    let fields: Vec<Option<&Field>> = field_keys.iter().map(|k| schema.find(k)).collect();
    let mut seen: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut diagnostics = Vec::new();

    for (row_index, cells) in rows.chunks(width).enumerate() {
        let mut identity = Vec::new();

        for (field, cell) in fields.iter().zip(cells) {
            let Some(field) = field else { continue };
            let value = cell.trim();

            if field.is_key {
                if value.is_empty() {
                    diagnostics.push(RowDiagnostic {
                        row_index,
                        field: Some(field.key.clone()),
                        message: format!("key field '{}' is blank", field.key),
                    });
                }
                identity.push(value);
            } else if field.is_numeric() && !value.is_empty() && value.parse::<f64>().is_err() {
                diagnostics.push(RowDiagnostic {
                    row_index,
                    field: Some(field.key.clone()),
                    message: format!(
                        "value '{}' for '{}' is not a number in {}",
                        value, field.key, field.unit
                    ),
                });
            }
        }

        if !identity.is_empty() {
            if let Some(first) = seen.insert(identity, row_index) {
                diagnostics.push(RowDiagnostic {
                    row_index,
                    field: None,
                    message: format!("duplicates the identity of row {}, last row wins", first),
                });
            }
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn load_patterns(class: ImportClass) -> StoredTable {
        let mut table = StoredTable::new(
            "Load Patterns",
            class,
            vec![
                Field::new("Name").key_field(),
                Field::new("Type"),
                Field::new("SelfWeightMultiplier").with_unit("unitless-factor"),
            ],
        );
        table.rows = vec![strings(&["DEAD", "Dead", "1.0"]), strings(&["LIVE", "Live", "0"])];
        table
    }

    fn request<'a>(key: &'a TableKey, version: u64, fields: &'a [String], rows: &'a [String]) -> WriteRequest<'a> {
        WriteRequest {
            key,
            expected_version: version,
            field_keys: fields,
            rows,
            row_log: true,
        }
    }

    #[test]
    fn test_stale_write_is_refused() {
        let mut table = load_patterns(ImportClass::ImportableMerge);
        let key = table.key.clone();
        let fields = strings(&["Name", "Type", "SelfWeightMultiplier"]);
        let rows = strings(&["DEAD", "Dead", "9"]);

        let outcome = table.write(&request(&key, 0, &fields, &rows)).unwrap();
        assert!(!outcome.accepted);
        assert_eq!(table.data_version, 1);
        assert_eq!(table.rows[0][2], "1.0");
    }

    #[test]
    fn test_merge_updates_by_identity() {
        let mut table = load_patterns(ImportClass::ImportableMerge);
        let key = table.key.clone();
        let fields = strings(&["Name", "SelfWeightMultiplier"]);
        let rows = strings(&["DEAD", "1.2", "WIND", "0"]);

        let outcome = table.write(&request(&key, 1, &fields, &rows)).unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.version, 2);
        assert_eq!(table.rows.len(), 3);
        // Untouched column keeps its value
        assert_eq!(table.rows[0], strings(&["DEAD", "Dead", "1.2"]));
        assert_eq!(table.rows[2], strings(&["WIND", "", "0"]));
    }

    #[test]
    fn test_merge_requires_key_fields() {
        let mut table = load_patterns(ImportClass::ImportableMerge);
        let key = table.key.clone();
        let fields = strings(&["Type"]);
        let rows = strings(&["Dead"]);

        let err = table.write(&request(&key, 1, &fields, &rows)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedRows);
    }

    #[test]
    fn test_clear_all_first_replaces_rows() {
        let mut table = load_patterns(ImportClass::ImportableClearAllFirst);
        let key = table.key.clone();
        let fields = strings(&["Name", "Type"]);
        let rows = strings(&["SNOW", "Snow"]);

        table.write(&request(&key, 1, &fields, &rows)).unwrap();
        assert_eq!(table.rows, vec![strings(&["SNOW", "Snow", ""])]);
    }

    #[test]
    fn test_clear_all_first_keeps_columns_of_matched_rows() {
        let mut table = StoredTable::new(
            "Frame Sections",
            ImportClass::ImportableClearAllFirst,
            vec![
                Field::new("Name").key_field(),
                Field::new("Material"),
                Field::new("Area").with_unit("in2").read_only(),
            ],
        )
        .with_rows([["W12X26", "A992", "7.65"], ["W14X30", "A992", "8.85"]]);
        let key = table.key.clone();
        let fields = strings(&["Name", "Material"]);
        let rows = strings(&["W12X26", "A36", "W10X12", "A992"]);

        table.write(&request(&key, 1, &fields, &rows)).unwrap();
        assert_eq!(
            table.rows,
            vec![strings(&["W12X26", "A36", "7.65"]), strings(&["W10X12", "A992", ""])]
        );
    }

    #[test]
    fn test_read_only_key_field_is_writable() {
        let mut table = StoredTable::new(
            "Load Patterns",
            ImportClass::ImportableMerge,
            vec![
                Field {
                    is_importable: false,
                    ..Field::new("Name").key_field()
                },
                Field::new("Type"),
            ],
        )
        .with_rows([["DEAD", "Dead"]]);
        assert!(table.table_fields().fields[0].is_importable);

        let key = table.key.clone();
        let fields = strings(&["Name", "Type"]);
        let rows = strings(&["DEAD", "Superdead"]);
        let outcome = table.write(&request(&key, 1, &fields, &rows)).unwrap();
        assert!(outcome.accepted);
        assert_eq!(table.rows[0], strings(&["DEAD", "Superdead"]));
    }

    #[test]
    fn test_with_rows_pads_short_rows() {
        let table = StoredTable::new(
            "Load Patterns",
            ImportClass::ImportableMerge,
            vec![Field::new("Name").key_field(), Field::new("Type"), Field::new("Notes")],
        )
        .with_rows([vec!["DEAD"], vec!["LIVE", "Live", "x", "extra"]]);

        assert_eq!(table.rows[0], strings(&["DEAD", "", ""]));
        assert_eq!(table.rows[1], strings(&["LIVE", "Live", "x"]));
    }

    #[test]
    fn test_not_importable_table_refuses_write() {
        let mut table = load_patterns(ImportClass::NotImportable);
        let key = table.key.clone();
        let fields = strings(&["Name"]);
        let rows = strings(&["DEAD"]);

        let err = table.write(&request(&key, 1, &fields, &rows)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotImportable);
    }

    #[test]
    fn test_read_with_group_members() {
        let table = load_patterns(ImportClass::ImportableMerge);
        let members: BTreeSet<String> = ["LIVE".to_string()].into_iter().collect();

        let raw = table.read(Some(&members));
        assert_eq!(raw.rows, strings(&["LIVE", "Live", "0"]));
        assert_eq!(table.read(None).rows.len(), 6);
    }

    #[test]
    fn test_group_matches_first_key_field() {
        let table = StoredTable::new(
            "Joint Loads",
            ImportClass::ImportableMerge,
            vec![
                Field::new("Joint").key_field(),
                Field::new("Pattern").key_field(),
                Field::new("FZ").with_unit("kip"),
            ],
        )
        .with_rows([["J1", "DEAD", "-10"], ["J1", "LIVE", "-4"], ["J2", "DEAD", "-8"]]);
        let members: BTreeSet<String> = ["J1".to_string()].into_iter().collect();

        let raw = table.read(Some(&members));
        assert_eq!(raw.rows, strings(&["J1", "DEAD", "-10", "J1", "LIVE", "-4"]));
    }

    #[test]
    fn test_resolve_group() {
        let mut groups = Groups::new();
        groups.insert("Roof".to_string(), BTreeSet::new());

        assert!(resolve_group(&groups, None).unwrap().is_none());
        assert!(resolve_group(&groups, Some("ALL")).unwrap().is_none());
        assert!(resolve_group(&groups, Some("roof")).unwrap().is_some());
        let err = resolve_group(&groups, Some("Basement")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn test_inspect_rows() {
        let table = load_patterns(ImportClass::ImportableMerge);
        let fields = strings(&["Name", "Type", "SelfWeightMultiplier"]);
        let rows = strings(&["DEAD", "Dead", "heavy", "", "Live", "0", "DEAD", "Dead", "1"]);

        let diags = inspect_rows(&table.table_fields(), &fields, &rows);
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].row_index, 0);
        assert_eq!(diags[0].field.as_deref(), Some("SelfWeightMultiplier"));
        assert_eq!(diags[1].row_index, 1);
        assert_eq!(diags[2].row_index, 2);
        assert!(diags[2].message.contains("row 0"));
    }
}
