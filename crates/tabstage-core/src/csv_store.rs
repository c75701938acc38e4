//! Table store backed by a directory of CSV files
//!
//! Layout under the root directory:
//! - `<name>.table.json`: table metadata, field list and both versions
//! - `<name>.csv`: rows, with a header of field keys in schema order
//! - `groups.json`: optional row groups, `{ "group": ["identity", ...] }`
//!
//! Every call re-reads the directory, so external edits to the files are
//! seen immediately.

use crate::error::{Error, Result};
use crate::store::{resolve_group, Groups, RawTable, StoredTable, TableStore, WriteOutcome, WriteRequest};
use crate::table::{TableFields, TableInfo, TableKey};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};
use walkdir::WalkDir;

const META_SUFFIX: &str = ".table.json";
const GROUPS_FILE: &str = "groups.json";

/// A table store reading and writing CSV files under one directory
#[derive(Debug)]
pub struct CsvDirStore {
    root: PathBuf,
    writes: Mutex<()>,
}

impl CsvDirStore {
    /// Open an existing store directory
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::BackendUnavailable(format!(
                "store root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            writes: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create or overwrite a table's files
    pub fn put_table(&self, table: &StoredTable) -> Result<()> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let meta_path = match self.find_meta(&table.key)? {
            Some((path, _)) => path,
            None => self.root.join(format!("{}{}", file_stem_for(&table.key), META_SUFFIX)),
        };
        save_table(&meta_path, table)
    }

    /// Replace the row groups
    pub fn put_groups(&self, groups: &Groups) -> Result<()> {
        let content = serde_json::to_string_pretty(groups)?;
        fs::write(self.root.join(GROUPS_FILE), content)?;
        Ok(())
    }

    fn load_groups(&self) -> Result<Groups> {
        let path = self.root.join(GROUPS_FILE);
        if !path.exists() {
            return Ok(Groups::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Every metadata sidecar under the root, in path order
    fn meta_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(META_SUFFIX))
            {
                paths.push(path.to_path_buf());
            }
        }
        Ok(paths)
    }

    /// Locate the sidecar for a key and load its metadata (without rows)
    fn find_meta(&self, key: &TableKey) -> Result<Option<(PathBuf, StoredTable)>> {
        for path in self.meta_files()? {
            let meta = load_meta(&path)?;
            if &meta.key == key {
                return Ok(Some((path, meta)));
            }
        }
        Ok(None)
    }

    /// Load a table with its rows
    fn load_table(&self, key: &TableKey) -> Result<(PathBuf, StoredTable)> {
        let (path, mut table) = self.find_meta(key)?.ok_or_else(|| Error::TableNotFound {
            table: key.to_string(),
        })?;
        table.rows = parse_rows(&data_path(&path), &table)?;
        Ok((path, table))
    }
}

impl TableStore for CsvDirStore {
    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let mut tables = Vec::new();
        for path in self.meta_files()? {
            let mut table = load_meta(&path)?;
            table.rows = parse_rows(&data_path(&path), &table)?;
            tables.push(table.info());
        }
        debug!(root = %self.root.display(), count = tables.len(), "listed tables");
        Ok(tables)
    }

    fn read_schema(&self, key: &TableKey) -> Result<TableFields> {
        let (_, meta) = self.find_meta(key)?.ok_or_else(|| Error::TableNotFound {
            table: key.to_string(),
        })?;
        Ok(meta.table_fields())
    }

    fn read_table(&self, key: &TableKey, group: Option<&str>) -> Result<RawTable> {
        let groups = self.load_groups()?;
        let members = resolve_group(&groups, group)?;
        let (_, table) = self.load_table(key)?;
        Ok(table.read(members))
    }

    fn write_table(&self, request: WriteRequest<'_>) -> Result<WriteOutcome> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let (path, mut table) = self.load_table(request.key)?;
        let outcome = table.write(&request)?;
        if outcome.accepted {
            save_table(&path, &table)?;
        }
        Ok(outcome)
    }

    fn data_version(&self, key: &TableKey) -> Result<u64> {
        let (_, meta) = self.find_meta(key)?.ok_or_else(|| Error::TableNotFound {
            table: key.to_string(),
        })?;
        Ok(meta.data_version)
    }

    fn table_info(&self, key: &TableKey) -> Result<TableInfo> {
        let (_, table) = self.load_table(key)?;
        Ok(table.info())
    }

    fn ping(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable(format!(
                "store root '{}' is no longer a directory",
                self.root.display()
            )))
        }
    }
}

fn load_meta(path: &Path) -> Result<StoredTable> {
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(Error::Json)
}

/// `frames.table.json` -> `frames.csv`
fn data_path(meta_path: &Path) -> PathBuf {
    let name = meta_path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(META_SUFFIX))
        .unwrap_or("table");
    meta_path.with_file_name(format!("{}.csv", name))
}

/// File name stem for a new table: lowercase, non-alphanumerics as `_`
fn file_stem_for(key: &TableKey) -> String {
    key.as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Read a table's rows. A missing data file means an empty table.
fn parse_rows(path: &Path, table: &StoredTable) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // row widths are fixed up below
        .from_reader(BufReader::new(file));

    let headers = reader.headers().map_err(|e| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;

    let expected: Vec<&str> = table.fields.iter().map(|f| f.key.as_str()).collect();
    let found: Vec<&str> = headers.iter().collect();
    if found != expected {
        return Err(Error::CsvParse {
            path: path.to_path_buf(),
            message: format!("header {:?} does not match fields {:?}", found, expected),
        });
    }

    let width = expected.len();
    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        if cells.len() > width {
            warn!(
                row = row_idx + 1,
                path = %path.display(),
                "row has more cells than fields, truncating"
            );
        }
        cells.resize(width, String::new());
        rows.push(cells);
    }

    Ok(rows)
}

/// Write the data file first, then the sidecar carrying the new version
fn save_table(meta_path: &Path, table: &StoredTable) -> Result<()> {
    let csv_path = data_path(meta_path);
    let mut writer = csv::Writer::from_path(&csv_path).map_err(|e| Error::Csv {
        path: csv_path.clone(),
        source: e,
    })?;

    let csv_err = |e: csv::Error| Error::Csv {
        path: csv_path.clone(),
        source: e,
    };
    writer
        .write_record(table.fields.iter().map(|f| f.key.as_str()))
        .map_err(csv_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush()?;

    let content = serde_json::to_string_pretty(table)?;
    fs::write(meta_path, content)?;
    Ok(())
}
