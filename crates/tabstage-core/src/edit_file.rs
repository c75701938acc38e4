//! JSON files for editing tables outside the session
//!
//! An [`EditFile`] is an editing read written to disk so the rows can be
//! changed by hand or by another tool, then staged again. A [`BatchFile`]
//! lists edit files to stage and apply together.

use crate::error::{Error, Result};
use crate::snapshot::TableSnapshot;
use crate::staging::StagedEdit;
use crate::table::TableKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One table's rows, ready to be edited and staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditFile {
    /// Table this edit applies to
    pub table: TableKey,
    /// Version of the editing read the rows came from
    pub base_version: u64,
    /// Group filter used for the read, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Field keys, one per column
    pub fields: Vec<String>,
    /// One inner list per row
    pub rows: Vec<Vec<String>>,
}

impl EditFile {
    /// Build from an editing read. Display reads carry no commit token and
    /// give `None`.
    pub fn from_snapshot(snapshot: &TableSnapshot, group: Option<&str>) -> Option<Self> {
        let base_version = snapshot.commit_token()?;
        Some(Self {
            table: snapshot.table_key.clone(),
            base_version,
            group: group.map(str::to_string),
            fields: snapshot.field_keys.clone(),
            rows: snapshot.rows_iter().map(|r| r.to_vec()).collect(),
        })
    }

    /// Flatten into a staged edit; every row must have one cell per field
    pub fn into_staged(self) -> Result<StagedEdit> {
        let width = self.fields.len();
        if let Some((idx, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(Error::malformed(
                &self.table,
                format!("row {} has {} cells, expected {}", idx, row.len(), width),
            ));
        }

        let rows = self.rows.into_iter().flatten().collect();
        Ok(StagedEdit::new(self.table, self.base_version, self.fields, rows))
    }

    /// Load an edit file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the edit file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// A batch of edit files applied in one go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    /// Store directory
    pub root: PathBuf,
    /// Edit files to stage
    pub edits: Vec<PathBuf>,
    /// Ask the store for per-row diagnostics
    #[serde(default)]
    pub detailed_log: bool,
    /// Where to write the apply report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
}

impl BatchFile {
    /// Load a batch file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the batch file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
