//! Core table types: table identity, catalog entries and field metadata

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of the row group that selects every row
pub const ALL_GROUP: &str = "All";

/// Case-insensitive table identity.
///
/// The original spelling is kept for display; equality, ordering and hashing
/// ignore case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableKey(String);

impl TableKey {
    /// Create a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as originally spelled
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded().eq(other.folded())
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
        0xffu8.hash(state);
    }
}

impl PartialOrd for TableKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(other.folded())
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TableKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether, and how, a table accepts written data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportClass {
    /// Read-only
    NotImportable,
    /// A write replaces every existing row
    ImportableClearAllFirst,
    /// A write upserts rows by their key fields
    ImportableMerge,
}

impl ImportClass {
    pub fn is_importable(self) -> bool {
        !matches!(self, ImportClass::NotImportable)
    }
}

/// A table as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub key: TableKey,
    pub display_name: String,
    pub import_class: ImportClass,
    /// Point-in-time fact, true when the table has no rows
    pub is_empty: bool,
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column key (e.g., "SelfWeightMultiplier")
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Unit label, empty when unitless
    #[serde(default)]
    pub unit: String,
    pub is_importable: bool,
    /// Identity-bearing field used to address a row
    #[serde(default)]
    pub is_key: bool,
}

impl Field {
    /// Create an importable, non-key field whose display name is its key
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            display_name: key.clone(),
            key,
            description: String::new(),
            unit: String::new(),
            is_importable: true,
            is_key: false,
        }
    }

    /// Mark as an identity field. Key fields are always importable.
    pub fn key_field(mut self) -> Self {
        self.is_key = true;
        self.is_importable = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.is_importable = false;
        self.is_key = false;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether a staged edit may carry this field. Key fields always may.
    pub fn accepts_import(&self) -> bool {
        self.is_importable || self.is_key
    }

    /// Whether values of this field are expected to be numeric
    pub fn is_numeric(&self) -> bool {
        !self.unit.is_empty()
    }
}

/// The columns of one table together with the schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFields {
    /// Changes only when the set of columns changes
    pub schema_version: u64,
    /// Fields in their fixed column order
    pub fields: Vec<Field>,
}

impl TableFields {
    /// Find a field by key
    pub fn find(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Column position of a field
    pub fn position(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.key == key)
    }

    /// Keys of every field a staged edit may carry, in column order
    pub fn importable_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.accepts_import())
            .map(|f| f.key.as_str())
            .collect()
    }

    /// Keys of the identity fields, in column order
    pub fn key_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_key)
            .map(|f| f.key.as_str())
            .collect()
    }
}
