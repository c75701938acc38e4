//! Per-table field metadata

use crate::error::{Error, Result};
use crate::store::TableStore;
use crate::table::{Field, TableFields, TableKey};

/// Column lookups for tables in a store
pub struct FieldSchema<'s, S: TableStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: TableStore + ?Sized> FieldSchema<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Fields of a table in column order, with the schema version
    pub fn fields(&self, key: &TableKey) -> Result<TableFields> {
        self.store.read_schema(key)
    }

    /// One field of a table
    pub fn field(&self, key: &TableKey, field_key: &str) -> Result<Field> {
        self.fields(key)?
            .fields
            .into_iter()
            .find(|f| f.key == field_key)
            .ok_or_else(|| Error::FieldNotFound {
                table: key.to_string(),
                field: field_key.to_string(),
            })
    }
}
