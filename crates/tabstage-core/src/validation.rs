//! Checks a staged edit against a table's current schema

use crate::error::{Error, ErrorKind};
use crate::staging::StagedEdit;
use crate::table::{TableFields, TableKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One entry of an import log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub table_key: TableKey,
    /// Row within the staged rows, for row-level entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Table-level error entry describing `err`
    pub fn from_error(table_key: &TableKey, err: &Error) -> Self {
        let field = match err {
            Error::FieldNotFound { field, .. } | Error::FieldNotImportable { field, .. } => Some(field.clone()),
            _ => None,
        };
        Self {
            severity: Severity::Error,
            kind: err.kind(),
            table_key: table_key.clone(),
            row_index: None,
            field,
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Stateless edit validation.
///
/// Runs once when an edit is submitted and again right before it is
/// committed, since the schema may have drifted in between.
pub struct ValidationService;

impl ValidationService {
    /// Every problem with `edit` under `schema`, as errors.
    ///
    /// Covers schema drift since submit, the field list (non-empty, no
    /// duplicates, every field known and importable) and row shape.
    pub fn violations(edit: &StagedEdit, schema: &TableFields) -> Vec<Error> {
        let table = edit.table_key.to_string();
        let mut errors = Vec::new();

        if let Some(staged) = edit.schema_version() {
            if staged != schema.schema_version {
                errors.push(Error::SchemaChanged {
                    table: table.clone(),
                    staged,
                    current: schema.schema_version,
                });
            }
        }

        if edit.field_keys.is_empty() {
            errors.push(Error::malformed(&table, "no fields included"));
            return errors;
        }

        let mut seen = HashSet::new();
        for key in &edit.field_keys {
            if !seen.insert(key.as_str()) {
                errors.push(Error::malformed(&table, format!("field '{}' is included twice", key)));
                continue;
            }
            match schema.find(key) {
                None => errors.push(Error::FieldNotFound {
                    table: table.clone(),
                    field: key.clone(),
                }),
                Some(field) if !field.accepts_import() => errors.push(Error::FieldNotImportable {
                    table: table.clone(),
                    field: key.clone(),
                }),
                Some(_) => {}
            }
        }

        let width = edit.field_keys.len();
        if edit.rows.len() % width != 0 {
            errors.push(Error::malformed(
                &table,
                format!(
                    "{} cells do not divide into rows of {} fields",
                    edit.rows.len(),
                    width
                ),
            ));
        }

        errors
    }

    /// Same checks as [`ValidationService::violations`], as log entries
    pub fn validate(edit: &StagedEdit, schema: &TableFields) -> Vec<Diagnostic> {
        Self::violations(edit, schema)
            .iter()
            .map(|e| Diagnostic::from_error(&edit.table_key, e))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Field;

    fn schema() -> TableFields {
        TableFields {
            schema_version: 3,
            fields: vec![
                Field::new("Name").key_field(),
                Field::new("Type"),
                Field::new("Area").read_only(),
            ],
        }
    }

    fn edit(fields: &[&str], rows: &[&str]) -> StagedEdit {
        StagedEdit::new(
            "Frame Sections",
            1,
            fields.iter().map(|s| s.to_string()).collect(),
            rows.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_valid_edit_has_no_diagnostics() {
        let e = edit(&["Name", "Type"], &["A", "x", "B", "y"]);
        assert!(ValidationService::validate(&e, &schema()).is_empty());
    }

    #[test]
    fn test_read_only_field() {
        let e = edit(&["Name", "Area"], &["A", "1"]);
        let diags = ValidationService::validate(&e, &schema());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::FieldNotImportable);
        assert_eq!(diags[0].field.as_deref(), Some("Area"));
        assert!(diags[0].is_error());
    }

    #[test]
    fn test_key_field_flagged_read_only_is_accepted() {
        let mut schema = schema();
        schema.fields[0].is_importable = false;

        let e = edit(&["Name", "Type"], &["A", "x"]);
        assert!(ValidationService::violations(&e, &schema).is_empty());
        assert_eq!(schema.importable_keys(), vec!["Name", "Type"]);
    }

    #[test]
    fn test_unknown_field() {
        let e = edit(&["Name", "Color"], &["A", "red"]);
        let errors = ValidationService::violations(&e, &schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_ragged_rows() {
        let e = edit(&["Name", "Type"], &["A", "x", "B"]);
        let errors = ValidationService::violations(&e, &schema());
        assert_eq!(errors[0].kind(), ErrorKind::MalformedRows);
    }

    #[test]
    fn test_empty_and_duplicate_fields() {
        let e = edit(&[], &[]);
        assert_eq!(ValidationService::violations(&e, &schema())[0].kind(), ErrorKind::MalformedRows);

        let e = edit(&["Name", "Name"], &["A", "A"]);
        assert_eq!(ValidationService::violations(&e, &schema())[0].kind(), ErrorKind::MalformedRows);
    }

    #[test]
    fn test_schema_drift() {
        let mut e = edit(&["Name"], &["A"]);
        e.stamp_schema(2);
        let diags = ValidationService::validate(&e, &schema());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::SchemaChanged);
    }
}
