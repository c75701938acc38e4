//! The transaction boundary: commit or reject every staged edit

use crate::error::{Error, ErrorKind, Result};
use crate::staging::{EditStaging, StagedEdit};
use crate::store::{TableStore, WriteRequest};
use crate::table::TableKey;
use crate::validation::{Diagnostic, Severity, ValidationService};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What happened to one table's staged edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub table_key: TableKey,
    pub committed: bool,
    pub error_count: usize,
    pub warning_count: usize,
    /// Data version after the commit, for re-reading to confirm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub import_log: Vec<Diagnostic>,
}

impl ApplyOutcome {
    fn new(table_key: TableKey, committed: bool, version: Option<u64>, import_log: Vec<Diagnostic>) -> Self {
        let error_count = import_log.iter().filter(|d| d.severity == Severity::Error).count();
        let warning_count = import_log.iter().filter(|d| d.severity == Severity::Warning).count();
        Self {
            table_key,
            committed,
            error_count,
            warning_count,
            version,
            import_log,
        }
    }

    fn rejected(table_key: TableKey, import_log: Vec<Diagnostic>) -> Self {
        Self::new(table_key, false, None, import_log)
    }

    /// First error kind in the log, if the table was rejected
    pub fn reason(&self) -> Option<ErrorKind> {
        self.import_log.iter().find(|d| d.is_error()).map(|d| d.kind)
    }
}

/// Commits staged edits against a store, one table at a time
pub struct ApplyCoordinator<'s, S: TableStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: TableStore + ?Sized> ApplyCoordinator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Try to commit every pending edit and empty the staging area.
    ///
    /// Each table is handled on its own: a rejected table does not stop the
    /// others. A table is rejected when it fails re-validation against the
    /// current schema or when its data version moved since the editing
    /// read; either way nothing is written for it. With `detailed_log` the
    /// store is also asked for per-row diagnostics, which are reported as
    /// warnings and never undo the commit.
    ///
    /// Fails only when the store cannot be reached before any table is
    /// tried. The staged edits are then left in place.
    pub fn apply(&self, staging: &mut EditStaging, detailed_log: bool) -> Result<Vec<ApplyOutcome>> {
        if !staging.is_empty() {
            self.store.ping()?;
        }

        let edits = staging.take_all();
        info!(tables = edits.len(), detailed_log, "applying staged edits");

        let outcomes = edits
            .into_iter()
            .map(|edit| {
                let outcome = self.apply_one(edit, detailed_log);
                if outcome.committed {
                    info!(
                        table = %outcome.table_key,
                        version = ?outcome.version,
                        warnings = outcome.warning_count,
                        "committed edit"
                    );
                } else {
                    warn!(
                        table = %outcome.table_key,
                        reason = ?outcome.reason(),
                        errors = outcome.error_count,
                        "rejected edit"
                    );
                }
                outcome
            })
            .collect();
        Ok(outcomes)
    }

    /// Drop every pending edit without touching the store
    pub fn cancel(&self, staging: &mut EditStaging) -> Result<usize> {
        let discarded = staging.discard_all();
        info!(discarded, "cancelled staged edits");
        Ok(discarded)
    }

    fn apply_one(&self, edit: StagedEdit, detailed_log: bool) -> ApplyOutcome {
        let key = edit.table_key.clone();
        let reject = |err: Error| ApplyOutcome::rejected(key.clone(), vec![Diagnostic::from_error(&key, &err)]);

        let schema = match self.store.read_schema(&key) {
            Ok(schema) => schema,
            Err(e) => return reject(e),
        };

        let diagnostics = ValidationService::validate(&edit, &schema);
        if !diagnostics.is_empty() {
            return ApplyOutcome::rejected(key.clone(), diagnostics);
        }

        let current = match self.store.data_version(&key) {
            Ok(version) => version,
            Err(e) => return reject(e),
        };
        if current != edit.base_version {
            return reject(Error::VersionConflict {
                table: key.to_string(),
                base: edit.base_version,
                current,
            });
        }

        let written = self.store.write_table(WriteRequest {
            key: &key,
            expected_version: edit.base_version,
            field_keys: &edit.field_keys,
            rows: &edit.rows,
            row_log: detailed_log,
        });
        let written = match written {
            Ok(written) => written,
            Err(e) => return reject(e),
        };

        // The store re-checks the version itself in case a writer got in
        // between the check above and the write
        if !written.accepted {
            return reject(Error::VersionConflict {
                table: key.to_string(),
                base: edit.base_version,
                current: written.version,
            });
        }

        let import_log = written
            .row_diagnostics
            .into_iter()
            .map(|d| Diagnostic {
                severity: Severity::Warning,
                kind: ErrorKind::PartialRowFailure,
                table_key: key.clone(),
                row_index: Some(d.row_index),
                field: d.field,
                message: d.message,
            })
            .collect();

        ApplyOutcome::new(key.clone(), true, Some(written.version), import_log)
    }
}
