//! tabstage-core: Staged, versioned edit transactions over tabular data
//!
//! This library provides functionality to:
//! - Discover the tables a host data store holds and their field metadata
//! - Read versioned snapshots of a table, for display or for editing
//! - Stage edited rows off to the side, one pending edit per table
//! - Apply every staged edit, committing each table only if its data
//!   version is unchanged since the editing read
//! - Back a session with an in-memory store or a directory of CSV files

pub mod apply;
pub mod catalog;
pub mod csv_store;
pub mod edit_file;
pub mod error;
pub mod memory;
pub mod report;
pub mod schema;
pub mod session;
pub mod snapshot;
pub mod staging;
pub mod store;
pub mod table;
pub mod validation;

pub use apply::{ApplyCoordinator, ApplyOutcome};
pub use catalog::TableCatalog;
pub use csv_store::CsvDirStore;
pub use edit_file::{BatchFile, EditFile};
pub use error::{Error, ErrorKind, Result};
pub use memory::MemoryStore;
pub use report::ApplyReport;
pub use schema::FieldSchema;
pub use session::TableSession;
pub use snapshot::{ReadPurpose, SnapshotReader, TableSnapshot};
pub use staging::{EditStaging, StagedEdit};
pub use store::{RawTable, RowDiagnostic, StoredTable, TableStore, WriteOutcome, WriteRequest};
pub use table::{Field, ImportClass, TableFields, TableInfo, TableKey, ALL_GROUP};
pub use validation::{Diagnostic, Severity, ValidationService};
