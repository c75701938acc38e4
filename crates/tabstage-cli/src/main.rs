//! tabstage CLI
//!
//! Command-line tool for reading, staging and applying table edits against a
//! directory-of-CSV table store.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabstage_core::{
    ApplyOutcome, ApplyReport, BatchFile, CsvDirStore, EditFile, Severity, TableKey, TableSession,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TABSTAGE_LOG";
const DEFAULT_LOG_FILTER: &str = "tabstage=info,tabstage_core=warn";

#[derive(Parser)]
#[command(name = "tabstage")]
#[command(about = "Staged, versioned table edits", long_about = None)]
#[command(version)]
struct Cli {
    /// Store directory
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables
    Tables {
        /// Include empty read-only tables
        #[arg(short, long)]
        all: bool,
    },

    /// Show the fields of a table
    Fields {
        /// Table key
        #[arg(short, long)]
        table: String,
    },

    /// Show a table's rows
    Show {
        /// Table key
        #[arg(short, long)]
        table: String,

        /// Fields to display (comma-separated)
        #[arg(short, long)]
        fields: Option<String>,

        /// Row group to display
        #[arg(short, long)]
        group: Option<String>,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read a table for editing and write it to an edit file
    Checkout {
        /// Table key
        #[arg(short, long)]
        table: String,

        /// Row group to check out
        #[arg(short, long)]
        group: Option<String>,

        /// Output path for the edit file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Stage edit files and apply them
    Apply {
        /// Edit files (JSON)
        #[arg(short, long, required = true)]
        edit: Vec<PathBuf>,

        /// Include per-row diagnostics
        #[arg(short, long)]
        detailed: bool,

        /// Write an apply report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run a batch file
    Batch {
        /// Path to batch file (JSON)
        #[arg(short, long)]
        batch: PathBuf,
    },

    /// Create a batch file template
    CreateBatch {
        /// Output path for the batch file
        #[arg(short, long)]
        output: PathBuf,

        /// Edit files to include
        #[arg(short, long)]
        edit: Vec<PathBuf>,

        /// Include per-row diagnostics
        #[arg(short, long)]
        detailed: bool,

        /// Report path to record in the batch
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Run a command. `Ok(false)` means it ran but some table was not committed.
fn run(cli: Cli) -> tabstage_core::Result<bool> {
    match cli.command {
        Commands::Tables { all } => cmd_tables(&cli.root, all),
        Commands::Fields { table } => cmd_fields(&cli.root, &table),
        Commands::Show {
            table,
            fields,
            group,
            limit,
            json,
        } => cmd_show(&cli.root, &table, fields, group.as_deref(), limit, json),
        Commands::Checkout { table, group, output } => cmd_checkout(&cli.root, &table, group.as_deref(), &output),
        Commands::Apply { edit, detailed, report } => cmd_apply(&cli.root, &edit, detailed, report.as_deref()),
        Commands::Batch { batch } => cmd_batch(&batch),
        Commands::CreateBatch {
            output,
            edit,
            detailed,
            report,
        } => cmd_create_batch(&cli.root, &output, edit, detailed, report),
    }
}

fn open_session(root: &Path) -> tabstage_core::Result<TableSession<CsvDirStore>> {
    Ok(TableSession::new(CsvDirStore::open(root)?))
}

fn cmd_tables(root: &Path, all: bool) -> tabstage_core::Result<bool> {
    let session = open_session(root)?;
    let tables = if all {
        session.list_all_tables()?
    } else {
        session.list_available_tables()?
    };

    println!("Tables ({}):", tables.len());
    println!();

    for table in &tables {
        let class = match table.import_class {
            tabstage_core::ImportClass::NotImportable => "read-only",
            tabstage_core::ImportClass::ImportableClearAllFirst => "replace",
            tabstage_core::ImportClass::ImportableMerge => "merge",
        };
        let empty = if table.is_empty { ", empty" } else { "" };
        println!("  {} [{}{}]", table.key, class, empty);
    }

    Ok(true)
}

fn cmd_fields(root: &Path, table: &str) -> tabstage_core::Result<bool> {
    let session = open_session(root)?;
    let fields = session.get_fields(&TableKey::new(table))?;

    println!("Table: {}", table);
    println!("Schema version: {}", fields.schema_version);
    println!();

    for field in &fields.fields {
        let mut flags = Vec::new();
        if field.is_key {
            flags.push("key");
        }
        if !field.is_importable {
            flags.push("read-only");
        }
        let unit = if field.unit.is_empty() {
            String::new()
        } else {
            format!(" ({})", field.unit)
        };
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("  {}{}{}", field.key, unit, flags);
        if !field.description.is_empty() {
            println!("      {}", field.description);
        }
    }

    Ok(true)
}

fn cmd_show(
    root: &Path,
    table: &str,
    fields: Option<String>,
    group: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> tabstage_core::Result<bool> {
    let session = open_session(root)?;

    let field_filter: Option<Vec<String>> =
        fields.map(|f| f.split(',').map(|s| s.trim().to_string()).collect());
    let snapshot = session.get_for_display(&TableKey::new(table), field_filter.as_deref(), group)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(true);
    }

    // Print header
    println!("{}", snapshot.field_keys.join("\t"));
    println!("{}", "-".repeat(snapshot.field_count() * 12));

    // Print rows
    let row_limit = limit.unwrap_or(snapshot.row_count);
    for row in snapshot.rows_iter().take(row_limit) {
        println!("{}", row.join("\t"));
    }

    if snapshot.row_count > row_limit {
        println!("... ({} more rows)", snapshot.row_count - row_limit);
    }

    Ok(true)
}

fn cmd_checkout(root: &Path, table: &str, group: Option<&str>, output: &Path) -> tabstage_core::Result<bool> {
    let session = open_session(root)?;
    let snapshot = session.get_for_editing(&TableKey::new(table), group)?;

    let Some(file) = EditFile::from_snapshot(&snapshot, group) else {
        eprintln!("Table '{}' did not return an editable snapshot", table);
        return Ok(false);
    };
    file.save(output)?;

    println!("Checked out {} rows of '{}' at version {}", snapshot.row_count, snapshot.table_key, snapshot.version);
    println!("Fields: {}", snapshot.field_keys.join(", "));
    println!();
    println!("Edit the file, then run:");
    println!("  tabstage --root {} apply --edit {}", root.display(), output.display());

    Ok(true)
}

fn cmd_apply(root: &Path, edits: &[PathBuf], detailed: bool, report: Option<&Path>) -> tabstage_core::Result<bool> {
    let session = open_session(root)?;
    apply_edit_files(&session, edits, detailed, report)
}

fn cmd_batch(batch_path: &Path) -> tabstage_core::Result<bool> {
    let batch = BatchFile::load(batch_path)?;

    println!("Running batch with {} edit files", batch.edits.len());
    println!("Root: {}", batch.root.display());
    println!();

    let session = open_session(&batch.root)?;
    apply_edit_files(&session, &batch.edits, batch.detailed_log, batch.report.as_deref())
}

/// Stage every edit file, apply once and print the outcomes
fn apply_edit_files(
    session: &TableSession<CsvDirStore>,
    edits: &[PathBuf],
    detailed: bool,
    report_path: Option<&Path>,
) -> tabstage_core::Result<bool> {
    let mut stage_errors = Vec::new();

    for path in edits {
        let staged = EditFile::load(path)
            .and_then(EditFile::into_staged)
            .and_then(|edit| session.submit(edit));
        match staged {
            Ok(()) => println!("Staged {}", path.display()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "edit file not staged");
                stage_errors.push((path.clone(), e.to_string()));
            }
        }
    }

    let outcomes = session.apply(detailed)?;
    println!();
    print_outcomes(&outcomes);

    if !stage_errors.is_empty() {
        println!("\nNot staged ({}):", stage_errors.len());
        for (path, err) in &stage_errors {
            println!("  {}: {}", path.display(), err);
        }
    }

    let report = ApplyReport::new(detailed, outcomes);
    if let Some(path) = report_path {
        report.save(path)?;
        println!("\nReport written to {}", path.display());
    }

    println!();
    println!(
        "Apply complete: {} committed, {} rejected",
        report.committed_count(),
        report.rejected_count()
    );

    Ok(report.all_committed() && stage_errors.is_empty())
}

fn print_outcomes(outcomes: &[ApplyOutcome]) {
    if outcomes.is_empty() {
        println!("Nothing to apply.");
        return;
    }

    for outcome in outcomes {
        if outcome.committed {
            let version = outcome.version.map(|v| v.to_string()).unwrap_or_default();
            println!(
                "  [committed] {} (version {}, {} warnings)",
                outcome.table_key, version, outcome.warning_count
            );
        } else {
            println!("  [rejected] {} ({} errors)", outcome.table_key, outcome.error_count);
        }

        for entry in &outcome.import_log {
            let severity = match entry.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            match entry.row_index {
                Some(row) => println!("      {} row {}: {}", severity, row, entry.message),
                None => println!("      {}: {}", severity, entry.message),
            }
        }
    }
}

fn cmd_create_batch(
    root: &Path,
    output: &Path,
    edits: Vec<PathBuf>,
    detailed: bool,
    report: Option<PathBuf>,
) -> tabstage_core::Result<bool> {
    let edits = if edits.is_empty() {
        vec![PathBuf::from("edit1.json"), PathBuf::from("edit2.json")]
    } else {
        edits
    };

    let batch = BatchFile {
        root: root.to_path_buf(),
        edits,
        detailed_log: detailed,
        report,
    };

    batch.save(output)?;
    println!("Created batch file: {}", output.display());
    println!();
    println!("Edit the file to configure your batch, then run:");
    println!("  tabstage batch --batch {}", output.display());

    Ok(true)
}
