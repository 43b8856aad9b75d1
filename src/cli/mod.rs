pub mod account_types;
pub mod import;
pub mod init;
pub mod preview;
pub mod status;
pub mod tags;

use std::path::Path;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::db::{get_connection, init_db};
use crate::error::{PennyError, Result};
use crate::headers::Sheet;
use crate::models::RowIssue;
use crate::parser::read_csv_file;
use crate::settings::Settings;
use crate::store::SqliteStore;
use crate::tags::{ConflictKind, TagConflict};

/// Read and shape an upload, using the configured delimiter unless one is given.
pub(crate) fn load_sheet(file: &str, delimiter: Option<char>, settings: &Settings) -> Result<Sheet> {
    let matrix = read_csv_file(Path::new(file), delimiter.unwrap_or(settings.delimiter))?;
    Ok(Sheet::from_matrix(matrix))
}

/// Open the configured database, creating the schema if needed.
pub(crate) fn open_store(settings: &Settings) -> Result<SqliteStore> {
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(PennyError::Other(
            "Database not found. Run `penny init` to set up.".into(),
        ));
    }
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    Ok(SqliteStore::new(conn))
}

pub(crate) fn print_conflicts(conflicts: &[TagConflict]) {
    if conflicts.is_empty() {
        return;
    }
    println!("{}", format!("Tag conflicts ({})", conflicts.len()).yellow().bold());
    for c in conflicts {
        let prev = c.prev_parent.as_deref().unwrap_or("(root)");
        match c.kind {
            ConflictKind::ParentMismatch => println!(
                "  {} stays under {}; ignored parent {}",
                c.child, prev, c.new_parent
            ),
            ConflictKind::Cycle => println!(
                "  {} under {} would form a cycle; link refused",
                c.child, c.new_parent
            ),
        }
    }
}

pub(crate) fn print_issues(issues: &[RowIssue]) {
    if issues.is_empty() {
        return;
    }
    println!("{}", format!("Row issues ({})", issues.len()).red().bold());
    for issue in issues {
        // 1-based data row, header excluded
        println!("  row {}: {}", issue.row_index + 1, issue.kind);
    }
}

#[derive(Parser)]
#[command(
    name = "penny",
    about = "Import bank-export CSVs into accounts, hierarchical tags and transactions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Penny: choose a data directory, owner and initialize the database.
    Init {
        /// Path for Penny data (default: ~/Documents/penny)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Owner id that scopes every written record
        #[arg(long = "owner-id")]
        owner_id: Option<String>,
        /// Owner email stored on written records
        #[arg(long = "owner-email")]
        owner_email: Option<String>,
    },
    /// Show what a CSV would produce without writing anything.
    Preview {
        /// Path to the CSV file
        file: String,
        /// Field delimiter (default from settings, usually ',')
        #[arg(long)]
        delimiter: Option<char>,
        /// Dump the full result as JSON
        #[arg(long, conflicts_with = "csv")]
        json: bool,
        /// Write the normalized transactions as CSV
        #[arg(long)]
        csv: bool,
        /// Fail when any row issue is found
        #[arg(long)]
        strict: bool,
    },
    /// Show the tag hierarchy of a CSV, or its tag index.
    Tags {
        /// Path to the CSV file
        file: String,
        #[arg(long)]
        delimiter: Option<char>,
        /// Print tag -> row ids instead of the tree
        #[arg(long)]
        index: bool,
    },
    /// Import a CSV into the database for the configured owner.
    Import {
        /// Path to the CSV file
        file: String,
        /// Account classification, e.g. checking=asset.bank (repeatable)
        #[arg(long = "map", value_name = "SLUG=TYPE")]
        map: Vec<String>,
        /// Account type for accounts not named by --map
        #[arg(long = "default-type", value_name = "TYPE")]
        default_type: Option<String>,
        #[arg(long)]
        delimiter: Option<char>,
        /// Refuse to write when any row issue is found
        #[arg(long)]
        strict: bool,
        /// Process and validate, but write nothing
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long = "owner-id")]
        owner_id: Option<String>,
        #[arg(long = "owner-email")]
        owner_email: Option<String>,
    },
    /// List the reference account types usable with --map.
    AccountTypes,
    /// Show settings, database location and document counts.
    Status,
}
