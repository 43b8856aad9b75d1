use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::{amount, tree_lines};
use crate::headers::{Column, Sheet};
use crate::lookups::fetch_currency_codes;
use crate::models::Processed;
use crate::normalizer::{ensure_valid, process, ProcessOptions};
use crate::settings::{load_settings, Settings};
use crate::tags::join_segments;

use super::{load_sheet, open_store, print_conflicts, print_issues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
    Csv,
}

/// Currency codes from the database when one exists; preview works without it.
fn known_currencies(settings: &Settings) -> Result<Vec<String>> {
    if !settings.db_path().exists() {
        return Ok(Vec::new());
    }
    fetch_currency_codes(&open_store(settings)?)
}

pub fn run(file: &str, delimiter: Option<char>, output: Output, strict: bool) -> Result<()> {
    let settings = load_settings();
    let sheet = load_sheet(file, delimiter, &settings)?;
    let options = ProcessOptions {
        strict,
        known_currencies: known_currencies(&settings)?,
    };
    let processed = process(&sheet, &options);

    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&processed)?),
        Output::Csv => write_csv(&processed)?,
        Output::Text => {
            print_columns(&sheet);
            print_text(&processed);
        }
    }

    ensure_valid(&processed, &options)
}

fn write_csv(processed: &Processed) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    wtr.write_record([
        "id", "date", "description", "currency", "type", "account", "account_id", "amount",
        "tag_path", "tag_leaf_id",
    ])?;
    for tx in &processed.transactions {
        let amount = tx.amount.to_string();
        let tag_path = join_segments(&tx.tag_path);
        wtr.write_record([
            tx.id.as_deref().unwrap_or(""),
            tx.date.as_str(),
            tx.description.as_str(),
            tx.currency_code.as_str(),
            tx.type_name.as_str(),
            tx.account_name.as_str(),
            tx.account_id.as_str(),
            amount.as_str(),
            tag_path.as_str(),
            tx.tag_leaf_id.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_columns(sheet: &Sheet) {
    let found: Vec<&str> = Column::ALL
        .iter()
        .filter(|c| sheet.columns.get(**c).is_some())
        .map(|c| c.label())
        .collect();
    println!("Columns: {}", found.join(", "));
    let ignored = sheet.unresolved_headers();
    if !ignored.is_empty() {
        println!("Ignored: {}", ignored.join(", ").dimmed());
    }
}

fn print_text(processed: &Processed) {
    let mut table = Table::new();
    table.set_header(vec!["Account", "Slug", "Currency"]);
    for acc in &processed.accounts {
        table.add_row(vec![
            Cell::new(&acc.name),
            Cell::new(&acc.slug),
            Cell::new(&acc.currency_code),
        ]);
    }
    println!("{}\n{table}", "Accounts".bold());

    println!("{}", "Tags".bold());
    for line in tree_lines(&processed.tags.tree) {
        println!("  {line}");
    }
    print_conflicts(&processed.tags.conflicts);

    let mut table = Table::new();
    table.set_header(vec!["Row", "Date", "Description", "Account", "Type", "Amount", "Tag"]);
    for tx in &processed.transactions {
        let shown = amount(tx.amount, &tx.currency_code);
        let shown = if tx.amount < 0.0 {
            shown.red()
        } else {
            shown.green()
        };
        table.add_row(vec![
            Cell::new(tx.source_row_index + 1),
            Cell::new(&tx.date),
            Cell::new(&tx.description),
            Cell::new(&tx.account_name),
            Cell::new(&tx.type_name),
            Cell::new(shown),
            Cell::new(join_segments(&tx.tag_path)),
        ]);
    }
    println!("{}\n{table}", "Transactions".bold());

    print_issues(&processed.issues);
    let c = processed.counts;
    println!(
        "{} accounts, {} tags, {} transactions",
        c.accounts, c.tags, c.transactions
    );
}
