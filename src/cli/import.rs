use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{PennyError, Result};
use crate::lookups::{
    fetch_account_types, fetch_currency_codes, fetch_transaction_types, AccountMapping,
    AccountType,
};
use crate::models::Account;
use crate::normalizer::{ensure_valid, process, ProcessOptions};
use crate::settings::load_settings;
use crate::writer::{file_checksum, previous_import, record_import, write_processed};

use super::{load_sheet, open_store, print_conflicts, print_issues};

pub struct ImportArgs {
    pub file: String,
    pub map: Vec<String>,
    pub default_type: Option<String>,
    pub delimiter: Option<char>,
    pub strict: bool,
    pub dry_run: bool,
    pub owner_id: Option<String>,
    pub owner_email: Option<String>,
}

fn print_unmapped(unmapped: &[&Account], types: &[AccountType]) {
    println!("{}", "Accounts without a type:".yellow().bold());
    for acc in unmapped {
        println!("  {} ({})", acc.name, acc.slug);
    }
    let mut table = Table::new();
    table.set_header(vec!["Type ID", "Name"]);
    for t in types {
        table.add_row(vec![Cell::new(&t.id), Cell::new(&t.name)]);
    }
    println!("Map them with --map SLUG=TYPE or --default-type TYPE:\n{table}");
}

pub fn run(args: ImportArgs) -> Result<()> {
    let settings = load_settings();
    let owner = settings.owner(args.owner_id.as_deref(), args.owner_email.as_deref());
    let mut store = open_store(&settings)?;

    let sheet = load_sheet(&args.file, args.delimiter, &settings)?;
    let options = ProcessOptions {
        strict: args.strict,
        known_currencies: fetch_currency_codes(&store)?,
    };
    let processed = process(&sheet, &options);
    print_conflicts(&processed.tags.conflicts);
    print_issues(&processed.issues);
    ensure_valid(&processed, &options)?;

    let account_types = fetch_account_types(&store)?;
    let mapping = AccountMapping::build(
        &processed.accounts,
        &args.map,
        args.default_type.as_deref(),
        &account_types,
    )?;
    let unmapped = mapping.unmapped(&processed.accounts);
    if !unmapped.is_empty() {
        print_unmapped(&unmapped, &account_types);
        let names: Vec<&str> = unmapped.iter().map(|a| a.name.as_str()).collect();
        return Err(PennyError::UnmappedAccount(names.join(", ")));
    }

    let c = processed.counts;
    if args.dry_run {
        println!(
            "Dry run: would write {} accounts, {} tags, {} transactions",
            c.accounts, c.tags, c.transactions
        );
        return Ok(());
    }
    if owner.id.is_empty() {
        return Err(PennyError::NotSignedIn);
    }

    let path = Path::new(&args.file);
    let checksum = file_checksum(path)?;
    if let Some(prev) = previous_import(&store, &owner, &checksum)? {
        let name = prev.get("fileName").and_then(|v| v.as_str()).unwrap_or("?");
        println!("This file was imported before (as {name}); existing records will be updated.");
    }

    let transaction_types = fetch_transaction_types(&store)?;
    let summary = write_processed(
        &mut store,
        &processed,
        &mapping,
        &owner,
        &transaction_types,
        &settings.write_options(),
        &mut |msg| println!("{}", msg.dimmed()),
    )?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.clone());
    record_import(&mut store, &owner, &file_name, &checksum, &c)?;

    println!(
        "{} accounts, {} tags, {} transactions written in {} batches",
        summary.accounts, summary.tags, summary.transactions, summary.batches
    );
    Ok(())
}
