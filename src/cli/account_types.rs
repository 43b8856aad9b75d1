use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::lookups::fetch_account_types;
use crate::settings::load_settings;

use super::open_store;

pub fn run() -> Result<()> {
    let store = open_store(&load_settings())?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Description"]);
    for t in fetch_account_types(&store)? {
        table.add_row(vec![Cell::new(t.id), Cell::new(t.name), Cell::new(t.desc)]);
    }
    println!("Account types\n{table}");
    Ok(())
}
