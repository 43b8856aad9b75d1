use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::tree_lines;
use crate::headers::Column;
use crate::normalizer::{process, ProcessOptions};
use crate::settings::load_settings;
use crate::tags::{build_tag_index, unique_tags};

use super::{load_sheet, print_conflicts};

pub fn run(file: &str, delimiter: Option<char>, index: bool) -> Result<()> {
    let settings = load_settings();
    let sheet = load_sheet(file, delimiter, &settings)?;
    let tags_col = sheet.columns.get(Column::Tags);

    if !index {
        let processed = process(&sheet, &ProcessOptions::default());
        if processed.tags.nodes.is_empty() {
            println!("No tags found.");
            return Ok(());
        }
        println!("{}", format!("Tags ({})", processed.tags.nodes.len()).bold());
        for line in tree_lines(&processed.tags.tree) {
            println!("  {line}");
        }
        print_conflicts(&processed.tags.conflicts);
        return Ok(());
    }

    let id_col = sheet.columns.get(Column::Id);
    if id_col.is_none() {
        println!("No ID column; listing tags only.");
        for tag in unique_tags(&sheet.rows, tags_col) {
            println!("  {tag}");
        }
        return Ok(());
    }

    let tag_index = build_tag_index(&sheet.rows, tags_col, id_col);
    let mut table = Table::new();
    table.set_header(vec!["Tag", "Rows"]);
    for tag in &tag_index.unique_tags {
        let ids = tag_index.index.get(tag).map(|v| v.join(", ")).unwrap_or_default();
        table.add_row(vec![Cell::new(tag), Cell::new(ids)]);
    }
    println!("Tag index\n{table}");
    Ok(())
}
