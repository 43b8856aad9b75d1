use crate::tags::TagTreeNode;

/// Format an amount with thousands separators and an optional currency code: 1,234.56 USD
pub fn amount(val: f64, currency: &str) -> String {
    let negative = val < 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    let sign = if negative { "-" } else { "" };
    if currency.is_empty() {
        format!("{sign}{with_commas}.{dec_part}")
    } else {
        format!("{sign}{with_commas}.{dec_part} {currency}")
    }
}

pub fn format_bytes(size: u64) -> String {
    if size < 1024 {
        format!("{size} B")
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    }
}

/// Render a tag forest as indented lines, two spaces per level.
pub fn tree_lines(tree: &[TagTreeNode]) -> Vec<String> {
    fn walk(node: &TagTreeNode, out: &mut Vec<String>) {
        out.push(format!(
            "{}{} ({})",
            "  ".repeat(node.depth.saturating_sub(1)),
            node.name,
            node.slug
        ));
        for child in &node.children {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    for root in tree {
        walk(root, &mut out);
    }
    out
}
