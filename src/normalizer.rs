use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{PennyError, Result};
use crate::headers::{Column, Sheet};
use crate::models::{Account, Counts, IssueKind, Processed, RowIssue, Transaction};
use crate::slug::slugify;
use crate::tags::{path_nodes, split_paths_cell, TagHierarchyBuilder};

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Refuse to write when the validation report is non-empty.
    pub strict: bool,
    /// Currency codes considered valid; empty disables the check.
    pub known_currencies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Parse a bank amount: strips `,` `$` `"` and whitespace, `(x)` means negative.
pub fn parse_amount_strict(raw: &str) -> Option<f64> {
    let s: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '"' | '$') && !c.is_whitespace())
        .collect();
    let (negate, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner.to_string()),
        None => (false, s),
    };
    let n: f64 = s.parse().ok().filter(|n: &f64| n.is_finite())?;
    Some(if negate { -n } else { n })
}

/// Lenient amount: anything non-numeric is 0.
pub fn parse_amount(raw: &str) -> f64 {
    parse_amount_strict(raw).unwrap_or(0.0)
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("invalid iso regex"))
}

fn mdy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("invalid mdy regex"))
}

fn ymd_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})[/.](\d{1,2})[/.](\d{1,2})$").expect("invalid ymd regex"))
}

fn compact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("invalid compact regex"))
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%b %d %Y", "%d %b %Y", "%d %B %Y", "%d-%b-%Y"];

fn parse_generic_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(c) = compact_re().captures(s) {
        return ymd(&c[1], &c[2], &c[3]);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
}

/// Normalize a date cell to `YYYY-MM-DD`; empty when it can't be understood.
pub fn to_iso_date(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    let date = if let Some(c) = iso_re().captures(s) {
        ymd(&c[1], &c[2], &c[3])
    } else if let Some(c) = mdy_re().captures(s) {
        ymd(&c[3], &c[1], &c[2])
    } else if let Some(c) = ymd_re().captures(s) {
        ymd(&c[1], &c[2], &c[3])
    } else {
        parse_generic_date(s)
    };
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Sign sanity check between the type column and the amount.
fn violates_type_amount(type_name: &str, amount: f64) -> bool {
    match type_name.trim().to_lowercase().as_str() {
        "expense" | "refund" => amount > 0.0,
        "income" => amount < 0.0,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

/// Derive accounts, the tag hierarchy and one transaction per row.
pub fn process(sheet: &Sheet, options: &ProcessOptions) -> Processed {
    if sheet.rows.is_empty() {
        return Processed::default();
    }
    let cols = &sheet.columns;
    let known: Vec<String> = options
        .known_currencies
        .iter()
        .map(|c| c.trim().to_uppercase())
        .collect();

    let mut accounts: Vec<Account> = Vec::new();
    let mut account_pos: HashMap<String, usize> = HashMap::new();
    let mut tags = TagHierarchyBuilder::new();
    let mut transactions = Vec::with_capacity(sheet.rows.len());
    let mut issues = Vec::new();

    for (i, row) in sheet.rows.iter().enumerate() {
        let account_name = cols.cell(row, Column::Account).trim().to_string();
        let currency_code = cols.cell(row, Column::Currency).trim().to_uppercase();
        let account_id = slugify(&account_name);

        // accounts
        if account_id.is_empty() {
            issues.push(RowIssue {
                row_index: i,
                kind: IssueKind::MissingAccount,
            });
        } else {
            match account_pos.get(&account_id) {
                Some(&pos) => {
                    let acc = &mut accounts[pos];
                    if acc.currency_code.is_empty() && !currency_code.is_empty() {
                        acc.currency_code = currency_code.clone();
                    }
                }
                None => {
                    account_pos.insert(account_id.clone(), accounts.len());
                    accounts.push(Account {
                        name: account_name.clone(),
                        slug: account_id.clone(),
                        currency_code: currency_code.clone(),
                    });
                }
            }
        }

        // tags: every path feeds the hierarchy, only the first is attributed
        let paths = split_paths_cell(cols.cell(row, Column::Tags));
        for path in &paths {
            tags.add_path(path);
        }
        let first = paths.first().map(|p| path_nodes(p)).unwrap_or_default();
        let tag_path: Vec<String> = first.iter().map(|(name, _)| name.clone()).collect();
        let tag_path_ids: Vec<String> = first.into_iter().map(|(_, slug)| slug).collect();
        let tag_leaf_id = tag_path_ids.last().cloned();

        // scalar fields
        let raw_amount = cols.cell(row, Column::Amount).trim();
        let amount = parse_amount(raw_amount);
        if !raw_amount.is_empty() && parse_amount_strict(raw_amount).is_none() {
            issues.push(RowIssue {
                row_index: i,
                kind: IssueKind::InvalidAmount {
                    raw: raw_amount.to_string(),
                },
            });
        }
        let raw_date = cols.cell(row, Column::Date).trim();
        let date = to_iso_date(raw_date);
        if date.is_empty() && !raw_date.is_empty() {
            issues.push(RowIssue {
                row_index: i,
                kind: IssueKind::InvalidDate {
                    raw: raw_date.to_string(),
                },
            });
        }
        let type_name = cols.cell(row, Column::Type).trim().to_string();
        if violates_type_amount(&type_name, amount) {
            issues.push(RowIssue {
                row_index: i,
                kind: IssueKind::TypeAmountMismatch {
                    type_name: type_name.clone(),
                    amount,
                },
            });
        }
        if !known.is_empty() && !currency_code.is_empty() && !known.contains(&currency_code) {
            issues.push(RowIssue {
                row_index: i,
                kind: IssueKind::UnknownCurrency {
                    code: currency_code.clone(),
                },
            });
        }

        let id = cols.cell(row, Column::Id).trim();
        transactions.push(Transaction {
            id: (!id.is_empty()).then(|| id.to_string()),
            date,
            description: cols.cell(row, Column::Description).trim().to_string(),
            currency_code,
            type_name,
            account_name,
            account_id,
            amount,
            tag_path,
            tag_path_ids,
            tag_leaf_id,
            source_row_index: i,
        });
    }

    let tags = tags.finish();
    let counts = Counts {
        accounts: accounts.len(),
        tags: tags.nodes.len(),
        transactions: transactions.len(),
    };
    info!(
        accounts = counts.accounts,
        tags = counts.tags,
        transactions = counts.transactions,
        conflicts = tags.conflicts.len(),
        issues = issues.len(),
        "processed upload"
    );
    debug!(unresolved = ?sheet.unresolved_headers(), "columns ignored by normalizer");

    Processed {
        accounts,
        tags,
        transactions,
        issues,
        counts,
    }
}

/// In strict mode any row issue blocks the write.
pub fn ensure_valid(processed: &Processed, options: &ProcessOptions) -> Result<()> {
    if options.strict && !processed.issues.is_empty() {
        return Err(PennyError::Validation(processed.issues.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv;

    fn sheet(text: &str) -> Sheet {
        Sheet::from_matrix(parse_csv(text, ','))
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), 1234.56);
        assert_eq!(parse_amount("\"500.00\""), 500.0);
        assert_eq!(parse_amount("  -42.50  "), -42.5);
        assert_eq!(parse_amount("(1,234.56)"), -1234.56);
        assert_eq!(parse_amount("-$50.00"), -50.0);
        assert_eq!(parse_amount("not_a_number"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
        assert_eq!(parse_amount(""), 0.0);
    }

    #[test]
    fn test_to_iso_date_shapes() {
        assert_eq!(to_iso_date("2025-01-15"), "2025-01-15");
        assert_eq!(to_iso_date("1/5/2025"), "2025-01-05");
        assert_eq!(to_iso_date("12/31/2024"), "2024-12-31");
        assert_eq!(to_iso_date("2025/1/5"), "2025-01-05");
        assert_eq!(to_iso_date("2025.03.09"), "2025-03-09");
    }

    #[test]
    fn test_to_iso_date_generic() {
        assert_eq!(to_iso_date("2025-01-15T10:30:00Z"), "2025-01-15");
        assert_eq!(to_iso_date("2025-01-15 10:30:00"), "2025-01-15");
        assert_eq!(to_iso_date("Jan 5, 2025"), "2025-01-05");
        assert_eq!(to_iso_date("5 March 2025"), "2025-03-05");
        assert_eq!(to_iso_date("20250105"), "2025-01-05");
    }

    #[test]
    fn test_to_iso_date_invalid_is_empty() {
        assert_eq!(to_iso_date("2025-13-01"), "");
        assert_eq!(to_iso_date("02/30/2025"), "");
        assert_eq!(to_iso_date("yesterday"), "");
        assert_eq!(to_iso_date(""), "");
    }

    #[test]
    fn test_accounts_collapse_by_slug() {
        let s = sheet(
            "Date,Description,Account,Amount,Tags\n\
             2025-01-01,Latte,Checking,-4.5,Food / Coffee\n\
             2025-01-02,Sandwich,checking ,-9,Food / Lunch\n",
        );
        let p = process(&s, &ProcessOptions::default());
        assert_eq!(p.accounts.len(), 1);
        assert_eq!(p.accounts[0].slug, "checking");
        assert_eq!(p.accounts[0].name, "Checking");
        assert_eq!(p.tags.tree.len(), 1);
        assert_eq!(p.tags.tree[0].name, "Food");
        let kids: Vec<&str> = p.tags.tree[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(kids, vec!["Coffee", "Lunch"]);
        assert_eq!(p.transactions[1].account_id, p.accounts[0].slug);
    }

    #[test]
    fn test_first_non_empty_currency_wins() {
        let s = sheet(
            "Account,Currency,Amount\n\
             Savings,,1\n\
             Savings,cad,2\n\
             Savings,USD,3\n",
        );
        let p = process(&s, &ProcessOptions::default());
        assert_eq!(p.accounts[0].currency_code, "CAD");
        assert_eq!(p.transactions[0].currency_code, "");
    }

    #[test]
    fn test_missing_account_still_yields_transaction() {
        let s = sheet("Account,Amount\n,5\nCash,6\n");
        let p = process(&s, &ProcessOptions::default());
        assert_eq!(p.accounts.len(), 1);
        assert_eq!(p.transactions.len(), 2);
        assert_eq!(p.transactions[0].account_id, "");
        assert_eq!(p.issues[0].kind, IssueKind::MissingAccount);
    }

    #[test]
    fn test_first_tag_path_attributed() {
        let s = sheet("ID,Account,Tags\n7,Cash,Travel / Flights | Work / Trips\n");
        let p = process(&s, &ProcessOptions::default());
        let t = &p.transactions[0];
        assert_eq!(t.id.as_deref(), Some("7"));
        assert_eq!(t.tag_path, vec!["Travel", "Flights"]);
        assert_eq!(t.tag_path_ids, vec!["travel", "flights"]);
        assert_eq!(t.tag_leaf_id.as_deref(), Some("flights"));
        // the second path still lands in the hierarchy
        assert!(p.tags.node("trips").is_some());
        assert_eq!(p.counts.tags, 4);
    }

    #[test]
    fn test_lenient_fields_reported() {
        let s = sheet("Date,Account,Amount,Type\nsoon,Cash,abc,Expense\n2025-01-01,Cash,10,Expense\n");
        let p = process(&s, &ProcessOptions::default());
        assert_eq!(p.transactions[0].amount, 0.0);
        assert_eq!(p.transactions[0].date, "");
        let kinds: Vec<&IssueKind> = p.issues.iter().map(|i| &i.kind).collect();
        assert!(kinds.contains(&&IssueKind::InvalidAmount { raw: "abc".into() }));
        assert!(kinds.contains(&&IssueKind::InvalidDate { raw: "soon".into() }));
        assert!(kinds.contains(&&IssueKind::TypeAmountMismatch {
            type_name: "Expense".into(),
            amount: 10.0
        }));
        assert_eq!(p.issues.len(), 3);
    }

    #[test]
    fn test_unknown_currency_reported_when_list_given() {
        let s = sheet("Account,Currency\nCash,XYZ\nCash,usd\n");
        let opts = ProcessOptions {
            strict: false,
            known_currencies: vec!["USD".into()],
        };
        let p = process(&s, &opts);
        assert_eq!(p.issues.len(), 1);
        assert_eq!(p.issues[0].row_index, 0);
    }

    #[test]
    fn test_strict_mode_blocks() {
        let s = sheet("Account,Amount\nCash,oops\n");
        let mut opts = ProcessOptions::default();
        let p = process(&s, &opts);
        assert!(ensure_valid(&p, &opts).is_ok());
        opts.strict = true;
        assert!(matches!(ensure_valid(&p, &opts), Err(PennyError::Validation(1))));
    }

    #[test]
    fn test_empty_rows() {
        let s = sheet("Date,Amount\n");
        let p = process(&s, &ProcessOptions::default());
        assert_eq!(p, Processed::default());
    }

    #[test]
    fn test_reprocessing_is_deterministic() {
        let text = "Account,Tags\nA,X / Y\nB,Y / Z | Q / Y\n";
        let a = process(&sheet(text), &ProcessOptions::default());
        let b = process(&sheet(text), &ProcessOptions::default());
        assert_eq!(a, b);
    }
}
