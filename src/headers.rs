use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::parser::NBSP;

/// Logical columns the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Date,
    Description,
    Currency,
    Type,
    Account,
    Amount,
    Tags,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Id,
        Column::Date,
        Column::Description,
        Column::Currency,
        Column::Type,
        Column::Account,
        Column::Amount,
        Column::Tags,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Date => "Date",
            Self::Description => "Description",
            Self::Currency => "Currency",
            Self::Type => "Type",
            Self::Account => "Account",
            Self::Amount => "Amount",
            Self::Tags => "Tags",
        }
    }

    // Matched against the header lowercased with non-alphanumerics stripped.
    fn alias_pattern(&self) -> &'static str {
        match self {
            Self::Id => r"^id$",
            Self::Date => r"^date",
            Self::Description => r"^(description|merchant|details?|narration|memo)$",
            Self::Currency => r"^(currency|curr|fx)$",
            Self::Type => r"^(type|transactiontype|trxtype|txntype)$",
            Self::Account => r"^(account|accountname|acct)$",
            Self::Amount => r"^(amount|amt)$",
            Self::Tags => r"^tags?$",
        }
    }
}

fn norm_key(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn alias_res() -> &'static [(Column, Regex)] {
    static RES: OnceLock<Vec<(Column, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        Column::ALL
            .iter()
            .map(|c| (*c, Regex::new(c.alias_pattern()).expect("invalid alias regex")))
            .collect()
    })
}

/// Header index for each recognized column, resolved once per upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    indices: HashMap<Column, usize>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String]) -> Self {
        let keys: Vec<String> = headers.iter().map(|h| norm_key(h)).collect();
        let mut indices = HashMap::new();
        for (column, re) in alias_res() {
            if let Some(idx) = keys.iter().position(|k| re.is_match(k)) {
                indices.insert(*column, idx);
            }
        }
        Self { indices }
    }

    pub fn get(&self, column: Column) -> Option<usize> {
        self.indices.get(&column).copied()
    }

    /// Read a resolved column from a row, empty when the column is absent.
    pub fn cell<'a>(&self, row: &'a [String], column: Column) -> &'a str {
        self.get(column)
            .and_then(|i| row.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn is_resolved(&self, idx: usize) -> bool {
        self.indices.values().any(|&i| i == idx)
    }
}

/// Normalize raw header cells to unique snake-ish keys: `Date, date` -> `date, date_2`.
pub fn ensure_unique_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .map(|h| {
            let cleaned = h.replace(NBSP, " ");
            let key = match cleaned.trim() {
                "" => "column",
                k => k,
            };
            let base = key
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
                .to_lowercase();
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

/// Uploaded table: unique headers plus rectangular, trimmed data rows.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub columns: ColumnMap,
}

impl Sheet {
    pub fn from_matrix(matrix: Vec<Vec<String>>) -> Self {
        let mut iter = matrix.into_iter();
        let Some(header_row) = iter.next() else {
            return Self::default();
        };
        let data: Vec<Vec<String>> = iter.collect();

        let width = data
            .iter()
            .map(|r| r.len())
            .fold(header_row.len(), usize::max);
        let mut headers = ensure_unique_headers(&header_row);
        for i in headers.len()..width {
            headers.push(format!("column_{}", i + 1));
        }

        let rows = data
            .into_iter()
            .map(|r| {
                let mut cells: Vec<String> = r
                    .into_iter()
                    .map(|c| c.replace(NBSP, " ").trim().to_string())
                    .collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();

        let columns = ColumnMap::resolve(&headers);
        Self {
            headers,
            rows,
            columns,
        }
    }

    /// Headers that no logical column claimed; kept for display only.
    pub fn unresolved_headers(&self) -> Vec<&str> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.columns.is_resolved(*i))
            .map(|(_, h)| h.as_str())
            .collect()
    }
}
