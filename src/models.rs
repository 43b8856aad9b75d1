use serde::{Deserialize, Serialize};

use crate::tags::TagHierarchy;

/// Record marker stamped on everything written from an upload.
pub const SOURCE_CSV_UPLOAD: &str = "csv-upload";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    pub slug: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub date: String,
    pub description: String,
    pub currency_code: String,
    pub type_name: String,
    pub account_name: String,
    pub account_id: String,
    pub amount: f64,
    pub tag_path: Vec<String>,
    pub tag_path_ids: Vec<String>,
    pub tag_leaf_id: Option<String>,
    pub source_row_index: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub accounts: usize,
    pub tags: usize,
    pub transactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    InvalidAmount { raw: String },
    InvalidDate { raw: String },
    MissingAccount,
    TypeAmountMismatch { type_name: String, amount: f64 },
    UnknownCurrency { code: String },
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount { raw } => write!(f, "amount '{raw}' is not a number (using 0)"),
            Self::InvalidDate { raw } => write!(f, "date '{raw}' could not be parsed (left blank)"),
            Self::MissingAccount => write!(f, "no account name"),
            Self::TypeAmountMismatch { type_name, amount } => {
                write!(f, "amount {amount} looks wrong for type '{type_name}'")
            }
            Self::UnknownCurrency { code } => write!(f, "unknown currency '{code}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub row_index: usize,
    #[serde(flatten)]
    pub kind: IssueKind,
}

/// Everything derived from one upload. Rebuilt from scratch on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Processed {
    pub accounts: Vec<Account>,
    pub tags: TagHierarchy,
    pub transactions: Vec<Transaction>,
    pub issues: Vec<RowIssue>,
    pub counts: Counts,
}

/// Identity that scopes written records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub email: Option<String>,
}

impl Owner {
    pub fn normalized_email(&self) -> String {
        self.email
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase()
    }
}
