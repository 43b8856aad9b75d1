use std::path::Path;

use rusqlite::Connection;
use serde_json::json;

use crate::error::Result;

pub const DB_FILE: &str = "penny.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    fields TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (collection, key)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
";

/// Collection names. Rename here and nowhere else.
pub mod collections {
    pub const USER_ACCOUNTS: &str = "user_accounts";
    pub const USER_TAGS: &str = "user_tags";
    pub const USER_TRANSACTIONS: &str = "user_transactions";
    pub const USER_IMPORTS: &str = "user_imports";
    pub const ACCOUNT_TYPES: &str = "pp_account_types";
    pub const TRANSACTION_TYPES: &str = "pp_transaction_types";
    pub const CURRENCY_LIST: &str = "pp_currency_list";
}

// (id, name, desc)
const DEFAULT_ACCOUNT_TYPES: &[(&str, &str, &str)] = &[
    ("asset.cash", "Cash", "Cash and cash equivalents."),
    ("asset.bank", "Bank Account", "Checking and savings accounts."),
    ("asset.investment", "Investment", "Brokerage and retirement accounts."),
    ("liability.credit_card", "Credit Card", "Revolving credit card balances."),
    ("liability.line_of_credit", "Line of Credit", "Overdraft and credit lines."),
    ("liability.loan", "Loan", "Mortgages, auto and personal loans."),
];

// (id, name, symbol)
const DEFAULT_TRANSACTION_TYPES: &[(&str, &str, &str)] = &[
    ("income", "Income", "+"),
    ("expense", "Expense", "-"),
    ("refund", "Refund", "+"),
    ("transfer", "Transfer", "+"),
];

// (code, name, symbol)
const DEFAULT_CURRENCIES: &[(&str, &str, &str)] = &[
    ("USD", "US Dollar", "$"),
    ("CAD", "Canadian Dollar", "$"),
    ("EUR", "Euro", "\u{20ac}"),
    ("GBP", "Pound Sterling", "\u{a3}"),
    ("AUD", "Australian Dollar", "$"),
    ("NZD", "New Zealand Dollar", "$"),
    ("JPY", "Japanese Yen", "\u{a5}"),
    ("INR", "Indian Rupee", "\u{20b9}"),
    ("CHF", "Swiss Franc", "Fr"),
    ("SEK", "Swedish Krona", "kr"),
    ("NOK", "Norwegian Krone", "kr"),
    ("DKK", "Danish Krone", "kr"),
    ("SGD", "Singapore Dollar", "$"),
    ("HKD", "Hong Kong Dollar", "$"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

fn collection_is_empty(conn: &Connection, collection: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM documents WHERE collection = ?1",
        [collection],
        |row| row.get(0),
    )?;
    Ok(count == 0)
}

fn seed(conn: &Connection, collection: &str, docs: Vec<(String, serde_json::Value)>) -> Result<()> {
    if !collection_is_empty(conn, collection)? {
        return Ok(());
    }
    for (key, fields) in docs {
        conn.execute(
            "INSERT INTO documents (collection, key, fields) VALUES (?1, ?2, ?3)",
            rusqlite::params![collection, key, fields.to_string()],
        )?;
    }
    Ok(())
}

/// Create the schema and seed reference collections that are still empty.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    seed(
        conn,
        collections::ACCOUNT_TYPES,
        DEFAULT_ACCOUNT_TYPES
            .iter()
            .map(|(id, name, desc)| (id.to_string(), json!({ "name": name, "desc": desc })))
            .collect(),
    )?;
    seed(
        conn,
        collections::TRANSACTION_TYPES,
        DEFAULT_TRANSACTION_TYPES
            .iter()
            .map(|(id, name, symbol)| (id.to_string(), json!({ "name": name, "symbol": symbol })))
            .collect(),
    )?;
    seed(
        conn,
        collections::CURRENCY_LIST,
        DEFAULT_CURRENCIES
            .iter()
            .map(|(code, name, symbol)| {
                (
                    code.to_string(),
                    json!({ "code": code, "currencyName": name, "symbol": symbol }),
                )
            })
            .collect(),
    )?;
    Ok(())
}
