use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::db::collections;
use crate::error::{PennyError, Result};
use crate::models::Account;
use crate::store::{Document, DocumentStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountType {
    pub id: String,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionType {
    pub id: String,
    pub name: String,
    pub symbol: char,
}

fn str_field<'a>(doc: &'a Document, name: &str) -> &'a str {
    doc.get(name).and_then(Value::as_str).unwrap_or("").trim()
}

/// Reference account types, sorted by name.
pub fn fetch_account_types(store: &dyn DocumentStore) -> Result<Vec<AccountType>> {
    let mut types: Vec<AccountType> = store
        .list(collections::ACCOUNT_TYPES)?
        .into_iter()
        .map(|(id, doc)| {
            let name = match str_field(&doc, "name") {
                "" => id.clone(),
                n => n.to_string(),
            };
            let desc = match str_field(&doc, "desc") {
                "" => str_field(&doc, "description").to_string(),
                d => d.to_string(),
            };
            AccountType { id, name, desc }
        })
        .collect();
    types.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(types)
}

pub fn fetch_transaction_types(store: &dyn DocumentStore) -> Result<Vec<TransactionType>> {
    Ok(store
        .list(collections::TRANSACTION_TYPES)?
        .into_iter()
        .filter_map(|(id, doc)| {
            let name = match str_field(&doc, "name") {
                "" => id.trim().to_string(),
                n => n.to_string(),
            };
            if name.is_empty() {
                return None;
            }
            let symbol = if str_field(&doc, "symbol") == "-" { '-' } else { '+' };
            Some(TransactionType { id, name, symbol })
        })
        .collect())
}

pub fn fetch_currency_codes(store: &dyn DocumentStore) -> Result<Vec<String>> {
    Ok(store
        .list(collections::CURRENCY_LIST)?
        .into_iter()
        .map(|(key, doc)| match str_field(&doc, "code") {
            "" => key.to_uppercase(),
            c => c.to_uppercase(),
        })
        .collect())
}

/// Account slug to the reference type it will be classified as.
#[derive(Debug, Clone, Default)]
pub struct AccountMapping {
    by_slug: HashMap<String, AccountType>,
}

impl AccountMapping {
    /// Build from `slug=type_id` pairs plus an optional type for everything else.
    pub fn build(
        accounts: &[Account],
        pairs: &[String],
        default_type: Option<&str>,
        types: &[AccountType],
    ) -> Result<Self> {
        let find = |id: &str| {
            types
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| PennyError::UnknownAccountType(id.to_string()))
        };

        let mut by_slug = HashMap::new();
        for pair in pairs {
            let (slug, type_id) = pair
                .split_once('=')
                .map(|(s, t)| (s.trim(), t.trim()))
                .filter(|(s, t)| !s.is_empty() && !t.is_empty())
                .ok_or_else(|| PennyError::InvalidMapping(pair.clone()))?;
            by_slug.insert(crate::slug::slugify(slug), find(type_id)?);
        }
        if let Some(default_type) = default_type {
            let fallback = find(default_type)?;
            for acc in accounts {
                by_slug
                    .entry(acc.slug.clone())
                    .or_insert_with(|| fallback.clone());
            }
        }
        Ok(Self { by_slug })
    }

    pub fn get(&self, slug: &str) -> Option<&AccountType> {
        self.by_slug.get(slug)
    }

    /// Accounts that still have no type.
    pub fn unmapped<'a>(&self, accounts: &'a [Account]) -> Vec<&'a Account> {
        accounts
            .iter()
            .filter(|a| !self.by_slug.contains_key(&a.slug))
            .collect()
    }
}
