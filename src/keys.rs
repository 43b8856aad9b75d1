use crate::models::Transaction;

/// Compose a per-owner document id so re-imports overwrite instead of duplicating.
pub fn owner_scoped_id(owner: &str, id: &str) -> String {
    format!("{owner}:{id}")
}

pub fn account_key(owner: &str, slug: &str) -> String {
    owner_scoped_id(owner, slug)
}

pub fn tag_key(owner: &str, slug: &str) -> String {
    owner_scoped_id(owner, slug)
}

/// Explicit row id when present, else `date|description|amount|account`, lowercased.
pub fn transaction_key(owner: &str, tx: &Transaction) -> String {
    let base = match &tx.id {
        Some(id) => id.clone(),
        None => format!(
            "{}|{}|{}|{}",
            tx.date,
            tx.description,
            // -0 and 0 must key the same row
            tx.amount + 0.0,
            tx.account_name
        ),
    };
    owner_scoped_id(owner, &base.to_lowercase())
}

pub fn import_key(owner: &str, checksum: &str) -> String {
    owner_scoped_id(owner, checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: Option<&str>) -> Transaction {
        Transaction {
            id: id.map(String::from),
            date: "2025-01-15".into(),
            description: "Blue Bottle".into(),
            currency_code: "USD".into(),
            type_name: "Expense".into(),
            account_name: "Checking".into(),
            account_id: "checking".into(),
            amount: -4.5,
            tag_path: vec![],
            tag_path_ids: vec![],
            tag_leaf_id: None,
            source_row_index: 0,
        }
    }

    #[test]
    fn test_scoped_keys() {
        assert_eq!(account_key("u1", "checking"), "u1:checking");
        assert_eq!(tag_key("u1", "food"), "u1:food");
    }

    #[test]
    fn test_transaction_key_composite() {
        assert_eq!(
            transaction_key("u1", &tx(None)),
            "u1:2025-01-15|blue bottle|-4.5|checking"
        );
    }

    #[test]
    fn test_transaction_key_whole_amount() {
        let mut t = tx(None);
        t.amount = 12.0;
        assert!(transaction_key("u1", &t).ends_with("|12|checking"));
    }

    #[test]
    fn test_transaction_key_explicit_id() {
        assert_eq!(transaction_key("u1", &tx(Some("TX-9"))), "u1:tx-9");
    }

    #[test]
    fn test_transaction_key_negative_zero() {
        let mut neg = tx(None);
        neg.amount = -0.0;
        let mut pos = tx(None);
        pos.amount = 0.0;
        assert_eq!(transaction_key("u1", &neg), transaction_key("u1", &pos));
        assert!(transaction_key("u1", &neg).ends_with("|0|checking"));
    }

    #[test]
    fn test_keys_are_stable() {
        assert_eq!(transaction_key("u1", &tx(None)), transaction_key("u1", &tx(None)));
    }
}
