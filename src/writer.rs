use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::db::collections;
use crate::error::{PennyError, Result};
use crate::keys::{account_key, import_key, tag_key, transaction_key};
use crate::lookups::{AccountMapping, TransactionType};
use crate::models::{Counts, Owner, Processed, SOURCE_CSV_UPLOAD};
use crate::store::{Document, DocumentStore, WriteBatch};

pub const DEFAULT_BATCH_SIZE: usize = 400;

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub batch_size: usize,
    /// Pause between committed chunks.
    pub batch_pause: Duration,
    pub batch_retries: u32,
    /// First retry delay; doubles on each further attempt.
    pub retry_backoff: Duration,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: Duration::from_millis(10),
            batch_retries: 2,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub accounts: usize,
    pub tags: usize,
    pub transactions: usize,
    pub batches: usize,
}

/// Tracks chunk commits across all phases of one write.
struct ChunkedWriter<'a> {
    store: &'a mut dyn DocumentStore,
    opts: &'a WriteOptions,
    batches: usize,
}

impl ChunkedWriter<'_> {
    fn commit_with_retry(&mut self, batch: &WriteBatch) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.store.commit(batch) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.opts.batch_retries => {
                    let delay = self.opts.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(attempt, error = %e, ?delay, "batch commit failed, retrying");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_phase(&mut self, collection: &str, docs: Vec<(String, Document)>) -> Result<usize> {
        let total = docs.len();
        let size = self.opts.batch_size.max(1);
        let mut docs = docs.into_iter().peekable();
        while docs.peek().is_some() {
            if self.batches > 0 && !self.opts.batch_pause.is_zero() {
                std::thread::sleep(self.opts.batch_pause);
            }
            let mut batch = WriteBatch::new();
            for (key, fields) in docs.by_ref().take(size) {
                batch.set(collection, key, fields);
            }
            self.commit_with_retry(&batch)?;
            self.batches += 1;
            debug!(collection, upserts = batch.len(), batch = self.batches, "chunk committed");
        }
        info!(collection, total, "phase written");
        Ok(total)
    }
}

fn owner_fields(owner: &Owner) -> Document {
    let mut doc = Document::new();
    doc.insert("userId".into(), Value::String(owner.id.clone()));
    doc.insert("userEmail".into(), Value::String(owner.normalized_email()));
    doc.insert("source".into(), Value::String(SOURCE_CSV_UPLOAD.into()));
    doc
}

fn to_document<T: Serialize>(value: &T, owner: &Owner) -> Result<Document> {
    let mut doc = owner_fields(owner);
    if let Value::Object(fields) = serde_json::to_value(value)? {
        doc.extend(fields);
    }
    Ok(doc)
}

fn type_symbol(types: &[TransactionType], type_name: &str, amount: f64) -> char {
    types
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(type_name) || t.id.eq_ignore_ascii_case(type_name))
        .map(|t| t.symbol)
        .unwrap_or(if amount < 0.0 { '-' } else { '+' })
}

/// Write accounts, tags and transactions for one owner, in that order.
/// A chunk that still fails after its retries aborts everything after it.
pub fn write_processed(
    store: &mut dyn DocumentStore,
    processed: &Processed,
    mapping: &AccountMapping,
    owner: &Owner,
    types: &[TransactionType],
    opts: &WriteOptions,
    status: &mut dyn FnMut(&str),
) -> Result<WriteSummary> {
    if owner.id.trim().is_empty() {
        return Err(PennyError::NotSignedIn);
    }

    let mut accounts = Vec::with_capacity(processed.accounts.len());
    for acc in &processed.accounts {
        let system = mapping
            .get(&acc.slug)
            .ok_or_else(|| PennyError::UnmappedAccount(acc.name.clone()))?;
        let mut doc = to_document(acc, owner)?;
        doc.insert("systemTypeId".into(), json!(system.id));
        doc.insert("systemTypeName".into(), json!(system.name));
        doc.insert("systemTypeDesc".into(), json!(system.desc));
        accounts.push((account_key(&owner.id, &acc.slug), doc));
    }

    let tags = processed
        .tags
        .nodes
        .iter()
        .map(|node| Ok((tag_key(&owner.id, &node.slug), to_document(node, owner)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut transactions = Vec::with_capacity(processed.transactions.len());
    for tx in &processed.transactions {
        let mut doc = to_document(tx, owner)?;
        let account = (!tx.account_id.is_empty()).then(|| account_key(&owner.id, &tx.account_id));
        doc.insert("accountKey".into(), json!(account));
        doc.insert(
            "typeSymbol".into(),
            json!(type_symbol(types, &tx.type_name, tx.amount).to_string()),
        );
        transactions.push((transaction_key(&owner.id, tx), doc));
    }

    let mut writer = ChunkedWriter {
        store,
        opts,
        batches: 0,
    };

    status("Writing accounts...");
    let accounts = writer.write_phase(collections::USER_ACCOUNTS, accounts)?;
    status("Writing tags...");
    let tags = writer.write_phase(collections::USER_TAGS, tags)?;
    status("Writing transactions...");
    let transactions = writer.write_phase(collections::USER_TRANSACTIONS, transactions)?;
    status("Done.");

    Ok(WriteSummary {
        accounts,
        tags,
        transactions,
        batches: writer.batches,
    })
}

// ---------------------------------------------------------------------------
// Import records
// ---------------------------------------------------------------------------

pub fn file_checksum(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

pub fn previous_import(
    store: &dyn DocumentStore,
    owner: &Owner,
    checksum: &str,
) -> Result<Option<Document>> {
    store.get(collections::USER_IMPORTS, &import_key(&owner.id, checksum))
}

pub fn record_import(
    store: &mut dyn DocumentStore,
    owner: &Owner,
    file_name: &str,
    checksum: &str,
    counts: &Counts,
) -> Result<()> {
    let mut doc = owner_fields(owner);
    doc.insert("fileName".into(), json!(file_name));
    doc.insert("checksum".into(), json!(checksum));
    doc.insert("counts".into(), serde_json::to_value(counts)?);
    let mut batch = WriteBatch::new();
    batch.set(collections::USER_IMPORTS, import_key(&owner.id, checksum), doc);
    store.commit(&batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Sheet;
    use crate::lookups::AccountType;
    use crate::normalizer::{process, ProcessOptions};
    use crate::parser::parse_csv;
    use crate::store::MemoryStore;

    const CSV: &str = "Date,Description,Type,Account,Amount,Tags\n\
        2025-01-02,Coffee,Expense,Checking,-4.50,Food/Coffee\n\
        2025-01-03,Salary,Income,checking,2000,Work/Payroll\n\
        2025-01-04,Groceries,Expense,Visa,-80.10,Food/Groceries\n";

    fn processed() -> Processed {
        process(
            &Sheet::from_matrix(parse_csv(CSV, ',')),
            &ProcessOptions::default(),
        )
    }

    fn mapping(p: &Processed) -> AccountMapping {
        let types = vec![AccountType {
            id: "asset.bank".into(),
            name: "Bank Account".into(),
            desc: "Checking".into(),
        }];
        AccountMapping::build(&p.accounts, &[], Some("asset.bank"), &types).unwrap()
    }

    fn owner() -> Owner {
        Owner {
            id: "u1".into(),
            email: Some(" Me@Example.COM ".into()),
        }
    }

    fn fast(batch_size: usize) -> WriteOptions {
        WriteOptions {
            batch_size,
            batch_pause: Duration::ZERO,
            batch_retries: 2,
            retry_backoff: Duration::ZERO,
        }
    }

    fn write(store: &mut dyn DocumentStore, opts: &WriteOptions) -> Result<WriteSummary> {
        let p = processed();
        write_processed(store, &p, &mapping(&p), &owner(), &[], opts, &mut |_| {})
    }

    /// Fails the commits whose 1-based call number matches the predicate.
    struct FlakyStore {
        inner: MemoryStore,
        calls: usize,
        fail: fn(usize) -> bool,
    }

    impl DocumentStore for FlakyStore {
        fn commit(&mut self, batch: &WriteBatch) -> Result<()> {
            self.calls += 1;
            if (self.fail)(self.calls) {
                return Err(PennyError::Other("unavailable".into()));
            }
            self.inner.commit(batch)
        }
        fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
            self.inner.get(collection, key)
        }
        fn list(&self, collection: &str) -> Result<Vec<(String, Document)>> {
            self.inner.list(collection)
        }
    }

    #[test]
    fn test_writes_all_phases_with_owner_fields() {
        let mut store = MemoryStore::default();
        let summary = write(&mut store, &fast(400)).unwrap();
        assert_eq!(summary.accounts, 2);
        assert_eq!(summary.tags, 5);
        assert_eq!(summary.transactions, 3);
        assert_eq!(summary.batches, 3);

        let acc = store.get(collections::USER_ACCOUNTS, "u1:checking").unwrap().unwrap();
        assert_eq!(acc["userEmail"], "me@example.com");
        assert_eq!(acc["source"], SOURCE_CSV_UPLOAD);
        assert_eq!(acc["systemTypeId"], "asset.bank");

        let tag = store.get(collections::USER_TAGS, "u1:coffee").unwrap().unwrap();
        assert_eq!(tag["parentSlug"], "food");
        assert_eq!(tag["depth"], 2);

        let txs = store.list(collections::USER_TRANSACTIONS).unwrap();
        assert!(txs.iter().all(|(k, d)| k.starts_with("u1:") && d["userId"] == "u1"));
        assert!(txs.iter().any(|(_, d)| d["accountKey"] == "u1:checking"));
    }

    #[test]
    fn test_missing_account_has_null_account_key() {
        let csv = "Date,Description,Account,Amount\n2025-01-02,Cash tip,,-2\n2025-01-03,Coffee,Checking,-4\n";
        let p = process(&Sheet::from_matrix(parse_csv(csv, ',')), &ProcessOptions::default());
        let mut store = MemoryStore::default();
        write_processed(&mut store, &p, &mapping(&p), &owner(), &[], &fast(400), &mut |_| {})
            .unwrap();
        let txs = store.list(collections::USER_TRANSACTIONS).unwrap();
        let tip = txs.iter().find(|(_, d)| d["description"] == "Cash tip").unwrap();
        let coffee = txs.iter().find(|(_, d)| d["description"] == "Coffee").unwrap();
        assert!(tip.1["accountKey"].is_null());
        assert_eq!(coffee.1["accountKey"], "u1:checking");
    }

    #[test]
    fn test_type_symbol_falls_back_to_sign() {
        let mut store = MemoryStore::default();
        write(&mut store, &fast(400)).unwrap();
        let txs = store.list(collections::USER_TRANSACTIONS).unwrap();
        let salary = txs.iter().find(|(_, d)| d["description"] == "Salary").unwrap();
        let coffee = txs.iter().find(|(_, d)| d["description"] == "Coffee").unwrap();
        assert_eq!(salary.1["typeSymbol"], "+");
        assert_eq!(coffee.1["typeSymbol"], "-");
    }

    #[test]
    fn test_chunking() {
        let mut store = MemoryStore::default();
        let summary = write(&mut store, &fast(2)).unwrap();
        // accounts 2 -> 1, tags 5 -> 3, transactions 3 -> 2
        assert_eq!(summary.batches, 6);
        assert_eq!(store.commits, 6);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let mut store = MemoryStore::default();
        write(&mut store, &fast(400)).unwrap();
        let first = store.docs.clone();
        write(&mut store, &fast(400)).unwrap();
        assert_eq!(store.docs, first);
    }

    #[test]
    fn test_refuses_without_owner() {
        let p = processed();
        let mut store = MemoryStore::default();
        let err = write_processed(
            &mut store,
            &p,
            &mapping(&p),
            &Owner::default(),
            &[],
            &fast(400),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, PennyError::NotSignedIn));
        assert_eq!(store.commits, 0);
    }

    #[test]
    fn test_refuses_unmapped_account() {
        let p = processed();
        let mut store = MemoryStore::default();
        let err = write_processed(
            &mut store,
            &p,
            &AccountMapping::default(),
            &owner(),
            &[],
            &fast(400),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, PennyError::UnmappedAccount(_)));
        assert!(store.docs.is_empty());
    }

    #[test]
    fn test_retry_recovers() {
        let mut store = FlakyStore {
            inner: MemoryStore::default(),
            calls: 0,
            fail: |n| n == 1 || n == 2,
        };
        let summary = write(&mut store, &fast(400)).unwrap();
        assert_eq!(summary.batches, 3);
        assert_eq!(store.calls, 5);
    }

    #[test]
    fn test_large_retry_count_does_not_overflow_backoff() {
        let mut store = FlakyStore {
            inner: MemoryStore::default(),
            calls: 0,
            fail: |n| n <= 40,
        };
        let opts = WriteOptions {
            batch_retries: 40,
            ..fast(400)
        };
        let summary = write(&mut store, &opts).unwrap();
        assert_eq!(summary.batches, 3);
        assert_eq!(store.calls, 43);
    }

    #[test]
    fn test_exhausted_retries_abort_remaining_phases() {
        // accounts commit on call 1, tags fail on calls 2..=4
        let mut store = FlakyStore {
            inner: MemoryStore::default(),
            calls: 0,
            fail: |n| n >= 2,
        };
        assert!(write(&mut store, &fast(400)).is_err());
        assert_eq!(store.calls, 4);
        assert_eq!(store.inner.list(collections::USER_ACCOUNTS).unwrap().len(), 2);
        assert!(store.inner.list(collections::USER_TAGS).unwrap().is_empty());
        assert!(store.inner.list(collections::USER_TRANSACTIONS).unwrap().is_empty());
    }

    #[test]
    fn test_status_messages() {
        let p = processed();
        let mut store = MemoryStore::default();
        let mut seen = Vec::new();
        write_processed(
            &mut store,
            &p,
            &mapping(&p),
            &owner(),
            &[],
            &fast(400),
            &mut |m| seen.push(m.to_string()),
        )
        .unwrap();
        assert_eq!(seen.first().map(String::as_str), Some("Writing accounts..."));
        assert_eq!(seen.last().map(String::as_str), Some("Done."));
    }

    #[test]
    fn test_import_record_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, CSV).unwrap();
        let sum = file_checksum(&path).unwrap();
        assert_eq!(sum.len(), 64);

        let mut store = MemoryStore::default();
        assert!(previous_import(&store, &owner(), &sum).unwrap().is_none());
        record_import(&mut store, &owner(), "a.csv", &sum, &processed().counts).unwrap();
        let doc = previous_import(&store, &owner(), &sum).unwrap().unwrap();
        assert_eq!(doc["fileName"], "a.csv");
        assert_eq!(doc["counts"]["transactions"], 3);
    }
}
