//! Transaction store access
//!
//! The store owns the transaction table; the engine only reads
//! snapshots. A snapshot pairs the ordered records with a content
//! fingerprint so callers can make index-freshness decisions without
//! rescanning the table.

use crate::models::{Fingerprint, TransactionRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Immutable view of the transaction table at one point in time.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub records: Arc<Vec<TransactionRecord>>,
    pub fingerprint: Fingerprint,
}

impl TableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read accessor the engine depends on.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    /// Current ordered sequence of records plus its content fingerprint.
    async fn snapshot(&self) -> Result<TableSnapshot>;
}

/// In-memory store backed by a replaceable record vector.
///
/// The snapshot fingerprint covers row count, last-modified stamp, and
/// full row content, so any table change is observable in O(1)
/// comparisons downstream.
pub struct InMemoryTransactionStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    records: Arc<Vec<TransactionRecord>>,
    last_modified: DateTime<Utc>,
    fingerprint: Fingerprint,
}

impl InMemoryTransactionStore {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        let last_modified = Utc::now();
        let fingerprint = compute_fingerprint(&records, last_modified);
        Self {
            inner: RwLock::new(StoreInner {
                records: Arc::new(records),
                last_modified,
                fingerprint,
            }),
        }
    }

    /// Replace the whole table, bumping the fingerprint.
    pub async fn replace(&self, records: Vec<TransactionRecord>) {
        let mut inner = self.inner.write().await;
        inner.last_modified = Utc::now();
        inner.fingerprint = compute_fingerprint(&records, inner.last_modified);
        inner.records = Arc::new(records);
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn snapshot(&self) -> Result<TableSnapshot> {
        let inner = self.inner.read().await;
        Ok(TableSnapshot {
            records: Arc::clone(&inner.records),
            fingerprint: inner.fingerprint.clone(),
        })
    }
}

/// Compute a SHA256 content fingerprint over row count, last-modified
/// stamp, and row content. Streams JSON directly into the hasher, no
/// intermediate String.
pub fn compute_fingerprint(
    records: &[TransactionRecord],
    last_modified: DateTime<Utc>,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(records.len().to_le_bytes());
    hasher.update(last_modified.timestamp_micros().to_le_bytes());

    for record in records {
        if serde_json::to_writer(&mut HashWriter(&mut hasher), record).is_err() {
            // Serialization of plain data types cannot fail in practice;
            // fall through and let the count/stamp carry the fingerprint.
            break;
        }
    }

    Fingerprint(hex::encode(hasher.finalize()))
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Small built-in dataset used by the demo binaries when no real data
/// source is wired up.
pub fn demo_records() -> Vec<TransactionRecord> {
    let rows: [(&str, &str, f64, &str, &str); 12] = [
        ("2025-01-02", "K-Market Vuorela", 14.93, "Groceries", "Food"),
        ("2025-01-05", "Netflix", 12.99, "Bills", "Streaming"),
        ("2025-01-08", "Prisma Kuopio", 30.50, "Groceries", "Food"),
        ("2025-01-12", "HSL Mobiili", 3.20, "Transport", "Public Transport"),
        ("2025-01-15", "Spotify", 11.99, "Bills", "Streaming"),
        ("2025-01-20", "Prisma Tampereentie", 15.00, "Groceries", "Food"),
        ("2025-01-25", "Verkkokauppa.com", 249.00, "Shopping", "Electronics"),
        ("2025-02-01", "Cursor Ai Powered Ide", 20.00, "Shopping", "Software"),
        ("2025-02-05", "Netflix", 12.99, "Bills", "Streaming"),
        ("2025-02-09", "K-Market Vuorela", 22.47, "Groceries", "Food"),
        ("2025-02-14", "Ravintola Musta Lammas", 89.00, "Dining", "Restaurant"),
        ("2025-02-15", "Spotify", 11.99, "Bills", "Streaming"),
    ];

    rows.iter()
        .enumerate()
        .map(|(id, (date, merchant, amount, category, subcategory))| TransactionRecord {
            id: id as u64,
            date: date.parse().unwrap_or_default(),
            time: None,
            merchant: merchant.to_string(),
            amount: *amount,
            adjusted_amount: *amount,
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            notes: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionRecord;

    fn record(id: u64, merchant: &str, amount: f64) -> TransactionRecord {
        TransactionRecord {
            id,
            date: "2025-01-15".parse().unwrap(),
            time: None,
            merchant: merchant.to_string(),
            amount,
            adjusted_amount: amount,
            category: "Groceries".to_string(),
            subcategory: "General".to_string(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_returns_fingerprint() {
        let store = InMemoryTransactionStore::new(vec![record(0, "Prisma", 12.5)]);
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.records.len(), 1);
        assert!(!snap.fingerprint.0.is_empty());
    }

    #[tokio::test]
    async fn test_replace_changes_fingerprint() {
        let store = InMemoryTransactionStore::new(vec![record(0, "Prisma", 12.5)]);
        let before = store.snapshot().await.unwrap().fingerprint;

        store.replace(vec![record(0, "Prisma", 12.5), record(1, "Alepa", 3.9)]).await;
        let after = store.snapshot().await.unwrap().fingerprint;

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_without_writes() {
        let store = InMemoryTransactionStore::new(vec![record(0, "Prisma", 12.5)]);
        let a = store.snapshot().await.unwrap().fingerprint;
        let b = store.snapshot().await.unwrap().fingerprint;
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_covers_content() {
        let stamp = Utc::now();
        let a = compute_fingerprint(&[record(0, "Prisma", 12.5)], stamp);
        let b = compute_fingerprint(&[record(0, "Prisma", 99.0)], stamp);
        assert_ne!(a, b);
    }
}
