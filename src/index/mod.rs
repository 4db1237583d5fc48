//! Vector index over transaction snapshots
//!
//! The index is a sequence of immutable generations, each keyed by the
//! content fingerprint of the snapshot it was built from. Readers hold
//! an `Arc` to a generation and are never blocked by a rebuild; the
//! swap to a new generation is a single pointer write under a brief
//! write lock. Rebuilds are single-flight: a build lock is held across
//! the whole embedding pass, and late arrivals for an already-active
//! fingerprint return the active generation untouched.

pub mod disk;

use crate::config::FreshnessMode;
use crate::error::EngineError;
use crate::models::{Fingerprint, RetrievalResult, RetrievedRecord, TransactionRecord};
use crate::provider::EmbeddingProvider;
use crate::store::TableSnapshot;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// One embedded row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub record: TransactionRecord,
    pub vector: Vec<f32>,
}

/// An immutable, fully-built snapshot of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexGeneration {
    pub fingerprint: Fingerprint,
    pub dimensions: usize,
    pub entries: Vec<IndexEntry>,
    pub built_at: DateTime<Utc>,
}

impl IndexGeneration {
    /// Exact top-k cosine search. Ties on score resolve toward the
    /// lower record id so results are reproducible.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedRecord>> {
        if query.len() != self.dimensions {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut scored: Vec<RetrievedRecord> = self
            .entries
            .iter()
            .map(|entry| RetrievedRecord {
                record: entry.record.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Freshness verdict for the active generation against a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Serve the active generation but kick off a background rebuild.
    StaleServe,
    /// Rebuild before answering.
    StaleRebuild,
    /// No generation exists yet.
    Unavailable,
}

/// Cheap cloneable handle; clones share generations and the build lock,
/// which lets background rebuild tasks outlive the query that spawned
/// them.
#[derive(Clone)]
pub struct VectorIndex {
    inner: Arc<Inner>,
}

struct Inner {
    embedder: Arc<dyn EmbeddingProvider>,
    active: RwLock<Option<Arc<IndexGeneration>>>,
    build_lock: Mutex<()>,
    index_dir: Option<PathBuf>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                embedder,
                active: RwLock::new(None),
                build_lock: Mutex::new(()),
                index_dir,
            }),
        }
    }

    pub async fn active(&self) -> Option<Arc<IndexGeneration>> {
        self.inner.active.read().await.clone()
    }

    /// Restore a persisted generation matching the snapshot, if any.
    pub async fn load_persisted(&self, snapshot: &TableSnapshot) -> bool {
        let Some(dir) = &self.inner.index_dir else {
            return false;
        };
        match disk::load(dir, &snapshot.fingerprint) {
            Some(generation) if generation.dimensions == self.inner.embedder.dimensions() => {
                info!(fingerprint = %generation.fingerprint, "restored index generation from disk");
                *self.inner.active.write().await = Some(Arc::new(generation));
                true
            }
            Some(generation) => {
                warn!(
                    found = generation.dimensions,
                    expected = self.inner.embedder.dimensions(),
                    "persisted index has wrong dimensions, ignoring"
                );
                false
            }
            None => false,
        }
    }

    /// Compare the active generation against a snapshot fingerprint,
    /// with the freshness mode deciding how staleness is handled.
    pub async fn check_freshness(&self, snapshot: &TableSnapshot, mode: FreshnessMode) -> Freshness {
        match self.active().await {
            None => Freshness::Unavailable,
            Some(generation) if generation.fingerprint == snapshot.fingerprint => Freshness::Fresh,
            Some(_) => match mode {
                FreshnessMode::Strict => Freshness::StaleRebuild,
                FreshnessMode::Eventual => Freshness::StaleServe,
            },
        }
    }

    /// Build a generation for the snapshot and swap it in. Single
    /// flight: concurrent callers for the same fingerprint coalesce on
    /// the build lock and the late ones get the already-swapped result.
    pub async fn rebuild(&self, snapshot: &TableSnapshot) -> Result<Arc<IndexGeneration>> {
        let inner = &self.inner;
        let _guard = inner.build_lock.lock().await;

        // another caller may have finished this exact build already
        if let Some(active) = inner.active.read().await.clone() {
            if active.fingerprint == snapshot.fingerprint {
                return Ok(active);
            }
        }

        info!(
            fingerprint = %snapshot.fingerprint,
            rows = snapshot.records.len(),
            "rebuilding vector index"
        );

        let texts: Vec<String> = snapshot.records.iter().map(|r| r.source_text()).collect();
        let vectors = inner.embedder.embed_batch(&texts).await?;

        let dimensions = inner.embedder.dimensions();
        for vector in &vectors {
            if vector.len() != dimensions {
                return Err(EngineError::DimensionMismatch {
                    expected: dimensions,
                    got: vector.len(),
                });
            }
        }

        let entries = snapshot
            .records
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(record, vector)| IndexEntry { record, vector })
            .collect();

        let generation = Arc::new(IndexGeneration {
            fingerprint: snapshot.fingerprint.clone(),
            dimensions,
            entries,
            built_at: Utc::now(),
        });

        if let Some(dir) = &inner.index_dir {
            if let Err(e) = disk::save(dir, &generation) {
                warn!(error = %e, "failed to persist index generation");
            }
        }

        *inner.active.write().await = Some(generation.clone());
        info!(fingerprint = %generation.fingerprint, "index generation swapped in");
        Ok(generation)
    }

    /// Detached background rebuild. The task outlives the query that
    /// triggered it, so cancellation of that query does not abort the
    /// build.
    pub fn rebuild_in_background(&self, snapshot: TableSnapshot) {
        let index = self.clone();
        tokio::spawn(async move {
            if let Err(e) = index.rebuild(&snapshot).await {
                warn!(error = %e, "background index rebuild failed");
            }
        });
    }

    /// Answer a semantic query against the snapshot under the given
    /// freshness mode.
    pub async fn search(
        &self,
        snapshot: &TableSnapshot,
        query_text: &str,
        top_k: usize,
        mode: FreshnessMode,
    ) -> Result<RetrievalResult> {
        let (generation, possibly_stale) = match self.check_freshness(snapshot, mode).await {
            Freshness::Fresh => (
                self.active().await.ok_or_else(|| {
                    EngineError::IndexUnavailable("generation vanished during query".to_string())
                })?,
                false,
            ),
            Freshness::StaleRebuild => (self.rebuild(snapshot).await?, false),
            Freshness::StaleServe => {
                self.rebuild_in_background(snapshot.clone());
                let generation = self.active().await.ok_or_else(|| {
                    EngineError::IndexUnavailable("generation vanished during query".to_string())
                })?;
                (generation, true)
            }
            Freshness::Unavailable => match mode {
                FreshnessMode::Strict => (self.rebuild(snapshot).await?, false),
                FreshnessMode::Eventual => {
                    self.rebuild_in_background(snapshot.clone());
                    return Err(EngineError::IndexUnavailable(
                        "no index generation built yet".to_string(),
                    ));
                }
            },
        };

        let query_vector = self.inner.embedder.embed(query_text).await?;
        let hits = generation.search(&query_vector, top_k)?;
        Ok(RetrievalResult {
            hits,
            possibly_stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::HashEmbeddingProvider;
    use crate::store::{compute_fingerprint, InMemoryTransactionStore, TransactionStore};

    fn record(id: u64, date: &str, merchant: &str, amount: f64, category: &str) -> TransactionRecord {
        TransactionRecord {
            id,
            date: date.parse().unwrap(),
            time: None,
            merchant: merchant.to_string(),
            amount,
            adjusted_amount: amount,
            category: category.to_string(),
            subcategory: "General".to_string(),
            notes: String::new(),
        }
    }

    fn sample_records() -> Vec<TransactionRecord> {
        vec![
            record(0, "2025-01-01", "K-Market Vuorela", 14.93, "Groceries"),
            record(1, "2025-01-15", "Prisma Kuopio", 30.50, "Groceries"),
            record(2, "2025-01-22", "Netflix", 12.99, "Bills"),
            record(3, "2025-02-01", "Cursor Ai Powered Ide", 20.00, "Shopping"),
        ]
    }

    async fn snapshot_of(records: Vec<TransactionRecord>) -> TableSnapshot {
        InMemoryTransactionStore::new(records)
            .snapshot()
            .await
            .unwrap()
    }

    fn index() -> VectorIndex {
        VectorIndex::new(Arc::new(HashEmbeddingProvider::default()), None)
    }

    #[tokio::test]
    async fn test_rebuild_then_search() {
        let index = index();
        let snapshot = snapshot_of(sample_records()).await;
        index.rebuild(&snapshot).await.unwrap();

        let result = index
            .search(&snapshot, "netflix subscription", 2, FreshnessMode::Eventual)
            .await
            .unwrap();
        assert_eq!(result.hits.len(), 2);
        assert!(!result.possibly_stale);
        assert_eq!(result.hits[0].record.merchant, "Netflix");
    }

    #[tokio::test]
    async fn test_cold_index_eventual_is_unavailable() {
        let index = index();
        let snapshot = snapshot_of(sample_records()).await;
        let err = index
            .search(&snapshot, "anything", 3, FreshnessMode::Eventual)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cold_index_strict_builds_inline() {
        let index = index();
        let snapshot = snapshot_of(sample_records()).await;
        let result = index
            .search(&snapshot, "prisma groceries", 3, FreshnessMode::Strict)
            .await
            .unwrap();
        assert!(!result.possibly_stale);
        assert_eq!(result.hits.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_eventual_serves_old_generation_flagged() {
        let index = index();
        let old_snapshot = snapshot_of(sample_records()).await;
        index.rebuild(&old_snapshot).await.unwrap();

        let mut changed = sample_records();
        changed.push(record(4, "2025-02-05", "Spotify", 9.99, "Bills"));
        let new_snapshot = snapshot_of(changed).await;
        assert_ne!(old_snapshot.fingerprint, new_snapshot.fingerprint);

        let result = index
            .search(&new_snapshot, "music streaming", 5, FreshnessMode::Eventual)
            .await
            .unwrap();
        assert!(result.possibly_stale);
        // old generation has no Spotify row
        assert!(result.hits.iter().all(|h| h.record.merchant != "Spotify"));
    }

    #[tokio::test]
    async fn test_stale_strict_rebuilds_before_answering() {
        let index = index();
        let old_snapshot = snapshot_of(sample_records()).await;
        index.rebuild(&old_snapshot).await.unwrap();

        let mut changed = sample_records();
        changed.push(record(4, "2025-02-05", "Spotify", 9.99, "Bills"));
        let new_snapshot = snapshot_of(changed).await;

        let result = index
            .search(&new_snapshot, "spotify music", 1, FreshnessMode::Strict)
            .await
            .unwrap();
        assert!(!result.possibly_stale);
        assert_eq!(result.hits[0].record.merchant, "Spotify");
    }

    #[tokio::test]
    async fn test_rebuild_same_fingerprint_is_noop() {
        let index = index();
        let snapshot = snapshot_of(sample_records()).await;
        let first = index.rebuild(&snapshot).await.unwrap();
        let second = index.rebuild(&snapshot).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_rebuilds_coalesce() {
        let index = index();
        let snapshot = snapshot_of(sample_records()).await;
        let (a, b) = tokio::join!(index.rebuild(&snapshot), index.rebuild(&snapshot));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let records = sample_records();
        let fingerprint = compute_fingerprint(&records, Utc::now());
        let generation = IndexGeneration {
            fingerprint,
            dimensions: 64,
            entries: vec![],
            built_at: Utc::now(),
        };
        let err = generation.search(&[0.5; 16], 3).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch { expected: 64, got: 16 }
        ));
    }

    #[tokio::test]
    async fn test_search_ties_break_on_record_id() {
        let records = vec![
            record(0, "2025-01-01", "Same Shop", 10.0, "Groceries"),
            record(1, "2025-01-01", "Same Shop", 10.0, "Groceries"),
        ];
        let snapshot = snapshot_of(records).await;
        let index = index();
        index.rebuild(&snapshot).await.unwrap();
        let result = index
            .search(&snapshot, "same shop", 2, FreshnessMode::Eventual)
            .await
            .unwrap();
        assert_eq!(result.hits[0].record.id, 0);
        assert_eq!(result.hits[1].record.id, 1);
    }
}
