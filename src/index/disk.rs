//! Index persistence
//!
//! Each generation is written as `index-<fingerprint>.json` under the
//! configured directory, wrapped with a format version. Files are
//! written to a temp name and renamed so a crash never leaves a
//! half-written generation where the loader would find it. A corrupt or
//! version-mismatched file is ignored with a warning, never an error:
//! the index just rebuilds from scratch.

use crate::index::IndexGeneration;
use crate::models::Fingerprint;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    generation: IndexGeneration,
}

fn generation_path(dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    dir.join(format!("index-{}.json", fingerprint))
}

pub fn save(dir: &Path, generation: &IndexGeneration) -> Result<()> {
    fs::create_dir_all(dir)?;

    let persisted = PersistedIndex {
        version: FORMAT_VERSION,
        generation: generation.clone(),
    };
    let json = serde_json::to_vec(&persisted)?;

    let final_path = generation_path(dir, &generation.fingerprint);
    let tmp_path = final_path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Load the persisted generation for a fingerprint, if one exists and
/// is readable.
pub fn load(dir: &Path, fingerprint: &Fingerprint) -> Option<IndexGeneration> {
    let path = generation_path(dir, fingerprint);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read persisted index");
            return None;
        }
    };

    let persisted: PersistedIndex = match serde_json::from_slice(&bytes) {
        Ok(persisted) => persisted,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persisted index is corrupt, ignoring");
            return None;
        }
    };

    if persisted.version != FORMAT_VERSION {
        warn!(
            path = %path.display(),
            found = persisted.version,
            expected = FORMAT_VERSION,
            "persisted index has unknown format version, ignoring"
        );
        return None;
    }

    if persisted.generation.fingerprint != *fingerprint {
        warn!(path = %path.display(), "persisted index fingerprint does not match its filename, ignoring");
        return None;
    }

    Some(persisted.generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use crate::models::TransactionRecord;
    use chrono::Utc;

    fn generation() -> IndexGeneration {
        IndexGeneration {
            fingerprint: Fingerprint("abc123".to_string()),
            dimensions: 4,
            entries: vec![IndexEntry {
                record: TransactionRecord {
                    id: 0,
                    date: "2025-01-15".parse().unwrap(),
                    time: None,
                    merchant: "Prisma Kuopio".to_string(),
                    amount: 30.50,
                    adjusted_amount: 30.50,
                    category: "Groceries".to_string(),
                    subcategory: "Food".to_string(),
                    notes: String::new(),
                },
                vector: vec![0.1, 0.2, 0.3, 0.4],
            }],
            built_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation();
        save(dir.path(), &generation).unwrap();

        let loaded = load(dir.path(), &generation.fingerprint).unwrap();
        assert_eq!(loaded.fingerprint, generation.fingerprint);
        assert_eq!(loaded.dimensions, 4);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].record.merchant, "Prisma Kuopio");
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path(), &Fingerprint("missing".to_string())).is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let fingerprint = Fingerprint("abc123".to_string());
        std::fs::write(generation_path(dir.path(), &fingerprint), b"not json at all").unwrap();
        assert!(load(dir.path(), &fingerprint).is_none());
    }

    #[test]
    fn test_load_rejects_mismatched_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation();
        save(dir.path(), &generation).unwrap();

        // rename the file so its name claims a different fingerprint
        let other = Fingerprint("other".to_string());
        std::fs::rename(
            generation_path(dir.path(), &generation.fingerprint),
            generation_path(dir.path(), &other),
        )
        .unwrap();
        assert!(load(dir.path(), &other).is_none());
    }
}
