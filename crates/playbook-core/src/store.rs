//! Persistence for active and archived deltas.
//!
//! Layout:
//!   .playbook/deltas.json           active collection (JSON array)
//!   .playbook/deltas.lock           advisory lock for read-modify-write
//!   .playbook/archive/YYYY-MM.json  archived deltas, by month archived
//!
//! Business logic talks to the `DeltaRepository` / `ArchiveRepository`
//! traits so the JSON files can be swapped for another engine.

use crate::delta::Delta;
use crate::error::{PlaybookError, Result};
use crate::{io, paths};
use fs2::FileExt;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCK_RETRIES: u32 = 50;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// StoreLock
// ---------------------------------------------------------------------------

/// Exclusive hold on the delta store. Released on drop.
pub struct StoreLock {
    file: Option<File>,
}

impl StoreLock {
    /// A lock that guards nothing, for repositories without shared state.
    pub fn unguarded() -> Self {
        Self { file: None }
    }

    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        for attempt in 0..LOCK_RETRIES {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), attempt, "acquired store lock");
                    return Ok(Self { file: Some(file) });
                }
                Err(_) => std::thread::sleep(LOCK_RETRY_SLEEP),
            }
        }
        Err(PlaybookError::LockTimeout(path.to_path_buf()))
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

// ---------------------------------------------------------------------------
// DeltaRepository
// ---------------------------------------------------------------------------

pub trait DeltaRepository {
    /// Current active collection. Missing or unreadable data reads as empty.
    fn load_all(&self) -> Vec<Delta>;

    /// Like `load_all`, but corruption is an error. Writers use this so a
    /// damaged file is never silently replaced by an empty collection.
    fn load_checked(&self) -> Result<Vec<Delta>>;

    /// Replace the whole collection atomically.
    fn save_all(&self, deltas: &[Delta]) -> Result<()>;

    /// Take the exclusive read-modify-write lock.
    fn lock(&self) -> Result<StoreLock>;

    /// Locked read-modify-write. Nothing is saved if `f` fails.
    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Delta>) -> Result<T>,
        Self: Sized,
    {
        let _lock = self.lock()?;
        let mut deltas = self.load_checked()?;
        let out = f(&mut deltas)?;
        self.save_all(&deltas)?;
        Ok(out)
    }
}

pub struct JsonDeltaStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonDeltaStore {
    pub fn open(root: &Path) -> Self {
        Self {
            path: paths::deltas_path(root),
            lock_path: paths::lock_path(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeltaRepository for JsonDeltaStore {
    fn load_all(&self) -> Vec<Delta> {
        match self.load_checked() {
            Ok(deltas) => deltas,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "treating delta store as empty");
                Vec::new()
            }
        }
    }

    fn load_checked(&self) -> Result<Vec<Delta>> {
        let parsed: Option<Vec<Delta>> =
            io::read_json(&self.path).map_err(|e| match e {
                PlaybookError::Json(err) => PlaybookError::CorruptStore {
                    path: self.path.clone(),
                    reason: err.to_string(),
                },
                other => other,
            })?;
        let deltas = parsed.unwrap_or_default();
        // Ids are embedded in the rendered document and must parse back out.
        if let Some(bad) = deltas.iter().find(|d| paths::validate_id(&d.id).is_err()) {
            return Err(PlaybookError::CorruptStore {
                path: self.path.clone(),
                reason: format!("invalid delta id '{}'", bad.id),
            });
        }
        Ok(deltas)
    }

    fn save_all(&self, deltas: &[Delta]) -> Result<()> {
        io::write_json(&self.path, deltas)?;
        tracing::debug!(path = %self.path.display(), count = deltas.len(), "saved delta store");
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.lock_path)
    }
}

/// Eviction order: lowest confidence first, then oldest `first_seen`, then id.
pub fn ranked_for_eviction(deltas: &[Delta]) -> Vec<&Delta> {
    let mut ranked: Vec<&Delta> = deltas.iter().collect();
    ranked.sort_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            .then(a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

/// Display order: highest confidence first, then oldest `first_seen`, then id.
pub fn ranked_for_display(deltas: &[Delta]) -> Vec<&Delta> {
    let mut ranked: Vec<&Delta> = deltas.iter().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

// ---------------------------------------------------------------------------
// ArchiveRepository
// ---------------------------------------------------------------------------

pub trait ArchiveRepository {
    /// Add archived deltas. Ids already archived are skipped.
    fn append(&self, deltas: &[Delta]) -> Result<()>;

    /// Drop ids from the archive; used to undo an `append` whose active-side
    /// save failed.
    fn remove(&self, ids: &[String]) -> Result<()>;

    fn load_all(&self) -> Vec<Delta>;

    fn contains(&self, id: &str) -> bool {
        self.load_all().iter().any(|d| d.id == id)
    }
}

pub struct JsonArchive {
    root: PathBuf,
}

impl JsonArchive {
    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn month_files(&self) -> Vec<PathBuf> {
        let dir = paths::archive_dir(&self.root);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        files
    }

    fn load_month(path: &Path) -> Result<Vec<Delta>> {
        io::read_json::<Vec<Delta>>(path)
            .map(Option::unwrap_or_default)
            .map_err(|e| match e {
                PlaybookError::Json(err) => PlaybookError::CorruptStore {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                },
                other => other,
            })
    }

    /// Every archived delta; an unreadable partition is an error.
    pub fn load_checked(&self) -> Result<Vec<Delta>> {
        let mut all = Vec::new();
        for path in self.month_files() {
            all.extend(Self::load_month(&path)?);
        }
        Ok(all)
    }
}

impl ArchiveRepository for JsonArchive {
    fn append(&self, deltas: &[Delta]) -> Result<()> {
        let existing: HashSet<String> = self.load_checked()?.into_iter().map(|d| d.id).collect();

        let mut by_month: BTreeMap<String, Vec<&Delta>> = BTreeMap::new();
        for d in deltas.iter().filter(|d| !existing.contains(&d.id)) {
            let stamp = d.archived_at.unwrap_or(d.last_used);
            by_month
                .entry(stamp.format("%Y-%m").to_string())
                .or_default()
                .push(d);
        }

        for (month, batch) in by_month {
            let path = paths::archive_month_path(&self.root, &month);
            let mut records = Self::load_month(&path)?;
            records.extend(batch.into_iter().cloned());
            io::write_json(&path, &records)?;
            tracing::debug!(path = %path.display(), total = records.len(), "wrote archive partition");
        }
        Ok(())
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for path in self.month_files() {
            let mut records = Self::load_month(&path)?;
            let before = records.len();
            records.retain(|d| !ids.contains(d.id.as_str()));
            if records.len() != before {
                io::write_json(&path, &records)?;
            }
        }
        Ok(())
    }

    fn load_all(&self) -> Vec<Delta> {
        let mut all = Vec::new();
        for path in self.month_files() {
            match Self::load_month(&path) {
                Ok(records) => all.extend(records),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable archive partition")
                }
            }
        }
        all
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::tests::{at, delta};
    use crate::delta::ArchiveReason;
    use tempfile::TempDir;

    #[test]
    fn missing_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        assert!(store.load_all().is_empty());
        assert!(store.load_checked().unwrap().is_empty());
    }

    #[test]
    fn corrupt_store_loads_empty_but_checked_errors() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        std::fs::create_dir_all(dir.path().join(".playbook")).unwrap();
        std::fs::write(store.path(), "[{\"id\": ").unwrap();
        assert!(store.load_all().is_empty());
        assert!(matches!(
            store.load_checked(),
            Err(PlaybookError::CorruptStore { .. })
        ));
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("d1", 0.4), delta("d2", 0.8)]).unwrap();
        let loaded = store.load_all();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, "d2");
    }

    #[test]
    fn update_does_not_save_on_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("d1", 0.4)]).unwrap();
        let result: Result<()> = store.update(|deltas| {
            deltas.clear();
            Err(PlaybookError::DeltaNotFound("x".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.load_all().len(), 1);
    }

    #[test]
    fn update_refuses_corrupt_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        std::fs::create_dir_all(dir.path().join(".playbook")).unwrap();
        std::fs::write(store.path(), "garbage").unwrap();
        let result = store.update(|deltas| {
            deltas.push(delta("d1", 0.4));
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "garbage");
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        {
            let _held = store.lock().unwrap();
        }
        let _again = store.lock().unwrap();
    }

    #[test]
    fn eviction_ranking_breaks_ties_by_age() {
        let mut a = delta("a", 0.3);
        a.first_seen = at(5);
        let mut b = delta("b", 0.3);
        b.first_seen = at(1);
        let c = delta("c", 0.9);
        let deltas = vec![c, a, b];
        let ranked: Vec<&str> = ranked_for_eviction(&deltas)
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ranked, ["b", "a", "c"]);
    }

    #[test]
    fn archive_partitions_by_month_and_dedupes() {
        let dir = TempDir::new().unwrap();
        let archive = JsonArchive::open(dir.path());

        let mut jan = delta("jan", 0.1);
        jan.mark_archived(ArchiveReason::BelowFloor, at(3));
        let mut feb = delta("feb", 0.1);
        feb.mark_archived(ArchiveReason::Capacity, at(40));

        archive.append(&[jan.clone(), feb]).unwrap();
        archive.append(&[jan]).unwrap();

        assert!(dir.path().join(".playbook/archive/2026-01.json").exists());
        assert!(dir.path().join(".playbook/archive/2026-02.json").exists());
        assert_eq!(archive.load_all().len(), 2);
        assert!(archive.contains("feb"));
    }

    #[test]
    fn invalid_ids_make_the_store_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("ok", 0.4), delta("has space", 0.5)]).unwrap();
        assert!(store.load_all().is_empty());
        match store.load_checked() {
            Err(PlaybookError::CorruptStore { reason, .. }) => {
                assert!(reason.contains("has space"), "{reason}")
            }
            other => panic!("expected CorruptStore, got {other:?}"),
        }
    }

    #[test]
    fn append_refuses_damaged_partition() {
        let dir = TempDir::new().unwrap();
        let archive = JsonArchive::open(dir.path());
        let damaged = dir.path().join(".playbook/archive/2026-01.json");
        std::fs::create_dir_all(damaged.parent().unwrap()).unwrap();
        std::fs::write(&damaged, "[{\"id\": ").unwrap();

        let mut d = delta("late", 0.1);
        d.mark_archived(ArchiveReason::BelowFloor, at(40));
        assert!(matches!(
            archive.append(&[d]),
            Err(PlaybookError::CorruptStore { .. })
        ));
        assert!(!dir.path().join(".playbook/archive/2026-02.json").exists());
        assert_eq!(std::fs::read_to_string(&damaged).unwrap(), "[{\"id\": ");
    }

    #[test]
    fn archive_remove_undoes_append() {
        let dir = TempDir::new().unwrap();
        let archive = JsonArchive::open(dir.path());
        let mut d = delta("gone", 0.1);
        d.mark_archived(ArchiveReason::BelowFloor, at(3));
        archive.append(&[d]).unwrap();
        archive.remove(&["gone".to_string()]).unwrap();
        assert!(!archive.contains("gone"));
    }
}
