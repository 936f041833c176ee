//! Maintenance pass: decay idle deltas, archive the weak ones, and keep the
//! active set within capacity.
//!
//! Planning (`ArchivalPolicy::apply`) is pure; `run` commits the plan with
//! the archive written before the active set, so a record is never only
//! removed. If the active save fails after the archive write, the archived
//! ids are taken back out.

use crate::config::{ArchivalConfig, DecayFunction};
use crate::delta::{ArchiveReason, Delta};
use crate::error::Result;
use crate::store::{ranked_for_eviction, ArchiveRepository, DeltaRepository};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Decayed {
    pub id: String,
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Archived {
    pub id: String,
    pub confidence: f64,
    pub reason: ArchiveReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchivalOutcome {
    pub active_before: usize,
    pub active_after: usize,
    pub decayed: Vec<Decayed>,
    pub archived: Vec<Archived>,
    pub dry_run: bool,
    #[serde(skip)]
    pub evicted: Vec<Delta>,
}

impl ArchivalOutcome {
    pub fn is_noop(&self) -> bool {
        self.decayed.is_empty() && self.evicted.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

pub struct ArchivalPolicy<'a> {
    cfg: &'a ArchivalConfig,
}

impl<'a> ArchivalPolicy<'a> {
    pub fn new(cfg: &'a ArchivalConfig) -> Self {
        Self { cfg }
    }

    fn window(&self) -> Duration {
        Duration::days(i64::from(self.cfg.stale_days.max(1)))
    }

    /// Confidence lost to idleness as of `now`, and the new decay anchor.
    pub fn decay_for(&self, delta: &Delta, now: DateTime<Utc>) -> Option<(f64, DateTime<Utc>)> {
        let window = self.window();
        let anchor = delta.last_decayed.map_or(delta.last_used, |d| d.max(delta.last_used));
        match self.cfg.decay {
            DecayFunction::None => None,
            DecayFunction::Step { amount } => {
                let steps = (now - anchor).num_seconds() / window.num_seconds();
                if steps <= 0 {
                    return None;
                }
                let steps_i32 = i32::try_from(steps).unwrap_or(i32::MAX);
                Some((amount * steps as f64, anchor + window * steps_i32))
            }
            DecayFunction::Linear { per_day } => {
                let start = delta
                    .last_decayed
                    .map_or(delta.last_used + window, |d| d.max(delta.last_used + window));
                if now <= start {
                    return None;
                }
                let days = (now - start).num_seconds() as f64 / 86_400.0;
                Some((per_day * days, now))
            }
        }
    }

    /// Decay (optional), then floor eviction, then capacity eviction.
    /// Evicted deltas are removed from `deltas` and returned marked archived.
    pub fn apply(&self, deltas: &mut Vec<Delta>, now: DateTime<Utc>, decay: bool) -> ArchivalOutcome {
        let active_before = deltas.len();
        let mut decayed = Vec::new();

        if decay {
            for d in deltas.iter_mut() {
                if let Some((loss, anchor)) = self.decay_for(d, now) {
                    let from = d.confidence;
                    d.set_confidence(from - loss);
                    d.last_decayed = Some(anchor);
                    tracing::debug!(id = %d.id, from, to = d.confidence, "decayed idle pattern");
                    decayed.push(Decayed {
                        id: d.id.clone(),
                        from,
                        to: d.confidence,
                    });
                }
            }
        }

        let mut evicted = Vec::new();

        let (below, kept): (Vec<Delta>, Vec<Delta>) = std::mem::take(deltas)
            .into_iter()
            .partition(|d| d.confidence < self.cfg.floor);
        *deltas = kept;
        for mut d in below {
            d.mark_archived(ArchiveReason::BelowFloor, now);
            evicted.push(d);
        }

        if deltas.len() > self.cfg.max_deltas {
            let excess = deltas.len() - self.cfg.max_deltas;
            let victims: HashSet<String> = ranked_for_eviction(deltas)
                .into_iter()
                .take(excess)
                .map(|d| d.id.clone())
                .collect();
            let (out, kept): (Vec<Delta>, Vec<Delta>) = std::mem::take(deltas)
                .into_iter()
                .partition(|d| victims.contains(&d.id));
            *deltas = kept;
            for mut d in out {
                d.mark_archived(ArchiveReason::Capacity, now);
                evicted.push(d);
            }
        }

        let archived = evicted
            .iter()
            .map(|d| Archived {
                id: d.id.clone(),
                confidence: d.confidence,
                reason: d.archive_reason.unwrap_or(ArchiveReason::Capacity),
            })
            .collect();

        ArchivalOutcome {
            active_before,
            active_after: deltas.len(),
            decayed,
            archived,
            dry_run: false,
            evicted,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Write `evicted` to the archive, then `active` to the store. Callers must
/// hold the store lock.
pub(crate) fn commit<R, A>(store: &R, archive: &A, active: &[Delta], evicted: &[Delta]) -> Result<()>
where
    R: DeltaRepository,
    A: ArchiveRepository,
{
    if !evicted.is_empty() {
        archive.append(evicted)?;
    }
    if let Err(e) = store.save_all(active) {
        if !evicted.is_empty() {
            let ids: Vec<String> = evicted.iter().map(|d| d.id.clone()).collect();
            if let Err(rollback) = archive.remove(&ids) {
                tracing::warn!(error = %rollback, ?ids, "could not undo archive write; records are in both stores");
            }
        }
        return Err(e);
    }
    Ok(())
}

/// Run the full maintenance pass against the store.
pub fn run<R, A>(
    store: &R,
    archive: &A,
    cfg: &ArchivalConfig,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<ArchivalOutcome>
where
    R: DeltaRepository,
    A: ArchiveRepository,
{
    let _lock = store.lock()?;
    let mut deltas = store.load_checked()?;
    let mut outcome = ArchivalPolicy::new(cfg).apply(&mut deltas, now, true);
    outcome.dry_run = dry_run;

    if dry_run || outcome.is_noop() {
        return Ok(outcome);
    }

    commit(store, archive, &deltas, &outcome.evicted)?;
    tracing::info!(
        decayed = outcome.decayed.len(),
        archived = outcome.archived.len(),
        active = outcome.active_after,
        "archival pass committed"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::delta::tests::{at, delta};
    use crate::error::PlaybookError;
    use crate::store::{JsonArchive, JsonDeltaStore, StoreLock};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// In-memory repositories with switchable write failures.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub deltas: RefCell<Vec<Delta>>,
        pub fail_save: bool,
    }

    impl DeltaRepository for MemoryStore {
        fn load_all(&self) -> Vec<Delta> {
            self.deltas.borrow().clone()
        }
        fn load_checked(&self) -> Result<Vec<Delta>> {
            Ok(self.load_all())
        }
        fn save_all(&self, deltas: &[Delta]) -> Result<()> {
            if self.fail_save {
                return Err(std::io::Error::other("disk full").into());
            }
            *self.deltas.borrow_mut() = deltas.to_vec();
            Ok(())
        }
        fn lock(&self) -> Result<StoreLock> {
            Ok(StoreLock::unguarded())
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryArchive {
        pub records: RefCell<Vec<Delta>>,
        pub fail_append: bool,
    }

    impl ArchiveRepository for MemoryArchive {
        fn append(&self, deltas: &[Delta]) -> Result<()> {
            if self.fail_append {
                return Err(std::io::Error::other("archive unwritable").into());
            }
            self.records.borrow_mut().extend(deltas.iter().cloned());
            Ok(())
        }
        fn remove(&self, ids: &[String]) -> Result<()> {
            self.records.borrow_mut().retain(|d| !ids.contains(&d.id));
            Ok(())
        }
        fn load_all(&self) -> Vec<Delta> {
            self.records.borrow().clone()
        }
    }

    fn cfg(max: usize) -> ArchivalConfig {
        ArchivalConfig {
            max_deltas: max,
            ..ArchivalConfig::default()
        }
    }

    fn ids(deltas: &[Delta]) -> Vec<&str> {
        deltas.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn capacity_is_enforced() {
        let mut deltas: Vec<Delta> = (0..55)
            .map(|i| delta(&format!("d{i}"), 0.3 + (i as f64) / 100.0))
            .collect();
        let c = cfg(50);
        let outcome = ArchivalPolicy::new(&c).apply(&mut deltas, at(1), false);
        assert_eq!(deltas.len(), 50);
        assert_eq!(outcome.evicted.len(), 5);
        assert_eq!(ids(&outcome.evicted), ["d0", "d1", "d2", "d3", "d4"]);
        assert!(outcome
            .evicted
            .iter()
            .all(|d| d.archived && d.archive_reason == Some(ArchiveReason::Capacity)));
    }

    #[test]
    fn evicts_lowest_confidence_first() {
        let mut deltas = vec![
            delta("a", 0.9),
            delta("b", 0.3),
            delta("c", 0.3),
            delta("d", 0.95),
        ];
        let c = cfg(2);
        let outcome = ArchivalPolicy::new(&c).apply(&mut deltas, at(1), false);
        let mut evicted = ids(&outcome.evicted);
        evicted.sort();
        assert_eq!(evicted, ["b", "c"]);
        assert_eq!(ids(&deltas), ["a", "d"]);
    }

    #[test]
    fn ties_evict_oldest_first() {
        let mut newer = delta("newer", 0.3);
        newer.first_seen = at(10);
        let mut older = delta("older", 0.3);
        older.first_seen = at(2);
        let mut deltas = vec![delta("a", 0.9), newer, older, delta("d", 0.95)];
        let c = cfg(3);
        let outcome = ArchivalPolicy::new(&c).apply(&mut deltas, at(11), false);
        assert_eq!(ids(&outcome.evicted), ["older"]);
    }

    #[test]
    fn below_floor_is_archived_regardless_of_capacity() {
        let mut deltas = vec![delta("weak", 0.15), delta("edge", 0.2), delta("ok", 0.7)];
        let c = cfg(50);
        let outcome = ArchivalPolicy::new(&c).apply(&mut deltas, at(1), false);
        assert_eq!(ids(&outcome.evicted), ["weak"]);
        assert_eq!(outcome.archived[0].reason, ArchiveReason::BelowFloor);
        assert_eq!(ids(&deltas), ["edge", "ok"]);
    }

    #[test]
    fn step_decay_once_per_idle_window() {
        let c = cfg(50);
        let policy = ArchivalPolicy::new(&c);
        let mut deltas = vec![delta("idle", 0.5)];

        // 29 days idle: nothing.
        let outcome = policy.apply(&mut deltas, at(29), true);
        assert!(outcome.decayed.is_empty());

        // 31 days idle: one step.
        let outcome = policy.apply(&mut deltas, at(31), true);
        assert_eq!(outcome.decayed.len(), 1);
        assert_eq!(deltas[0].confidence, 0.4);
        assert_eq!(deltas[0].last_decayed, Some(at(30)));

        // Running again the same day doesn't double count.
        let outcome = policy.apply(&mut deltas, at(31), true);
        assert!(outcome.decayed.is_empty());

        // Another full window later: one more step.
        policy.apply(&mut deltas, at(61), true);
        assert_eq!(deltas[0].confidence, 0.3);
    }

    #[test]
    fn use_resets_decay_anchor() {
        let c = cfg(50);
        let policy = ArchivalPolicy::new(&c);
        let mut d = delta("d", 0.5);
        d.last_decayed = Some(at(30));
        d.last_used = at(50);
        assert!(policy.decay_for(&d, at(70)).is_none());
        assert!(policy.decay_for(&d, at(81)).is_some());
    }

    #[test]
    fn linear_decay_counts_days_past_window() {
        let c = ArchivalConfig {
            decay: DecayFunction::Linear { per_day: 0.01 },
            ..ArchivalConfig::default()
        };
        let policy = ArchivalPolicy::new(&c);
        let mut deltas = vec![delta("idle", 0.5)];
        policy.apply(&mut deltas, at(40), true);
        assert_eq!(deltas[0].confidence, 0.4);
        policy.apply(&mut deltas, at(45), true);
        assert_eq!(deltas[0].confidence, 0.35);
    }

    #[test]
    fn decay_none_leaves_confidence() {
        let c = ArchivalConfig {
            decay: DecayFunction::None,
            ..ArchivalConfig::default()
        };
        let mut deltas = vec![delta("idle", 0.5)];
        let outcome = ArchivalPolicy::new(&c).apply(&mut deltas, at(400), true);
        assert!(outcome.decayed.is_empty());
        assert_eq!(deltas[0].confidence, 0.5);
    }

    #[test]
    fn decay_can_push_below_floor() {
        let c = cfg(50);
        let mut deltas = vec![delta("fading", 0.25)];
        let outcome = ArchivalPolicy::new(&c).apply(&mut deltas, at(31), true);
        assert_eq!(outcome.decayed.len(), 1);
        assert_eq!(ids(&outcome.evicted), ["fading"]);
        assert!(deltas.is_empty());
    }

    #[test]
    fn run_moves_records_between_stores() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        let archive = JsonArchive::open(dir.path());
        store
            .save_all(&[delta("weak", 0.1), delta("strong", 0.9)])
            .unwrap();
        let outcome = run(&store, &archive, &cfg(50), at(1), false).unwrap();
        assert_eq!(outcome.active_after, 1);
        assert_eq!(ids(&store.load_all()), ["strong"]);
        let archived = archive.load_all();
        assert_eq!(ids(&archived), ["weak"]);
        assert!(archived[0].archived);
    }

    #[test]
    fn dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        let archive = JsonArchive::open(dir.path());
        store.save_all(&[delta("weak", 0.1)]).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();
        let outcome = run(&store, &archive, &cfg(50), at(1), true).unwrap();
        assert!(outcome.dry_run);
        assert_eq!(outcome.archived.len(), 1);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
        assert!(archive.load_all().is_empty());
    }

    #[test]
    fn archive_failure_keeps_record_active() {
        let store = MemoryStore::default();
        store.deltas.borrow_mut().push(delta("weak", 0.1));
        let archive = MemoryArchive {
            fail_append: true,
            ..MemoryArchive::default()
        };
        let err = run(&store, &archive, &cfg(50), at(1), false).unwrap_err();
        assert!(matches!(err, PlaybookError::Io(_)));
        assert_eq!(ids(&store.load_all()), ["weak"]);
        assert!(!store.load_all()[0].archived);
    }

    #[test]
    fn save_failure_rolls_back_archive() {
        let store = MemoryStore {
            fail_save: true,
            ..MemoryStore::default()
        };
        store.deltas.borrow_mut().push(delta("weak", 0.1));
        let archive = MemoryArchive::default();
        assert!(run(&store, &archive, &cfg(50), at(1), false).is_err());
        assert!(archive.load_all().is_empty());
        assert_eq!(ids(&store.load_all()), ["weak"]);
    }
}
