//! Feedback-driven confidence updates.

use crate::config::ConfidenceConfig;
use crate::delta::Delta;
use crate::error::{PlaybookError, Result};
use crate::event::{Event, EventLog, Outcome};
use crate::store::DeltaRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Boost,
    Penalize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackResult {
    pub id: String,
    pub kind: FeedbackKind,
    pub human: bool,
    pub previous: f64,
    pub confidence: f64,
}

/// Signed change one feedback event makes, before clamping.
pub fn step_for(kind: FeedbackKind, human: bool, cfg: &ConfidenceConfig) -> f64 {
    let weight = if human { cfg.human_weight } else { 1.0 };
    match kind {
        FeedbackKind::Boost => cfg.boost_step * weight,
        FeedbackKind::Penalize => -cfg.penalize_step * weight,
    }
}

/// Apply one feedback signal to a delta in memory.
pub fn adjust(
    delta: &mut Delta,
    kind: FeedbackKind,
    human: bool,
    cfg: &ConfidenceConfig,
    now: DateTime<Utc>,
) {
    delta.set_confidence(delta.confidence + step_for(kind, human, cfg));
    match kind {
        FeedbackKind::Boost => delta.helpful_count += 1,
        FeedbackKind::Penalize => delta.not_helpful_count += 1,
    }
    if human {
        delta.human_feedback_count += 1;
    }
    delta.last_used = now;
}

/// Locked read-modify-write of one delta's confidence, followed by an event
/// log entry. Unknown ids fail with `DeltaNotFound` and change nothing.
pub fn apply_feedback<R: DeltaRepository>(
    store: &R,
    events: &EventLog,
    id: &str,
    kind: FeedbackKind,
    human: bool,
    cfg: &ConfidenceConfig,
    now: DateTime<Utc>,
) -> Result<FeedbackResult> {
    let result = store.update(|deltas| {
        let delta = deltas
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| PlaybookError::DeltaNotFound(id.to_string()))?;
        let previous = delta.confidence;
        adjust(delta, kind, human, cfg, now);
        Ok(FeedbackResult {
            id: id.to_string(),
            kind,
            human,
            previous,
            confidence: delta.confidence,
        })
    })?;

    let outcome = match (kind, human) {
        (FeedbackKind::Boost, true) => Outcome::HumanConfirmed,
        (FeedbackKind::Boost, false) => Outcome::Helpful,
        (FeedbackKind::Penalize, _) => Outcome::NotHelpful,
    };
    let event = Event {
        timestamp: now,
        delta_id: id.to_string(),
        outcome,
        human,
    };
    if let Err(e) = events.append(&event) {
        // The confidence change is already committed; a lost log line only
        // affects reporting.
        tracing::warn!(id, error = %e, "failed to append feedback event");
    }

    tracing::info!(
        id,
        ?kind,
        human,
        from = result.previous,
        to = result.confidence,
        "applied feedback"
    );
    Ok(result)
}

/// Record that deltas were surfaced to the assistant. Returns the ids that
/// were not found.
pub fn mark_used<R: DeltaRepository>(
    store: &R,
    ids: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    store.update(|deltas| {
        let mut missing = Vec::new();
        for id in ids {
            match deltas.iter_mut().find(|d| &d.id == id) {
                Some(d) => d.last_used = now,
                None => missing.push(id.clone()),
            }
        }
        Ok(missing)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::tests::{at, delta};
    use crate::store::JsonDeltaStore;
    use tempfile::TempDir;

    fn cfg() -> ConfidenceConfig {
        ConfidenceConfig::default()
    }

    #[test]
    fn inferred_boost_adds_one_step() {
        let mut d = delta("d1", 0.5);
        adjust(&mut d, FeedbackKind::Boost, false, &cfg(), at(1));
        assert_eq!(d.confidence, 0.6);
        assert_eq!(d.helpful_count, 1);
        assert_eq!(d.human_feedback_count, 0);
        assert_eq!(d.last_used, at(1));
    }

    #[test]
    fn human_boost_is_three_steps() {
        let mut d = delta("d1", 0.5);
        adjust(&mut d, FeedbackKind::Boost, true, &cfg(), at(1));
        assert_eq!(d.confidence, 0.8);
        assert_eq!(d.helpful_count, 1);
        assert_eq!(d.human_feedback_count, 1);
    }

    #[test]
    fn human_penalty_is_three_steps() {
        let mut d = delta("d1", 0.9);
        adjust(&mut d, FeedbackKind::Penalize, true, &cfg(), at(1));
        assert_eq!(d.confidence, 0.45);
        assert_eq!(d.not_helpful_count, 1);
        assert_eq!(d.human_feedback_count, 1);
    }

    #[test]
    fn confidence_stays_in_bounds_for_any_sequence() {
        let kinds = [FeedbackKind::Boost, FeedbackKind::Penalize];
        let mut d = delta("d1", 0.4);
        // Deterministic pseudo-random walk over kind and human flag.
        let mut seed: u32 = 7;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let kind = kinds[(seed >> 16) as usize % 2];
            let human = (seed >> 8) % 3 == 0;
            adjust(&mut d, kind, human, &cfg(), at(1));
            assert!((0.0..=1.0).contains(&d.confidence), "{}", d.confidence);
        }
    }

    #[test]
    fn clamps_at_both_ends() {
        let mut high = delta("h", 0.95);
        adjust(&mut high, FeedbackKind::Boost, true, &cfg(), at(1));
        assert_eq!(high.confidence, 1.0);

        let mut low = delta("l", 0.1);
        adjust(&mut low, FeedbackKind::Penalize, false, &cfg(), at(1));
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn apply_feedback_persists_and_logs() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("d1", 0.4)]).unwrap();
        let events = EventLog::open(dir.path());

        for _ in 0..2 {
            apply_feedback(&store, &events, "d1", FeedbackKind::Boost, false, &cfg(), at(2)).unwrap();
        }
        let d = &store.load_all()[0];
        assert_eq!(d.confidence, 0.6);
        assert_eq!(d.helpful_count, 2);

        let logged = events.read_all();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|e| e.outcome == Outcome::Helpful));
    }

    #[test]
    fn unknown_id_is_not_found_and_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("d1", 0.4)]).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();
        let events = EventLog::open(dir.path());

        let err = apply_feedback(&store, &events, "nope", FeedbackKind::Boost, true, &cfg(), at(2))
            .unwrap_err();
        assert!(matches!(err, PlaybookError::DeltaNotFound(ref id) if id == "nope"));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
        assert!(events.read_all().is_empty());
    }

    #[test]
    fn human_boost_logs_human_confirmed() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("d1", 0.4)]).unwrap();
        let events = EventLog::open(dir.path());
        apply_feedback(&store, &events, "d1", FeedbackKind::Boost, true, &cfg(), at(2)).unwrap();
        let logged = events.read_all();
        assert_eq!(logged[0].outcome, Outcome::HumanConfirmed);
        assert!(logged[0].human);
    }

    #[test]
    fn concurrent_feedback_loses_no_updates() {
        const THREADS: u32 = 8;
        const BOOSTS: u32 = 10;

        let dir = TempDir::new().unwrap();
        JsonDeltaStore::open(dir.path())
            .save_all(&[delta("d1", 0.4)])
            .unwrap();

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let store = JsonDeltaStore::open(dir.path());
                    let events = EventLog::open(dir.path());
                    for _ in 0..BOOSTS {
                        apply_feedback(&store, &events, "d1", FeedbackKind::Boost, false, &cfg(), at(2))
                            .unwrap();
                    }
                });
            }
        });

        let d = &JsonDeltaStore::open(dir.path()).load_all()[0];
        assert_eq!(d.helpful_count, THREADS * BOOSTS);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(EventLog::open(dir.path()).read_all().len(), (THREADS * BOOSTS) as usize);
    }

    #[test]
    fn mark_used_reports_missing() {
        let dir = TempDir::new().unwrap();
        let store = JsonDeltaStore::open(dir.path());
        store.save_all(&[delta("d1", 0.4)]).unwrap();
        let missing =
            mark_used(&store, &["d1".to_string(), "zz".to_string()], at(9)).unwrap();
        assert_eq!(missing, ["zz"]);
        assert_eq!(store.load_all()[0].last_used, at(9));
    }
}
