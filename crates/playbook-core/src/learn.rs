//! Entry point for new deltas produced by the learning process.

use crate::archival::{self, ArchivalPolicy, Archived};
use crate::config::Config;
use crate::delta::{Category, Delta, Source};
use crate::error::{PlaybookError, Result};
use crate::paths;
use crate::store::{ArchiveRepository, DeltaRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct NewDelta {
    pub id: Option<String>,
    pub category: Category,
    pub skill: Option<String>,
    pub condition: String,
    pub problem: String,
    pub content: String,
    pub source: Source,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub delta: Delta,
    /// Deltas pushed out to keep the active set within capacity.
    pub archived: Vec<Archived>,
}

pub fn generate_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("d-{}", &hex[..8])
}

/// Insert a delta at its source's initial confidence, then enforce the
/// floor and capacity rules in the same locked operation.
pub fn add<R, A>(
    store: &R,
    archive: &A,
    new: NewDelta,
    cfg: &Config,
    now: DateTime<Utc>,
) -> Result<AddOutcome>
where
    R: DeltaRepository,
    A: ArchiveRepository,
{
    let id = match new.id {
        Some(id) => {
            paths::validate_id(&id)?;
            id
        }
        None => generate_id(),
    };
    if new.condition.trim().is_empty() {
        return Err(PlaybookError::InvalidDelta(format!("{id}: condition is empty")));
    }

    let _lock = store.lock()?;
    let mut deltas = store.load_checked()?;
    if deltas.iter().any(|d| d.id == id) || archive.contains(&id) {
        return Err(PlaybookError::DeltaExists(id));
    }

    let initial = match new.source {
        Source::Explicit => cfg.confidence.explicit_initial,
        Source::Implicit => cfg.confidence.implicit_initial,
    };
    let mut delta = Delta {
        id: id.clone(),
        category: new.category,
        skill: new.skill.filter(|s| !s.trim().is_empty()),
        condition: new.condition,
        problem: new.problem,
        content: new.content,
        confidence: 0.0,
        source: new.source,
        helpful_count: 0,
        not_helpful_count: 0,
        human_feedback_count: 0,
        first_seen: now,
        last_used: now,
        last_decayed: None,
        archived: false,
        archived_at: None,
        archive_reason: None,
    };
    delta.set_confidence(initial);
    deltas.push(delta.clone());

    let outcome = ArchivalPolicy::new(&cfg.archival).apply(&mut deltas, now, false);
    archival::commit(store, archive, &deltas, &outcome.evicted)?;

    tracing::info!(id = %id, confidence = delta.confidence, evicted = outcome.archived.len(), "added delta");
    Ok(AddOutcome {
        delta,
        archived: outcome.archived,
    })
}
