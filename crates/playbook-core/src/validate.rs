//! Parity check between the delta store and the target document's section.

use crate::config::SyncConfig;
use crate::error::{PlaybookError, Result};
use crate::io;
use crate::store::DeltaRepository;
use crate::sync;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub expected: usize,
    pub found: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub last_synced: Option<NaiveDate>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("expected {}, found {}", self.expected, self.found)
    }
}

/// Compare the active deltas with what the target document lists.
///
/// Mismatches are reported in the returned value; only I/O failures are
/// returned as errors.
pub fn validate<R: DeltaRepository>(
    store: &R,
    target: &Path,
    cfg: &SyncConfig,
    today: NaiveDate,
) -> Result<ValidationReport> {
    let deltas = store.load_all();
    let mut report = ValidationReport {
        expected: deltas.len(),
        found: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
        last_synced: None,
    };

    let Some(doc) = io::read_optional(target)? else {
        if report.expected > 0 {
            report
                .errors
                .push(format!("target document not found: {}", target.display()));
        }
        return Ok(report);
    };

    let parsed = match sync::parse_section(&doc, target) {
        Ok(parsed) => parsed,
        Err(e @ PlaybookError::MalformedSection { .. }) => {
            report.errors.push(e.to_string());
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    let Some(section) = parsed else {
        if report.expected > 0 {
            report.errors.push(format!(
                "pattern section markers not found in {}",
                target.display()
            ));
            report.errors.push(report.summary());
        }
        return Ok(report);
    };

    report.last_synced = section.last_synced;

    // With nothing active, sync leaves the document alone, so lines left over
    // from an earlier sync are not counted against parity.
    if report.expected == 0 {
        if !section.entries.is_empty() {
            report.warnings.push(format!(
                "section still lists {} pattern(s) but none are active; run `playbook sync --remove`",
                section.entries.len()
            ));
        }
        return Ok(report);
    }

    report.found = section.entries.len();

    if report.found != report.expected {
        report.errors.push(report.summary());
    }

    let active: HashMap<&str, u32> = deltas.iter().map(|d| (d.id.as_str(), d.percent())).collect();
    let mut seen = BTreeSet::new();
    for entry in &section.entries {
        if !seen.insert(entry.id.as_str()) {
            report.errors.push(format!("duplicate in target: {}", entry.id));
            continue;
        }
        match active.get(entry.id.as_str()) {
            None => report.errors.push(format!("orphan in target: {}", entry.id)),
            Some(&pct) if pct != entry.percent => report.warnings.push(format!(
                "confidence changed for {}: target shows {}%, store has {}%",
                entry.id, entry.percent, pct
            )),
            Some(_) => {}
        }
    }
    let mut missing: Vec<&str> = active
        .keys()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();
    missing.sort_unstable();
    for id in missing {
        report.errors.push(format!("missing from target: {id}"));
    }

    match (section.last_synced, section.unparsed_date.as_deref()) {
        (Some(date), _) => {
            let age = (today - date).num_days();
            if age > cfg.stale_sync_days {
                report.warnings.push(format!(
                    "last sync was {age} days ago ({date}); run `playbook sync`"
                ));
            }
        }
        (None, Some(raw)) => report
            .warnings
            .push(format!("could not parse last-synced date '{raw}'")),
        (None, None) => report
            .warnings
            .push("section has no last-synced date".to_string()),
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
