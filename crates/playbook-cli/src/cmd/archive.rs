use crate::output::print_json;
use anyhow::Context;
use playbook_core::archival;
use playbook_core::config::Config;
use playbook_core::store::{JsonArchive, JsonDeltaStore};
use std::path::Path;

pub fn run(root: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    super::ensure_initialized(root)?;
    let config = Config::load(root).context("failed to load config")?;
    let store = JsonDeltaStore::open(root);
    let archive = JsonArchive::open(root);

    let outcome = archival::run(
        &store,
        &archive,
        &config.archival,
        chrono::Utc::now(),
        dry_run,
    )?;

    if json {
        return print_json(&outcome);
    }

    let prefix = if dry_run { "[dry-run] " } else { "" };
    if outcome.is_noop() {
        println!(
            "{prefix}Nothing to do: {} active of {} max.",
            outcome.active_after, config.archival.max_deltas
        );
        return Ok(());
    }
    for d in &outcome.decayed {
        println!("{prefix}decayed  {}: {:.2} -> {:.2}", d.id, d.from, d.to);
    }
    for a in &outcome.archived {
        println!("{prefix}archived {} ({}, {:.2})", a.id, a.reason, a.confidence);
    }
    println!(
        "{prefix}Active patterns: {} -> {}",
        outcome.active_before, outcome.active_after
    );
    Ok(())
}
