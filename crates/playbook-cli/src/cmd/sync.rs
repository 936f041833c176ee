use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use playbook_core::config::Config;
use playbook_core::store::JsonDeltaStore;
use playbook_core::sync::{self, SyncAction};
use playbook_core::validate::{self, ValidationReport};
use std::path::Path;

#[derive(Args)]
pub struct SyncArgs {
    /// Render and report changes without writing
    #[arg(long, conflicts_with_all = ["validate", "status"])]
    dry_run: bool,

    /// Check that the document matches the store; exit 1 on mismatch
    #[arg(long, conflicts_with_all = ["status", "remove"])]
    validate: bool,

    /// Show active and rendered counts and the last sync date
    #[arg(long, conflicts_with = "remove")]
    status: bool,

    /// Delete the pattern section from the document
    #[arg(long)]
    remove: bool,
}

pub fn run(root: &Path, args: SyncArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = JsonDeltaStore::open(root);
    let target = config.target_path(root);

    if args.validate {
        let report = validate::validate(&store, &target, &config.sync, today())?;
        return finish_validation(&report, json);
    }
    if args.status {
        return status(&store, &target, json);
    }
    if args.remove {
        return remove(&target, args.dry_run, json);
    }

    let outcome = sync::sync(&store, &target, &config.sync, today(), args.dry_run)?;
    if json {
        return print_json(&outcome);
    }

    let prefix = if outcome.dry_run { "[dry-run] " } else { "" };
    let name = target.display();
    match outcome.action {
        SyncAction::NoOp => println!("No active patterns; {name} left unchanged."),
        SyncAction::Unchanged => {
            println!("{name} is up to date ({} patterns).", outcome.active)
        }
        SyncAction::Created | SyncAction::Updated => {
            let verb = match (outcome.action, outcome.dry_run) {
                (SyncAction::Created, true) => "Would create",
                (SyncAction::Created, false) => "Created",
                (_, true) => "Would update",
                (_, false) => "Updated",
            };
            println!(
                "{prefix}{verb} pattern section in {name} ({} patterns).",
                outcome.active
            );
            if outcome.dry_run {
                for line in &outcome.lines {
                    println!("  {line}");
                }
            }
        }
    }
    Ok(())
}

fn status(store: &JsonDeltaStore, target: &Path, json: bool) -> anyhow::Result<()> {
    let status = sync::status(store, target)?;
    if json {
        return print_json(&status);
    }
    println!("Active patterns:   {}", status.active);
    if !status.target_exists {
        println!("Target:            {} (missing)", target.display());
        return Ok(());
    }
    println!("Target:            {}", target.display());
    if status.section_present {
        println!("Rendered patterns: {}", status.rendered);
    } else {
        println!("Rendered patterns: (no section)");
    }
    match status.last_synced {
        Some(date) => println!("Last synced:       {date}"),
        None => println!("Last synced:       never"),
    }
    Ok(())
}

fn remove(target: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let outcome = sync::remove(target, dry_run)?;
    if json {
        return print_json(&outcome);
    }
    match (outcome.removed, outcome.dry_run) {
        (false, _) => println!("No pattern section in {}.", target.display()),
        (true, true) => println!("[dry-run] Would remove pattern section from {}.", target.display()),
        (true, false) => println!("Removed pattern section from {}.", target.display()),
    }
    Ok(())
}

/// Print a validation report and turn errors into a failing exit.
pub(crate) fn finish_validation(report: &ValidationReport, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(report)?;
    } else {
        for e in &report.errors {
            println!("[error] {e}");
        }
        for w in &report.warnings {
            println!("[warning] {w}");
        }
        if report.is_valid() {
            println!("In sync: {}", report.summary());
        }
    }
    if !report.is_valid() {
        anyhow::bail!("patterns out of sync: {}", report.summary());
    }
    Ok(())
}

pub(crate) fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
