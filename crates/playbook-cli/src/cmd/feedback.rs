use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use playbook_core::confidence::{self, FeedbackKind};
use playbook_core::config::Config;
use playbook_core::event::EventLog;
use playbook_core::store::JsonDeltaStore;
use std::path::Path;

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct FeedbackKindFlag {
    /// The pattern helped
    #[arg(long)]
    boost: bool,

    /// The pattern did not help
    #[arg(long)]
    penalize: bool,
}

impl From<FeedbackKindFlag> for FeedbackKind {
    fn from(flag: FeedbackKindFlag) -> Self {
        if flag.penalize {
            FeedbackKind::Penalize
        } else {
            FeedbackKind::Boost
        }
    }
}

pub fn run(
    root: &Path,
    id: &str,
    kind: FeedbackKind,
    human: bool,
    json: bool,
) -> anyhow::Result<()> {
    super::ensure_initialized(root)?;
    let config = Config::load(root).context("failed to load config")?;
    let store = JsonDeltaStore::open(root);
    let events = EventLog::open(root);

    let result = confidence::apply_feedback(
        &store,
        &events,
        id,
        kind,
        human,
        &config.confidence,
        chrono::Utc::now(),
    )?;

    if json {
        return print_json(&result);
    }

    let verb = match kind {
        FeedbackKind::Boost => "Boosted",
        FeedbackKind::Penalize => "Penalized",
    };
    let who = if human { " (human)" } else { "" };
    println!(
        "{verb} {id}{who}: {:.2} -> {:.2}",
        result.previous, result.confidence
    );
    Ok(())
}
