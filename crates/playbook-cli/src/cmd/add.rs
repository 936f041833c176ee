use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use playbook_core::config::Config;
use playbook_core::delta::{Category, Source};
use playbook_core::learn::{self, NewDelta};
use playbook_core::store::{JsonArchive, JsonDeltaStore};
use std::path::Path;

#[derive(Args)]
pub struct AddArgs {
    /// Situation the pattern applies to (e.g. "when running /commit")
    #[arg(long)]
    condition: String,

    /// What went wrong
    #[arg(long)]
    problem: String,

    /// What to do instead
    #[arg(long)]
    content: String,

    /// Category tag
    #[arg(long, default_value = "general")]
    category: Category,

    /// Skill the pattern belongs to (default: derived from the condition)
    #[arg(long)]
    skill: Option<String>,

    /// Authored deliberately; starts at a higher confidence
    #[arg(long)]
    explicit: bool,

    /// Use this id instead of generating one
    #[arg(long)]
    id: Option<String>,
}

pub fn run(root: &Path, args: AddArgs, json: bool) -> anyhow::Result<()> {
    super::ensure_initialized(root)?;
    let config = Config::load(root).context("failed to load config")?;
    let store = JsonDeltaStore::open(root);
    let archive = JsonArchive::open(root);

    let new = NewDelta {
        id: args.id,
        category: args.category,
        skill: args.skill,
        condition: args.condition,
        problem: args.problem,
        content: args.content,
        source: if args.explicit {
            Source::Explicit
        } else {
            Source::Implicit
        },
    };
    let outcome = learn::add(&store, &archive, new, &config, chrono::Utc::now())?;

    if json {
        return print_json(&outcome);
    }

    println!(
        "Added {} [{}] at {}%",
        outcome.delta.id,
        outcome.delta.category,
        outcome.delta.percent()
    );
    for a in &outcome.archived {
        println!("  archived {} ({}, {:.2})", a.id, a.reason, a.confidence);
    }
    Ok(())
}
