use super::sync::{finish_validation, today};
use anyhow::Context;
use playbook_core::config::Config;
use playbook_core::store::JsonDeltaStore;
use playbook_core::validate;
use std::path::Path;

/// Pre-commit / CI gate. Errors fail the run; warnings are printed only.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = JsonDeltaStore::open(root);
    let target = config.target_path(root);
    let report = validate::validate(&store, &target, &config.sync, today())?;
    finish_validation(&report, json)
}
