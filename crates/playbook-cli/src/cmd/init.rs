use crate::output::print_json;
use anyhow::Context;
use playbook_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let archive_dir = paths::archive_dir(root);
    std::fs::create_dir_all(&archive_dir)
        .with_context(|| format!("failed to create {}", archive_dir.display()))?;

    let mut created = Vec::new();
    let mut existing = Vec::new();

    if paths::config_path(root).exists() {
        existing.push(paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        created.push(paths::CONFIG_FILE);
    }

    let wrote = io::write_if_missing(&paths::deltas_path(root), b"[]\n")
        .context("failed to write deltas.json")?;
    if wrote {
        created.push(paths::DELTAS_FILE);
    } else {
        existing.push(paths::DELTAS_FILE);
    }

    if json {
        return print_json(&serde_json::json!({
            "root": root,
            "created": created,
            "existing": existing,
        }));
    }

    println!("Initializing playbook in: {}", root.display());
    for path in &created {
        println!("  created: {path}");
    }
    for path in &existing {
        println!("  exists:  {path}");
    }
    Ok(())
}
