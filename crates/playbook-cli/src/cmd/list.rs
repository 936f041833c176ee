use crate::output::{clip, print_json, print_table};
use playbook_core::delta::Delta;
use playbook_core::store::{self, ArchiveRepository, DeltaRepository, JsonArchive, JsonDeltaStore};
use std::path::Path;

pub fn run(root: &Path, archived: bool, json: bool) -> anyhow::Result<()> {
    if archived {
        list_archived(root, json)
    } else {
        list_active(root, json)
    }
}

fn list_active(root: &Path, json: bool) -> anyhow::Result<()> {
    let deltas = JsonDeltaStore::open(root).load_all();
    let ranked = store::ranked_for_display(&deltas);

    if json {
        return print_json(&ranked);
    }
    if ranked.is_empty() {
        println!("No active patterns.");
        return Ok(());
    }

    let rows = ranked
        .iter()
        .map(|d| {
            vec![
                d.id.clone(),
                format!("{}%", d.percent()),
                d.category.to_string(),
                d.skill_label(),
                format!("+{}/-{}", d.helpful_count, d.not_helpful_count),
                d.last_used.format("%Y-%m-%d").to_string(),
                clip(&d.condition, 48),
            ]
        })
        .collect();
    print_table(
        &["ID", "CONF", "CATEGORY", "SKILL", "FEEDBACK", "LAST USED", "CONDITION"],
        rows,
    );
    Ok(())
}

fn list_archived(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut deltas: Vec<Delta> = JsonArchive::open(root).load_all();
    deltas.sort_by(|a, b| b.archived_at.cmp(&a.archived_at).then_with(|| a.id.cmp(&b.id)));

    if json {
        return print_json(&deltas);
    }
    if deltas.is_empty() {
        println!("No archived patterns.");
        return Ok(());
    }

    let rows = deltas
        .iter()
        .map(|d| {
            vec![
                d.id.clone(),
                format!("{}%", d.percent()),
                d.archive_reason.map(|r| r.to_string()).unwrap_or_default(),
                d.archived_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                clip(&d.condition, 48),
            ]
        })
        .collect();
    print_table(&["ID", "CONF", "REASON", "ARCHIVED", "CONDITION"], rows);
    Ok(())
}
