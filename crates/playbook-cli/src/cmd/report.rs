use crate::output::{clip, print_json, print_table};
use playbook_core::config::Config;
use playbook_core::event::EventLog;
use playbook_core::report::Report;
use playbook_core::store::{ArchiveRepository, DeltaRepository, JsonArchive, JsonDeltaStore};
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root);
    let deltas = JsonDeltaStore::open(root).load_all();
    let archived = JsonArchive::open(root).load_all().len();
    let events = EventLog::open(root).read_all();

    let report = Report::build(
        &deltas,
        archived,
        &events,
        config.archival.max_deltas,
        config.report.top_n,
    );

    if json {
        return print_json(&report);
    }
    print_console(&report);
    Ok(())
}

fn print_console(report: &Report) {
    println!("Playbook report");
    println!(
        "  Active patterns:  {}/{} ({:.1}% of capacity)",
        report.active, report.max_deltas, report.capacity_pct
    );
    println!("  Archived:         {}", report.archived);
    println!("  Avg confidence:   {:.2}", report.avg_confidence);
    println!(
        "  Feedback:         {} helpful, {} not helpful, {} human",
        report.helpful, report.not_helpful, report.human_feedback
    );

    let ev = &report.events;
    let last = ev
        .last_event
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "  Events:           {} total ({} helpful, {} not helpful, {} human-confirmed), last {last}",
        ev.total, ev.helpful, ev.not_helpful, ev.human_confirmed
    );

    if report.top.is_empty() {
        println!();
        println!("No active patterns.");
        return;
    }

    println!();
    println!("Top patterns:");
    let rows = report
        .top
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                format!("{}%", t.percent),
                t.skill.clone(),
                format!("+{}/-{}", t.helpful_count, t.not_helpful_count),
                clip(&t.condition, 48),
            ]
        })
        .collect();
    print_table(&["ID", "CONF", "SKILL", "FEEDBACK", "CONDITION"], rows);

    print_breakdown("By skill:", &report.by_skill);
    print_breakdown("By category:", &report.by_category);
}

fn print_breakdown(title: &str, counts: &BTreeMap<String, usize>) {
    println!();
    println!("{title}");
    for (name, count) in counts {
        println!("  {name:<20} {count}");
    }
}
