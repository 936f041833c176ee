use crate::output::print_json;
use playbook_core::confidence;
use playbook_core::store::JsonDeltaStore;
use std::path::Path;

pub fn run(root: &Path, ids: &[String], json: bool) -> anyhow::Result<()> {
    super::ensure_initialized(root)?;
    let store = JsonDeltaStore::open(root);
    let missing = confidence::mark_used(&store, ids, chrono::Utc::now())?;
    let touched: Vec<&String> = ids.iter().filter(|id| !missing.contains(*id)).collect();

    if json {
        print_json(&serde_json::json!({
            "touched": touched,
            "missing": missing,
        }))?;
    } else {
        for id in &touched {
            println!("Touched {id}");
        }
        for id in &missing {
            eprintln!("warning: pattern not found: {id}");
        }
    }

    if touched.is_empty() {
        anyhow::bail!("none of the given patterns exist");
    }
    Ok(())
}
