use crate::error::{PlaybookError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLAYBOOK_DIR: &str = ".playbook";
pub const ARCHIVE_DIR: &str = ".playbook/archive";

pub const CONFIG_FILE: &str = ".playbook/config.yaml";
pub const DELTAS_FILE: &str = ".playbook/deltas.json";
pub const LOCK_FILE: &str = ".playbook/deltas.lock";
pub const EVENTS_FILE: &str = ".playbook/events.jsonl";

pub const DEFAULT_TARGET_DOCUMENT: &str = "CLAUDE.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn playbook_dir(root: &Path) -> PathBuf {
    root.join(PLAYBOOK_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn deltas_path(root: &Path) -> PathBuf {
    root.join(DELTAS_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

pub fn events_path(root: &Path) -> PathBuf {
    root.join(EVENTS_FILE)
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join(ARCHIVE_DIR)
}

/// Monthly archive partition, e.g. `.playbook/archive/2026-10.json`.
pub fn archive_month_path(root: &Path, month: &str) -> PathBuf {
    archive_dir(root).join(format!("{month}.json"))
}

/// Resolve the target document; relative paths are taken from the project root.
pub fn target_path(root: &Path, target: &str) -> PathBuf {
    let p = Path::new(target);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

// ---------------------------------------------------------------------------
// Id validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,63}$").unwrap())
}

pub fn validate_id(id: &str) -> Result<()> {
    if !id_re().is_match(id) {
        return Err(PlaybookError::InvalidId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
