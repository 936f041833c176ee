pub mod add;
pub mod archive;
pub mod check;
pub mod config;
pub mod feedback;
pub mod init;
pub mod list;
pub mod report;
pub mod sync;
pub mod touch;

use playbook_core::{paths, PlaybookError};
use std::path::Path;

/// Commands that write to the store refuse to run before `playbook init`.
pub(crate) fn ensure_initialized(root: &Path) -> anyhow::Result<()> {
    if !paths::playbook_dir(root).is_dir() {
        return Err(PlaybookError::NotInitialized.into());
    }
    Ok(())
}
