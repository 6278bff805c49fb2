// src/ops/init.rs

//! Repository initialization

use super::ReviewContext;
use crate::dataset::{DEDUPE_DIR, SEARCH_DIR, STATE_DIR};
use crate::record::RecordSet;
use crate::settings::{SETTINGS_FILE, Settings};
use crate::{Error, Result};
use std::path::Path;
use tracing::info;

/// Create the directory skeleton, default settings and an empty record set
pub fn init(root: &Path, title: &str) -> Result<ReviewContext> {
    if root.join(SETTINGS_FILE).exists() {
        return Err(Error::Settings(format!(
            "{} is already initialized",
            root.display()
        )));
    }
    for dir in [SEARCH_DIR, DEDUPE_DIR, STATE_DIR] {
        std::fs::create_dir_all(root.join(dir))?;
    }

    let mut ctx = ReviewContext::with_settings(root, Settings::new(title), false);
    ctx.save_settings()?;
    ctx.save_records(&mut RecordSet::new())?;
    ctx.commit("Initial commit")?;

    info!(root = %root.display(), title, "review repository initialized");
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RECORDS_FILE;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_skeleton() {
        let dir = TempDir::new().unwrap();
        let ctx = init(dir.path(), "Platform review").unwrap();

        assert!(dir.path().join(SETTINGS_FILE).is_file());
        assert!(dir.path().join(RECORDS_FILE).is_file());
        assert!(dir.path().join(SEARCH_DIR).is_dir());
        assert_eq!(ctx.dataset.changelog().history().unwrap().len(), 1);

        let reopened = ReviewContext::open(dir.path(), false).unwrap();
        assert_eq!(reopened.settings.project.title, "Platform review");
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), "A").unwrap();
        assert!(matches!(init(dir.path(), "B"), Err(Error::Settings(_))));
    }
}
