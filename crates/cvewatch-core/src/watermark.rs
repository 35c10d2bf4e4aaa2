//! Durable single-value store for the last delivered record id.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{security, Result};

#[derive(Clone, Debug)]
pub struct WatermarkStore {
    base_dir: PathBuf,
    path: PathBuf,
}

impl WatermarkStore {
    /// Bind the store to `file` inside `base_dir`.
    ///
    /// Rejects paths that leave `base_dir`. Touches nothing on disk.
    pub fn open(base_dir: &Path, file: &Path) -> Result<Self> {
        let path = security::resolve_within(base_dir, file)?;
        let base_dir = security::absolute(base_dir)?;
        Ok(Self { base_dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved id, or `None` when nothing was ever saved.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        security::ensure_no_symlink_escape(&self.base_dir, &self.path)?;

        let txt = fs::read_to_string(&self.path)?;
        let id = txt.trim();
        if id.is_empty() {
            return Ok(None);
        }
        Ok(Some(id.to_string()))
    }

    pub fn save(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        security::ensure_no_symlink_escape(&self.base_dir, &self.path)?;
        fs::write(&self.path, id.trim())?;
        Ok(())
    }
}
