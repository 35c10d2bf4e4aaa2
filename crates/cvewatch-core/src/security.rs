use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use crate::{errors::Error, Result};

// ============== Path Validation ==============

/// Resolve `raw` against `base` and make sure the result stays inside `base`.
///
/// Purely lexical: no filesystem access happens here, so a configured path
/// like `../../etc/passwd` is rejected before anything is opened.
pub fn resolve_within(base: &Path, raw: &Path) -> Result<PathBuf> {
    if raw.as_os_str().is_empty() {
        return Err(Error::InvalidPath {
            path: raw.to_path_buf(),
            reason: "empty path".to_string(),
        });
    }

    let base = absolute(base)?;
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base.join(raw)
    };
    let resolved = normalize_path(&joined);

    if resolved == base || !resolved.starts_with(&base) {
        return Err(Error::InvalidPath {
            path: raw.to_path_buf(),
            reason: format!("resolves outside {}", base.display()),
        });
    }

    Ok(resolved)
}

/// Filesystem-level counterpart of [`resolve_within`].
///
/// Follows symlinks for whatever part of `path` exists and rejects it if the
/// real location leaves the real `base`. Missing paths pass; there is
/// nothing to follow yet.
pub fn ensure_no_symlink_escape(base: &Path, path: &Path) -> Result<()> {
    let Ok(real_path) = fs::canonicalize(path) else {
        // Dangling symlinks would be written through, so they count as escapes.
        if fs::symlink_metadata(path).is_ok_and(|md| md.file_type().is_symlink()) {
            return Err(Error::Security(format!(
                "{} is a dangling symlink",
                path.display()
            )));
        }
        return Ok(());
    };
    let real_base = fs::canonicalize(base).unwrap_or_else(|_| normalize_path(base));

    if !real_path.starts_with(&real_base) {
        return Err(Error::Security(format!(
            "{} escapes {} via symlink",
            path.display(),
            base.display()
        )));
    }
    Ok(())
}

pub(crate) fn absolute(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(normalize_path(p));
    }
    let cwd = std::env::current_dir().map_err(Error::Io)?;
    Ok(normalize_path(&cwd.join(p)))
}

fn normalize_path(p: &Path) -> PathBuf {
    // Remove `.` and process `..` without consulting the FS.
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
