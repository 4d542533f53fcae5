use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{BareError, Result};

pub fn is_safe_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Maps an arbitrary label or remote spec onto a single path component.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn ensure_base_dir(path: &Path) -> Result<()> {
    if path.exists() {
        let meta = fs::metadata(path)
            .map_err(|e| BareError::message(format!("stat {}: {}", path.display(), e)))?;
        if !meta.is_dir() {
            return Err(BareError::message(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| BareError::message(format!("create {}: {}", path.display(), e)))
}

/// Creates `path` with mode 0700 unless it already exists as a directory.
/// Returns whether the directory was created by this call.
pub fn create_private_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(BareError::message(format!(
                "{} exists and is not a directory",
                path.display()
            )));
        }
        return Ok(false);
    }
    fs::create_dir(path)
        .map_err(|e| BareError::message(format!("create {}: {}", path.display(), e)))?;
    let mut perms = fs::metadata(path)
        .map_err(|e| BareError::message(format!("stat {}: {}", path.display(), e)))?
        .permissions();
    perms.set_mode(0o700);
    fs::set_permissions(path, perms)
        .map_err(|e| BareError::message(format!("chmod {}: {}", path.display(), e)))?;
    Ok(true)
}

pub fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("MY DRIVE"), "MY_DRIVE");
        assert_eq!(sanitize_component("gdrive:backups/laptop"), "gdrive_backups_laptop");
        assert_eq!(sanitize_component(".."), "_");
    }

    #[test]
    fn create_private_dir_reports_creation_once() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("bare.vol-x");
        assert!(create_private_dir(&target).expect("create"));
        assert!(!create_private_dir(&target).expect("exists"));
        let mode = fs::metadata(&target).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn create_private_dir_rejects_file() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("file");
        fs::write(&target, b"x").expect("write");
        assert!(create_private_dir(&target).is_err());
    }
}
