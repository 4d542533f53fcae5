use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::MaskError;
use crate::mask::MaskBackend;
use crate::mount::inspect::{mountpoint_is_mounted, read_mount_table};
use crate::mount::ops::{bind_mount, unmount_path};
use crate::types::{MaskBackendKind, RunMode};

#[derive(Debug)]
struct BoundMask {
    mask: PathBuf,
    created: Vec<PathBuf>,
}

/// Masks with kernel bind mounts: the real path is mounted over the mask
/// path for the duration of the backup. Only masks bound through this
/// instance are ever unmounted by it.
pub struct NativeBackend {
    run_mode: RunMode,
    bound: RefCell<Vec<BoundMask>>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::with_run_mode(RunMode::default())
    }

    pub fn with_run_mode(run_mode: RunMode) -> Self {
        Self {
            run_mode,
            bound: RefCell::new(Vec::new()),
        }
    }

    /// Creates every missing component of `mask`, outermost first. The leaf
    /// is a file when `real` is not a directory. Returns what was created;
    /// on failure nothing created here is left behind.
    fn prepare_target(&self, real: &Path, mask: &Path) -> Result<Vec<PathBuf>, MaskError> {
        let mut missing: Vec<&Path> = mask.ancestors().take_while(|p| !p.exists()).collect();
        missing.reverse();

        let mut created = Vec::with_capacity(missing.len());
        for path in missing {
            let result = if path == mask && !real.is_dir() {
                fs::File::create(path).map(|_| ())
            } else {
                fs::create_dir(path)
            };
            if let Err(err) = result {
                remove_created_paths(&created);
                return Err(MaskError::BindFailed {
                    real: real.to_path_buf(),
                    mask: mask.to_path_buf(),
                    reason: format!("create {}: {}", path.display(), err),
                });
            }
            created.push(path.to_path_buf());
        }
        Ok(created)
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes `paths` innermost first. Directories are only removed when empty.
pub fn remove_created_paths(paths: &[PathBuf]) {
    for path in paths.iter().rev() {
        let result = if path.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "could not remove mask target"),
        }
    }
}

impl MaskBackend for NativeBackend {
    fn kind(&self) -> MaskBackendKind {
        MaskBackendKind::Native
    }

    fn bind(&self, real: &Path, mask: &Path) -> Result<(), MaskError> {
        if !cfg!(target_os = "linux") {
            return Err(MaskError::BackendUnavailable {
                backend: "native",
                reason: "bind mounts require Linux".to_string(),
            });
        }
        if !real.exists() {
            return Err(MaskError::BindFailed {
                real: real.to_path_buf(),
                mask: mask.to_path_buf(),
                reason: "source does not exist".to_string(),
            });
        }
        let created = self.prepare_target(real, mask)?;
        if let Err(err) = bind_mount(real, mask, self.run_mode) {
            remove_created_paths(&created);
            return Err(MaskError::BindFailed {
                real: real.to_path_buf(),
                mask: mask.to_path_buf(),
                reason: err.to_string(),
            });
        }
        self.bound.borrow_mut().push(BoundMask {
            mask: mask.to_path_buf(),
            created,
        });
        Ok(())
    }

    fn unbind(&self, mask: &Path) -> Result<(), MaskError> {
        let position = self.bound.borrow().iter().position(|b| b.mask == mask);
        let Some(idx) = position else {
            debug!(mask = %mask.display(), "mask not bound here; nothing to undo");
            return Ok(());
        };
        let entries = read_mount_table().map_err(|e| MaskError::UnbindFailed {
            mask: mask.to_path_buf(),
            reason: e.to_string(),
        })?;
        if mountpoint_is_mounted(&entries, mask) {
            unmount_path(mask, self.run_mode).map_err(|e| MaskError::UnbindFailed {
                mask: mask.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let entry = self.bound.borrow_mut().remove(idx);
        remove_created_paths(&entry.created);
        Ok(())
    }

    fn created_paths(&self, mask: &Path) -> Vec<PathBuf> {
        self.bound
            .borrow()
            .iter()
            .find(|b| b.mask == mask)
            .map(|b| b.created.clone())
            .unwrap_or_default()
    }
}
