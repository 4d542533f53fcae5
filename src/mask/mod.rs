//! Path masking: backing up a real directory under a different, virtual path.
//!
//! A [`MaskBackend`] knows how to bind one real path to one mask path. The
//! [`MaskAdapter`] applies a batch of bindings all-or-nothing and tears them
//! down idempotently.

pub mod native;
pub mod proot;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{BareError, ConfigError, MaskError};
use crate::types::{MaskBackendKind, RunMode};

pub use native::NativeBackend;
pub use proot::ProotBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskBinding {
    pub real: PathBuf,
    pub mask: PathBuf,
    pub backend: MaskBackendKind,
    /// Paths the backend created to make `mask` bindable, outermost first.
    pub created: Vec<PathBuf>,
}

pub trait MaskBackend {
    fn kind(&self) -> MaskBackendKind;
    fn bind(&self, real: &Path, mask: &Path) -> Result<(), MaskError>;
    /// Must succeed without side effects when `mask` is not bound.
    fn unbind(&self, mask: &Path) -> Result<(), MaskError>;
    /// Arguments placed in front of the backup tool's command line while the
    /// bindings are active.
    fn command_prefix(&self, _bindings: &[MaskBinding]) -> Vec<String> {
        Vec::new()
    }
    fn created_paths(&self, _mask: &Path) -> Vec<PathBuf> {
        Vec::new()
    }
}

pub fn backend_for(kind: MaskBackendKind, run_mode: RunMode) -> Box<dyn MaskBackend> {
    match kind {
        MaskBackendKind::Proot => Box::new(ProotBackend::new()),
        MaskBackendKind::Native => Box::new(NativeBackend::with_run_mode(run_mode)),
    }
}

pub fn validate_masks(sources: &[PathBuf], masks: &[PathBuf]) -> Result<(), ConfigError> {
    if !masks.is_empty() && masks.len() != sources.len() {
        return Err(ConfigError::MaskArityMismatch {
            sources: sources.len(),
            masks: masks.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct MaskSet {
    sources: Vec<PathBuf>,
    bindings: Vec<MaskBinding>,
    prefix: Vec<String>,
}

impl MaskSet {
    pub fn passthrough(sources: &[PathBuf]) -> Self {
        Self {
            sources: sources.to_vec(),
            bindings: Vec::new(),
            prefix: Vec::new(),
        }
    }

    pub fn bindings(&self) -> &[MaskBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Paths the backup tool should be pointed at.
    pub fn effective_sources(&self) -> Vec<PathBuf> {
        if self.bindings.is_empty() {
            return self.sources.clone();
        }
        self.bindings.iter().map(|b| b.mask.clone()).collect()
    }

    pub fn command_prefix(&self) -> &[String] {
        &self.prefix
    }
}

pub struct MaskAdapter<'a> {
    backend: &'a dyn MaskBackend,
}

impl<'a> MaskAdapter<'a> {
    pub fn new(backend: &'a dyn MaskBackend) -> Self {
        Self { backend }
    }

    /// Binds every `(source, mask)` pair. If one binding fails the ones already
    /// applied in this batch are unbound, newest first, before returning.
    pub fn apply_masks(&self, sources: &[PathBuf], masks: &[PathBuf]) -> Result<MaskSet, BareError> {
        validate_masks(sources, masks)?;
        if masks.is_empty() {
            return Ok(MaskSet::passthrough(sources));
        }

        let mut applied: Vec<MaskBinding> = Vec::with_capacity(masks.len());
        for (real, mask) in sources.iter().zip(masks) {
            if let Err(err) = self.backend.bind(real, mask) {
                self.rollback(&applied);
                return Err(err.into());
            }
            debug!(real = %real.display(), mask = %mask.display(), backend = self.backend.kind().as_str(), "mask bound");
            applied.push(MaskBinding {
                real: real.clone(),
                mask: mask.clone(),
                backend: self.backend.kind(),
                created: self.backend.created_paths(mask),
            });
        }
        let prefix = self.backend.command_prefix(&applied);
        Ok(MaskSet {
            sources: sources.to_vec(),
            bindings: applied,
            prefix,
        })
    }

    fn rollback(&self, applied: &[MaskBinding]) {
        for binding in applied.iter().rev() {
            if let Err(err) = self.backend.unbind(&binding.mask) {
                warn!(mask = %binding.mask.display(), error = %err, "rollback of mask failed");
            }
        }
    }

    /// Unbinds everything in `set`, newest first. The set is emptied, so a
    /// second call does nothing. Failures are collected, not fatal.
    pub fn remove_masks(&self, set: &mut MaskSet) -> Vec<MaskError> {
        let bindings = std::mem::take(&mut set.bindings);
        set.prefix.clear();
        let mut errors = Vec::new();
        for binding in bindings.iter().rev() {
            match self.backend.unbind(&binding.mask) {
                Ok(()) => debug!(mask = %binding.mask.display(), "mask removed"),
                Err(err) => {
                    warn!(mask = %binding.mask.display(), error = %err, "mask removal failed");
                    errors.push(err);
                }
            }
        }
        errors
    }
}
