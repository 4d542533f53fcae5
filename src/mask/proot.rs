use std::path::{Path, PathBuf};

use crate::error::MaskError;
use crate::mask::{MaskBackend, MaskBinding};
use crate::types::MaskBackendKind;
use crate::util::command::program_available;

/// Masks by running the backup tool under `proot -b real:mask`. Nothing is
/// changed on the host, so unbinding is always a no-op.
pub struct ProotBackend {
    program: PathBuf,
}

impl ProotBackend {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("proot"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn available(&self) -> bool {
        if self.program.components().count() > 1 {
            return self.program.is_file();
        }
        program_available(&self.program.to_string_lossy())
    }
}

impl Default for ProotBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskBackend for ProotBackend {
    fn kind(&self) -> MaskBackendKind {
        MaskBackendKind::Proot
    }

    fn bind(&self, real: &Path, mask: &Path) -> Result<(), MaskError> {
        if !self.available() {
            return Err(MaskError::BackendUnavailable {
                backend: "proot",
                reason: format!("{} not found", self.program.display()),
            });
        }
        if !real.exists() {
            return Err(MaskError::BindFailed {
                real: real.to_path_buf(),
                mask: mask.to_path_buf(),
                reason: "source does not exist".to_string(),
            });
        }
        if !mask.is_absolute() {
            return Err(MaskError::BindFailed {
                real: real.to_path_buf(),
                mask: mask.to_path_buf(),
                reason: "mask path must be absolute".to_string(),
            });
        }
        Ok(())
    }

    fn unbind(&self, _mask: &Path) -> Result<(), MaskError> {
        Ok(())
    }

    fn command_prefix(&self, bindings: &[MaskBinding]) -> Vec<String> {
        let mut args = vec![self.program.to_string_lossy().to_string()];
        for binding in bindings {
            args.push("-b".to_string());
            args.push(format!("{}:{}", binding.real.display(), binding.mask.display()));
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_program_is_backend_unavailable() {
        let dir = TempDir::new().expect("tempdir");
        let backend = ProotBackend::with_program(dir.path().join("no-proot"));
        let err = backend
            .bind(dir.path(), Path::new("/masked"))
            .expect_err("unavailable");
        assert!(matches!(err, MaskError::BackendUnavailable { .. }));
    }

    #[test]
    fn prefix_lists_every_binding() {
        let dir = TempDir::new().expect("tempdir");
        let program = dir.path().join("proot");
        std::fs::write(&program, b"").expect("write");
        let backend = ProotBackend::with_program(&program);
        backend.bind(dir.path(), Path::new("/home/user")).expect("bind");
        assert!(backend
            .bind(&dir.path().join("absent"), Path::new("/x"))
            .is_err());

        let bindings = vec![
            MaskBinding {
                real: PathBuf::from("/a"),
                mask: PathBuf::from("/m1"),
                backend: MaskBackendKind::Proot,
                created: Vec::new(),
            },
            MaskBinding {
                real: PathBuf::from("/b"),
                mask: PathBuf::from("/m2"),
                backend: MaskBackendKind::Proot,
                created: Vec::new(),
            },
        ];
        let prefix = backend.command_prefix(&bindings);
        assert_eq!(&prefix[1..], &["-b", "/a:/m1", "-b", "/b:/m2"]);
        assert!(backend.unbind(Path::new("/m1")).is_ok());
    }
}
