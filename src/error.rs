use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::BackupTool;

#[derive(Debug, Error)]
pub enum BareError {
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Mount(MountError),
    #[error("{0}")]
    Mask(MaskError),
    #[error("{0}")]
    Tool(ToolError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
    #[error("session {session}: missing required field {field}")]
    MissingField { session: String, field: &'static str },
    #[error("mask count {masks} does not match source count {sources}")]
    MaskArityMismatch { sources: usize, masks: usize },
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount source {0} not found")]
    NotFound(String),
    #[error("mountpoint {0} is busy")]
    AlreadyBusy(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("timed out waiting for {0} to mount")]
    Timeout(PathBuf),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("mask backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: &'static str, reason: String },
    #[error("bind {} -> {}: {reason}", real.display(), mask.display())]
    BindFailed {
        real: PathBuf,
        mask: PathBuf,
        reason: String,
    },
    #[error("unbind {}: {reason}", mask.display())]
    UnbindFailed { mask: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool}: {reason}")]
    Spawn { tool: BackupTool, reason: String },
    #[error("{tool} failed with exit code {code}")]
    Exit { tool: BackupTool, code: i32 },
}

pub type Result<T> = std::result::Result<T, BareError>;

impl BareError {
    pub fn message(msg: impl Into<String>) -> Self {
        BareError::Message(msg.into())
    }
}

impl From<ConfigError> for BareError {
    fn from(err: ConfigError) -> Self {
        BareError::Config(err)
    }
}

impl From<MountError> for BareError {
    fn from(err: MountError) -> Self {
        BareError::Mount(err)
    }
}

impl From<MaskError> for BareError {
    fn from(err: MaskError) -> Self {
        BareError::Mask(err)
    }
}

impl From<ToolError> for BareError {
    fn from(err: ToolError) -> Self {
        BareError::Tool(err)
    }
}
