use std::path::PathBuf;

use serde::Deserialize;
use serde_yaml::Mapping;

use crate::types::MaskBackendKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
    #[serde(default)]
    pub mount_base: Option<PathBuf>,
    #[serde(default)]
    pub mask_backend: Option<String>,
    #[serde(default)]
    pub remotes: Vec<String>,
    #[serde(default = "default_true")]
    pub discover_remotes: bool,
    #[serde(default)]
    pub mount_timeout_secs: Option<u64>,
    #[serde(default)]
    pub low_priority: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub source: Option<OneOrMany>,
    #[serde(default)]
    pub mask: Option<OneOrMany>,
    #[serde(default)]
    pub check_hostname: bool,
    #[serde(default)]
    pub restic: ResticTarget,
    #[serde(default)]
    pub rsync: RsyncTarget,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ResticTarget {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
    #[serde(default = "default_restic_folder")]
    pub repository_folder: String,
    #[serde(default = "default_runner")]
    pub runner: String,
    #[serde(default)]
    pub args: Mapping,
    #[serde(default)]
    pub forget: Option<Mapping>,
}

impl Default for ResticTarget {
    fn default() -> Self {
        Self {
            enable: true,
            password: None,
            password_file: None,
            repository_folder: default_restic_folder(),
            runner: default_runner(),
            args: Mapping::new(),
            forget: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RsyncTarget {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_rsync_folder")]
    pub folder: String,
    #[serde(default)]
    pub args: Mapping,
}

impl Default for RsyncTarget {
    fn default() -> Self {
        Self {
            enable: false,
            folder: default_rsync_folder(),
            args: Mapping::new(),
        }
    }
}

/// A validated session, ready for the orchestrator.
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub hostname: String,
    pub destination: String,
    pub sources: Vec<PathBuf>,
    pub masks: Vec<PathBuf>,
    pub check_hostname: bool,
    pub restic: ResticTarget,
    pub rsync: RsyncTarget,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub sessions: Vec<Session>,
    pub mount_base: PathBuf,
    pub mask_backend: MaskBackendKind,
    pub remotes: Vec<String>,
    pub discover_remotes: bool,
    pub mount_timeout_secs: u64,
    pub low_priority: bool,
}

fn default_true() -> bool {
    true
}

fn default_restic_folder() -> String {
    "restic".to_string()
}

fn default_runner() -> String {
    "restic".to_string()
}

fn default_rsync_folder() -> String {
    "rsync".to_string()
}
