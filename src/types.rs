use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupTool {
    Restic,
    Rsync,
}

impl BackupTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupTool::Restic => "restic",
            BackupTool::Rsync => "rsync",
        }
    }
}

impl fmt::Display for BackupTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskBackendKind {
    #[default]
    Proot,
    Native,
}

impl MaskBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskBackendKind::Proot => "proot",
            MaskBackendKind::Native => "native",
        }
    }
}

impl FromStr for MaskBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proot" => Ok(MaskBackendKind::Proot),
            "native" => Ok(MaskBackendKind::Native),
            _ => Err(format!(
                "invalid mask backend {}; expected proot or native",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    pub dry_run: bool,
    pub verbose: bool,
}
