//! Destination classification and the resolved destination type.
//!
//! A raw destination string from a session is classified exactly once, here,
//! into a closed set of kinds. Everything downstream matches on the kind.

use std::path::{Path, PathBuf};

use crate::mount::MountHandle;
use crate::util::paths::absolute_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub name: String,
    pub subpath: String,
}

impl RemoteSpec {
    /// The argument handed to `rclone mount`.
    pub fn source(&self) -> String {
        format!("{}:{}", self.name, self.subpath)
    }

    pub fn identifier(&self) -> String {
        if self.subpath.is_empty() {
            self.name.clone()
        } else {
            self.source()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationKind {
    Path(PathBuf),
    VolumeLabel(String),
    RemoteName(RemoteSpec),
}

impl DestinationKind {
    pub fn describe(&self) -> &'static str {
        match self {
            DestinationKind::Path(_) => "path",
            DestinationKind::VolumeLabel(_) => "volume",
            DestinationKind::RemoteName(_) => "remote",
        }
    }
}

/// Existing paths win over remote names; anything else is a volume label.
pub fn classify(destination: &str, remotes: &[String]) -> DestinationKind {
    let raw = destination.trim();
    let path = Path::new(raw);
    if !raw.is_empty() && path.exists() {
        return DestinationKind::Path(absolute_path(path));
    }
    if let Some(spec) = match_remote(raw, remotes) {
        return DestinationKind::RemoteName(spec);
    }
    DestinationKind::VolumeLabel(raw.to_string())
}

fn match_remote(raw: &str, remotes: &[String]) -> Option<RemoteSpec> {
    let (name, subpath) = match raw.split_once(':') {
        Some((name, rest)) => (name, rest),
        None => (raw, ""),
    };
    if name.is_empty() {
        return None;
    }
    remotes
        .iter()
        .map(|r| normalize_remote_name(r))
        .any(|r| r == name)
        .then(|| RemoteSpec {
            name: name.to_string(),
            subpath: subpath.to_string(),
        })
}

/// `rclone listremotes` prints names with a trailing colon.
pub fn normalize_remote_name(raw: &str) -> &str {
    raw.trim().trim_end_matches(':')
}

#[derive(Debug, Clone)]
pub enum Destination {
    LocalPath(PathBuf),
    VolumeMount { label: String, handle: MountHandle },
    RemoteMount { remote: String, handle: MountHandle },
}

impl Destination {
    pub fn path(&self) -> &Path {
        match self {
            Destination::LocalPath(path) => path,
            Destination::VolumeMount { handle, .. } | Destination::RemoteMount { handle, .. } => {
                &handle.mountpoint
            }
        }
    }

    pub fn handle(&self) -> Option<&MountHandle> {
        match self {
            Destination::LocalPath(_) => None,
            Destination::VolumeMount { handle, .. } | Destination::RemoteMount { handle, .. } => {
                Some(handle)
            }
        }
    }
}
