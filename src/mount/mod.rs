pub mod inspect;
pub mod ops;
pub mod resolver;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MountError;
use crate::mount::inspect::{find_mounts_under, find_source_mountpoint, mountpoint_is_mounted, read_mount_table};
use crate::mount::ops::{mount_device, mount_remote, unmount_path};
use crate::types::RunMode;
use crate::util::command::run_command_captured;
use crate::util::paths::sanitize_component;

/// Every directory this system creates under the mount base starts with this.
pub const MOUNT_PREFIX: &str = "bare.";
pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(30);

const BY_LABEL_DIR: &str = "/dev/disk/by-label";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Volume,
    Remote,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Volume => "volume",
            MountKind::Remote => "remote",
        }
    }

    fn dir_tag(&self) -> &'static str {
        match self {
            MountKind::Volume => "vol",
            MountKind::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountHandle {
    pub kind: MountKind,
    pub source: String,
    pub mountpoint: PathBuf,
    pub created_by_us: bool,
    #[serde(default)]
    pub created_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    Device(PathBuf),
    Remote(String),
}

impl MountSource {
    pub fn display(&self) -> String {
        match self {
            MountSource::Device(path) => path.display().to_string(),
            MountSource::Remote(spec) => spec.clone(),
        }
    }
}

/// OS-facing mount primitives. The resolver and the reversal command only
/// talk to the system through this trait.
pub trait MountCapability {
    fn lookup_device(&self, label: &str) -> Result<PathBuf, MountError>;
    fn mount(&self, source: &MountSource, mountpoint: &Path) -> Result<(), MountError>;
    fn unmount(&self, mountpoint: &Path) -> Result<(), MountError>;
    fn is_mounted(&self, mountpoint: &Path) -> Result<bool, MountError>;
    fn mounted_at(&self, source: &MountSource) -> Result<Option<PathBuf>, MountError>;
    fn mounts_under(&self, base: &Path) -> Result<Vec<PathBuf>, MountError>;
}

pub fn canonical_mountpoint(mount_base: &Path, kind: MountKind, id: &str) -> PathBuf {
    mount_base.join(format!("{}{}-{}", MOUNT_PREFIX, kind.dir_tag(), mount_dir_id(id)))
}

/// Ids that survive sanitising unchanged are used as-is; any other id gets a
/// digest suffix so that `MY DRIVE` and `MY_DRIVE` never share a directory.
fn mount_dir_id(id: &str) -> String {
    let clean = sanitize_component(id);
    if clean == id {
        return clean;
    }
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    format!("{}-{}", clean, &digest[..8])
}

/// udev's encoding of labels under /dev/disk/by-label.
pub fn encode_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || "#+-.:=@_".contains(c) || !c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(&format!("\\x{:02x}", c as u32));
        }
    }
    out
}

pub fn device_path_for_label(label: &str) -> PathBuf {
    Path::new(BY_LABEL_DIR).join(encode_label(label))
}

pub struct SystemMounter {
    run_mode: RunMode,
    timeout: Duration,
}

impl SystemMounter {
    pub fn new(run_mode: RunMode, timeout: Duration) -> Self {
        Self { run_mode, timeout }
    }
}

impl MountCapability for SystemMounter {
    fn lookup_device(&self, label: &str) -> Result<PathBuf, MountError> {
        let link = device_path_for_label(label);
        link.canonicalize()
            .map_err(|_| MountError::NotFound(format!("volume label {}", label)))
    }

    fn mount(&self, source: &MountSource, mountpoint: &Path) -> Result<(), MountError> {
        match source {
            MountSource::Device(device) => mount_device(device, mountpoint, self.run_mode),
            MountSource::Remote(spec) => mount_remote(spec, mountpoint, self.timeout, self.run_mode),
        }
    }

    fn unmount(&self, mountpoint: &Path) -> Result<(), MountError> {
        unmount_path(mountpoint, self.run_mode)
    }

    fn is_mounted(&self, mountpoint: &Path) -> Result<bool, MountError> {
        Ok(mountpoint_is_mounted(&read_mount_table()?, mountpoint))
    }

    fn mounted_at(&self, source: &MountSource) -> Result<Option<PathBuf>, MountError> {
        let entries = read_mount_table()?;
        Ok(find_source_mountpoint(&entries, &source.display()))
    }

    fn mounts_under(&self, base: &Path) -> Result<Vec<PathBuf>, MountError> {
        Ok(find_mounts_under(&read_mount_table()?, base, MOUNT_PREFIX))
    }
}

/// Names of the remotes rclone knows about, without the trailing colon.
pub fn list_remotes(run_mode: RunMode) -> Result<Vec<String>, MountError> {
    let mut cmd = Command::new("rclone");
    cmd.arg("listremotes");
    let output = run_command_captured(&mut cmd, run_mode)
        .map_err(|e| MountError::Failed(format!("rclone listremotes: {}", e)))?;
    if !output.success() {
        return Err(MountError::Failed(format!(
            "rclone listremotes failed with exit code {}",
            output.code
        )));
    }
    Ok(parse_remotes(&output.stdout))
}

fn parse_remotes(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(crate::destination::normalize_remote_name)
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_name(kind: MountKind, id: &str) -> String {
        canonical_mountpoint(Path::new("/tmp"), kind, id)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn canonical_mountpoint_follows_naming_convention() {
        assert_eq!(
            canonical_mountpoint(Path::new("/tmp"), MountKind::Volume, "MYDRIVE"),
            PathBuf::from("/tmp/bare.vol-MYDRIVE")
        );
        assert_eq!(dir_name(MountKind::Remote, "gdrive"), "bare.remote-gdrive");

        let spaced = dir_name(MountKind::Volume, "MY DRIVE");
        assert!(spaced.starts_with("bare.vol-MY_DRIVE-"));
        assert_eq!(spaced.len(), "bare.vol-MY_DRIVE-".len() + 8);
        assert_eq!(spaced, dir_name(MountKind::Volume, "MY DRIVE"));
        assert!(dir_name(MountKind::Remote, "gdrive:photos").starts_with("bare.remote-gdrive_photos-"));
    }

    #[test]
    fn ids_that_sanitise_alike_get_distinct_mountpoints() {
        assert_ne!(dir_name(MountKind::Volume, "MY DRIVE"), dir_name(MountKind::Volume, "MY_DRIVE"));
        assert_ne!(dir_name(MountKind::Volume, "a/b"), dir_name(MountKind::Volume, "a_b"));
        assert_ne!(dir_name(MountKind::Volume, "a/b"), dir_name(MountKind::Volume, "a:b"));
    }

    #[test]
    fn label_encoding_matches_udev() {
        assert_eq!(encode_label("MYDRIVE"), "MYDRIVE");
        assert_eq!(encode_label("MY DRIVE"), "MY\\x20DRIVE");
        assert_eq!(encode_label("a/b"), "a\\x2fb");
    }

    #[test]
    fn parses_listremotes_output() {
        assert_eq!(
            parse_remotes("gdrive:\ns3-archive:\n\n"),
            vec!["gdrive".to_string(), "s3-archive".to_string()]
        );
    }
}
