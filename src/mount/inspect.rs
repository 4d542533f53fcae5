use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MountError;

const MOUNT_TABLE: &str = "/proc/self/mounts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mountpoint: PathBuf,
    pub fstype: String,
}

pub fn read_mount_table() -> Result<Vec<MountEntry>, MountError> {
    let contents = fs::read_to_string(MOUNT_TABLE)
        .map_err(|e| MountError::Failed(format!("read {}: {}", MOUNT_TABLE, e)))?;
    Ok(parse_mounts(&contents))
}

pub fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        entries.push(MountEntry {
            source: unescape_field(fields[0]),
            mountpoint: PathBuf::from(unescape_field(fields[1])),
            fstype: fields[2].to_string(),
        });
    }
    entries
}

// The kernel writes space, tab, newline and backslash as \ooo octal escapes.
fn unescape_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let parsed = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(value) = parsed {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

pub fn mountpoint_is_mounted(entries: &[MountEntry], mountpoint: &Path) -> bool {
    entries.iter().any(|entry| entry.mountpoint == mountpoint)
}

/// Where `source` is currently mounted, if anywhere. Device paths are compared
/// after resolving symlinks so `/dev/disk/by-label/X` matches `/dev/sdb1`.
pub fn find_source_mountpoint(entries: &[MountEntry], source: &str) -> Option<PathBuf> {
    let wanted = Path::new(source)
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from(source));
    entries
        .iter()
        .find(|entry| {
            let mounted = Path::new(&entry.source);
            let mounted_real = mounted
                .canonicalize()
                .unwrap_or_else(|_| mounted.to_path_buf());
            mounted_real == wanted || entry.source == source
        })
        .map(|entry| entry.mountpoint.clone())
}

pub fn find_mounts_under(entries: &[MountEntry], base: &Path, prefix: &str) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|entry| entry.mountpoint.parent() == Some(base))
        .filter(|entry| {
            entry
                .mountpoint
                .file_name()
                .map(|name| name.to_string_lossy().starts_with(prefix))
                .unwrap_or(false)
        })
        .map(|entry| entry.mountpoint.clone())
        .collect()
}
