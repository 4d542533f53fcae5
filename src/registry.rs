//! Process-wide ledger of mounts opened by this system.
//!
//! The registry is an index, not an owner: the orchestrator owns each
//! [`MountHandle`] for the duration of a session and the registry only keeps a
//! copy keyed by mount point so that an interrupted run can be reversed. The
//! ledger is written to a YAML file next to the mount points on every change
//! and the file is removed once the ledger is empty.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BareError, MountError, Result};
use crate::mount::{MountCapability, MountHandle, MOUNT_PREFIX};

pub const REGISTRY_FILE: &str = "bare.mounts.yaml";
const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    mounts: Vec<MountHandle>,
}

const TEMP_EXTENSION: &str = "yaml.tmp";

#[derive(Debug, Default)]
pub struct CleanupRegistry {
    store: Option<PathBuf>,
    temp_extension: Option<&'static str>,
    entries: Vec<MountHandle>,
}

pub fn registry_path(mount_base: &Path) -> PathBuf {
    mount_base.join(REGISTRY_FILE)
}

impl CleanupRegistry {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the ledger at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(contents) => {
                let file: RegistryFile = serde_yaml::from_str(&contents).map_err(|e| {
                    BareError::message(format!("parse registry {}: {}", path.display(), e))
                })?;
                file.mounts
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(BareError::message(format!(
                    "read registry {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        Ok(Self {
            store: Some(path.to_path_buf()),
            temp_extension: None,
            entries,
        })
    }

    /// Like [`open`](Self::open), but an unreadable ledger never blocks
    /// recovery: it is moved aside to `<file>.bad` and an empty ledger bound
    /// to the same path is returned.
    pub fn open_or_reset(path: &Path) -> Self {
        match Self::open(path) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable mount registry");
                let aside = path.with_extension("yaml.bad");
                if let Err(err) = fs::rename(path, &aside) {
                    warn!(path = %path.display(), error = %err, "could not move registry aside");
                }
                Self {
                    store: Some(path.to_path_buf()),
                    temp_extension: None,
                    entries: Vec::new(),
                }
            }
        }
    }

    /// Writes go through `<file>.<extension>` instead of the default temp
    /// file, so two writers in one process never share a temp file.
    pub fn with_temp_extension(mut self, extension: &'static str) -> Self {
        self.temp_extension = Some(extension);
        self
    }

    pub fn register(&mut self, handle: MountHandle) -> Result<()> {
        self.entries.retain(|entry| entry.mountpoint != handle.mountpoint);
        debug!(mountpoint = %handle.mountpoint.display(), source = %handle.source, "registered mount");
        self.entries.push(handle);
        self.persist()
    }

    pub fn deregister(&mut self, mountpoint: &Path) -> Result<Option<MountHandle>> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.mountpoint == mountpoint);
        let removed = position.map(|idx| self.entries.remove(idx));
        if removed.is_some() {
            debug!(mountpoint = %mountpoint.display(), "deregistered mount");
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn get(&self, mountpoint: &Path) -> Option<&MountHandle> {
        self.entries.iter().find(|entry| entry.mountpoint == mountpoint)
    }

    pub fn list_active(&self) -> Vec<MountHandle> {
        self.entries.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.store else {
            return Ok(());
        };
        if self.entries.is_empty() {
            return match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(BareError::message(format!(
                    "remove registry {}: {}",
                    path.display(),
                    err
                ))),
            };
        }
        let file = RegistryFile {
            version: REGISTRY_VERSION,
            mounts: self.entries.clone(),
        };
        let data = serde_yaml::to_string(&file)
            .map_err(|e| BareError::message(format!("encode registry: {}", e)))?;
        let tmp = path.with_extension(self.temp_extension.unwrap_or(TEMP_EXTENSION));
        fs::write(&tmp, data)
            .map_err(|e| BareError::message(format!("write registry {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| BareError::message(format!("write registry {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalAction {
    Unmounted,
    AlreadyUnmounted,
}

#[derive(Debug)]
pub struct ReversalOutcome {
    pub mountpoint: PathBuf,
    pub source: Option<String>,
    pub result: std::result::Result<ReversalAction, MountError>,
}

impl ReversalOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Reverses every mount left behind by this system, from the ledger and from
/// the mount table. Anything under `mount_base` carrying [`MOUNT_PREFIX`] is
/// treated as created by this system.
pub fn reverse_all(
    mounter: &dyn MountCapability,
    registry: &mut CleanupRegistry,
    mount_base: &Path,
) -> Vec<ReversalOutcome> {
    let mut candidates: Vec<(PathBuf, Option<String>)> = registry
        .list_active()
        .into_iter()
        .filter(|handle| handle.created_by_us)
        .map(|handle| (handle.mountpoint, Some(handle.source)))
        .collect();
    match mounter.mounts_under(mount_base) {
        Ok(found) => {
            for mountpoint in found {
                if !candidates.iter().any(|(known, _)| *known == mountpoint) {
                    candidates.push((mountpoint, None));
                }
            }
        }
        Err(err) => warn!(error = %err, "mount table scan failed; using registry only"),
    }
    candidates.sort_by_key(|(mountpoint, _)| std::cmp::Reverse(mountpoint.as_os_str().len()));

    let mut outcomes = Vec::new();
    for (mountpoint, source) in candidates {
        let result = reverse_one(mounter, &mountpoint);
        if result.is_ok() {
            if carries_prefix(&mountpoint) {
                let _ = fs::remove_dir(&mountpoint);
            }
            if let Err(err) = registry.deregister(&mountpoint) {
                warn!(error = %err, "registry update failed");
            }
        }
        outcomes.push(ReversalOutcome {
            mountpoint,
            source,
            result,
        });
    }
    outcomes
}

fn reverse_one(
    mounter: &dyn MountCapability,
    mountpoint: &Path,
) -> std::result::Result<ReversalAction, MountError> {
    if !mounter.is_mounted(mountpoint)? {
        return Ok(ReversalAction::AlreadyUnmounted);
    }
    mounter.unmount(mountpoint)?;
    info!(mountpoint = %mountpoint.display(), "unmounted");
    Ok(ReversalAction::Unmounted)
}

fn carries_prefix(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(MOUNT_PREFIX))
        .unwrap_or(false)
}

/// Removes empty, unmounted `bare.` directories directly under `mount_base`.
pub fn remove_leftover_dirs(mounter: &dyn MountCapability, mount_base: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for entry in WalkDir::new(mount_base)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_dir() || !carries_prefix(entry.path()) {
            continue;
        }
        if mounter.is_mounted(entry.path()).unwrap_or(true) {
            continue;
        }
        if fs::remove_dir(entry.path()).is_ok() {
            removed.push(entry.path().to_path_buf());
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::inspect::{find_mounts_under, MountEntry};
    use crate::mount::{MountKind, MountSource};
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeMounter {
        table: RefCell<Vec<MountEntry>>,
        busy: Option<PathBuf>,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl FakeMounter {
        fn with_mounts(mountpoints: &[&Path]) -> Self {
            let table = mountpoints
                .iter()
                .map(|mp| MountEntry {
                    source: "/dev/sdz1".to_string(),
                    mountpoint: mp.to_path_buf(),
                    fstype: "ext4".to_string(),
                })
                .collect();
            Self {
                table: RefCell::new(table),
                ..Self::default()
            }
        }

        fn still_mounted(&self, mountpoint: &Path) -> bool {
            self.table.borrow().iter().any(|e| e.mountpoint == mountpoint)
        }
    }

    impl MountCapability for FakeMounter {
        fn lookup_device(&self, label: &str) -> std::result::Result<PathBuf, MountError> {
            Err(MountError::NotFound(label.to_string()))
        }

        fn mount(&self, _source: &MountSource, _mountpoint: &Path) -> std::result::Result<(), MountError> {
            Err(MountError::Failed("not used".to_string()))
        }

        fn unmount(&self, mountpoint: &Path) -> std::result::Result<(), MountError> {
            self.calls.borrow_mut().push(mountpoint.to_path_buf());
            if self.busy.as_deref() == Some(mountpoint) {
                return Err(MountError::AlreadyBusy(mountpoint.to_path_buf()));
            }
            self.table.borrow_mut().retain(|e| e.mountpoint != mountpoint);
            Ok(())
        }

        fn is_mounted(&self, mountpoint: &Path) -> std::result::Result<bool, MountError> {
            Ok(self.still_mounted(mountpoint))
        }

        fn mounted_at(&self, _source: &MountSource) -> std::result::Result<Option<PathBuf>, MountError> {
            Ok(None)
        }

        fn mounts_under(&self, base: &Path) -> std::result::Result<Vec<PathBuf>, MountError> {
            Ok(find_mounts_under(&self.table.borrow(), base, MOUNT_PREFIX))
        }
    }

    fn handle(mountpoint: &Path) -> MountHandle {
        MountHandle {
            kind: MountKind::Volume,
            source: "MYDRIVE".to_string(),
            mountpoint: mountpoint.to_path_buf(),
            created_by_us: true,
            created_dir: true,
            mounted_at: None,
        }
    }

    #[test]
    fn persists_entries_and_removes_file_when_empty() {
        let dir = TempDir::new().expect("tempdir");
        let path = registry_path(dir.path());
        let mountpoint = dir.path().join("bare.vol-MYDRIVE");

        let mut registry = CleanupRegistry::open(&path).expect("open");
        registry.register(handle(&mountpoint)).expect("register");
        assert!(path.exists());

        let reloaded = CleanupRegistry::open(&path).expect("reopen");
        assert_eq!(reloaded.list_active(), vec![handle(&mountpoint)]);

        let removed = registry.deregister(&mountpoint).expect("deregister");
        assert!(removed.is_some());
        assert!(registry.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn register_replaces_entry_for_same_mountpoint() {
        let mut registry = CleanupRegistry::in_memory();
        let mountpoint = PathBuf::from("/tmp/bare.vol-X");
        registry.register(handle(&mountpoint)).expect("register");
        registry.register(handle(&mountpoint)).expect("register again");
        assert_eq!(registry.list_active().len(), 1);
        assert!(registry.deregister(Path::new("/tmp/other")).expect("noop").is_none());
    }

    #[test]
    fn corrupt_ledger_is_moved_aside_and_scan_still_runs() {
        let dir = TempDir::new().expect("tempdir");
        let path = registry_path(dir.path());
        fs::write(&path, "version: [oops").expect("write");
        assert!(CleanupRegistry::open(&path).is_err());

        let stale = dir.path().join("bare.vol-STALE");
        let mut registry = CleanupRegistry::open_or_reset(&path);
        assert!(registry.is_empty());
        assert!(!path.exists());
        assert!(path.with_extension("yaml.bad").exists());

        let mounter = FakeMounter::with_mounts(&[&stale]);
        let outcomes = reverse_all(&mounter, &mut registry, dir.path());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].mountpoint, stale);
        assert!(matches!(outcomes[0].result, Ok(ReversalAction::Unmounted)));
        assert!(!mounter.still_mounted(&stale));
    }

    #[test]
    fn registry_entry_without_mount_is_dropped() {
        let dir = TempDir::new().expect("tempdir");
        let gone = dir.path().join("bare.vol-GONE");
        let mut registry = CleanupRegistry::open(&registry_path(dir.path())).expect("open");
        registry.register(handle(&gone)).expect("register");

        let mounter = FakeMounter::default();
        let outcomes = reverse_all(&mounter, &mut registry, dir.path());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].source.as_deref(), Some("MYDRIVE"));
        assert!(matches!(outcomes[0].result, Ok(ReversalAction::AlreadyUnmounted)));
        assert!(mounter.calls.borrow().is_empty());
        assert!(registry.is_empty());
        assert!(!registry_path(dir.path()).exists());
    }

    #[test]
    fn scanned_mount_is_reversed_without_ledger_entry() {
        let dir = TempDir::new().expect("tempdir");
        let found = dir.path().join("bare.remote-gdrive");
        fs::create_dir(&found).expect("mkdir");
        let mounter = FakeMounter::with_mounts(&[&found]);
        let mut registry = CleanupRegistry::in_memory();

        let outcomes = reverse_all(&mounter, &mut registry, dir.path());
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].source.is_none());
        assert!(outcomes[0].succeeded());
        assert_eq!(*mounter.calls.borrow(), vec![found.clone()]);
        assert!(!found.exists());
    }

    #[test]
    fn failed_unmount_keeps_ledger_entry() {
        let dir = TempDir::new().expect("tempdir");
        let busy = dir.path().join("bare.vol-BUSY");
        let mut mounter = FakeMounter::with_mounts(&[&busy]);
        mounter.busy = Some(busy.clone());
        let mut registry = CleanupRegistry::in_memory();
        registry.register(handle(&busy)).expect("register");

        let outcomes = reverse_all(&mounter, &mut registry, dir.path());
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].result, Err(MountError::AlreadyBusy(_))));
        assert!(registry.get(&busy).is_some());
        assert!(mounter.still_mounted(&busy));
    }

    #[test]
    fn nested_mounts_are_reversed_deepest_first() {
        let dir = TempDir::new().expect("tempdir");
        let outer = dir.path().join("bare.vol-OUTER");
        let inner = outer.join("bare.remote-inner");
        let mounter = FakeMounter::with_mounts(&[&outer, &inner]);
        let mut registry = CleanupRegistry::in_memory();
        registry.register(handle(&inner)).expect("register");

        let outcomes = reverse_all(&mounter, &mut registry, dir.path());
        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert_eq!(*mounter.calls.borrow(), vec![inner, outer]);
    }

    #[test]
    fn foreign_mounts_and_dirs_under_base_are_left_alone() {
        let dir = TempDir::new().expect("tempdir");
        let foreign = dir.path().join("media");
        let leftover = dir.path().join("bare.vol-OLD");
        let mounted = dir.path().join("bare.vol-LIVE");
        for path in [&foreign, &leftover, &mounted] {
            fs::create_dir(path).expect("mkdir");
        }
        let mounter = FakeMounter::with_mounts(&[&foreign]);
        let mut registry = CleanupRegistry::in_memory();

        assert!(reverse_all(&mounter, &mut registry, dir.path()).is_empty());
        assert!(mounter.calls.borrow().is_empty());
        assert!(mounter.still_mounted(&foreign));

        mounter.table.borrow_mut().push(MountEntry {
            source: "/dev/sdz2".to_string(),
            mountpoint: mounted.clone(),
            fstype: "ext4".to_string(),
        });
        let removed = remove_leftover_dirs(&mounter, dir.path());
        assert_eq!(removed, vec![leftover.clone()]);
        assert!(foreign.exists());
        assert!(mounted.exists());
        assert!(!leftover.exists());
    }

    #[test]
    fn alternate_temp_file_is_not_left_behind() {
        let dir = TempDir::new().expect("tempdir");
        let path = registry_path(dir.path());
        let mut registry = CleanupRegistry::open_or_reset(&path).with_temp_extension("yaml.signal.tmp");
        registry
            .register(handle(&dir.path().join("bare.vol-X")))
            .expect("register");
        assert!(path.exists());
        assert!(!path.with_extension("yaml.signal.tmp").exists());
        assert_eq!(CleanupRegistry::open(&path).expect("reopen").list_active().len(), 1);
    }
}
