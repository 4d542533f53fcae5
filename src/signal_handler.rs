use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{error, warn};

use crate::mask::native::remove_created_paths;
use crate::mount::ops::unmount_path;
use crate::registry::CleanupRegistry;
use crate::types::RunMode;

const SIGNAL_TEMP_EXTENSION: &str = "yaml.signal.tmp";

pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Default)]
struct Tracked {
    mounts: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
    created: HashMap<PathBuf, Vec<PathBuf>>,
}

/// Mount points opened by this run, shared with the signal thread.
#[derive(Debug, Clone, Default)]
pub struct InterruptTracker {
    inner: Arc<Mutex<Tracked>>,
    registry: Option<PathBuf>,
}

impl InterruptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::default(),
            registry: Some(path.into()),
        }
    }

    pub fn track(&self, mountpoint: &Path, created_dir: bool) {
        if let Ok(mut tracked) = self.inner.lock() {
            tracked.mounts.insert(mountpoint.to_path_buf());
            if created_dir {
                tracked.dirs.insert(mountpoint.to_path_buf());
            }
        }
    }

    /// Tracks a bind-mounted mask together with the paths created to hold it.
    pub fn track_created(&self, mountpoint: &Path, created: &[PathBuf]) {
        if let Ok(mut tracked) = self.inner.lock() {
            tracked.mounts.insert(mountpoint.to_path_buf());
            if !created.is_empty() {
                tracked.created.insert(mountpoint.to_path_buf(), created.to_vec());
            }
        }
    }

    pub fn untrack(&self, mountpoint: &Path) {
        if let Ok(mut tracked) = self.inner.lock() {
            tracked.mounts.remove(mountpoint);
            tracked.dirs.remove(mountpoint);
            tracked.created.remove(mountpoint);
        }
    }

    /// Tracked mount points, deepest first.
    pub fn pending(&self) -> Vec<PathBuf> {
        let mut list: Vec<PathBuf> = match self.inner.lock() {
            Ok(tracked) => tracked.mounts.iter().cloned().collect(),
            Err(_) => Vec::new(),
        };
        list.sort_by_key(|m| std::cmp::Reverse(m.components().count()));
        list
    }

    fn created_dir(&self, mountpoint: &Path) -> bool {
        self.inner
            .lock()
            .map(|tracked| tracked.dirs.contains(mountpoint))
            .unwrap_or(false)
    }

    fn created_paths(&self, mountpoint: &Path) -> Vec<PathBuf> {
        self.inner
            .lock()
            .ok()
            .and_then(|tracked| tracked.created.get(mountpoint).cloned())
            .unwrap_or_default()
    }

    /// Removes whatever was created for an already unmounted path and stops
    /// tracking it.
    fn discard(&self, mountpoint: &Path) {
        if self.created_dir(mountpoint) {
            if let Err(err) = std::fs::remove_dir(mountpoint) {
                warn!(mountpoint = %mountpoint.display(), error = %err, "could not remove mountpoint");
            }
        }
        remove_created_paths(&self.created_paths(mountpoint));
        self.untrack(mountpoint);
    }

    /// Unmounts everything still tracked and returns the paths that could not
    /// be released.
    pub fn release_all(&self, run_mode: RunMode) -> Vec<PathBuf> {
        let mut registry = self.registry.as_deref().map(|path| {
            CleanupRegistry::open_or_reset(path).with_temp_extension(SIGNAL_TEMP_EXTENSION)
        });
        let mut failed = Vec::new();
        for mountpoint in self.pending() {
            if let Err(err) = unmount_path(&mountpoint, run_mode) {
                error!(mountpoint = %mountpoint.display(), error = %err, "unmount on interrupt failed");
                failed.push(mountpoint);
                continue;
            }
            self.discard(&mountpoint);
            if let Some(registry) = registry.as_mut() {
                let _ = registry.deregister(&mountpoint);
            }
        }
        failed
    }
}

pub fn signal_handler(tracker: &InterruptTracker, run_mode: RunMode) {
    let tracker = tracker.clone();
    thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                eprintln!("signal handler setup failed: {}", err);
                return;
            }
        };
        if let Some(signal) = signals.forever().next() {
            warn!(signal, "interrupted; releasing mounts");
            tracker.release_all(run_mode);
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
}
