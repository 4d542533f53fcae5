use std::fs;
use std::path::PathBuf;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::destination::{Destination, DestinationKind};
use crate::error::MountError;
use crate::mount::{canonical_mountpoint, MountCapability, MountHandle, MountKind, MountSource};
use crate::registry::CleanupRegistry;
use crate::util::paths::{create_private_dir, ensure_base_dir};

pub struct MountResolver<'a> {
    mounter: &'a dyn MountCapability,
    mount_base: PathBuf,
}

impl<'a> MountResolver<'a> {
    pub fn new(mounter: &'a dyn MountCapability, mount_base: impl Into<PathBuf>) -> Self {
        Self {
            mounter,
            mount_base: mount_base.into(),
        }
    }

    /// Turns a classified destination into a usable directory, mounting it when
    /// needed. Mounts that already exist are reused and marked as not ours.
    pub fn resolve(
        &self,
        kind: &DestinationKind,
        registry: &mut CleanupRegistry,
    ) -> Result<Destination, MountError> {
        match kind {
            DestinationKind::Path(path) => Ok(Destination::LocalPath(path.clone())),
            DestinationKind::VolumeLabel(label) => {
                let handle = self.acquire(MountKind::Volume, label, registry, || {
                    self.mounter.lookup_device(label).map(MountSource::Device)
                })?;
                Ok(Destination::VolumeMount {
                    label: label.clone(),
                    handle,
                })
            }
            DestinationKind::RemoteName(spec) => {
                let handle = self.acquire(MountKind::Remote, &spec.identifier(), registry, || {
                    Ok(MountSource::Remote(spec.source()))
                })?;
                Ok(Destination::RemoteMount {
                    remote: spec.name.clone(),
                    handle,
                })
            }
        }
    }

    fn acquire(
        &self,
        kind: MountKind,
        id: &str,
        registry: &mut CleanupRegistry,
        lookup: impl FnOnce() -> Result<MountSource, MountError>,
    ) -> Result<MountHandle, MountError> {
        let mountpoint = canonical_mountpoint(&self.mount_base, kind, id);
        if self.mounter.is_mounted(&mountpoint)? {
            if registry.get(&mountpoint).is_some() {
                warn!(mountpoint = %mountpoint.display(), "reusing mount left by an earlier run");
            }
            info!(mountpoint = %mountpoint.display(), "destination already mounted");
            return Ok(foreign_handle(kind, id, mountpoint));
        }

        let source = lookup()?;
        if let Some(existing) = self.mounter.mounted_at(&source)? {
            info!(
                source = %source.display(),
                mountpoint = %existing.display(),
                "destination already mounted elsewhere"
            );
            return Ok(foreign_handle(kind, id, existing));
        }

        ensure_base_dir(&self.mount_base).map_err(|e| MountError::Failed(e.to_string()))?;
        let created_dir =
            create_private_dir(&mountpoint).map_err(|e| MountError::Failed(e.to_string()))?;
        if let Err(err) = self.mounter.mount(&source, &mountpoint) {
            if created_dir {
                let _ = fs::remove_dir(&mountpoint);
            }
            return Err(err);
        }
        info!(source = %source.display(), mountpoint = %mountpoint.display(), "mounted destination");

        let handle = MountHandle {
            kind,
            source: id.to_string(),
            mountpoint,
            created_by_us: true,
            created_dir,
            mounted_at: Some(Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
        };
        if let Err(err) = registry.register(handle.clone()) {
            warn!(error = %err, "could not record mount in registry");
        }
        Ok(handle)
    }

    /// Inverse of [`resolve`](Self::resolve). Mounts we did not create are left
    /// alone. On failure the registry entry stays so `umount` can retry later.
    pub fn unmount(
        &self,
        handle: &MountHandle,
        registry: &mut CleanupRegistry,
    ) -> Result<(), MountError> {
        if !handle.created_by_us {
            debug!(mountpoint = %handle.mountpoint.display(), "not ours; leaving mounted");
            return Ok(());
        }
        self.mounter.unmount(&handle.mountpoint)?;
        if handle.created_dir {
            if let Err(err) = fs::remove_dir(&handle.mountpoint) {
                warn!(mountpoint = %handle.mountpoint.display(), error = %err, "could not remove mountpoint");
            }
        }
        if let Err(err) = registry.deregister(&handle.mountpoint) {
            warn!(error = %err, "could not update registry");
        }
        info!(mountpoint = %handle.mountpoint.display(), "unmounted destination");
        Ok(())
    }
}

fn foreign_handle(kind: MountKind, id: &str, mountpoint: PathBuf) -> MountHandle {
    MountHandle {
        kind,
        source: id.to_string(),
        mountpoint,
        created_by_us: false,
        created_dir: false,
        mounted_at: None,
    }
}
