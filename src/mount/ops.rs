use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::MountError;
use crate::mount::inspect::{mountpoint_is_mounted, read_mount_table};
use crate::types::RunMode;
use crate::util::command::run_command_captured;

const MOUNT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn mount_device(device: &Path, mountpoint: &Path, run_mode: RunMode) -> Result<(), MountError> {
    let mut cmd = Command::new("mount");
    cmd.arg(device).arg(mountpoint);
    run_mount_command(&mut cmd, &device.display().to_string(), mountpoint, run_mode)
}

pub fn mount_remote(
    source: &str,
    mountpoint: &Path,
    timeout: Duration,
    run_mode: RunMode,
) -> Result<(), MountError> {
    let mut cmd = Command::new("rclone");
    cmd.arg("mount").arg(source).arg(mountpoint).arg("--daemon");
    run_mount_command(&mut cmd, source, mountpoint, run_mode)?;
    if let Err(err) = wait_for_mount(mountpoint, timeout) {
        let _ = unmount_path(mountpoint, run_mode);
        return Err(err);
    }
    Ok(())
}

pub fn unmount_path(mountpoint: &Path, run_mode: RunMode) -> Result<(), MountError> {
    let mut cmd = Command::new("umount");
    cmd.arg(mountpoint);
    let output = run_command_captured(&mut cmd, run_mode)
        .map_err(|e| MountError::Failed(format!("umount {}: {}", mountpoint.display(), e)))?;
    if !output.success() {
        return Err(classify_failure(
            "umount",
            &mountpoint.display().to_string(),
            mountpoint,
            output.code,
            &output.stderr,
        ));
    }
    Ok(())
}

pub fn bind_mount(real: &Path, target: &Path, run_mode: RunMode) -> Result<(), MountError> {
    let mut cmd = Command::new("mount");
    cmd.arg("--bind").arg(real).arg(target);
    run_mount_command(&mut cmd, &real.display().to_string(), target, run_mode)
}

fn run_mount_command(
    cmd: &mut Command,
    source: &str,
    mountpoint: &Path,
    run_mode: RunMode,
) -> Result<(), MountError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let output = run_command_captured(cmd, run_mode)
        .map_err(|e| MountError::Failed(format!("{} {}: {}", program, source, e)))?;
    if !output.success() {
        return Err(classify_failure(&program, source, mountpoint, output.code, &output.stderr));
    }
    Ok(())
}

pub fn wait_for_mount(mountpoint: &Path, timeout: Duration) -> Result<(), MountError> {
    let started = Instant::now();
    loop {
        if mountpoint_is_mounted(&read_mount_table()?, mountpoint) {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(MountError::Timeout(mountpoint.to_path_buf()));
        }
        thread::sleep(MOUNT_POLL_INTERVAL);
    }
}

pub fn classify_failure(
    program: &str,
    source: &str,
    mountpoint: &Path,
    code: i32,
    stderr: &str,
) -> MountError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("busy") {
        return MountError::AlreadyBusy(mountpoint.to_path_buf());
    }
    if lower.contains("permission denied")
        || lower.contains("only root")
        || lower.contains("must be superuser")
        || lower.contains("operation not permitted")
    {
        return MountError::PermissionDenied(format!("{} {}: {}", program, source, stderr));
    }
    if lower.contains("does not exist")
        || lower.contains("no such file")
        || lower.contains("didn't find section")
        || lower.contains("can't find")
    {
        return MountError::NotFound(source.to_string());
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return MountError::Timeout(PathBuf::from(mountpoint));
    }
    MountError::Failed(format!(
        "{} {} failed with exit code {}{}",
        program,
        source,
        code,
        if stderr.is_empty() {
            String::new()
        } else {
            format!(": {}", stderr)
        }
    ))
}
