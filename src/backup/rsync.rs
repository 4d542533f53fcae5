use std::path::{Path, PathBuf};

use crate::backup::options_to_args;
use crate::config::model::RsyncTarget;
use crate::types::RunMode;

pub fn destination_dir(target: &RsyncTarget, mountpoint: &Path, hostname: &str) -> PathBuf {
    mountpoint.join(hostname).join(&target.folder)
}

pub fn backup_args(target: &RsyncTarget, dest: &Path, sources: &[PathBuf], run_mode: RunMode) -> Vec<String> {
    let mut args = vec![
        "rsync".to_string(),
        "-axHAX".to_string(),
        "--info=progress2".to_string(),
        "--numeric-ids".to_string(),
    ];
    args.extend(options_to_args(&target.args));
    args.push("--delete".to_string());
    args.push("--ignore-errors".to_string());
    if run_mode.dry_run {
        args.push("--dry-run".to_string());
    }
    args.extend(sources.iter().map(|s| s.to_string_lossy().to_string()));
    args.push(dest.to_string_lossy().to_string());
    args
}

/// 24 means some source files vanished while copying.
pub fn exit_ok(code: i32) -> bool {
    code == 0 || code == 24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsync_command_line() {
        let target = RsyncTarget {
            enable: true,
            args: serde_yaml::from_str("exclude: .cache").expect("args"),
            ..RsyncTarget::default()
        };
        let dest = destination_dir(&target, Path::new("/mnt/disk"), "laptop");
        assert_eq!(dest, PathBuf::from("/mnt/disk/laptop/rsync"));
        let args = backup_args(&target, &dest, &[PathBuf::from("/home")], RunMode::default());
        assert_eq!(
            args.join(" "),
            "rsync -axHAX --info=progress2 --numeric-ids --exclude .cache --delete --ignore-errors /home /mnt/disk/laptop/rsync"
        );
    }

    #[test]
    fn vanished_files_are_not_a_failure() {
        assert!(exit_ok(0));
        assert!(exit_ok(24));
        assert!(!exit_ok(23));
    }
}
