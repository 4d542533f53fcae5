use std::path::{Path, PathBuf};

use serde_yaml::Mapping;

use crate::backup::{options_to_args, ToolRequest};
use crate::config::model::ResticTarget;
use crate::types::RunMode;

pub fn repository_path(target: &ResticTarget, mountpoint: &Path) -> PathBuf {
    mountpoint.join(&target.repository_folder)
}

pub fn environment(target: &ResticTarget) -> Vec<(String, String)> {
    let mut env = Vec::new();
    if let Some(password) = &target.password {
        env.push(("RESTIC_PASSWORD".to_string(), password.clone()));
    }
    if let Some(file) = &target.password_file {
        env.push((
            "RESTIC_PASSWORD_FILE".to_string(),
            file.to_string_lossy().to_string(),
        ));
    }
    env
}

pub fn backup_args(
    target: &ResticTarget,
    repo: &Path,
    request: &ToolRequest<'_>,
    run_mode: RunMode,
) -> Vec<String> {
    let mut args = repo_args(target, repo);
    args.push("-v".to_string());
    args.push("backup".to_string());
    args.extend(request.sources.iter().map(|s| s.to_string_lossy().to_string()));
    args.push("-H".to_string());
    args.push(request.hostname.to_string());
    args.extend(options_to_args(&target.args));
    if run_mode.dry_run {
        args.push("--dry-run".to_string());
    }
    args
}

pub fn forget_args(target: &ResticTarget, repo: &Path, policy: &Mapping, run_mode: RunMode) -> Vec<String> {
    let mut args = repo_args(target, repo);
    args.push("forget".to_string());
    args.extend(options_to_args(policy));
    if run_mode.dry_run {
        args.push("--dry-run".to_string());
    }
    args
}

/// `restic <args>` run against a session's repository.
pub fn passthrough_args(target: &ResticTarget, repo: &Path, extra: &[String]) -> Vec<String> {
    let mut args = repo_args(target, repo);
    args.extend(extra.iter().cloned());
    args
}

fn repo_args(target: &ResticTarget, repo: &Path) -> Vec<String> {
    vec![
        target.runner.clone(),
        "-r".to_string(),
        repo.to_string_lossy().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ResticTarget {
        ResticTarget {
            password: Some("pw".to_string()),
            args: serde_yaml::from_str("exclude: '*.iso'").expect("args"),
            ..ResticTarget::default()
        }
    }

    #[test]
    fn backup_command_line() {
        let sources = vec![PathBuf::from("/home/me"), PathBuf::from("/etc")];
        let request = ToolRequest {
            session: "home",
            hostname: "laptop",
            sources: &sources,
            destination: Path::new("/mnt/disk"),
            prefix: &[],
        };
        let target = target();
        let repo = repository_path(&target, request.destination);
        let args = backup_args(
            &target,
            &repo,
            &request,
            RunMode {
                dry_run: true,
                verbose: false,
            },
        );
        assert_eq!(
            args.join(" "),
            "restic -r /mnt/disk/restic -v backup /home/me /etc -H laptop --exclude *.iso --dry-run"
        );
        assert_eq!(
            environment(&target),
            vec![("RESTIC_PASSWORD".to_string(), "pw".to_string())]
        );
    }

    #[test]
    fn forget_uses_policy_flags() {
        let target = target();
        let policy: Mapping = serde_yaml::from_str("keep-daily: 7\nprune: true").expect("policy");
        let args = forget_args(&target, Path::new("/r"), &policy, RunMode::default());
        assert_eq!(args, vec!["restic", "-r", "/r", "forget", "--keep-daily", "7", "--prune"]);
    }

    #[test]
    fn passthrough_keeps_user_arguments() {
        let args = passthrough_args(&target(), Path::new("/r"), &["snapshots".to_string()]);
        assert_eq!(args, vec!["restic", "-r", "/r", "snapshots"]);
    }
}
