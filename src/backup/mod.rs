use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::config::model::{ResticTarget, RsyncTarget, Session};
use crate::error::ToolError;
use crate::types::{BackupTool, RunMode};
use crate::util::command::{command_from_args, low_priority_args, run_command};

pub mod restic;
pub mod rsync;

#[derive(Debug, Clone, Copy)]
pub enum ToolOptions<'a> {
    Restic(&'a ResticTarget),
    Rsync(&'a RsyncTarget),
}

impl ToolOptions<'_> {
    pub fn tool(&self) -> BackupTool {
        match self {
            ToolOptions::Restic(_) => BackupTool::Restic,
            ToolOptions::Rsync(_) => BackupTool::Rsync,
        }
    }
}

/// Enabled targets of a session, restic first.
pub fn enabled_targets(session: &Session) -> Vec<ToolOptions<'_>> {
    let mut targets = Vec::new();
    if session.restic.enable {
        targets.push(ToolOptions::Restic(&session.restic));
    }
    if session.rsync.enable {
        targets.push(ToolOptions::Rsync(&session.rsync));
    }
    targets
}

pub struct ToolRequest<'a> {
    pub session: &'a str,
    pub hostname: &'a str,
    pub sources: &'a [PathBuf],
    pub destination: &'a Path,
    /// Wrapper command (for example a proot invocation) the tool runs under.
    pub prefix: &'a [String],
}

pub trait BackupExecutor {
    fn run_tool(&self, options: ToolOptions<'_>, request: &ToolRequest<'_>) -> Result<(), ToolError>;
}

pub struct SystemExecutor {
    run_mode: RunMode,
    low_priority: bool,
}

impl SystemExecutor {
    pub fn new(run_mode: RunMode, low_priority: bool) -> Self {
        Self {
            run_mode,
            low_priority,
        }
    }

    fn run(
        &self,
        tool: BackupTool,
        args: Vec<String>,
        prefix: &[String],
        env: &[(String, String)],
    ) -> Result<i32, ToolError> {
        let mut full: Vec<String> = prefix.to_vec();
        full.extend(args);
        if self.low_priority {
            full = low_priority_args(full);
        }
        let mut cmd = command_from_args(&full).map_err(|e| ToolError::Spawn {
            tool,
            reason: e.to_string(),
        })?;
        for (key, value) in env {
            cmd.env(key, value);
        }
        run_command(&mut cmd, self.run_mode).map_err(|e| ToolError::Spawn {
            tool,
            reason: e.to_string(),
        })
    }
}

impl BackupExecutor for SystemExecutor {
    fn run_tool(&self, options: ToolOptions<'_>, request: &ToolRequest<'_>) -> Result<(), ToolError> {
        match options {
            ToolOptions::Restic(target) => {
                let repo = restic::repository_path(target, request.destination);
                let env = restic::environment(target);
                let args = restic::backup_args(target, &repo, request, self.run_mode);
                let code = self.run(BackupTool::Restic, args, request.prefix, &env)?;
                if code != 0 {
                    return Err(ToolError::Exit {
                        tool: BackupTool::Restic,
                        code,
                    });
                }
                if let Some(policy) = &target.forget {
                    info!(session = request.session, "pruning old snapshots");
                    let args = restic::forget_args(target, &repo, policy, self.run_mode);
                    let code = self.run(BackupTool::Restic, args, &[], &env)?;
                    if code != 0 {
                        return Err(ToolError::Exit {
                            tool: BackupTool::Restic,
                            code,
                        });
                    }
                }
                Ok(())
            }
            ToolOptions::Rsync(target) => {
                let dest = rsync::destination_dir(target, request.destination, request.hostname);
                if !self.run_mode.dry_run {
                    std::fs::create_dir_all(&dest).map_err(|e| ToolError::Spawn {
                        tool: BackupTool::Rsync,
                        reason: format!("create {}: {}", dest.display(), e),
                    })?;
                }
                let args = rsync::backup_args(target, &dest, request.sources, self.run_mode);
                let code = self.run(BackupTool::Rsync, args, request.prefix, &[])?;
                if !rsync::exit_ok(code) {
                    return Err(ToolError::Exit {
                        tool: BackupTool::Rsync,
                        code,
                    });
                }
                if code != 0 {
                    warn!(session = request.session, code, "rsync reported vanished source files");
                }
                Ok(())
            }
        }
    }
}

/// Turns a YAML mapping of tool options into command-line flags. One-letter
/// keys become `-k`, longer ones `--key`; lists repeat the flag; `null`, `true`
/// and the empty string give a bare flag; `false` drops it.
pub fn options_to_args(options: &Mapping) -> Vec<String> {
    let mut out = Vec::new();
    for (key, value) in options {
        let Some(key) = scalar_text(key) else {
            warn!("ignoring non-scalar option key");
            continue;
        };
        let flag = flag_for(&key);
        match value {
            Value::Null => out.push(flag),
            Value::Bool(true) => out.push(flag),
            Value::Bool(false) => {}
            Value::Sequence(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        out.push(flag.clone());
                        out.push(text);
                    }
                }
            }
            other => match scalar_text(other) {
                Some(text) if text.is_empty() => out.push(flag),
                Some(text) => {
                    out.push(flag);
                    out.push(text);
                }
                None => warn!(option = %key, "ignoring nested option value"),
            },
        }
    }
    out
}

fn flag_for(key: &str) -> String {
    if key.starts_with('-') {
        key.to_string()
    } else if key.chars().count() == 1 {
        format!("-{}", key)
    } else {
        format!("--{}", key)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).expect("mapping")
    }

    #[test]
    fn options_map_to_flags() {
        let args = options_to_args(&mapping(
            "exclude: ['*.tmp', cache]\nv: ~\nkeep-daily: 7\none-file-system: true\nquiet: false\ndelete: ''\n",
        ));
        assert_eq!(
            args,
            vec![
                "--exclude",
                "*.tmp",
                "--exclude",
                "cache",
                "-v",
                "--keep-daily",
                "7",
                "--one-file-system",
                "--delete",
            ]
        );
    }

    #[test]
    fn enabled_targets_keep_restic_first() {
        let session = Session {
            name: "s".to_string(),
            hostname: "h".to_string(),
            destination: "/d".to_string(),
            sources: vec![PathBuf::from("/a")],
            masks: Vec::new(),
            check_hostname: false,
            restic: ResticTarget::default(),
            rsync: RsyncTarget {
                enable: true,
                ..RsyncTarget::default()
            },
        };
        let tools: Vec<BackupTool> = enabled_targets(&session).iter().map(|t| t.tool()).collect();
        assert_eq!(tools, vec![BackupTool::Restic, BackupTool::Rsync]);
    }
}
