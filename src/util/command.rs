use std::process::Command;

use crate::error::{BareError, Result};
use crate::types::RunMode;

pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub fn maybe_print_command(cmd: &Command, run_mode: RunMode) {
    if !run_mode.verbose {
        return;
    }
    println!("{}", render_command(cmd));
}

pub fn render_command(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

pub fn command_from_args(args: &[String]) -> Result<Command> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| BareError::message("empty command line"))?;
    let mut cmd = Command::new(program);
    cmd.args(rest);
    Ok(cmd)
}

pub fn run_command(cmd: &mut Command, run_mode: RunMode) -> Result<i32> {
    maybe_print_command(cmd, run_mode);
    let status = cmd
        .status()
        .map_err(|e| BareError::message(format!("{}: {}", cmd.get_program().to_string_lossy(), e)))?;
    Ok(status.code().unwrap_or(1))
}

pub fn run_command_captured(cmd: &mut Command, run_mode: RunMode) -> Result<CommandOutput> {
    maybe_print_command(cmd, run_mode);
    let output = cmd
        .output()
        .map_err(|e| BareError::message(format!("{}: {}", cmd.get_program().to_string_lossy(), e)))?;
    Ok(CommandOutput {
        code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

pub fn low_priority_args(args: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = ["nice", "-n", "19", "ionice", "-c", "3", "-n7"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    out.extend(args);
    out
}

pub fn program_available(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}
