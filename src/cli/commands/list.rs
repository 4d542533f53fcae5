use std::path::{Path, PathBuf};

use crate::backup::enabled_targets;
use crate::config::load::load_config;
use crate::config::model::Session;
use crate::error::Result;

pub fn run_list(config_path: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    if cfg.sessions.is_empty() {
        println!("no sessions configured");
        return Ok(());
    }
    for session in &cfg.sessions {
        println!("{}", describe_session(session));
    }
    Ok(())
}

pub fn describe_session(session: &Session) -> String {
    let targets: Vec<String> = enabled_targets(session)
        .iter()
        .map(|t| t.tool().to_string())
        .collect();
    let mut lines = vec![
        format!("{}:", session.name),
        format!("  hostname: {}", session.hostname),
        format!("  destination: {}", session.destination),
        format!("  sources: {}", join_paths(&session.sources)),
    ];
    if !session.masks.is_empty() {
        lines.push(format!("  masks: {}", join_paths(&session.masks)));
    }
    if session.check_hostname {
        lines.push("  check_hostname: true".to_string());
    }
    lines.push(format!(
        "  targets: {}",
        if targets.is_empty() { "none".to_string() } else { targets.join(", ") }
    ));
    lines.join("\n")
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load::parse_config;

    #[test]
    fn describes_session() {
        let cfg = parse_config(
            "sessions:\n  - {name: home, hostname: box, destination: MYDRIVE, source: [/home, /etc], mask: [/h, /e], rsync: {enable: true}}\n",
            "box",
        )
        .expect("parse");
        assert_eq!(
            describe_session(&cfg.sessions[0]),
            "home:\n  hostname: box\n  destination: MYDRIVE\n  sources: /home, /etc\n  masks: /h, /e\n  targets: restic, rsync"
        );
    }
}
