use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Config, RuntimeConfig, Session, SessionConfig};
use crate::error::{BareError, ConfigError, Result};
use crate::mount::DEFAULT_MOUNT_TIMEOUT;
use crate::types::MaskBackendKind;
use crate::util::host::local_hostname;
use crate::util::paths::{home_dir, is_safe_name};

pub const DEFAULT_SESSION_FILE: &str = "session.yml";

/// `--config` wins; then `session.yml` in the working directory; then the
/// per-user file under `~/.config/bare`.
pub fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(DEFAULT_SESSION_FILE);
    if local.exists() {
        return Some(local);
    }
    let user = home_dir()
        .join(".config")
        .join("bare")
        .join(DEFAULT_SESSION_FILE);
    user.exists().then_some(user)
}

pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return parse_runtime(Config::default(), &local_hostname());
    };
    let contents = fs::read_to_string(path).map_err(BareError::Io)?;
    parse_config(&contents, &local_hostname())
}

pub fn parse_config(contents: &str, local_host: &str) -> Result<RuntimeConfig> {
    let cfg: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?
    };
    parse_runtime(cfg, local_host)
}

fn parse_runtime(cfg: Config, local_host: &str) -> Result<RuntimeConfig> {
    let mask_backend = match cfg.mask_backend.as_deref() {
        Some(raw) => raw
            .parse::<MaskBackendKind>()
            .map_err(ConfigError::Invalid)?,
        None => MaskBackendKind::default(),
    };

    let mut names = HashSet::new();
    let mut sessions = Vec::new();
    for session in cfg.sessions {
        if !names.insert(session.name.clone()) {
            return Err(ConfigError::Invalid(format!("duplicate session name {}", session.name)).into());
        }
        sessions.push(build_session(session, local_host)?);
    }

    Ok(RuntimeConfig {
        sessions,
        mount_base: cfg.mount_base.unwrap_or_else(std::env::temp_dir),
        mask_backend,
        remotes: cfg.remotes,
        discover_remotes: cfg.discover_remotes,
        mount_timeout_secs: cfg
            .mount_timeout_secs
            .unwrap_or(DEFAULT_MOUNT_TIMEOUT.as_secs()),
        low_priority: cfg.low_priority,
    })
}

/// Structural validation only. Mask arity is checked per session by the
/// orchestrator so one bad session does not block the others.
pub fn build_session(cfg: SessionConfig, local_host: &str) -> Result<Session> {
    if cfg.name.trim().is_empty() {
        return Err(ConfigError::Invalid("session name is required".to_string()).into());
    }
    if !is_safe_name(&cfg.name) {
        return Err(ConfigError::Invalid(format!(
            "session {} name must use only letters, digits, '.', '-', '_'",
            cfg.name
        ))
        .into());
    }
    let destination = match cfg.destination {
        Some(dest) if !dest.trim().is_empty() => dest,
        _ => {
            return Err(ConfigError::MissingField {
                session: cfg.name,
                field: "destination",
            }
            .into())
        }
    };
    let sources: Vec<PathBuf> = match cfg.source {
        Some(source) => source.into_vec().into_iter().map(PathBuf::from).collect(),
        None => {
            return Err(ConfigError::MissingField {
                session: cfg.name,
                field: "source",
            }
            .into())
        }
    };
    if sources.is_empty() || sources.iter().any(|s| s.as_os_str().is_empty()) {
        return Err(ConfigError::Invalid(format!("session {}: source path is empty", cfg.name)).into());
    }
    let masks = cfg
        .mask
        .map(|m| m.into_vec().into_iter().map(PathBuf::from).collect())
        .unwrap_or_default();
    if cfg.restic.password.is_some() && cfg.restic.password_file.is_some() {
        return Err(ConfigError::Invalid(format!(
            "session {}: set restic password or password_file, not both",
            cfg.name
        ))
        .into());
    }

    Ok(Session {
        hostname: cfg
            .hostname
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| local_host.to_string()),
        name: cfg.name,
        destination,
        sources,
        masks,
        check_hostname: cfg.check_hostname,
        restic: cfg.restic,
        rsync: cfg.rsync,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
mount_base: "/run/bare"
mask_backend: native
remotes: ["gdrive"]
sessions:
  - name: "home"
    destination: "MYDRIVE"
    source: ["/home/user", "/etc"]
    mask: ["/home/me", "/etc"]
    check_hostname: true
    restic:
      password: "secret"
      args:
        exclude: ["*.tmp", "cache"]
      forget:
        keep-daily: 7
    rsync:
      enable: true
  - name: "cloud"
    hostname: "laptop"
    destination: "gdrive:backups"
    source: "/srv"
"#;

    #[test]
    fn load_config_with_sessions() {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(YAML.as_bytes()).expect("write");
        let cfg = load_config(Some(file.path())).expect("load");
        assert_eq!(cfg.sessions.len(), 2);
        assert_eq!(cfg.mount_base, PathBuf::from("/run/bare"));
        assert_eq!(cfg.mask_backend, MaskBackendKind::Native);
        assert_eq!(cfg.mount_timeout_secs, 30);
        assert!(cfg.discover_remotes);

        let home = &cfg.sessions[0];
        assert_eq!(home.sources.len(), 2);
        assert_eq!(home.masks, vec![PathBuf::from("/home/me"), PathBuf::from("/etc")]);
        assert!(home.restic.enable && home.rsync.enable);
        assert!(home.restic.forget.is_some());
        assert_eq!(home.restic.repository_folder, "restic");

        let cloud = &cfg.sessions[1];
        assert_eq!(cloud.hostname, "laptop");
        assert_eq!(cloud.sources, vec![PathBuf::from("/srv")]);
        assert!(cloud.masks.is_empty());
        assert!(!cloud.rsync.enable);
    }

    #[test]
    fn hostname_defaults_to_local_host() {
        let cfg = parse_config(
            "sessions:\n  - name: a\n    destination: /x\n    source: /y\n",
            "myhost",
        )
        .expect("parse");
        assert_eq!(cfg.sessions[0].hostname, "myhost");
        assert_eq!(cfg.mask_backend, MaskBackendKind::Proot);
    }

    #[test]
    fn missing_destination_is_rejected() {
        let err = parse_config("sessions:\n  - name: a\n    source: /y\n", "h").expect_err("missing");
        assert!(matches!(
            err,
            BareError::Config(ConfigError::MissingField { field: "destination", .. })
        ));
    }

    #[test]
    fn duplicate_and_unsafe_names_are_rejected() {
        let dup = "sessions:\n  - {name: a, destination: /x, source: /y}\n  - {name: a, destination: /x, source: /y}\n";
        assert!(parse_config(dup, "h").is_err());
        let unsafe_name = "sessions:\n  - {name: 'a b', destination: /x, source: /y}\n";
        assert!(parse_config(unsafe_name, "h").is_err());
        assert!(parse_config("mask_backend: chroot\n", "h").is_err());
    }

    #[test]
    fn mask_arity_is_left_to_the_orchestrator() {
        let yaml = "sessions:\n  - {name: a, destination: /x, source: [/a, /b], mask: [/m1]}\n";
        let cfg = parse_config(yaml, "h").expect("parse");
        assert_eq!(cfg.sessions[0].masks.len(), 1);
    }

    #[test]
    fn example_file_parses() {
        let cfg = parse_config(include_str!("../../session.example.yml"), "h").expect("parse");
        assert_eq!(cfg.sessions.len(), 2);
        assert!(cfg.low_priority);
        assert_eq!(cfg.sessions[0].masks.len(), cfg.sessions[0].sources.len());
    }

    #[test]
    fn empty_file_means_no_sessions() {
        let cfg = parse_config("", "h").expect("parse");
        assert!(cfg.sessions.is_empty());
        assert_eq!(cfg.mount_base, std::env::temp_dir());
    }
}
