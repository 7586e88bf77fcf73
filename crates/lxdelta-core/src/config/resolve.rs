use std::fmt;
use std::path::{Path, PathBuf};

use super::types::LxdeltaConfig;
use crate::error::{LxdeltaError, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "LXDELTA_CONFIG";

/// Tracks where the config file was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly passed via `--config`.
    CliArg(PathBuf),
    /// Set via the `LXDELTA_CONFIG` env var.
    EnvVar(PathBuf),
    /// Found by searching standard locations.
    SearchOrder { path: PathBuf, level: &'static str },
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) => p,
            ConfigSource::EnvVar(p) => p,
            ConfigSource::SearchOrder { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} ({CONFIG_ENV_VAR})", p.display()),
            ConfigSource::SearchOrder { path, level } => {
                write!(f, "{} ({})", path.display(), level)
            }
        }
    }
}

/// Returns search locations in priority order: project, user, system.
pub fn default_config_search_paths() -> Vec<(PathBuf, &'static str)> {
    let mut paths = vec![(PathBuf::from("lxdelta.yaml"), "project")];

    let user_config = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|base| base.join("lxdelta").join("config.yaml"));
    if let Some(p) = user_config {
        paths.push((p, "user"));
    }

    paths.push((PathBuf::from("/etc/lxdelta/config.yaml"), "system"));
    paths
}

/// Resolve which config file to use.
///
/// Priority: CLI arg > `LXDELTA_CONFIG` env var > first existing file from
/// search paths. Returns `None` if nothing is found; callers then run on
/// built-in defaults.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }

    if let Ok(val) = std::env::var(CONFIG_ENV_VAR) {
        if !val.is_empty() {
            return Some(ConfigSource::EnvVar(PathBuf::from(val)));
        }
    }

    default_config_search_paths()
        .into_iter()
        .find(|(path, _)| path.exists())
        .map(|(path, level)| ConfigSource::SearchOrder { path, level })
}

/// Load, parse and validate a config file. A file holding only comments
/// yields the defaults.
pub fn load_config(path: &Path) -> Result<LxdeltaConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        LxdeltaError::Config(format!("cannot read config '{}': {e}", path.display()))
    })?;
    parse_config(&text)
        .map_err(|e| LxdeltaError::Config(format!("invalid config '{}': {e}", path.display())))
}

/// Load the resolved config, or the defaults when no file was found.
pub fn load_or_default(source: Option<&ConfigSource>) -> Result<LxdeltaConfig> {
    match source {
        Some(source) => load_config(source.path()),
        None => Ok(LxdeltaConfig::default()),
    }
}

fn parse_config(text: &str) -> std::result::Result<LxdeltaConfig, String> {
    let blank = text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    });
    let config = if blank {
        LxdeltaConfig::default()
    } else {
        serde_yaml::from_str::<LxdeltaConfig>(text).map_err(|e| e.to_string())?
    };
    config.validate().map_err(|e| match e {
        LxdeltaError::Config(msg) => msg,
        other => other.to_string(),
    })?;
    Ok(config)
}

/// Returns a commented YAML config template suitable for bootstrapping.
pub fn minimal_config_template() -> &'static str {
    r#"# lxdelta configuration file
# Every setting is optional; the values below are the defaults.

# Directory receiving archives, fingerprint files and status logs.
target: "."

# File name prefix of every artifact.
prefix: "lxd-backup-"

compression:
  zstd_level: 3

rotation:
  # Day on which the weekly delta slot is evicted.
  week_rollover: Mon

runtime:
  binary: "lxc"
  command_timeout: "1h"
  export_timeout: "6h"

# --- Common optional settings (uncomment as needed) ---

# containers:
#   include:
#     - web
#     - db
#
# hosts:
#   exclude: node3
#
# hooks:
#   before: "logger -t lxdelta starting $LXDELTA_ENTITY"
#   failed:
#     - "logger -t lxdelta $LXDELTA_ENTITY failed: $LXDELTA_ERROR"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use chrono::Weekday;

    use crate::config::HooksConfig;

    // Tests that mutate process-global state (env vars, CWD) must be serialized.
    static GLOBAL_STATE: Mutex<()> = Mutex::new(());

    #[test]
    fn test_search_paths_order() {
        let paths = default_config_search_paths();
        assert!(paths.len() >= 2);
        assert_eq!(paths[0].0, PathBuf::from("lxdelta.yaml"));
        assert_eq!(paths[0].1, "project");
        assert_eq!(paths.last().unwrap().1, "system");
        if paths.len() == 3 {
            assert_eq!(paths[1].1, "user");
        }
    }

    #[test]
    fn test_resolve_cli_arg_wins() {
        let _lock = GLOBAL_STATE.lock().unwrap();
        let _guard = EnvGuard::set(CONFIG_ENV_VAR, "/tmp/env-config.yaml");
        let source = resolve_config_path(Some("/tmp/override.yaml")).unwrap();
        assert!(matches!(source, ConfigSource::CliArg(_)));
        assert_eq!(source.path(), Path::new("/tmp/override.yaml"));
    }

    #[test]
    fn test_resolve_env_var() {
        let _lock = GLOBAL_STATE.lock().unwrap();
        let _guard = EnvGuard::set(CONFIG_ENV_VAR, "/tmp/env-config.yaml");
        let source = resolve_config_path(None).unwrap();
        assert!(matches!(source, ConfigSource::EnvVar(_)));
        assert_eq!(source.path(), Path::new("/tmp/env-config.yaml"));
        assert!(source.to_string().contains("LXDELTA_CONFIG"));
    }

    #[test]
    fn test_resolve_search_finds_project() {
        let _lock = GLOBAL_STATE.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lxdelta.yaml"), "target: /srv/backup\n").unwrap();

        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let _env_guard = EnvGuard::set(CONFIG_ENV_VAR, "");

        let result = resolve_config_path(None);
        std::env::set_current_dir(original).unwrap();

        assert!(matches!(
            result.unwrap(),
            ConfigSource::SearchOrder {
                level: "project",
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_nothing_found_uses_defaults() {
        let _lock = GLOBAL_STATE.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let _env_guard = EnvGuard::set(CONFIG_ENV_VAR, "");
        let _xdg_guard = EnvGuard::set("XDG_CONFIG_HOME", dir.path().to_str().unwrap());

        let result = resolve_config_path(None);
        std::env::set_current_dir(original).unwrap();

        if std::path::Path::new("/etc/lxdelta/config.yaml").exists() {
            return;
        }
        assert!(result.is_none());
        assert_eq!(
            load_or_default(result.as_ref()).unwrap(),
            LxdeltaConfig::default()
        );
    }

    #[test]
    fn test_minimal_template_matches_defaults() {
        let parsed = parse_config(minimal_config_template()).unwrap();
        assert_eq!(parsed, LxdeltaConfig::default());
    }

    #[test]
    fn test_comment_only_file_is_default() {
        let parsed = parse_config("# nothing here\n\n").unwrap();
        assert_eq!(parsed, LxdeltaConfig::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/path/config.yaml")).unwrap_err();
        assert!(matches!(err, LxdeltaError::Config(_)));
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
target: /srv/lxd
prefix: "nightly-"
compression:
  zstd_level: 9
rotation:
  week_rollover: sunday
containers:
  exclude: [scratch, ci-runner]
hosts:
  include: node1
runtime:
  binary: /usr/local/bin/lxc
  command_timeout: 90s
  export_timeout: 600
hooks:
  before: "echo start"
  finally:
    - "echo done"
    - "sync"
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.target, "/srv/lxd");
        assert_eq!(config.prefix, "nightly-");
        assert_eq!(config.compression.zstd_level, 9);
        assert_eq!(config.rotation.week_rollover, Weekday::Sun);
        assert_eq!(config.containers.exclude, vec!["scratch", "ci-runner"]);
        assert_eq!(config.hosts.include, vec!["node1"]);
        assert_eq!(config.runtime.command_timeout().unwrap().as_secs(), 90);
        assert_eq!(config.runtime.export_timeout().unwrap().as_secs(), 600);
        assert_eq!(
            config.hooks,
            HooksConfig {
                before: vec!["echo start".into()],
                finally: vec!["echo done".into(), "sync".into()],
                ..Default::default()
            }
        );

        let filter = config.entity_filter();
        assert_eq!(filter.exclude_containers, vec!["scratch", "ci-runner"]);
        assert_eq!(filter.include_hosts, vec!["node1"]);
        assert_eq!(config.layout().target(), Path::new("/srv/lxd"));
    }

    #[test]
    fn test_reject_unknown_fields() {
        let err = parse_config("target: /tmp\nrepositories: []\n").unwrap_err();
        assert!(err.contains("unknown field"), "{err}");

        let err = parse_config("compression:\n  level: 3\n").unwrap_err();
        assert!(err.contains("unknown field"), "{err}");
    }

    #[test]
    fn test_reject_include_and_exclude_together() {
        let yaml = "containers:\n  include: [web]\n  exclude: [db]\n";
        let err = parse_config(yaml).unwrap_err();
        assert!(err.contains("mutually exclusive"), "{err}");

        let yaml = "hosts:\n  include: a\n  exclude: b\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn test_reject_bad_values() {
        assert!(parse_config("compression:\n  zstd_level: 40\n").is_err());
        assert!(parse_config("runtime:\n  export_timeout: 3w\n").is_err());
        assert!(parse_config("rotation:\n  week_rollover: someday\n").is_err());
        assert!(parse_config("prefix: a/b\n").is_err());
    }

    #[test]
    fn test_hooks_reject_bool_in_command_list() {
        let yaml = "hooks:\n  before:\n    - true\n";
        let err = parse_config(yaml).unwrap_err();
        assert!(err.contains("string value must be quoted"), "{err}");
    }

    /// RAII guard to set an env var and restore its previous value on drop.
    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, val: &str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::set_var(key, val);
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }
}
