use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Container, ContainerRuntime, ContainerState};
use crate::config::RuntimeConfig;
use crate::error::{LxdeltaError, Result};
use crate::platform::paths::find_executable;
use crate::platform::shell::run_command_with_timeout;

/// Sidecar name used when a container has no profiles attached.
const NO_PROFILE: &str = "none";

/// [`ContainerRuntime`] backed by the `lxc` command line client.
#[derive(Debug, Clone)]
pub struct LxcRuntime {
    binary: String,
    command_timeout: Duration,
    export_timeout: Duration,
}

impl LxcRuntime {
    pub fn new(binary: impl Into<String>, command_timeout: Duration, export_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            command_timeout,
            export_timeout,
        }
    }

    pub fn from_config(cfg: &RuntimeConfig) -> Result<Self> {
        Ok(Self::new(
            cfg.binary.clone(),
            cfg.command_timeout()?,
            cfg.export_timeout()?,
        ))
    }

    /// Resolve the client binary, failing early when it is not installed.
    pub fn check_available(&self) -> Result<PathBuf> {
        find_executable(&self.binary).ok_or_else(|| {
            LxdeltaError::Runtime(format!("'{}' not found in PATH", self.binary))
        })
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<Vec<u8>> {
        let rendered = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %rendered, "running container runtime command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        let output = run_command_with_timeout(&mut cmd, timeout)
            .map_err(|e| LxdeltaError::Runtime(format!("failed to run '{rendered}': {e}")))?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LxdeltaError::Runtime(format!(
                "'{rendered}' failed (exit code {code}): {}",
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn profile_text(&self, profile: &str) -> Result<String> {
        let out = self.run(&["profile", "show", profile], self.command_timeout)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

impl ContainerRuntime for LxcRuntime {
    fn list(&self) -> Result<Vec<Container>> {
        let out = self.run(&["list", "-c", "nsLP", "-f", "csv"], self.command_timeout)?;
        let rows = parse_list(&out)?;

        let mut profiles: HashMap<String, String> = HashMap::new();
        let mut containers = Vec::with_capacity(rows.len());
        for row in rows {
            for name in &row.profiles {
                if !profiles.contains_key(name) {
                    profiles.insert(name.clone(), self.profile_text(name)?);
                }
            }
            let docs: Vec<&str> = row
                .profiles
                .iter()
                .filter_map(|name| profiles.get(name).map(String::as_str))
                .collect();

            if let ContainerState::Other(state) = &row.state {
                warn!(container = %row.name, state = %state, "unexpected container state, exporting as is");
            }

            containers.push(Container {
                profile_name: profile_name(&row.profiles),
                profile: docs.join("---\n"),
                name: row.name,
                host: row.host,
                state: row.state,
            });
        }
        Ok(containers)
    }

    fn stop(&self, name: &str) -> Result<()> {
        info!(container = %name, "stopping container");
        self.run(&["stop", name], self.command_timeout).map(drop)
    }

    fn start(&self, name: &str) -> Result<()> {
        info!(container = %name, "starting container");
        self.run(&["start", name], self.command_timeout).map(drop)
    }

    fn export(&self, name: &str, destination: &Path) -> Result<()> {
        let dest = destination.to_string_lossy();
        info!(container = %name, path = %dest, "exporting container");
        self.run(
            &[
                "export",
                name,
                &dest,
                "--instance-only",
                "-q",
                "--compression",
                "zstd",
            ],
            self.export_timeout,
        )
        .map(drop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListRow {
    name: String,
    state: ContainerState,
    host: String,
    profiles: Vec<String>,
}

/// Parse `list -c nsLP -f csv` output: name, state, location, profiles.
/// Multiple profiles arrive newline separated inside one quoted field.
fn parse_list(raw: &[u8]) -> Result<Vec<ListRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| LxdeltaError::Runtime(format!("cannot parse container list: {e}")))?;
        if record.len() < 4 {
            return Err(LxdeltaError::Runtime(format!(
                "container list row has {} fields, expected 4",
                record.len()
            )));
        }
        rows.push(ListRow {
            name: record[0].to_string(),
            state: ContainerState::parse(&record[1]),
            host: record[2].trim().to_string(),
            profiles: record[3]
                .split(|c: char| c == '\n' || c == ',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        });
    }
    Ok(rows)
}

fn profile_name(profiles: &[String]) -> String {
    if profiles.is_empty() {
        NO_PROFILE.to_string()
    } else {
        profiles.join("+")
    }
}
