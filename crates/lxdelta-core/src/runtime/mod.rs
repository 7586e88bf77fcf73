//! Container lifecycle capability.
//!
//! The backup run only needs to enumerate entities, stop and start them, and
//! export one to a file. [`ContainerRuntime`] is that narrow surface;
//! [`LxcRuntime`] implements it over the `lxc` client and tests substitute an
//! in-memory double.

mod lxc;

use std::fmt;
use std::path::Path;

use crate::error::{LxdeltaError, Result};

pub use self::lxc::LxcRuntime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    Other(String),
}

impl ContainerState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "RUNNING" => ContainerState::Running,
            "STOPPED" => ContainerState::Stopped,
            other => ContainerState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Running => f.write_str("RUNNING"),
            ContainerState::Stopped => f.write_str("STOPPED"),
            ContainerState::Other(s) => f.write_str(s),
        }
    }
}

/// One backup entity as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    /// Cluster member hosting the container; empty on standalone hosts.
    pub host: String,
    pub state: ContainerState,
    /// Name used in the `<archive>.<profile_name>.profile` sidecar.
    pub profile_name: String,
    /// Profile text stored verbatim in the sidecar.
    pub profile: String,
}

pub trait ContainerRuntime {
    fn list(&self) -> Result<Vec<Container>>;
    fn stop(&self, name: &str) -> Result<()>;
    fn start(&self, name: &str) -> Result<()>;
    /// Write a full export of `name` to `destination`.
    fn export(&self, name: &str, destination: &Path) -> Result<()>;
}

/// Include/exclude selection by container name and host.
///
/// Applied in the order host exclude, host include, container exclude,
/// container include. Empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub include_containers: Vec<String>,
    pub exclude_containers: Vec<String>,
    pub include_hosts: Vec<String>,
    pub exclude_hosts: Vec<String>,
}

impl EntityFilter {
    pub fn validate(&self) -> Result<()> {
        if !self.include_hosts.is_empty() && !self.exclude_hosts.is_empty() {
            return Err(LxdeltaError::Config(
                "hosts can be included or excluded, not both".into(),
            ));
        }
        if !self.include_containers.is_empty() && !self.exclude_containers.is_empty() {
            return Err(LxdeltaError::Config(
                "containers can be included or excluded, not both".into(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, containers: Vec<Container>) -> Vec<Container> {
        containers
            .into_iter()
            .filter(|c| !contains(&self.exclude_hosts, &c.host))
            .filter(|c| self.include_hosts.is_empty() || contains(&self.include_hosts, &c.host))
            .filter(|c| !contains(&self.exclude_containers, &c.name))
            .filter(|c| {
                self.include_containers.is_empty() || contains(&self.include_containers, &c.name)
            })
            .collect()
    }
}

fn contains(list: &[String], value: &str) -> bool {
    list.iter().any(|v| v == value)
}
