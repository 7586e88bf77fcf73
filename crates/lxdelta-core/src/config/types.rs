use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::deserialize::*;
use super::hooks::HooksConfig;
use crate::delta::DeltaBuilder;
use crate::error::{LxdeltaError, Result};
use crate::layout::BackupLayout;
use crate::platform::paths::expand_tilde;
use crate::retention::RetentionRotator;
use crate::runtime::EntityFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LxdeltaConfig {
    /// Directory receiving archives, fingerprint files and status logs.
    #[serde(
        default = "default_target",
        deserialize_with = "deserialize_strict_string"
    )]
    pub target: String,
    /// File name prefix of every artifact.
    #[serde(
        default = "default_prefix",
        deserialize_with = "deserialize_strict_string"
    )]
    pub prefix: String,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub containers: FilterConfig,
    #[serde(default)]
    pub hosts: FilterConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl Default for LxdeltaConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            prefix: default_prefix(),
            compression: CompressionConfig::default(),
            rotation: RotationConfig::default(),
            containers: FilterConfig::default(),
            hosts: FilterConfig::default(),
            runtime: RuntimeConfig::default(),
            hooks: HooksConfig::default(),
        }
    }
}

impl LxdeltaConfig {
    /// Reject combinations serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(LxdeltaError::Config("target must not be empty".into()));
        }
        if self.prefix.contains('/') || self.prefix.contains('\0') {
            return Err(LxdeltaError::Config(format!(
                "prefix '{}' must not contain path separators",
                self.prefix
            )));
        }
        self.compression.validate()?;
        self.containers.validate("containers")?;
        self.hosts.validate("hosts")?;
        self.runtime.command_timeout()?;
        self.runtime.export_timeout()?;
        if self.runtime.binary.trim().is_empty() {
            return Err(LxdeltaError::Config(
                "runtime.binary must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Artifact naming rooted at the tilde-expanded target.
    pub fn layout(&self) -> BackupLayout {
        BackupLayout::new(expand_tilde(&self.target), self.prefix.clone())
    }

    pub fn rotator(&self) -> RetentionRotator {
        RetentionRotator::new(self.rotation.week_rollover)
    }

    pub fn delta_builder(&self) -> DeltaBuilder {
        DeltaBuilder::new(self.compression.zstd_level)
    }

    pub fn entity_filter(&self) -> EntityFilter {
        EntityFilter {
            include_containers: self.containers.include.clone(),
            exclude_containers: self.containers.exclude.clone(),
            include_hosts: self.hosts.include.clone(),
            exclude_hosts: self.hosts.exclude.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            zstd_level: default_zstd_level(),
        }
    }
}

impl CompressionConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=22).contains(&self.zstd_level) {
            return Err(LxdeltaError::Config(format!(
                "compression.zstd_level must be between 1 and 22, got {}",
                self.zstd_level
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotationConfig {
    /// Day on which the weekly delta slot is evicted.
    #[serde(default = "default_week_rollover")]
    pub week_rollover: Weekday,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            week_rollover: default_week_rollover(),
        }
    }
}

/// Name-based selection. `include` and `exclude` cannot both be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub exclude: Vec<String>,
}

impl FilterConfig {
    fn validate(&self, kind: &str) -> Result<()> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(LxdeltaError::Config(format!(
                "{kind}.include and {kind}.exclude are mutually exclusive"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Container manager client, looked up on `PATH` unless it contains a slash.
    #[serde(
        default = "default_runtime_binary",
        deserialize_with = "deserialize_strict_string"
    )]
    pub binary: String,
    /// Limit for list, stop, start and profile commands.
    #[serde(
        default = "default_command_timeout",
        deserialize_with = "deserialize_duration_string"
    )]
    pub command_timeout: String,
    /// Limit for a single export.
    #[serde(
        default = "default_export_timeout",
        deserialize_with = "deserialize_duration_string"
    )]
    pub export_timeout: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_runtime_binary(),
            command_timeout: default_command_timeout(),
            export_timeout: default_export_timeout(),
        }
    }
}

impl RuntimeConfig {
    pub fn command_timeout(&self) -> Result<Duration> {
        parse_human_duration(&self.command_timeout)
            .map_err(|e| field_error("runtime.command_timeout", e))
    }

    pub fn export_timeout(&self) -> Result<Duration> {
        parse_human_duration(&self.export_timeout)
            .map_err(|e| field_error("runtime.export_timeout", e))
    }
}

fn field_error(field: &str, err: LxdeltaError) -> LxdeltaError {
    match err {
        LxdeltaError::Config(msg) => LxdeltaError::Config(format!("{field}: {msg}")),
        other => other,
    }
}
