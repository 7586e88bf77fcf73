use clap::{Args, Parser, Subcommand};

use lxdelta_core::config::LxdeltaConfig;

#[derive(Parser)]
#[command(
    name = "lxdelta",
    version,
    about = "Quarterly baselines and rotating delta backups of LXD containers",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $LXDELTA_CONFIG             (environment variable)
  3. ./lxdelta.yaml              (project)
  4. $XDG_CONFIG_HOME or ~/.config + /lxdelta/config.yaml (user)
  5. /etc/lxdelta/config.yaml    (system)
Built-in defaults are used when no file is found.

Environment variables:
  LXDELTA_CONFIG    Path to configuration file (overrides default search)"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides LXDELTA_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Back up every selected container (the default command)
    Backup(BackupArgs),

    /// Fingerprint an archive and persist the table
    Fingerprint {
        /// Compressed archive to fingerprint
        archive: String,

        /// Where to write the table (default: <ARCHIVE>.md5sum)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show what changed in an archive relative to a fingerprint table
    Diff {
        /// Persisted fingerprint table of the baseline
        baseline_fingerprints: String,

        /// Compressed archive to compare
        archive: String,
    },

    /// Generate a starter configuration file
    Config {
        /// Destination path (prompts for a location when omitted)
        dest: Option<String>,
    },
}

impl Commands {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Commands::Backup(_) => "backup",
            Commands::Fingerprint { .. } => "fingerprint",
            Commands::Diff { .. } => "diff",
            Commands::Config { .. } => "config",
        }
    }
}

/// Flags that override the configuration file for one backup run.
#[derive(Args, Default, Debug, Clone)]
pub(crate) struct BackupArgs {
    /// Directory receiving baselines, deltas and status logs
    #[arg(short = 'b', long)]
    pub target: Option<String>,

    /// File name prefix for every artifact
    #[arg(long)]
    pub prefix: Option<String>,

    /// Only back up these containers (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub include_containers: Vec<String>,

    /// Skip these containers (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude_containers: Vec<String>,

    /// Only back up containers on these cluster members (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub include_hosts: Vec<String>,

    /// Skip containers on these cluster members (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude_hosts: Vec<String>,
}

impl BackupArgs {
    /// Apply the flags on top of `config`. A non-empty flag replaces the
    /// configured list of the same kind and clears its opposite.
    pub(crate) fn apply(&self, config: &mut LxdeltaConfig) {
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if !self.include_containers.is_empty() {
            config.containers.include = self.include_containers.clone();
            config.containers.exclude.clear();
        }
        if !self.exclude_containers.is_empty() {
            config.containers.exclude = self.exclude_containers.clone();
            if self.include_containers.is_empty() {
                config.containers.include.clear();
            }
        }
        if !self.include_hosts.is_empty() {
            config.hosts.include = self.include_hosts.clone();
            config.hosts.exclude.clear();
        }
        if !self.exclude_hosts.is_empty() {
            config.hosts.exclude = self.exclude_hosts.clone();
            if self.include_hosts.is_empty() {
                config.hosts.include.clear();
            }
        }
    }
}
