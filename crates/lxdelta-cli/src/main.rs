mod cli;
mod cmd;
mod config_gen;
mod format;
mod table;

use clap::Parser;

use lxdelta_core::config::{self, LxdeltaConfig};

use cli::{BackupArgs, Cli, Commands};
use config_gen::run_config_generate;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Backup(BackupArgs::default()));
    tracing::debug!(command = command.name(), "dispatching");

    let result = match &command {
        Commands::Config { dest } => run_config_generate(dest.as_deref()),
        Commands::Fingerprint { archive, output } => {
            cmd::fingerprint::run_fingerprint(archive, output.as_deref())
        }
        Commands::Diff {
            baseline_fingerprints,
            archive,
        } => cmd::diff::run_diff(baseline_fingerprints, archive),
        Commands::Backup(args) => load_config(cli.config.as_deref())
            .and_then(|cfg| cmd::backup::run_backup(&cfg, args)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Resolve and load the config file, or fall back to built-in defaults when
/// none of the search locations has one.
fn load_config(cli_config: Option<&str>) -> Result<LxdeltaConfig, Box<dyn std::error::Error>> {
    let source = config::resolve_config_path(cli_config);
    match &source {
        Some(source) => tracing::info!("Using config: {source}"),
        None => {
            tracing::info!("No configuration file found, using built-in defaults");
            for (path, level) in config::default_config_search_paths() {
                tracing::debug!("searched {} ({level})", path.display());
            }
        }
    }
    Ok(config::load_or_default(source.as_ref())?)
}
