use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use restic_runner::config::{
    configuration_file_paths, load_config, possible_config_paths, Config, LogConfig,
};
use restic_runner::managers::logging::{self, LoggingConfig};
use restic_runner::{write_metrics, Action, ResticRunner};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "restic-runner")]
#[command(about = "Run restic actions over configured repositories and export their metrics", long_about = None)]
#[command(version)]
struct Cli {
    /// Actions to run, in canonical order (default: backup forget prune check, plus stats
    /// when Prometheus metrics are configured)
    #[arg(value_enum)]
    actions: Vec<Action>,

    /// Configuration file (default: discovered under /etc and the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pass --dry-run to restic where supported; skip init and unlock
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warning, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Let restic report progress every SECONDS
    #[arg(long, value_name = "SECONDS")]
    show_progress: Option<f64>,

    /// Extra arguments appended to every restic command; unknown flags and
    /// values before `--` are passed along as well
    #[arg(last = true)]
    restic_args: Vec<String>,
}

fn main() -> Result<()> {
    let args = std::env::args_os().map(|arg| arg.to_string_lossy().into_owned());
    let cli = Cli::parse_from(split_restic_args(args));

    let level = logging::parse_level(&cli.log_level);
    let configs = logging::with_console_logging(level, || load_configs(cli.config.as_deref()))?;

    let default_log = LogConfig::default();
    let log = configs.first().map(|c| &c.logging).unwrap_or(&default_log);
    let _log_guard = logging::init_logging(&LoggingConfig::from_config(&cli.log_level, log))?;

    let mut errors = 0;
    for config in configs {
        if which::which(&config.restic_binary).is_err() {
            warn!("restic binary '{}' not found in PATH", config.restic_binary);
        }

        info!("Using configuration '{}'", config.name);
        let mut runner = ResticRunner::new(config, cli.dry_run, cli.restic_args.clone());
        if let Some(seconds) = cli.show_progress {
            runner = runner.show_progress(seconds);
        }

        errors += runner.run(&cli.actions);

        if let Err(e) = write_metrics(runner.metrics(), runner.config()) {
            error!("{:#}", e);
            errors += 1;
        }
    }

    if errors > 0 {
        error!("Finished with {} error(s)", errors);
        std::process::exit(1);
    }

    Ok(())
}

/// The explicit configuration, or every discovered one
fn load_configs(explicit: Option<&Path>) -> Result<Vec<Config>> {
    let paths = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => {
            let candidates = possible_config_paths();
            let paths = configuration_file_paths(&candidates);
            if paths.is_empty() {
                bail!("No configuration file found in {:?}", candidates);
            }
            paths
        }
    };

    paths
        .iter()
        .map(|path| {
            load_config(path)
                .with_context(|| format!("Invalid configuration {}", path.display()))
        })
        .collect()
}

/// Move everything clap does not know about behind `--`
///
/// Known flags (with their values) and action names stay in place; any
/// other token before `--` becomes a restic argument, ahead of the ones
/// already given after `--`.
fn split_restic_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut command = Cli::command();
    command.build();
    let known_flag = |token: &str| -> Option<bool> {
        command
            .get_arguments()
            .find(|arg| match token.strip_prefix("--") {
                Some(long) => arg.get_long() == Some(long),
                None => {
                    let mut chars = token.chars().skip(1);
                    match (chars.next(), chars.next()) {
                        (Some(short), None) => arg.get_short() == Some(short),
                        _ => false,
                    }
                }
            })
            .map(|arg| arg.get_action().takes_values())
    };

    let mut args = args.into_iter();
    let mut known: Vec<String> = args.next().into_iter().collect();
    let mut extra = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--" {
            extra.extend(args.by_ref());
            break;
        }

        if arg.starts_with('-') && arg.len() > 1 {
            let flag = arg.split_once('=').map_or(arg.as_str(), |(flag, _)| flag);
            match known_flag(flag) {
                Some(takes_value) => {
                    let pull_value = takes_value && !arg.contains('=');
                    known.push(arg);
                    if pull_value {
                        known.extend(args.next());
                    }
                }
                None => extra.push(arg),
            }
        } else if Action::from_str(&arg, false).is_ok() {
            known.push(arg);
        } else {
            extra.push(arg);
        }
    }

    if !extra.is_empty() {
        known.push("--".to_string());
        known.extend(extra);
    }
    known
}
