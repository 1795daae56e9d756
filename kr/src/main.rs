//! KREPS - duel shell
//!
//! CLI entry point: interactive shell, one-shot duel, and the hidden
//! challenger entry used by spawned duel participants.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use kreps::cli::{Cli, Command, get_log_path};
use kreps::config::Config;
use kreps::duel::{ChallengerParams, DuelCoordinator, SignalInbox, Termination, run_challenger};
use kreps::shell::{self, termination_requested};

fn parse_level(s: &str) -> Option<tracing::Level> {
    match s.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    // Both duel processes write here, so append instead of truncating
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(pid = std::process::id(), "Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A spawned challenger claims the duel signals before touching anything else
    let challenger_inbox = match cli.command {
        Some(Command::Challenger { .. }) => {
            Some(SignalInbox::install().context("Failed to register duel signal handlers")?)
        }
        _ => None,
    };

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    // A challenger that cannot log must still play, or its peer waits forever
    if let Err(e) = setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()) {
        eprintln!("Warning: Failed to setup logging: {:#}", e);
    }

    let config_path = cli.config.clone();
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        // The challenger's configuration travels in its parameters
        Some(Command::Challenger { params }) => {
            let inbox = challenger_inbox.ok_or_else(|| eyre!("Duel signal handlers missing"))?;
            cmd_challenger(&params, inbox).await
        }
        Some(Command::Duel { verbose }) => {
            let config = load_config(config_path.as_ref())?;
            cmd_duel(&config, verbose).await
        }
        Some(Command::Shell { commands }) => {
            let config = load_config(config_path.as_ref())?;
            shell::run_interactive(&config, &commands).await
        }
        None => {
            let config = load_config(config_path.as_ref())?;
            shell::run_interactive(&config, &[]).await
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Fight one duel as root and print the report
async fn cmd_duel(config: &Config, verbose: bool) -> Result<()> {
    debug!(verbose, "cmd_duel: called");
    let coordinator = DuelCoordinator::new(config.duel.clone())?.with_narration(verbose);
    let report = coordinator
        .spawn_duel_until(termination_requested())
        .await
        .context("Duel failed")?;
    println!("{} {}", "✓".green(), report.message);
    Ok(())
}

/// Play the challenger side, then leave the way the termination rule says
async fn cmd_challenger(raw: &str, inbox: SignalInbox) -> Result<()> {
    debug!("cmd_challenger: called");
    let params = ChallengerParams::decode(raw).context("Failed to decode challenger parameters")?;
    match run_challenger(params, inbox).await? {
        Termination::ExitSilently => {
            debug!("cmd_challenger: exiting silently");
            std::process::exit(0)
        }
        Termination::Report(report) => {
            println!("{}", report.message);
            Ok(())
        }
    }
}
