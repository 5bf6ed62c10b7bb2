//! Command-line application for running the gateway and checking chain
//! support of applications.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{value_parser, Arg, ArgMatches, Command};
use tokio_util::sync::CancellationToken;

use relaygate::Config;

use crate::tracing::LogLevel;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn arg_matches() -> ArgMatches {
    let cmd = Command::new("relaygate")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .version(VERSION)
        .about("Relay RPC requests to sessions of blockchain nodes.")
        .arg(
            Arg::new("verbosity")
                .long("verbosity")
                .short('v')
                .display_order(100)
                .value_name("level")
                .default_value("info")
                .value_parser(["trace", "debug", "info", "warn", "error", "none"])
                .global(true)
                .help("Set the verbosity of the log output"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(usize))
                .global(true)
                .help("Number of runtime worker threads"),
        )
        .subcommand(crate::serve::cmd())
        .subcommand(crate::check::cmd());

    cmd.get_matches()
}

/// Runs based on specified subcommand.
pub async fn start(matches: ArgMatches) -> Result<()> {
    init_logging(&matches)?;

    // Set up the mechanism for graceful shutdown
    let cancel = CancellationToken::new();

    match matches.subcommand() {
        Some(("serve", m)) => {
            crate::serve::start(m, cancel.clone()).await?;
            wait_for_shutdown(cancel).await;
        }
        Some(("check", m)) => {
            let _cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    _cancel.cancel();
                }
            });
            crate::check::start(m, cancel).await?;
        }
        _ => (),
    }

    Ok(())
}

/// Waits for either ctrl_c signal or cancellation trigger.
async fn wait_for_shutdown(cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("Initiating graceful shutdown...");
            cancel.cancel();
        },
        _ = cancel.cancelled() => (),
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
}

/// Arguments shared by subcommands that build the gateway.
pub fn config_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .long("config")
            .short('c')
            .value_name("path")
            .value_parser(value_parser!(PathBuf))
            .help("Path to a toml configuration file"),
        Arg::new("data-dir")
            .long("data-dir")
            .short('d')
            .value_name("path")
            .value_parser(value_parser!(PathBuf))
            .help("Directory holding the blockchain, application and load balancer documents"),
        Arg::new("dispatch-urls")
            .long("dispatch-urls")
            .num_args(1..)
            .value_delimiter(',')
            .value_name("url")
            .help("Session dispatch endpoints, tried in order"),
    ]
}

/// Builds the configuration from the optional config file with command line
/// overrides applied on top.
pub fn config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(dir) = matches.get_one::<PathBuf>("data-dir") {
        config.data_dir = dir.clone();
    }
    if let Some(urls) = matches.get_many::<String>("dispatch-urls") {
        config.dispatch_urls = urls.cloned().collect();
    }

    Ok(config)
}

/// Sets up logging based on settings from the matches.
fn init_logging(matches: &ArgMatches) -> Result<()> {
    let log_level = match matches.get_one::<String>("verbosity") {
        Some(s) => match s.as_str() {
            "0" | "none" => Some(LogLevel::Off),
            "1" | "err" | "error" | "min" => Some(LogLevel::Error),
            "2" | "warn" | "warning" | "default" => Some(LogLevel::Warn),
            "3" | "info" => Some(LogLevel::Info),
            "4" | "debug" => Some(LogLevel::Debug),
            "5" | "trace" | "max" | "all" => Some(LogLevel::Trace),
            _ => None,
        },
        _ => None,
    };
    crate::tracing::init(log_level)
}
