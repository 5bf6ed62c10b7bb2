use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use tokio_util::sync::CancellationToken;

use relaygate::Gateway;

pub fn cmd() -> Command {
    Command::new("check")
        .about("Check which session nodes of an application support the given chains")
        .display_order(2)
        .arg(
            Arg::new("application")
                .value_name("application-id")
                .required(true),
        )
        .arg(
            Arg::new("chains")
                .value_name("chain")
                .num_args(1..)
                .required(true)
                .help("Chain ids or aliases"),
        )
        .args(crate::cli::config_args())
}

/// Prints supporting nodes per session key as json.
pub async fn start(matches: &ArgMatches, cancel: CancellationToken) -> Result<()> {
    let config = crate::cli::config(matches)?;
    let gateway = Gateway::from_config(&config)?;

    let application_id = matches
        .get_one::<String>("application")
        .map(String::as_str)
        .unwrap_or_default();
    let application = gateway.repository.application(application_id).await?;

    let mut chains = Vec::new();
    for alias in matches.get_many::<String>("chains").into_iter().flatten() {
        chains.push(gateway.repository.blockchain(alias).await?);
    }

    let supporting = gateway
        .chain_checker
        .nodes_supporting_app(&cancel, &application, &chains)
        .await?;
    if cancel.is_cancelled() {
        warn!("chain check interrupted, results are partial");
    }

    println!("{}", serde_json::to_string_pretty(&supporting)?);
    Ok(())
}
