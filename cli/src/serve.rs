use std::net::SocketAddr;

use anyhow::Result;
use clap::{value_parser, Arg, ArgMatches, Command};
use tokio_util::sync::CancellationToken;

use relaygate::{server, Gateway};

pub fn cmd() -> Command {
    Command::new("serve")
        .about("Start the gateway")
        .long_about(
            "Start the gateway. Relay requests are accepted over http at \n\
            `/v1/<application-id>` and `/v1/lb/<load-balancer-id>`, with a json body \n\
            naming the chain and carrying the payload.\n\n\
            `relaygate serve --data-dir ./data --dispatch-urls http://localhost:8081`",
        )
        .display_order(1)
        .args(crate::cli::config_args())
        .arg(
            Arg::new("listener")
                .long("listener")
                .short('l')
                .value_name("address")
                .value_parser(value_parser!(SocketAddr))
                .help("Address to listen for relay requests on"),
        )
}

pub async fn start(matches: &ArgMatches, cancel: CancellationToken) -> Result<()> {
    let mut config = crate::cli::config(matches)?;
    if let Some(listener) = matches.get_one::<SocketAddr>("listener") {
        config.listener = *listener;
    }

    let gateway = Gateway::from_config(&config)?;
    let handle = server::spawn(config.listener, gateway.relay, cancel)?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(
        "relaygate@{} v{} serving relays on {}",
        host,
        crate::cli::VERSION,
        handle.listener
    );

    Ok(())
}
