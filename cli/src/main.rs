//! Command line program for running the relay gateway.

#[macro_use]
extern crate log;

mod check;
mod cli;
mod serve;
mod tracing;

use std::time::Duration;

use colored::*;

fn main() {
    let mut runtime = tokio::runtime::Builder::new_multi_thread();

    // Allow specifying number of worker threads for the runtime.
    //
    // NOTE: one can also use the `TOKIO_WORKER_THREADS` environment variable
    // to set this value instead of passing it as a CLI argument.
    let matches = cli::arg_matches();
    if let Some(threads) = matches.get_one::<usize>("threads") {
        runtime.worker_threads(*threads);
    }

    let runtime = match runtime.enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("{}failed building tokio runtime: {}", "error: ".red(), e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(cli::start(matches));

    debug!(
        "runtime: shutting down ({} tasks remain active)",
        runtime.metrics().num_alive_tasks()
    );
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Err(e) = result {
        println!("{}{}", "error: ".red(), e);
        if e.root_cause().to_string() != e.to_string() {
            println!("Caused by:\n{}", e.root_cause())
        }
        std::process::exit(1);
    }
}
