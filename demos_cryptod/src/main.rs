use clap::{App, Arg};
use config::Config;
use demos_crypto::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

fn main() {
    let matches = App::new("demos-cryptod")
        .version("0.1")
        .about("DEMOS crypto backend")
        .arg(
            Arg::with_name("address")
                .long("address")
                .short("a")
                .takes_value(true)
                .help("Listen address (unix:<path>, ipv4:<ip>:<port>, ipv6:[<ip>]:<port>) - can also be set with DEMOS_CRYPTOD_ADDRESS"),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .short("w")
                .takes_value(true)
                .help("Worker threads - can also be set with DEMOS_CRYPTOD_WORKERS"),
        )
        .arg(
            Arg::with_name("max-request")
                .long("max-request")
                .takes_value(true)
                .help("Largest accepted request in bytes - can also be set with DEMOS_CRYPTOD_MAX_REQUEST"),
        )
        .arg(
            Arg::with_name("max-ballot-parts")
                .long("max-ballot-parts")
                .takes_value(true)
                .help("Most ballot parts per GenBallot request - can also be set with DEMOS_CRYPTOD_MAX_BALLOT_PARTS"),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .takes_value(true)
                .help("Socket timeout in seconds - can also be set with DEMOS_CRYPTOD_TIMEOUT_SECS"),
        )
        .get_matches();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "bad configuration");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.merge(&matches) {
        error!(error = %e, "bad configuration");
        std::process::exit(1);
    }

    info!(
        address = %config.server.address,
        workers = config.server.workers,
        max_request = config.server.max_request,
        max_ballot_parts = config.server.max_ballot_parts,
        timeout = ?config.server.timeout,
        "starting demos-cryptod"
    );

    let result = Server::bind(config.server).and_then(|server| server.serve());
    if let Err(e) = result {
        error!(error = %e, "demos-cryptod stopped");
        std::process::exit(1);
    }
}
