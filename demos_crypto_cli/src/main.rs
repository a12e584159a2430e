use clap::{App, AppSettings, Arg, SubCommand};
use demos_crypto::*;
use num_enum::TryFromPrimitive;
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod command_audit;
mod command_e2e;
mod command_election;
mod command_keygen;
mod command_tally;
mod command_vote;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Silent = 0,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Verbosity {
    fn filter(&self) -> &'static str {
        match self {
            Verbosity::Silent => "off",
            Verbosity::Warn => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Either the in-process engine or a remote backend
#[derive(Clone, Debug)]
pub enum Engine {
    Local(Dispatcher),
    Remote(Client),
}

impl Backend for Engine {
    fn call(&self, request: Request) -> Result<Response, Error> {
        match self {
            Engine::Local(dispatcher) => dispatcher.call(request),
            Engine::Remote(client) => client.call(request),
        }
    }
}

fn main() {
    let store_arg = Arg::with_name("store")
        .long("store")
        .short("s")
        .takes_value(true)
        .help("Election store file (JSON) - can also be set with DEMOS_CRYPTO_STORE");

    let election_arg = Arg::with_name("ELECTION-ID")
        .index(1)
        .required(true)
        .help("Election id");

    let matches = App::new("DEMOS crypto CLI")
        .version("0.1")
        .about("Generates, tallies and audits DEMOS elections")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("address")
                .long("address")
                .short("a")
                .takes_value(true)
                .global(true)
                .help("Crypto backend address (unix:<path>, ipv4:<ip>:<port>, ipv6:[<ip>]:<port>) - can also be set with DEMOS_CRYPTO_ADDRESS"),
        )
        .arg(
            Arg::with_name("local")
                .long("local")
                .global(true)
                .help("Run the crypto engine in-process instead of connecting to a backend"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .long("quiet")
                .short("q")
                .global(true)
                .conflicts_with("v")
                .help("Only print results"),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate an election key for one question")
                .arg(
                    Arg::with_name("ballots")
                        .long("ballots")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("options")
                        .long("options")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("public")
                        .long("public")
                        .help("Print only the public part"),
                ),
        )
        .subcommand(
            SubCommand::with_name("election")
                .about("Manage elections")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("generate")
                        .about("Generate keys and ballots for a new election")
                        .arg(store_arg.clone())
                        .arg(
                            Arg::with_name("ballots")
                                .long("ballots")
                                .takes_value(true)
                                .required(true),
                        )
                        .arg(
                            Arg::with_name("options")
                                .long("options")
                                .takes_value(true)
                                .required(true)
                                .help("Option count of every question, comma separated"),
                        ),
                )
                .subcommand(
                    SubCommand::with_name("show")
                        .about("Print an election without its ballots")
                        .arg(store_arg.clone())
                        .arg(election_arg.clone()),
                )
                .subcommand(
                    SubCommand::with_name("unlock")
                        .about("Release a lease left behind by a failed run")
                        .arg(store_arg.clone())
                        .arg(election_arg.clone()),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Mark an option of a ballot side as voted")
                .arg(store_arg.clone())
                .arg(election_arg.clone())
                .arg(Arg::with_name("SERIAL").index(2).required(true))
                .arg(
                    Arg::with_name("SIDE")
                        .index(3)
                        .required(true)
                        .possible_values(&["A", "B", "a", "b"]),
                )
                .arg(Arg::with_name("QUESTION").index(4).required(true))
                .arg(Arg::with_name("OPTION").index(5).required(true)),
        )
        .subcommand(
            SubCommand::with_name("tally")
                .about("Run the tally protocol for an election")
                .arg(store_arg.clone())
                .arg(election_arg.clone())
                .arg(
                    Arg::with_name("batch-size")
                        .long("batch-size")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("audit")
                .about("Check a tallied election using public data only")
                .arg(store_arg.clone())
                .arg(election_arg.clone()),
        )
        .subcommand(
            SubCommand::with_name("e2e")
                .about("Generate, vote on, tally and audit a throwaway election")
                .arg(
                    Arg::with_name("ballots")
                        .long("ballots")
                        .takes_value(true)
                        .default_value("10"),
                )
                .arg(
                    Arg::with_name("options")
                        .long("options")
                        .takes_value(true)
                        .default_value("3"),
                ),
        )
        .get_matches();

    let verbosity = if matches.is_present("quiet") {
        Verbosity::Silent
    } else {
        let level = (Verbosity::Warn as u64 + matches.occurrences_of("v")).min(Verbosity::Debug as u64);
        Verbosity::try_from_primitive(level as u8).unwrap_or(Verbosity::Debug)
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match matches.subcommand() {
        ("keygen", Some(matches)) => command_keygen::command_keygen(matches),
        ("election", Some(matches)) => command_election::command_election(matches),
        ("vote", Some(matches)) => command_vote::command_vote(matches),
        ("tally", Some(matches)) => command_tally::command_tally(matches),
        ("audit", Some(matches)) => command_audit::command_audit(matches),
        ("e2e", Some(matches)) => command_e2e::command_e2e(matches),
        _ => {}
    }
}

/// The backend selected by `--local`, `--address` or the environment
pub fn engine(matches: &clap::ArgMatches) -> Engine {
    if matches.is_present("local") {
        return Engine::Local(Dispatcher::new());
    }

    let mut config = ClientConfig::from_env().unwrap_or_else(|e| {
        eprintln!("demos-crypto: {}", e);
        std::process::exit(1);
    });

    if let Some(address) = matches.value_of("address") {
        config.address = expand(address).parse().unwrap_or_else(|e| {
            eprintln!("demos-crypto: {}", e);
            std::process::exit(1);
        });
    }

    Engine::Remote(Client::new(config))
}

/// Expand `~` and environment variables
pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            eprintln!("demos-crypto: unable to expand {}: {}", input, e);
            std::process::exit(1);
        }
    }
}

/// Parse a numeric argument or exit
pub fn number<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> T {
    let value = matches.value_of(name).unwrap_or_default();
    value.parse().unwrap_or_else(|_| {
        eprintln!("demos-crypto: invalid {}: {:?}", name, value);
        std::process::exit(1);
    })
}

pub fn election_id(matches: &clap::ArgMatches) -> uuid::Uuid {
    let id = expand(matches.value_of("ELECTION-ID").unwrap_or_default());
    uuid::Uuid::parse_str(&id).unwrap_or_else(|e| {
        eprintln!("demos-crypto: invalid election id {}: {}", id, e);
        std::process::exit(1);
    })
}

fn store_path(matches: &clap::ArgMatches) -> String {
    let env_var = std::env::var("DEMOS_CRYPTO_STORE");
    let path = match matches.value_of("store") {
        Some(path) => path,
        None => env_var.as_deref().unwrap_or("./demos-elections.json"),
    };
    expand(path)
}

/// Load the store file, or start an empty store if it does not exist yet
pub fn load_store(matches: &clap::ArgMatches) -> (MemStore, String) {
    let path = store_path(matches);
    if !Path::new(&path).exists() {
        return (MemStore::default(), path);
    }

    let json = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        eprintln!("demos-crypto: unable to read {}: {}", path, e);
        std::process::exit(1);
    });
    let store = MemStore::from_json(&json).unwrap_or_else(|e| {
        eprintln!("demos-crypto: unable to read {}: {}", path, e);
        std::process::exit(1);
    });
    (store, path)
}

pub fn save_store(store: &MemStore, path: &str) {
    let json = store.to_json().unwrap_or_else(|e| {
        eprintln!("demos-crypto: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = std::fs::write(path, json) {
        eprintln!("demos-crypto: unable to write {}: {}", path, e);
        std::process::exit(1);
    }
}
