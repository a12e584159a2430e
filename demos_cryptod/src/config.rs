use demos_crypto::*;
use std::env::var;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon settings, from the environment and then the command line
pub struct Config {
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        let address: Address = match var("DEMOS_CRYPTOD_ADDRESS") {
            Ok(val) => val.parse()?,
            Err(_e) => Address::Unix(PathBuf::from("/run/demos-crypto/demos-crypto.sock")),
        };

        let mut server = ServerConfig::new(address);

        if let Ok(val) = var("DEMOS_CRYPTOD_WORKERS") {
            server.workers = parse("DEMOS_CRYPTOD_WORKERS", &val)?;
        }
        if let Ok(val) = var("DEMOS_CRYPTOD_MAX_REQUEST") {
            server.max_request = parse("DEMOS_CRYPTOD_MAX_REQUEST", &val)?;
        }
        if let Ok(val) = var("DEMOS_CRYPTOD_MAX_BALLOT_PARTS") {
            server.max_ballot_parts = parse("DEMOS_CRYPTOD_MAX_BALLOT_PARTS", &val)?;
        }
        if let Ok(val) = var("DEMOS_CRYPTOD_TIMEOUT_SECS") {
            server.timeout = Duration::from_secs(parse("DEMOS_CRYPTOD_TIMEOUT_SECS", &val)?);
        }

        Ok(Config { server })
    }

    /// Apply command line overrides
    pub fn merge(&mut self, matches: &clap::ArgMatches) -> Result<(), Error> {
        if let Some(val) = matches.value_of("address") {
            self.server.address = val.parse()?;
        }
        if let Some(val) = matches.value_of("workers") {
            self.server.workers = parse("--workers", val)?;
        }
        if let Some(val) = matches.value_of("max-request") {
            self.server.max_request = parse("--max-request", val)?;
        }
        if let Some(val) = matches.value_of("max-ballot-parts") {
            self.server.max_ballot_parts = parse("--max-ballot-parts", val)?;
        }
        if let Some(val) = matches.value_of("timeout") {
            self.server.timeout = Duration::from_secs(parse("--timeout", val)?);
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, Error> {
    val.parse()
        .map_err(|_| Error::InvalidConfig(format!("{}={}", name, val)))
}
