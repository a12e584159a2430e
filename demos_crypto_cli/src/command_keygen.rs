use demos_crypto::*;

pub fn command_keygen(matches: &clap::ArgMatches) {
    let ballots: u32 = crate::number(matches, "ballots");
    let options: u32 = crate::number(matches, "options");

    let key = crate::engine(matches)
        .key_gen(Group::Ristretto255, ballots, options)
        .unwrap_or_else(|e| {
            eprintln!("demos-crypto keygen: {}", e);
            std::process::exit(1);
        });

    let key = if matches.is_present("public") {
        key.public_only()
    } else {
        key
    };

    match serde_json::to_string_pretty(&key) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("demos-crypto keygen: {}", e);
            std::process::exit(1);
        }
    }
}
