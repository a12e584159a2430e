use demos_crypto::*;
use std::sync::Arc;

pub fn command_election(matches: &clap::ArgMatches) {
    // Subcommands
    if let Some(matches) = matches.subcommand_matches("generate") {
        command_election_generate(matches);
        std::process::exit(0);
    }
    if let Some(matches) = matches.subcommand_matches("show") {
        command_election_show(matches);
        std::process::exit(0);
    }
    if let Some(matches) = matches.subcommand_matches("unlock") {
        command_election_unlock(matches);
        std::process::exit(0);
    }
}

pub fn command_election_generate(matches: &clap::ArgMatches) {
    let ballots: u32 = crate::number(matches, "ballots");
    let questions: Vec<u32> = matches
        .value_of("options")
        .unwrap_or_default()
        .split(',')
        .map(|options| {
            options.trim().parse().unwrap_or_else(|_| {
                eprintln!("demos-crypto election: invalid option count {:?}", options);
                std::process::exit(1);
            })
        })
        .collect();

    let (store, path) = crate::load_store(matches);
    let store = Arc::new(store);
    let id = uuid::Uuid::new_v4();

    let job = SetupJob::new(crate::engine(matches), store.clone(), id, ballots, questions);
    if let Err(e) = job.run(&ProgressCounter::default()) {
        eprintln!("demos-crypto election: {}", e);
        std::process::exit(1);
    }

    crate::save_store(&store, &path);
    println!("{}", id);
}

pub fn command_election_show(matches: &clap::ArgMatches) {
    let id = crate::election_id(matches);
    let (store, _) = crate::load_store(matches);

    let mut election = store.get_election(id).unwrap_or_else(|e| {
        eprintln!("demos-crypto election: {}", e);
        std::process::exit(1);
    });

    // Secrets stay in the store
    for question in election.questions.iter_mut() {
        question.key = question.key.public_only();
    }

    match serde_json::to_string_pretty(&election) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("demos-crypto election: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn command_election_unlock(matches: &clap::ArgMatches) {
    let id = crate::election_id(matches);
    let (store, path) = crate::load_store(matches);

    if let Err(e) = store.release_lease(id) {
        eprintln!("demos-crypto election: {}", e);
        std::process::exit(1);
    }
    crate::save_store(&store, &path);
}
