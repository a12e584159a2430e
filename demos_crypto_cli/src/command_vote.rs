use demos_crypto::*;

pub fn command_vote(matches: &clap::ArgMatches) {
    let id = crate::election_id(matches);
    let serial: u32 = crate::number(matches, "SERIAL");
    let question: usize = crate::number(matches, "QUESTION");
    let option: usize = crate::number(matches, "OPTION");
    let side = match matches.value_of("SIDE") {
        Some("A") | Some("a") => Side::A,
        _ => Side::B,
    };

    let (store, path) = crate::load_store(matches);

    let election = store.get_election(id).unwrap_or_else(|e| {
        eprintln!("demos-crypto vote: {}", e);
        std::process::exit(1);
    });
    if election.state != ElectionState::Running {
        eprintln!("demos-crypto vote: election is {}", election.state);
        std::process::exit(1);
    }

    let mut ballots = store.ballots(id, serial..serial + 1).unwrap_or_default();
    let ballot = match ballots.first_mut() {
        Some(ballot) => ballot,
        None => {
            eprintln!("demos-crypto vote: no ballot {}", serial);
            std::process::exit(1);
        }
    };

    if !ballot.vote(side, question, option) {
        eprintln!(
            "demos-crypto vote: ballot {} has no option {} in question {}",
            serial, option, question
        );
        std::process::exit(1);
    }

    if let Err(e) = store.put_ballots(id, ballots) {
        eprintln!("demos-crypto vote: {}", e);
        std::process::exit(1);
    }
    crate::save_store(&store, &path);
}
