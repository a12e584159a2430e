use demos_crypto::*;

pub fn command_audit(matches: &clap::ArgMatches) {
    let id = crate::election_id(matches);
    let (store, _) = crate::load_store(matches);

    match audit(&store, id, BATCH_SIZE) {
        Ok(report) => {
            println!(
                "> Election verified OK: {} ballots, {} questions, {} proofs",
                report.ballots, report.questions, report.proofs
            );
            if let Ok(election) = store.get_election(id) {
                if let Some(counts) = election.counts() {
                    crate::command_tally::print_counts(&counts);
                }
            }
        }
        Err(e) => {
            eprintln!("demos-crypto audit: {}", e);
            std::process::exit(1);
        }
    }
}
