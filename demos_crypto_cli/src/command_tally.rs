use demos_crypto::*;
use std::sync::Arc;

pub fn command_tally(matches: &clap::ArgMatches) {
    let id = crate::election_id(matches);
    let (store, path) = crate::load_store(matches);
    let store = Arc::new(store);

    let mut job = TallyJob::new(crate::engine(matches), store.clone(), id);
    if matches.is_present("batch-size") {
        job = job.with_batch_size(crate::number(matches, "batch-size"));
    }

    let result = job.run(&ProgressCounter::default());

    // Failures are recorded in the store too
    crate::save_store(&store, &path);

    match result {
        Ok(counts) => print_counts(&counts),
        Err(e) => {
            eprintln!("demos-crypto tally: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn print_counts(counts: &[Vec<u64>]) {
    for (question, counts) in counts.iter().enumerate() {
        println!("Question {}:", question);
        for (option, count) in counts.iter().enumerate() {
            println!("  option {} got {} votes", option, count);
        }
    }
}
