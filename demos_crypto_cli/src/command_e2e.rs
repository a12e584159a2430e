use demos_crypto::*;
use rand::Rng;
use std::sync::Arc;

/// Run a whole election against the selected backend with random votes
pub fn command_e2e(matches: &clap::ArgMatches) {
    let ballots: u32 = crate::number(matches, "ballots");
    let options: u32 = crate::number(matches, "options");
    let engine = crate::engine(matches);

    let store = Arc::new(MemStore::default());
    let id = uuid::Uuid::new_v4();

    let election = SetupJob::new(engine.clone(), store.clone(), id, ballots, vec![options])
        .run(&ProgressCounter::default())
        .unwrap_or_else(|e| {
            eprintln!("demos-crypto e2e: setup failed: {}", e);
            std::process::exit(1);
        });
    println!("> Generated election {} with {} ballots", id, ballots);

    // Every voter picks a random side and option
    let mut rng = rand::thread_rng();
    let mut expected = vec![0u64; options as usize];
    let mut cast = store.ballots(id, election.serials()).unwrap_or_default();
    for ballot in cast.iter_mut() {
        let side = if rng.gen::<bool>() { Side::A } else { Side::B };
        let option = rng.gen_range(0, options as usize);
        ballot.vote(side, 0, option);
        expected[option] += 1;
    }
    if let Err(e) = store.put_ballots(id, cast) {
        eprintln!("demos-crypto e2e: {}", e);
        std::process::exit(1);
    }

    let counts = TallyJob::new(engine, store.clone(), id)
        .run(&ProgressCounter::default())
        .unwrap_or_else(|e| {
            eprintln!("demos-crypto e2e: tally failed: {}", e);
            std::process::exit(1);
        });

    if counts != vec![expected.clone()] {
        eprintln!(
            "demos-crypto e2e: tally {:?} does not match cast votes {:?}",
            counts, expected
        );
        std::process::exit(1);
    }
    println!("> Tally matches cast votes");

    match audit(&*store, id, BATCH_SIZE) {
        Ok(report) => println!("> Election verified OK: {} proofs", report.proofs),
        Err(e) => {
            eprintln!("demos-crypto e2e: audit failed: {}", e);
            std::process::exit(1);
        }
    }

    crate::command_tally::print_counts(&counts);
}
