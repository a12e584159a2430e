use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Generate an election with the in-process engine
fn setup(ballots: u32, questions: Vec<u32>, batch_size: u32) -> (Arc<MemStore>, Uuid) {
    let store = Arc::new(MemStore::default());
    let id = Uuid::new_v4();

    let job = SetupJob::new(Dispatcher::new(), store.clone(), id, ballots, questions)
        .with_batch_size(batch_size);
    let progress = ProgressCounter::default();
    let election = job.run(&progress).unwrap();

    assert_eq!(election.state, ElectionState::Running);
    assert_eq!(progress.get().current, progress.get().total);
    assert!(!store.lease_held(id).unwrap());

    (store, id)
}

/// Mark votes as (serial, side, question, option)
fn cast(store: &MemStore, id: Uuid, votes: &[(u32, Side, usize, usize)]) {
    let election = store.get_election(id).unwrap();
    let mut ballots = store.ballots(id, election.serials()).unwrap();
    for &(serial, side, question, option) in votes {
        let ballot = ballots.iter_mut().find(|b| b.serial == serial).unwrap();
        assert!(ballot.vote(side, question, option));
    }
    store.put_ballots(id, ballots).unwrap();
}

#[derive(Default)]
struct Recorder {
    completed: Mutex<Vec<Uuid>>,
    failed: Mutex<Vec<String>>,
}

impl Notifier for Recorder {
    fn completed(&self, election: &Election) {
        self.completed.lock().unwrap().push(election.id);
    }

    fn failed(&self, _election: Uuid, error: &Error) {
        self.failed.lock().unwrap().push(error.to_string());
    }
}

/// Drops the first `failures` calls as if the backend went away
#[derive(Clone)]
struct Flaky {
    failures: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl Flaky {
    fn new(failures: u32) -> Self {
        Flaky {
            failures: Arc::new(AtomicU32::new(failures)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl Backend for Flaky {
    fn call(&self, request: Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(Error::ConnectionClosed);
        }
        Dispatcher::new().call(request)
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

#[test]
fn full_tally() {
    // 3 ballots, 1 question with 2 options
    let (store, id) = setup(3, vec![2], BATCH_SIZE);

    let election = store.get_election(id).unwrap();
    let ballots = store.ballots(id, election.serials()).unwrap();
    assert_eq!(ballots.len(), 3);
    assert_eq!(ballots[0].serial, FIRST_SERIAL);
    for ballot in &ballots {
        for (_, part) in ballot.parts() {
            assert_eq!(part.questions.len(), 1);
            assert_eq!(part.questions[0].len(), 2);
        }
    }

    // One side per ballot is used to vote: option 0, option 1, option 0
    cast(
        &store,
        id,
        &[(100, Side::A, 0, 0), (101, Side::B, 0, 1), (102, Side::A, 0, 0)],
    );

    let recorder = Arc::new(Recorder::default());
    let mut job = TallyJob::new(Dispatcher::new(), store.clone(), id).with_notifier(recorder.clone());
    let progress = ProgressCounter::default();
    let counts = job.run(&progress).unwrap();
    assert_eq!(counts, vec![vec![2, 1]]);

    let states: Vec<TallyState> = job.transitions().iter().map(|(_, s)| *s).collect();
    assert_eq!(
        states,
        vec![
            TallyState::Start,
            TallyState::AddCom,
            TallyState::AddDecom,
            TallyState::VerifyCom,
            TallyState::DecodeTally,
            TallyState::CompleteZk,
            TallyState::Done,
        ]
    );
    assert_eq!(progress.get().current, progress.get().total);

    // Completed, notified and unlocked
    let election = store.get_election(id).unwrap();
    assert_eq!(election.state, ElectionState::Completed);
    assert_eq!(*recorder.completed.lock().unwrap(), vec![id]);
    assert!(!store.lease_held(id).unwrap());

    // Only ballot 101 was cast with its B side
    let coins = Coins::from_bitmap(vec![false, true, false]);
    assert_eq!(election.coins, Some(coins.clone()));

    // Anyone can check the published combination and every proof
    let question = &election.questions[0];
    let key = question.key.public_only();
    let combined_com = question.combined_com.as_ref().unwrap();
    let combined_decom = question.combined_decom.as_ref().unwrap();
    assert!(verify_com(&key, combined_com, combined_decom));

    for ballot in store.ballots(id, election.serials()).unwrap() {
        for (_, part) in ballot.parts() {
            for cell in &part.questions[0] {
                let zk2 = cell.zk2.as_ref().unwrap();
                assert!(verify_zk(&key, coins.as_str(), &cell.com, &cell.zk1, zk2));
                assert!(!verify_zk(&key, "0000", &cell.com, &cell.zk1, zk2));
            }
        }
    }

    // Running again does no work
    let flaky = Flaky::new(0);
    let mut again = TallyJob::new(flaky.clone(), store.clone(), id);
    assert_eq!(again.run(&ProgressCounter::default()).unwrap(), vec![vec![2, 1]]);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn tampered_opening_stops_the_tally() {
    let (store, id) = setup(3, vec![2], BATCH_SIZE);
    cast(
        &store,
        id,
        &[(100, Side::A, 0, 0), (101, Side::B, 0, 1), (102, Side::A, 0, 0)],
    );

    // Change one opening after the ballots were printed
    let mut ballots = store.ballots(id, 101..102).unwrap();
    let cell = ballots[0].b.questions[0].iter_mut().find(|c| c.voted).unwrap();
    cell.decom.message += 1u32;
    store.put_ballots(id, ballots).unwrap();

    let recorder = Arc::new(Recorder::default());
    let mut job = TallyJob::new(Dispatcher::new(), store.clone(), id)
        .with_notifier(recorder.clone())
        .with_retry(quick_retry());

    match job.run(&ProgressCounter::default()) {
        Err(Error::TallyVerificationFailed(0)) => {}
        other => panic!("unexpected {:?}", other),
    }

    // Never retried, never decoded
    let states: Vec<TallyState> = job.transitions().iter().map(|(_, s)| *s).collect();
    assert_eq!(states.last(), Some(&TallyState::Error));
    assert!(!states.contains(&TallyState::DecodeTally));
    assert_eq!(states.iter().filter(|s| **s == TallyState::Start).count(), 1);

    // Failed and still locked for the operator
    let election = store.get_election(id).unwrap();
    assert_eq!(election.state, ElectionState::Failed);
    assert!(election.questions[0].counts.is_none());
    assert!(store.lease_held(id).unwrap());
    assert_eq!(recorder.failed.lock().unwrap().len(), 1);
    assert!(recorder.completed.lock().unwrap().is_empty());

    // A second run is refused while the lease is held
    let mut retry = TallyJob::new(Dispatcher::new(), store.clone(), id);
    assert!(matches!(
        retry.run(&ProgressCounter::default()),
        Err(Error::LeaseHeld(_))
    ));
}

#[test]
fn batched_tally_over_two_questions() {
    // Batches of 2 over 5 ballots chain the accumulator three times
    let (store, id) = setup(5, vec![3, 2], 2);

    cast(
        &store,
        id,
        &[
            (100, Side::A, 0, 2),
            (100, Side::A, 1, 0),
            (101, Side::B, 0, 2),
            (101, Side::B, 1, 1),
            (102, Side::A, 0, 0),
            (103, Side::B, 0, 1),
            (103, Side::B, 1, 1),
            (104, Side::A, 0, 2),
        ],
    );

    let mut job = TallyJob::new(Dispatcher::new(), store.clone(), id).with_batch_size(2);
    let counts = job.run(&ProgressCounter::default()).unwrap();
    assert_eq!(counts, vec![vec![1, 1, 3], vec![1, 2]]);

    let election = store.get_election(id).unwrap();
    assert_eq!(election.counts(), Some(counts));
    assert_eq!(
        election.coins,
        Some(Coins::from_bitmap(vec![false, true, false, true, false]))
    );
}

#[test]
fn transport_failures_restart_the_question() {
    let (store, id) = setup(2, vec![2], BATCH_SIZE);
    cast(&store, id, &[(100, Side::A, 0, 1), (101, Side::A, 0, 1)]);

    let flaky = Flaky::new(2);
    let mut job = TallyJob::new(flaky.clone(), store.clone(), id).with_retry(quick_retry());
    assert_eq!(job.run(&ProgressCounter::default()).unwrap(), vec![vec![0, 2]]);

    let starts = job
        .transitions()
        .iter()
        .filter(|(_, s)| *s == TallyState::Start)
        .count();
    assert_eq!(starts, 3);

    // Out of attempts: reported, but the election is free to run again
    let (store, id) = setup(2, vec![2], BATCH_SIZE);
    cast(&store, id, &[(101, Side::B, 0, 0)]);
    let recorder = Arc::new(Recorder::default());
    let mut job = TallyJob::new(Flaky::new(10), store.clone(), id)
        .with_notifier(recorder.clone())
        .with_retry(quick_retry());
    assert!(matches!(
        job.run(&ProgressCounter::default()),
        Err(Error::ConnectionClosed)
    ));
    assert_eq!(recorder.failed.lock().unwrap().len(), 1);
    assert_eq!(
        store.get_election(id).unwrap().state,
        ElectionState::Running
    );
    assert!(!store.lease_held(id).unwrap());

    let mut rerun = TallyJob::new(Dispatcher::new(), store.clone(), id);
    assert_eq!(rerun.run(&ProgressCounter::default()).unwrap(), vec![vec![1, 0]]);
    assert!(!store.lease_held(id).unwrap());
}

/// Answers the first `ok` calls, then drops every later one
struct Cutoff {
    ok: AtomicU32,
}

impl Cutoff {
    fn new(ok: u32) -> Self {
        Cutoff {
            ok: AtomicU32::new(ok),
        }
    }
}

impl Backend for Cutoff {
    fn call(&self, request: Request) -> Result<Response, Error> {
        if self.ok.load(Ordering::SeqCst) == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.ok.fetch_sub(1, Ordering::SeqCst);
        Dispatcher::new().call(request)
    }
}

#[test]
fn interrupted_setup_resumes_with_the_same_keys() {
    let store = Arc::new(MemStore::default());
    let id = Uuid::new_v4();

    // KeyGen and the first batch go through, the second batch does not
    let first = SetupJob::new(Cutoff::new(2), store.clone(), id, 4, vec![2])
        .with_batch_size(2)
        .with_retry(RetryPolicy::none());
    assert!(matches!(
        first.run(&ProgressCounter::default()),
        Err(Error::ConnectionClosed)
    ));

    let election = store.get_election(id).unwrap();
    assert_eq!(election.state, ElectionState::Setup);
    assert!(!store.lease_held(id).unwrap());
    let key = election.questions[0].key.clone();
    let printed = store.ballots(id, election.serials()).unwrap();
    assert_eq!(printed.len(), 2);

    // Nothing changes while someone else holds the lease
    store.acquire_lease(id).unwrap();
    let blocked = SetupJob::new(Dispatcher::new(), store.clone(), id, 4, vec![2]).with_batch_size(2);
    assert!(matches!(
        blocked.run(&ProgressCounter::default()),
        Err(Error::LeaseHeld(_))
    ));
    assert_eq!(store.get_election(id).unwrap().questions[0].key, key);
    store.release_lease(id).unwrap();

    // A different shape is refused outright
    let reshaped = SetupJob::new(Dispatcher::new(), store.clone(), id, 4, vec![3]);
    assert!(matches!(
        reshaped.run(&ProgressCounter::default()),
        Err(Error::InvalidConfig(_))
    ));

    let progress = ProgressCounter::default();
    let election = SetupJob::new(Dispatcher::new(), store.clone(), id, 4, vec![2])
        .with_batch_size(2)
        .run(&progress)
        .unwrap();
    assert_eq!(election.state, ElectionState::Running);
    assert_eq!(election.questions[0].key, key);
    assert_eq!(progress.get().current, progress.get().total);
    assert!(!store.lease_held(id).unwrap());

    // Earlier ballots are kept and every ballot opens under the one key
    let ballots = store.ballots(id, election.serials()).unwrap();
    assert_eq!(ballots.len(), 4);
    assert_eq!(&ballots[..2], &printed[..]);
    for ballot in &ballots {
        for (_, part) in ballot.parts() {
            for cell in &part.questions[0] {
                assert!(verify_com(&key, &cell.com, &cell.decom));
            }
        }
    }

    // A running election is never regenerated
    let again = SetupJob::new(Dispatcher::new(), store.clone(), id, 4, vec![2]);
    assert!(matches!(
        again.run(&ProgressCounter::default()),
        Err(Error::WrongElectionState(..))
    ));
    assert_eq!(store.ballots(id, election.serials()).unwrap(), ballots);

    // And a full tally works on the resumed election
    cast(&store, id, &[(100, Side::A, 0, 1), (103, Side::B, 0, 0)]);
    let mut tally = TallyJob::new(Dispatcher::new(), store.clone(), id).with_batch_size(2);
    assert_eq!(tally.run(&ProgressCounter::default()).unwrap(), vec![vec![1, 1]]);
}

#[test]
fn work_queue_runs_jobs() {
    let store = Arc::new(MemStore::default());
    let id = Uuid::new_v4();
    let queue = WorkQueue::new(2).unwrap();

    let setup = queue
        .submit(SetupJob::new(Dispatcher::new(), store.clone(), id, 4, vec![2]))
        .unwrap();
    assert_eq!(setup.election(), id);
    assert_eq!(setup.wait(), JobStatus::Finished);

    cast(&store, id, &[(102, Side::B, 0, 0)]);

    let tally = queue
        .submit(TallyJob::new(Dispatcher::new(), store.clone(), id))
        .unwrap();
    assert_eq!(tally.wait(), JobStatus::Finished);
    assert!(tally.status().is_done());
    assert_eq!(
        store.get_election(id).unwrap().counts(),
        Some(vec![vec![1, 0]])
    );

    // Unknown elections fail without touching anything
    let missing = queue
        .submit(TallyJob::new(Dispatcher::new(), store.clone(), Uuid::new_v4()))
        .unwrap();
    match missing.wait() {
        JobStatus::Failed(message) => assert!(message.contains("not found")),
        other => panic!("unexpected {:?}", other),
    }

    queue.shutdown();
}

#[test]
fn audit_tallied_election() {
    let (store, id) = setup(4, vec![2, 3], 3);
    cast(
        &store,
        id,
        &[(100, Side::B, 0, 1), (101, Side::A, 1, 2), (103, Side::A, 0, 0)],
    );

    // Nothing to audit before the tally
    assert!(matches!(
        audit(&*store, id, BATCH_SIZE),
        Err(Error::WrongElectionState(..))
    ));

    let mut job = TallyJob::new(Dispatcher::new(), store.clone(), id).with_batch_size(3);
    job.run(&ProgressCounter::default()).unwrap();

    let report = audit(&*store, id, 3).unwrap();
    assert_eq!(report.ballots, 4);
    assert_eq!(report.questions, 2);
    assert_eq!(report.proofs, 4 * 2 * (2 + 3));

    // A swapped proof is caught
    let mut ballots = store.ballots(id, 102..103).unwrap();
    let other = ballots[0].a.questions[1][0].zk2.clone();
    ballots[0].b.questions[1][0].zk2 = other;
    store.put_ballots(id, ballots).unwrap();
    match audit(&*store, id, BATCH_SIZE) {
        Err(Error::ProofVerificationFailed(102, Side::B, 1)) => {}
        other => panic!("unexpected {:?}", other),
    }
}
