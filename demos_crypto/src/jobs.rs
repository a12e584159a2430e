use crate::*;
use rand::rngs::OsRng;
use std::cmp::min;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Ballots per backend request
pub const BATCH_SIZE: u32 = 128;

/// Split `serials` into consecutive windows of at most `size` serials
pub fn batches(serials: Range<u32>, size: u32) -> impl Iterator<Item = Range<u32>> {
    let end = serials.end;
    let size = size.max(1);
    serials
        .step_by(size as usize)
        .map(move |lo| lo..min(lo.saturating_add(size), end))
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
}

/// Progress counters shared between a running job and its handle
#[derive(Clone, Debug, Default)]
pub struct ProgressCounter {
    current: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl ProgressCounter {
    pub fn set_total(&self, total: u64) {
        self.current.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn advance(&self, n: u64) {
        self.current.fetch_add(n, Ordering::SeqCst);
    }

    pub fn get(&self) -> Progress {
        Progress {
            current: self.current.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }
}

/// How often a step is re-run after a transport failure
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::from_millis(0),
        }
    }

    /// Run `step` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. The backoff doubles after every failure.
    pub fn run<T, F>(&self, mut step: F) -> Result<T, Error>
    where
        F: FnMut(u32) -> Result<T, Error>,
    {
        let mut backoff = self.backoff;
        let mut attempt = 1;
        loop {
            match step(attempt) {
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    warn!(error = %e, attempt, "retrying after {:?}", backoff);
                    thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Told about the outcome of a tally run
pub trait Notifier: Send + Sync {
    fn completed(&self, election: &Election);

    fn failed(&self, election: Uuid, error: &Error);
}

/// Notifier that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn completed(&self, election: &Election) {
        info!(election = %election.id, counts = ?election.counts(), "tally completed");
    }

    fn failed(&self, election: Uuid, error: &Error) {
        error!(election = %election, error = %error, "tally failed");
    }
}

/// Generates keys and ballots for a new election.
pub struct SetupJob<B: Backend> {
    backend: B,
    store: Arc<dyn Store>,
    id: Uuid,
    ballots: u32,
    questions: Vec<u32>,
    batch_size: u32,
    retry: RetryPolicy,
}

impl<B: Backend> SetupJob<B> {
    /// `questions` holds the option count of every question
    pub fn new(backend: B, store: Arc<dyn Store>, id: Uuid, ballots: u32, questions: Vec<u32>) -> Self {
        SetupJob {
            backend,
            store,
            id,
            ballots,
            questions,
            batch_size: BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate the election, or finish an interrupted setup of it.
    ///
    /// Nothing is written unless the election's lease is held. An election that
    /// already exists keeps its keys and only its missing ballots are generated.
    pub fn run(&self, progress: &ProgressCounter) -> Result<Election, Error> {
        let _span = info_span!("setup", election = %self.id).entered();

        let election = match self.store.get_election(self.id) {
            Ok(existing) => self.resume(existing)?,
            Err(Error::ElectionNotFound(_)) => {
                let election = self.keys()?;
                self.store.create_election(election.clone())?;
                election
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.generate(&election, progress) {
            // Keys and finished batches stay; a rerun picks up from here
            if let Err(store_err) = self.store.release_lease(self.id) {
                error!(error = %store_err, "could not release lease");
            }
            return Err(e);
        }

        self.store.set_state(self.id, ElectionState::Running)?;
        self.store.release_lease(self.id)?;

        info!(ballots = self.ballots, questions = election.questions.len(), "election generated");
        self.store.get_election(self.id)
    }

    /// Take the lease on an existing election that is still being set up
    fn resume(&self, existing: Election) -> Result<Election, Error> {
        let options: Vec<u32> = existing.questions.iter().map(|q| q.options).collect();
        if existing.ballots_cnt != self.ballots || options != self.questions {
            return Err(Error::InvalidConfig(format!(
                "election {} was set up with {} ballots and options {:?}",
                self.id, existing.ballots_cnt, options
            )));
        }
        if existing.state != ElectionState::Setup {
            return Err(Error::WrongElectionState(
                self.id,
                existing.state,
                ElectionState::Setup,
            ));
        }

        self.store.acquire_lease(self.id)?;

        // Re-read under the lease
        let election = self.store.get_election(self.id)?;
        if election.state != ElectionState::Setup {
            self.store.release_lease(self.id)?;
            return Err(Error::WrongElectionState(
                self.id,
                election.state,
                ElectionState::Setup,
            ));
        }

        info!("resuming interrupted setup");
        Ok(election)
    }

    fn keys(&self) -> Result<Election, Error> {
        let questions = self
            .questions
            .iter()
            .enumerate()
            .map(|(index, &options)| {
                let key = self.retry.run(|_| {
                    self.backend
                        .key_gen(Group::Ristretto255, self.ballots, options)
                })?;
                Ok(Question {
                    index: index as u32,
                    options,
                    key,
                    combined_com: None,
                    combined_decom: None,
                    counts: None,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Election {
            id: self.id,
            state: ElectionState::Setup,
            ballots_cnt: self.ballots,
            questions,
            coins: None,
        })
    }

    fn generate(&self, election: &Election, progress: &ProgressCounter) -> Result<(), Error> {
        let questions = election.questions.len();
        progress.set_total(self.ballots as u64 * 2 * questions as u64);

        for serials in batches(election.serials(), self.batch_size) {
            let parts = (serials.end - serials.start) as u64 * 2 * questions as u64;

            let stored = self.store.ballots(self.id, serials.clone())?;
            let complete = stored.len() == serials.len()
                && stored
                    .iter()
                    .flat_map(|b| b.parts())
                    .all(|(_, part)| part.questions.len() == questions);
            if complete {
                progress.advance(parts);
                continue;
            }

            let ballots = self.retry.run(|_| self.gen_batch(election, serials.clone()))?;
            self.store.put_ballots(self.id, ballots)?;
            progress.advance(parts);
        }

        Ok(())
    }

    fn gen_batch(&self, election: &Election, serials: Range<u32>) -> Result<Vec<Ballot>, Error> {
        let mut rng = OsRng;
        let mut ballots: Vec<Ballot> = serials
            .map(|serial| Ballot::generate(serial, &mut rng))
            .collect();
        let number = 2 * ballots.len() as u32;

        for question in &election.questions {
            let parts = self.backend.gen_ballot(&question.key, number)?;
            if parts.len() != number as usize {
                return Err(Error::MalformedMessage(format!(
                    "asked for {} ballot parts, got {}",
                    number,
                    parts.len()
                )));
            }

            // Parts come in (A, B) pairs, one pair per ballot
            let mut parts = parts.into_iter();
            for ballot in ballots.iter_mut() {
                for side in &[Side::A, Side::B] {
                    let cells = parts.next().unwrap_or_default();
                    ballot.part_mut(*side).push_question(cells);
                }
            }
        }

        Ok(ballots)
    }
}

/// Steps of the per-question tally protocol
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TallyState {
    Start,
    AddCom,
    AddDecom,
    VerifyCom,
    DecodeTally,
    CompleteZk,
    Done,
    Error,
}

impl fmt::Display for TallyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TallyState::Start => "start",
            TallyState::AddCom => "add_com",
            TallyState::AddDecom => "add_decom",
            TallyState::VerifyCom => "verify_com",
            TallyState::DecodeTally => "decode_tally",
            TallyState::CompleteZk => "complete_zk",
            TallyState::Done => "done",
            TallyState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Combines cast votes, opens and checks the result, and completes every proof.
pub struct TallyJob<B: Backend> {
    backend: B,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    id: Uuid,
    batch_size: u32,
    retry: RetryPolicy,
    transitions: Vec<(u32, TallyState)>,
}

impl<B: Backend> TallyJob<B> {
    pub fn new(backend: B, store: Arc<dyn Store>, id: Uuid) -> Self {
        TallyJob {
            backend,
            store,
            notifier: Arc::new(LogNotifier),
            id,
            batch_size: BATCH_SIZE,
            retry: RetryPolicy::default(),
            transitions: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Every state entered so far, with its question index
    pub fn transitions(&self) -> &[(u32, TallyState)] {
        &self.transitions
    }

    /// Run the tally for every question and return the per-option counts.
    ///
    /// A completed election returns its stored counts. After a transport
    /// failure the election is released so the run can be invoked again; any
    /// other failure marks it failed and keeps its lease for inspection.
    pub fn run(&mut self, progress: &ProgressCounter) -> Result<Vec<Vec<u64>>, Error> {
        let _span = info_span!("tally", election = %self.id).entered();
        let election = self.store.get_election(self.id)?;

        match election.state {
            ElectionState::Completed => {
                if let Some(counts) = election.counts() {
                    return Ok(counts);
                }
            }
            ElectionState::Running | ElectionState::Tallying | ElectionState::Failed => {}
            state => {
                return Err(Error::WrongElectionState(
                    self.id,
                    state,
                    ElectionState::Running,
                ))
            }
        }

        self.store.acquire_lease(self.id)?;

        match self.tally(&election, progress) {
            Ok(counts) => {
                self.store.set_state(self.id, ElectionState::Completed)?;
                let election = self.store.get_election(self.id)?;
                self.notifier.completed(&election);
                self.store.release_lease(self.id)?;
                Ok(counts)
            }
            Err(e) if e.is_retryable() => {
                // The backend went away; the run can simply be invoked again
                let reset = self
                    .store
                    .set_state(self.id, ElectionState::Running)
                    .and_then(|_| self.store.release_lease(self.id));
                if let Err(store_err) = reset {
                    error!(error = %store_err, "could not release election");
                }
                self.notifier.failed(self.id, &e);
                Err(e)
            }
            Err(e) => {
                if let Err(store_err) = self.store.set_state(self.id, ElectionState::Failed) {
                    error!(error = %store_err, "could not mark election failed");
                }
                self.notifier.failed(self.id, &e);
                Err(e)
            }
        }
    }

    fn tally(&mut self, election: &Election, progress: &ProgressCounter) -> Result<Vec<Vec<u64>>, Error> {
        self.store.set_state(self.id, ElectionState::Tallying)?;

        let coins = self.coins(election)?;
        self.store.set_coins(self.id, coins.clone())?;

        let batches_per_question = batches(election.serials(), self.batch_size).count() as u64;
        progress.set_total(election.questions.len() as u64 * (3 * batches_per_question + 1));

        let retry = self.retry;
        let mut counts = Vec::with_capacity(election.questions.len());
        for question in &election.questions {
            let question_counts = retry.run(|attempt| {
                if attempt > 1 {
                    info!(question = question.index, attempt, "restarting question");
                }
                let result = self.tally_question(election, question, &coins, progress);
                if result.is_err() {
                    self.transition(question.index, TallyState::Error);
                }
                result
            })?;
            counts.push(question_counts);
        }

        Ok(counts)
    }

    fn transition(&mut self, question: u32, state: TallyState) {
        info!(question, state = %state, "tally step");
        self.transitions.push((question, state));
    }

    /// One bit per ballot in serial order: was it cast with its B side
    fn coins(&self, election: &Election) -> Result<Coins, Error> {
        let mut bits = Vec::with_capacity(election.ballots_cnt as usize);
        for serials in batches(election.serials(), self.batch_size) {
            let ballots = self.store.ballots(self.id, serials)?;
            bits.extend(ballots.iter().map(|b| b.b.is_voted()));
        }
        Ok(Coins::from_bitmap(bits))
    }

    fn tally_question(
        &mut self,
        election: &Election,
        question: &Question,
        coins: &Coins,
        progress: &ProgressCounter,
    ) -> Result<Vec<u64>, Error> {
        let q = question.index;
        let key = question.key.public_only();
        self.transition(q, TallyState::Start);

        self.transition(q, TallyState::AddCom);
        let mut combined_com = None;
        for serials in batches(election.serials(), self.batch_size) {
            let ballots = self.store.ballots(self.id, serials)?;
            let coms = combined_com
                .into_iter()
                .chain(voted_cells(&ballots, q).map(|c| c.com.clone()))
                .collect();
            combined_com = Some(self.backend.add_com(&key, coms)?);
            progress.advance(1);
        }

        self.transition(q, TallyState::AddDecom);
        let mut combined_decom = None;
        for serials in batches(election.serials(), self.batch_size) {
            let ballots = self.store.ballots(self.id, serials)?;
            let decoms = combined_decom
                .into_iter()
                .chain(voted_cells(&ballots, q).map(|c| c.decom.clone()))
                .collect();
            combined_decom = Some(self.backend.add_decom(&key, decoms)?);
            progress.advance(1);
        }

        let combined_com = match combined_com {
            Some(com) => com,
            None => self.backend.add_com(&key, Vec::new())?,
        };
        let combined_decom = match combined_decom {
            Some(decom) => decom,
            None => self.backend.add_decom(&key, Vec::new())?,
        };

        self.transition(q, TallyState::VerifyCom);
        let verified = self.backend.verify_com(&key, &combined_com, &combined_decom)?;
        progress.advance(1);
        if !verified {
            warn!(question = q, "combined opening does not match combined commitment");
            return Err(Error::TallyVerificationFailed(q));
        }

        self.transition(q, TallyState::DecodeTally);
        let counts = decode_tally(&combined_decom.message, key.ballots, question.options)
            .ok_or(Error::TallyVerificationFailed(q))?;

        self.store.put_question(
            self.id,
            Question {
                combined_com: Some(combined_com),
                combined_decom: Some(combined_decom),
                counts: Some(counts.clone()),
                ..question.clone()
            },
        )?;

        self.transition(q, TallyState::CompleteZk);
        for serials in batches(election.serials(), self.batch_size) {
            let ballots = self.store.ballots(self.id, serials)?;

            let mut slots = Vec::new();
            let mut pending = Vec::new();
            for ballot in &ballots {
                for (side, part) in ballot.parts() {
                    let cells = part.questions.get(q as usize).map(Vec::as_slice).unwrap_or(&[]);
                    slots.push((ballot.serial, side, cells.len()));
                    pending.extend(cells.iter().map(OptionCell::pending));
                }
            }

            let expected = pending.len();
            let zk2 = self.backend.complete_zk(&key, coins, pending)?;
            if zk2.len() != expected {
                return Err(Error::MalformedMessage(format!(
                    "sent {} proofs to complete, got {}",
                    expected,
                    zk2.len()
                )));
            }

            let mut zk2 = zk2.into_iter();
            let updates = slots
                .into_iter()
                .map(|(serial, side, n)| ZkUpdate {
                    serial,
                    side,
                    zk2: zk2.by_ref().take(n).collect(),
                })
                .collect();
            self.store.put_zk2(self.id, q, updates)?;
            progress.advance(1);
        }

        self.transition(q, TallyState::Done);
        Ok(counts)
    }
}

fn voted_cells(ballots: &[Ballot], question: u32) -> impl Iterator<Item = &OptionCell> {
    ballots
        .iter()
        .flat_map(|ballot| vec![&ballot.a, &ballot.b])
        .filter_map(move |part| part.questions.get(question as usize))
        .flatten()
        .filter(|cell| cell.voted)
}

/// A unit of background work
pub trait Job: Send {
    fn election(&self) -> Uuid;

    fn run(&mut self, progress: &ProgressCounter) -> Result<(), Error>;
}

impl<B: Backend + Send> Job for SetupJob<B> {
    fn election(&self) -> Uuid {
        self.id
    }

    fn run(&mut self, progress: &ProgressCounter) -> Result<(), Error> {
        SetupJob::run(self, progress).map(|_| ())
    }
}

impl<B: Backend + Send> Job for TallyJob<B> {
    fn election(&self) -> Uuid {
        self.id
    }

    fn run(&mut self, progress: &ProgressCounter) -> Result<(), Error> {
        TallyJob::run(self, progress).map(|_| ())
    }
}
