use crate::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Serial number of the first ballot of every election
pub const FIRST_SERIAL: u32 = 100;

/// Lifecycle of an election as seen by the crypto jobs
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ElectionState {
    Setup,
    Running,
    Tallying,
    Completed,
    Failed,
}

impl ElectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ElectionState::Setup => "setup",
            ElectionState::Running => "running",
            ElectionState::Tallying => "tallying",
            ElectionState::Completed => "completed",
            ElectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One of the two halves of a ballot
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    A,
    B,
}

/// A stored encrypted option, plus its completed proof and vote mark
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OptionCell {
    pub com: Com,
    pub decom: Decom,
    pub zk1: Zk1,
    pub zk_state: ZkState,

    #[serde(default)]
    pub zk2: Option<Zk2>,

    #[serde(default)]
    pub voted: bool,
}

impl OptionCell {
    pub fn pending(&self) -> PendingZk {
        PendingZk {
            zk1: self.zk1.clone(),
            zk_state: self.zk_state.clone(),
        }
    }
}

impl From<EncryptedOption> for OptionCell {
    fn from(enc: EncryptedOption) -> Self {
        OptionCell {
            com: enc.com,
            decom: enc.decom,
            zk1: enc.zk1,
            zk_state: enc.zk_state,
            zk2: None,
            voted: false,
        }
    }
}

/// Order of the option cells of `question` on a part with security `code`.
///
/// Position `p` holds the cell of option `order[p]`.
pub fn cell_order(code: &str, question: u32, options: usize) -> Vec<usize> {
    let mut hasher = Sha256::new();
    hasher.update(b"demos-crypto/cell-order");
    hasher.update(code.as_bytes());
    hasher.update(&question.to_be_bytes());

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());

    let mut order: Vec<usize> = (0..options).collect();
    order.shuffle(&mut StdRng::from_seed(seed));
    order
}

/// One side of a ballot: the option cells of every question, in question order.
///
/// Within a question the cells are shuffled by `cell_order`, so the position of
/// a voted cell says nothing without the part's security code.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Part {
    /// Printed on the ballot; kept with the other private ballot material
    #[serde(default)]
    pub code: String,

    pub questions: Vec<Vec<OptionCell>>,
}

impl Part {
    pub fn new(code: String) -> Self {
        Part {
            code,
            questions: Vec::new(),
        }
    }

    pub fn is_voted(&self) -> bool {
        self.questions.iter().flatten().any(|cell| cell.voted)
    }

    /// Append the next question's cells, given in option order
    pub fn push_question(&mut self, cells: Vec<EncryptedOption>) {
        let order = cell_order(&self.code, self.questions.len() as u32, cells.len());
        let mut cells: Vec<Option<EncryptedOption>> = cells.into_iter().map(Some).collect();
        let laid_out = order
            .iter()
            .filter_map(|&option| cells.get_mut(option).and_then(Option::take))
            .map(OptionCell::from)
            .collect();
        self.questions.push(laid_out);
    }

    /// Where the cell of `option` sits within `question`
    pub fn position(&self, question: usize, option: usize) -> Option<usize> {
        let cells = self.questions.get(question)?;
        cell_order(&self.code, question as u32, cells.len())
            .iter()
            .position(|&o| o == option)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Ballot {
    pub serial: u32,
    pub a: Part,
    pub b: Part,
}

impl Ballot {
    pub fn new(serial: u32) -> Self {
        Ballot {
            serial,
            a: Part::default(),
            b: Part::default(),
        }
    }

    /// An empty ballot with a fresh security code on each part
    pub fn generate<R: Rng + CryptoRng>(serial: u32, rng: &mut R) -> Self {
        let mut code = || hex::encode(rng.gen::<[u8; 10]>());
        Ballot {
            serial,
            a: Part::new(code()),
            b: Part::new(code()),
        }
    }

    pub fn part(&self, side: Side) -> &Part {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn part_mut(&mut self, side: Side) -> &mut Part {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    pub fn parts(&self) -> impl Iterator<Item = (Side, &Part)> {
        vec![(Side::A, &self.a), (Side::B, &self.b)].into_iter()
    }

    /// Mark `option` of `question` voted on `side`
    pub fn vote(&mut self, side: Side, question: usize, option: usize) -> bool {
        let part = self.part_mut(side);
        let position = match part.position(question, option) {
            Some(position) => position,
            None => return false,
        };
        match part
            .questions
            .get_mut(question)
            .and_then(|cells| cells.get_mut(position))
        {
            Some(cell) => {
                cell.voted = true;
                true
            }
            None => false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Question {
    pub index: u32,
    pub options: u32,
    pub key: Key,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_com: Option<Com>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_decom: Option<Decom>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<Vec<u64>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Election {
    pub id: Uuid,
    pub state: ElectionState,
    pub ballots_cnt: u32,
    pub questions: Vec<Question>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coins: Option<Coins>,
}

impl Election {
    /// Serial numbers of every ballot of this election
    pub fn serials(&self) -> Range<u32> {
        FIRST_SERIAL..FIRST_SERIAL + self.ballots_cnt
    }

    /// Vote counts of every question, once all are tallied
    pub fn counts(&self) -> Option<Vec<Vec<u64>>> {
        self.questions.iter().map(|q| q.counts.clone()).collect()
    }
}

/// Completed proofs for one side of one ballot
#[derive(Clone, Debug)]
pub struct ZkUpdate {
    pub serial: u32,
    pub side: Side,
    pub zk2: Vec<Zk2>,
}

/// Persistence used by the setup and tally jobs.
///
/// Every method is a single atomic step.
pub trait Store: Send + Sync {
    fn get_election(&self, id: Uuid) -> Result<Election, Error>;

    fn put_election(&self, election: Election) -> Result<(), Error>;

    /// Insert a new election with its lease already held.
    ///
    /// Fails with `LeaseHeld` if the election exists.
    fn create_election(&self, election: Election) -> Result<(), Error>;

    fn set_state(&self, id: Uuid, state: ElectionState) -> Result<(), Error> {
        let mut election = self.get_election(id)?;
        election.state = state;
        self.put_election(election)
    }

    fn set_coins(&self, id: Uuid, coins: Coins) -> Result<(), Error> {
        let mut election = self.get_election(id)?;
        election.coins = Some(coins);
        self.put_election(election)
    }

    /// Replace one question's combined values and counts
    fn put_question(&self, id: Uuid, question: Question) -> Result<(), Error> {
        let mut election = self.get_election(id)?;
        match election
            .questions
            .iter_mut()
            .find(|q| q.index == question.index)
        {
            Some(q) => *q = question,
            None => election.questions.push(question),
        }
        self.put_election(election)
    }

    fn put_ballots(&self, id: Uuid, ballots: Vec<Ballot>) -> Result<(), Error>;

    /// Ballots with serials in `serials`, in serial order
    fn ballots(&self, id: Uuid, serials: Range<u32>) -> Result<Vec<Ballot>, Error>;

    /// Store completed proofs of one question for a batch of ballot sides
    fn put_zk2(&self, id: Uuid, question: u32, updates: Vec<ZkUpdate>) -> Result<(), Error>;

    /// Take the election's processing lease
    fn acquire_lease(&self, id: Uuid) -> Result<(), Error>;

    fn release_lease(&self, id: Uuid) -> Result<(), Error>;

    fn lease_held(&self, id: Uuid) -> Result<bool, Error>;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Record {
    election: Election,
    ballots: BTreeMap<u32, Ballot>,
    #[serde(default)]
    leased: bool,
}

/// A simple store that uses an in-memory BTreeMap
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<BTreeMap<Uuid, Record>>,
}

impl MemStore {
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Uuid, Record>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Uuid, Record>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn elections(&self) -> Vec<Election> {
        self.read().values().map(|r| r.election.clone()).collect()
    }

    /// Serialize every election, ballot and lease
    pub fn to_json(&self) -> Result<String, Error> {
        let records: Vec<Record> = self.read().values().cloned().collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        let inner = records
            .into_iter()
            .map(|r| (r.election.id, r))
            .collect();

        Ok(MemStore {
            inner: RwLock::new(inner),
        })
    }
}

impl Store for MemStore {
    fn get_election(&self, id: Uuid) -> Result<Election, Error> {
        self.read()
            .get(&id)
            .map(|r| r.election.clone())
            .ok_or(Error::ElectionNotFound(id))
    }

    fn put_election(&self, election: Election) -> Result<(), Error> {
        let mut inner = self.write();
        match inner.get_mut(&election.id) {
            Some(record) => record.election = election,
            None => {
                inner.insert(
                    election.id,
                    Record {
                        election,
                        ballots: BTreeMap::new(),
                        leased: false,
                    },
                );
            }
        }
        Ok(())
    }

    fn create_election(&self, election: Election) -> Result<(), Error> {
        let mut inner = self.write();
        if inner.contains_key(&election.id) {
            return Err(Error::LeaseHeld(election.id));
        }
        inner.insert(
            election.id,
            Record {
                election,
                ballots: BTreeMap::new(),
                leased: true,
            },
        );
        Ok(())
    }

    fn put_ballots(&self, id: Uuid, ballots: Vec<Ballot>) -> Result<(), Error> {
        let mut inner = self.write();
        let record = inner.get_mut(&id).ok_or(Error::ElectionNotFound(id))?;
        for ballot in ballots {
            record.ballots.insert(ballot.serial, ballot);
        }
        Ok(())
    }

    fn ballots(&self, id: Uuid, serials: Range<u32>) -> Result<Vec<Ballot>, Error> {
        let inner = self.read();
        let record = inner.get(&id).ok_or(Error::ElectionNotFound(id))?;
        Ok(record.ballots.range(serials).map(|(_, b)| b.clone()).collect())
    }

    fn put_zk2(&self, id: Uuid, question: u32, updates: Vec<ZkUpdate>) -> Result<(), Error> {
        let mut inner = self.write();
        let record = inner.get_mut(&id).ok_or(Error::ElectionNotFound(id))?;

        // Check the whole batch before writing any of it
        for update in &updates {
            let cells = record
                .ballots
                .get(&update.serial)
                .and_then(|b| b.part(update.side).questions.get(question as usize))
                .map(|cells| cells.len());
            if cells != Some(update.zk2.len()) {
                return Err(Error::MalformedMessage(format!(
                    "{} proofs do not fit ballot {} side {:?} question {}",
                    update.zk2.len(),
                    update.serial,
                    update.side,
                    question
                )));
            }
        }

        for update in updates {
            let cells = record
                .ballots
                .get_mut(&update.serial)
                .and_then(|b| b.part_mut(update.side).questions.get_mut(question as usize));
            if let Some(cells) = cells {
                for (cell, zk2) in cells.iter_mut().zip(update.zk2) {
                    cell.zk2 = Some(zk2);
                }
            }
        }

        Ok(())
    }

    fn acquire_lease(&self, id: Uuid) -> Result<(), Error> {
        let mut inner = self.write();
        let record = inner.get_mut(&id).ok_or(Error::ElectionNotFound(id))?;
        if record.leased {
            return Err(Error::LeaseHeld(id));
        }
        record.leased = true;
        Ok(())
    }

    fn release_lease(&self, id: Uuid) -> Result<(), Error> {
        let mut inner = self.write();
        let record = inner.get_mut(&id).ok_or(Error::ElectionNotFound(id))?;
        record.leased = false;
        Ok(())
    }

    fn lease_held(&self, id: Uuid) -> Result<bool, Error> {
        self.read()
            .get(&id)
            .map(|r| r.leased)
            .ok_or(Error::ElectionNotFound(id))
    }
}
