use crate::*;

pub use crate::wire::Command;

/// A typed request to the crypto engine
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    KeyGen {
        group: Group,
        ballots: u32,
        options: u32,
    },
    GenBallot {
        key: Key,
        ballots: u32,
        options: u32,
        number: u32,
    },
    AddCom {
        key: Key,
        coms: Vec<Com>,
    },
    AddDecom {
        key: Key,
        decoms: Vec<Decom>,
    },
    CompleteZk {
        key: Key,
        options: u32,
        coins: Coins,
        zk_set: Vec<PendingZk>,
    },
    VerifyCom {
        key: Key,
        com: Com,
        decom: Decom,
    },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::KeyGen { .. } => Command::KeyGen,
            Request::GenBallot { .. } => Command::GenBallot,
            Request::AddCom { .. } => Command::AddCom,
            Request::AddDecom { .. } => Command::AddDecom,
            Request::CompleteZk { .. } => Command::CompleteZk,
            Request::VerifyCom { .. } => Command::VerifyCom,
        }
    }
}

/// A typed response from the crypto engine.
///
/// Every response kind answers exactly one request kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Key(Key),
    BallotData(Vec<BallotPart>),
    AddedCom(Com),
    AddedDecom(Decom),
    ZkSet(Vec<Zk2>),
    Check(bool),
}

impl Response {
    pub fn command(&self) -> Command {
        match self {
            Response::Key(_) => Command::KeyGen,
            Response::BallotData(_) => Command::GenBallot,
            Response::AddedCom(_) => Command::AddCom,
            Response::AddedDecom(_) => Command::AddDecom,
            Response::ZkSet(_) => Command::CompleteZk,
            Response::Check(_) => Command::VerifyCom,
        }
    }

    fn unexpected(self, expected: Command) -> Error {
        Error::MalformedMessage(format!(
            "expected {} response, got {}",
            expected,
            self.command()
        ))
    }

    pub fn into_key(self) -> Result<Key, Error> {
        match self {
            Response::Key(key) => Ok(key),
            other => Err(other.unexpected(Command::KeyGen)),
        }
    }

    pub fn into_ballot_data(self) -> Result<Vec<BallotPart>, Error> {
        match self {
            Response::BallotData(parts) => Ok(parts),
            other => Err(other.unexpected(Command::GenBallot)),
        }
    }

    pub fn into_added_com(self) -> Result<Com, Error> {
        match self {
            Response::AddedCom(com) => Ok(com),
            other => Err(other.unexpected(Command::AddCom)),
        }
    }

    pub fn into_added_decom(self) -> Result<Decom, Error> {
        match self {
            Response::AddedDecom(decom) => Ok(decom),
            other => Err(other.unexpected(Command::AddDecom)),
        }
    }

    pub fn into_zk_set(self) -> Result<Vec<Zk2>, Error> {
        match self {
            Response::ZkSet(zk_set) => Ok(zk_set),
            other => Err(other.unexpected(Command::CompleteZk)),
        }
    }

    pub fn into_check(self) -> Result<bool, Error> {
        match self {
            Response::Check(check) => Ok(check),
            other => Err(other.unexpected(Command::VerifyCom)),
        }
    }
}

/// Anything that can execute engine requests: the socket client or an
/// in-process dispatcher.
pub trait Backend {
    fn call(&self, request: Request) -> Result<Response, Error>;

    fn key_gen(&self, group: Group, ballots: u32, options: u32) -> Result<Key, Error> {
        self.call(Request::KeyGen {
            group,
            ballots,
            options,
        })?
        .into_key()
    }

    fn gen_ballot(&self, key: &Key, number: u32) -> Result<Vec<BallotPart>, Error> {
        self.call(Request::GenBallot {
            key: key.clone(),
            ballots: key.ballots,
            options: key.options,
            number,
        })?
        .into_ballot_data()
    }

    fn add_com(&self, key: &Key, coms: Vec<Com>) -> Result<Com, Error> {
        self.call(Request::AddCom {
            key: key.clone(),
            coms,
        })?
        .into_added_com()
    }

    fn add_decom(&self, key: &Key, decoms: Vec<Decom>) -> Result<Decom, Error> {
        self.call(Request::AddDecom {
            key: key.clone(),
            decoms,
        })?
        .into_added_decom()
    }

    fn complete_zk(
        &self,
        key: &Key,
        coins: &Coins,
        zk_set: Vec<PendingZk>,
    ) -> Result<Vec<Zk2>, Error> {
        self.call(Request::CompleteZk {
            key: key.clone(),
            options: key.options,
            coins: coins.clone(),
            zk_set,
        })?
        .into_zk_set()
    }

    fn verify_com(&self, key: &Key, com: &Com, decom: &Decom) -> Result<bool, Error> {
        self.call(Request::VerifyCom {
            key: key.clone(),
            com: com.clone(),
            decom: decom.clone(),
        })?
        .into_check()
    }
}
