use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("demos-crypto: malformed message: {0}")]
    MalformedMessage(String),

    #[error("demos-crypto: connection closed before a full frame was received")]
    ConnectionClosed,

    #[error("demos-crypto: connection refused: {0}")]
    ConnectionRefused(std::io::Error),

    #[error("demos-crypto: timed out waiting for the backend")]
    Timeout,

    #[error("demos-crypto: invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("demos-crypto: frame of {0} bytes exceeds the limit of {1} bytes")]
    SizeLimitExceeded(u64, u64),

    #[error("demos-crypto: tally verification failed for question {0}")]
    TallyVerificationFailed(u32),

    #[error("demos-crypto: backend rejected request: {0}")]
    Backend(String),

    #[error("demos-crypto: io error: {0}")]
    Io(std::io::Error),

    #[error("demos-crypto: election {0} not found")]
    ElectionNotFound(uuid::Uuid),

    #[error("demos-crypto: election {0} is already being processed")]
    LeaseHeld(uuid::Uuid),

    #[error("demos-crypto: election {0} is in state {1}, expected {2}")]
    WrongElectionState(uuid::Uuid, crate::ElectionState, crate::ElectionState),

    #[error("demos-crypto: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("demos-crypto: invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("demos-crypto: proof for ballot {0} side {1:?} question {2} does not verify")]
    ProofVerificationFailed(u32, crate::Side, u32),

    #[error("demos-crypto: work queue is shut down")]
    QueueClosed,
}

impl Error {
    /// Transport-level failures may be retried by re-running a whole step,
    /// every engine operation being a pure function of its inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed | Error::ConnectionRefused(_) | Error::Timeout | Error::Io(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotFound => Error::ConnectionRefused(err),
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Io(err),
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::MalformedMessage(err.to_string())
    }
}

/// Request validation errors
///
/// Raised by the dispatcher before any cryptographic work is attempted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("demos-crypto validation: ballot count must be positive")]
    ZeroBallots,

    #[error("demos-crypto validation: option count must be positive")]
    ZeroOptions,

    #[error("demos-crypto validation: {ballots} ballots with {options} options overflow the message space")]
    TallyCapacityExceeded { ballots: u32, options: u32 },

    #[error("demos-crypto validation: ballot part count {0} must be positive and even")]
    OddBallotNumber(u32),

    #[error("demos-crypto validation: {number} ballot parts requested, at most {limit} per request")]
    TooManyBallotParts { number: u32, limit: u32 },

    #[error("demos-crypto validation: public key does not match secret key")]
    InconsistentKey,

    #[error("demos-crypto validation: {field} is {actual} but the key was generated for {expected}")]
    KeyMismatch {
        field: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("demos-crypto validation: proof {0} has {1} branches, expected {2}")]
    BranchCountMismatch(usize, usize, u32),

    #[error("demos-crypto validation: proof {0} has real branch index {1} out of range")]
    BranchIndexOutOfRange(usize, u32),

    #[error("demos-crypto validation: coins must not be empty")]
    EmptyCoins,
}
