//! Protobuf messages exchanged with the crypto backend.
//!
//! Group elements and scalars are 32-byte compressed / little-endian strings;
//! decommitment messages are unsigned big-endian integers of any length.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Command {
    KeyGen = 0,
    GenBallot = 1,
    AddCom = 2,
    AddDecom = 3,
    CompleteZk = 4,
    VerifyCom = 5,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::KeyGen => "key_gen",
            Command::GenBallot => "gen_ballot",
            Command::AddCom => "add_com",
            Command::AddDecom => "add_decom",
            Command::CompleteZk => "complete_zk",
            Command::VerifyCom => "verify_com",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Key {
    #[prost(int32, tag = "1")]
    pub group: i32,
    #[prost(uint32, tag = "2")]
    pub ballots: u32,
    #[prost(uint32, tag = "3")]
    pub options: u32,
    #[prost(bytes, tag = "4")]
    pub public: Vec<u8>,
    /// Empty when the secret part is withheld
    #[prost(bytes, tag = "5")]
    pub secret: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Com {
    #[prost(bytes, tag = "1")]
    pub c1: Vec<u8>,
    #[prost(bytes, tag = "2")]
    pub c2: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Decom {
    #[prost(bytes, tag = "1")]
    pub randomness: Vec<u8>,
    #[prost(bytes, tag = "2")]
    pub message: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ZkCommitment {
    #[prost(bytes, tag = "1")]
    pub a: Vec<u8>,
    #[prost(bytes, tag = "2")]
    pub b: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ZkBranch {
    #[prost(bytes, tag = "1")]
    pub challenge: Vec<u8>,
    #[prost(bytes, tag = "2")]
    pub response: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Zk1 {
    #[prost(message, repeated, tag = "1")]
    pub commitments: Vec<ZkCommitment>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ZkState {
    #[prost(bytes, tag = "1")]
    pub randomness: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub index: u32,
    #[prost(bytes, tag = "3")]
    pub nonce: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub simulated: Vec<ZkBranch>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Zk2 {
    #[prost(message, repeated, tag = "1")]
    pub branches: Vec<ZkBranch>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptedOption {
    #[prost(message, optional, tag = "1")]
    pub com: Option<Com>,
    #[prost(message, optional, tag = "2")]
    pub decom: Option<Decom>,
    #[prost(message, optional, tag = "3")]
    pub zk1: Option<Zk1>,
    #[prost(message, optional, tag = "4")]
    pub zk_state: Option<ZkState>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ballot {
    #[prost(message, repeated, tag = "1")]
    pub enc: Vec<EncryptedOption>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BallotData {
    #[prost(message, repeated, tag = "1")]
    pub ballot: Vec<Ballot>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PendingZk {
    #[prost(message, optional, tag = "1")]
    pub zk1: Option<Zk1>,
    #[prost(message, optional, tag = "2")]
    pub zk_state: Option<ZkState>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ZkSet {
    #[prost(message, repeated, tag = "1")]
    pub zk2: Vec<Zk2>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyGenRequest {
    #[prost(int32, tag = "1")]
    pub group: i32,
    #[prost(uint32, tag = "2")]
    pub ballots: u32,
    #[prost(uint32, tag = "3")]
    pub options: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenBallotRequest {
    #[prost(message, optional, tag = "1")]
    pub key: Option<Key>,
    #[prost(uint32, tag = "2")]
    pub ballots: u32,
    #[prost(uint32, tag = "3")]
    pub options: u32,
    #[prost(uint32, tag = "4")]
    pub number: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddComRequest {
    #[prost(message, optional, tag = "1")]
    pub key: Option<Key>,
    #[prost(message, repeated, tag = "2")]
    pub com: Vec<Com>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddDecomRequest {
    #[prost(message, optional, tag = "1")]
    pub key: Option<Key>,
    #[prost(message, repeated, tag = "2")]
    pub decom: Vec<Decom>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompleteZkRequest {
    #[prost(message, optional, tag = "1")]
    pub key: Option<Key>,
    #[prost(uint32, tag = "2")]
    pub options: u32,
    #[prost(string, tag = "3")]
    pub coins: String,
    #[prost(message, repeated, tag = "4")]
    pub zk_set: Vec<PendingZk>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyComRequest {
    #[prost(message, optional, tag = "1")]
    pub key: Option<Key>,
    #[prost(message, optional, tag = "2")]
    pub com: Option<Com>,
    #[prost(message, optional, tag = "3")]
    pub decom: Option<Decom>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CryptoRequest {
    #[prost(enumeration = "Command", tag = "1")]
    pub cmd: i32,
    #[prost(oneof = "crypto_request::Request", tags = "2, 3, 4, 5, 6, 7")]
    pub request: Option<crypto_request::Request>,
}

pub mod crypto_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "2")]
        Kg(super::KeyGenRequest),
        #[prost(message, tag = "3")]
        Gb(super::GenBallotRequest),
        #[prost(message, tag = "4")]
        Ac(super::AddComRequest),
        #[prost(message, tag = "5")]
        Ad(super::AddDecomRequest),
        #[prost(message, tag = "6")]
        Cz(super::CompleteZkRequest),
        #[prost(message, tag = "7")]
        Vc(super::VerifyComRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CryptoResponse {
    #[prost(oneof = "crypto_response::Response", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub response: Option<crypto_response::Response>,
}

pub mod crypto_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        Key(super::Key),
        #[prost(message, tag = "2")]
        BallotData(super::BallotData),
        #[prost(message, tag = "3")]
        AddedCom(super::Com),
        #[prost(message, tag = "4")]
        AddedDecom(super::Decom),
        #[prost(message, tag = "5")]
        ZkSet(super::ZkSet),
        #[prost(bool, tag = "6")]
        Check(bool),
        #[prost(string, tag = "7")]
        Error(String),
    }
}
