use crate::group;
use crate::wire::{self, crypto_request, crypto_response};
use crate::*;
use num_bigint::BigUint;
use prost::Message;
use std::convert::TryFrom;

/// Encode a request into its protobuf payload
pub fn encode_request(request: &Request) -> Result<Vec<u8>, Error> {
    let msg = wire::CryptoRequest::from(request);
    to_bytes(&msg)
}

/// Decode a protobuf payload into a request.
///
/// The command tag must be known and must agree with the populated request body.
pub fn decode_request(bytes: &[u8]) -> Result<Request, Error> {
    let msg = wire::CryptoRequest::decode(bytes)?;
    let cmd = wire::Command::from_i32(msg.cmd)
        .ok_or_else(|| Error::MalformedMessage(format!("unknown command {}", msg.cmd)))?;
    let body = required(msg.request, "request")?;

    let request = match body {
        crypto_request::Request::Kg(kg) => Request::KeyGen {
            group: Group::from_wire(kg.group)?,
            ballots: kg.ballots,
            options: kg.options,
        },
        crypto_request::Request::Gb(gb) => Request::GenBallot {
            key: Key::try_from(required(gb.key, "key")?)?,
            ballots: gb.ballots,
            options: gb.options,
            number: gb.number,
        },
        crypto_request::Request::Ac(ac) => Request::AddCom {
            key: Key::try_from(required(ac.key, "key")?)?,
            coms: collect(ac.com)?,
        },
        crypto_request::Request::Ad(ad) => Request::AddDecom {
            key: Key::try_from(required(ad.key, "key")?)?,
            decoms: collect(ad.decom)?,
        },
        crypto_request::Request::Cz(cz) => Request::CompleteZk {
            key: Key::try_from(required(cz.key, "key")?)?,
            options: cz.options,
            coins: Coins::from(cz.coins),
            zk_set: collect(cz.zk_set)?,
        },
        crypto_request::Request::Vc(vc) => Request::VerifyCom {
            key: Key::try_from(required(vc.key, "key")?)?,
            com: Com::try_from(required(vc.com, "com")?)?,
            decom: Decom::try_from(required(vc.decom, "decom")?)?,
        },
    };

    if request.command() != cmd {
        return Err(Error::MalformedMessage(format!(
            "command {} does not match {} request body",
            cmd,
            request.command()
        )));
    }

    Ok(request)
}

/// Encode a response (or a backend-side rejection) into its protobuf payload
pub fn encode_response(response: Result<&Response, &str>) -> Result<Vec<u8>, Error> {
    let body = match response {
        Ok(response) => crypto_response::Response::from(response),
        Err(message) => crypto_response::Response::Error(message.to_owned()),
    };
    let msg = wire::CryptoResponse {
        response: Some(body),
    };
    to_bytes(&msg)
}

/// Decode a response payload, which must answer `expected`.
pub fn decode_response(bytes: &[u8], expected: Command) -> Result<Response, Error> {
    let msg = wire::CryptoResponse::decode(bytes)?;
    let body = required(msg.response, "response")?;

    let response = match body {
        crypto_response::Response::Error(message) => return Err(Error::Backend(message)),
        crypto_response::Response::Key(key) => Response::Key(Key::try_from(key)?),
        crypto_response::Response::BallotData(data) => Response::BallotData(
            data.ballot
                .into_iter()
                .map(|ballot| collect(ballot.enc))
                .collect::<Result<Vec<BallotPart>, Error>>()?,
        ),
        crypto_response::Response::AddedCom(com) => Response::AddedCom(Com::try_from(com)?),
        crypto_response::Response::AddedDecom(decom) => {
            Response::AddedDecom(Decom::try_from(decom)?)
        }
        crypto_response::Response::ZkSet(set) => Response::ZkSet(collect(set.zk2)?),
        crypto_response::Response::Check(check) => Response::Check(check),
    };

    if response.command() != expected {
        return Err(Error::MalformedMessage(format!(
            "expected {} response, got {}",
            expected,
            response.command()
        )));
    }

    Ok(response)
}

fn to_bytes<M: Message>(msg: &M) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut buf)
        .map_err(|e| Error::MalformedMessage(e.to_string()))?;
    Ok(buf)
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, Error> {
    field.ok_or_else(|| Error::MalformedMessage(format!("missing field {}", name)))
}

fn collect<W, T>(items: Vec<W>) -> Result<Vec<T>, Error>
where
    T: TryFrom<W, Error = Error>,
{
    items.into_iter().map(T::try_from).collect()
}

fn to_wire<'a, D: 'a, W: From<&'a D>>(items: impl IntoIterator<Item = &'a D>) -> Vec<W> {
    items.into_iter().map(W::from).collect()
}

// Domain -> wire

impl From<&Request> for wire::CryptoRequest {
    fn from(request: &Request) -> Self {
        let body = match request {
            Request::KeyGen {
                group,
                ballots,
                options,
            } => crypto_request::Request::Kg(wire::KeyGenRequest {
                group: (*group).into(),
                ballots: *ballots,
                options: *options,
            }),
            Request::GenBallot {
                key,
                ballots,
                options,
                number,
            } => crypto_request::Request::Gb(wire::GenBallotRequest {
                key: Some(key.into()),
                ballots: *ballots,
                options: *options,
                number: *number,
            }),
            Request::AddCom { key, coms } => crypto_request::Request::Ac(wire::AddComRequest {
                key: Some(key.into()),
                com: to_wire(coms),
            }),
            Request::AddDecom { key, decoms } => {
                crypto_request::Request::Ad(wire::AddDecomRequest {
                    key: Some(key.into()),
                    decom: to_wire(decoms),
                })
            }
            Request::CompleteZk {
                key,
                options,
                coins,
                zk_set,
            } => crypto_request::Request::Cz(wire::CompleteZkRequest {
                key: Some(key.into()),
                options: *options,
                coins: coins.as_str().to_owned(),
                zk_set: to_wire(zk_set),
            }),
            Request::VerifyCom { key, com, decom } => {
                crypto_request::Request::Vc(wire::VerifyComRequest {
                    key: Some(key.into()),
                    com: Some(com.into()),
                    decom: Some(decom.into()),
                })
            }
        };

        wire::CryptoRequest {
            cmd: request.command() as i32,
            request: Some(body),
        }
    }
}

impl From<&Response> for crypto_response::Response {
    fn from(response: &Response) -> Self {
        match response {
            Response::Key(key) => crypto_response::Response::Key(key.into()),
            Response::BallotData(parts) => {
                crypto_response::Response::BallotData(wire::BallotData {
                    ballot: parts
                        .iter()
                        .map(|part| wire::Ballot {
                            enc: to_wire(part),
                        })
                        .collect(),
                })
            }
            Response::AddedCom(com) => crypto_response::Response::AddedCom(com.into()),
            Response::AddedDecom(decom) => crypto_response::Response::AddedDecom(decom.into()),
            Response::ZkSet(zk_set) => crypto_response::Response::ZkSet(wire::ZkSet {
                zk2: to_wire(zk_set),
            }),
            Response::Check(check) => crypto_response::Response::Check(*check),
        }
    }
}

impl From<&Key> for wire::Key {
    fn from(key: &Key) -> Self {
        wire::Key {
            group: key.group.into(),
            ballots: key.ballots,
            options: key.options,
            public: group::encode_point(&key.public),
            secret: key
                .secret
                .as_ref()
                .map(|s| group::encode_scalar(&s.0))
                .unwrap_or_default(),
        }
    }
}

impl From<&Com> for wire::Com {
    fn from(com: &Com) -> Self {
        wire::Com {
            c1: group::encode_point(&com.c1),
            c2: group::encode_point(&com.c2),
        }
    }
}

impl From<&Decom> for wire::Decom {
    fn from(decom: &Decom) -> Self {
        wire::Decom {
            randomness: group::encode_scalar(&decom.randomness),
            message: decom.message.to_bytes_be(),
        }
    }
}

impl From<&ZkCommitment> for wire::ZkCommitment {
    fn from(c: &ZkCommitment) -> Self {
        wire::ZkCommitment {
            a: group::encode_point(&c.a),
            b: group::encode_point(&c.b),
        }
    }
}

impl From<&ZkBranch> for wire::ZkBranch {
    fn from(b: &ZkBranch) -> Self {
        wire::ZkBranch {
            challenge: group::encode_scalar(&b.challenge),
            response: group::encode_scalar(&b.response),
        }
    }
}

impl From<&Zk1> for wire::Zk1 {
    fn from(zk1: &Zk1) -> Self {
        wire::Zk1 {
            commitments: to_wire(&zk1.commitments),
        }
    }
}

impl From<&ZkState> for wire::ZkState {
    fn from(state: &ZkState) -> Self {
        wire::ZkState {
            randomness: group::encode_scalar(&state.randomness),
            index: state.index,
            nonce: group::encode_scalar(&state.nonce),
            simulated: to_wire(&state.simulated),
        }
    }
}

impl From<&Zk2> for wire::Zk2 {
    fn from(zk2: &Zk2) -> Self {
        wire::Zk2 {
            branches: to_wire(&zk2.branches),
        }
    }
}

impl From<&PendingZk> for wire::PendingZk {
    fn from(p: &PendingZk) -> Self {
        wire::PendingZk {
            zk1: Some((&p.zk1).into()),
            zk_state: Some((&p.zk_state).into()),
        }
    }
}

impl From<&EncryptedOption> for wire::EncryptedOption {
    fn from(cell: &EncryptedOption) -> Self {
        wire::EncryptedOption {
            com: Some((&cell.com).into()),
            decom: Some((&cell.decom).into()),
            zk1: Some((&cell.zk1).into()),
            zk_state: Some((&cell.zk_state).into()),
        }
    }
}

// Wire -> domain

impl TryFrom<wire::Key> for Key {
    type Error = Error;

    fn try_from(key: wire::Key) -> Result<Self, Error> {
        let secret = if key.secret.is_empty() {
            None
        } else {
            Some(SecretScalar(group::decode_scalar(&key.secret)?))
        };

        Ok(Key {
            group: Group::from_wire(key.group)?,
            ballots: key.ballots,
            options: key.options,
            public: group::decode_point(&key.public)?,
            secret,
        })
    }
}

impl TryFrom<wire::Com> for Com {
    type Error = Error;

    fn try_from(com: wire::Com) -> Result<Self, Error> {
        Ok(Com {
            c1: group::decode_point(&com.c1)?,
            c2: group::decode_point(&com.c2)?,
        })
    }
}

impl TryFrom<wire::Decom> for Decom {
    type Error = Error;

    fn try_from(decom: wire::Decom) -> Result<Self, Error> {
        Ok(Decom {
            randomness: group::decode_scalar(&decom.randomness)?,
            message: BigUint::from_bytes_be(&decom.message),
        })
    }
}

impl TryFrom<wire::ZkCommitment> for ZkCommitment {
    type Error = Error;

    fn try_from(c: wire::ZkCommitment) -> Result<Self, Error> {
        Ok(ZkCommitment {
            a: group::decode_point(&c.a)?,
            b: group::decode_point(&c.b)?,
        })
    }
}

impl TryFrom<wire::ZkBranch> for ZkBranch {
    type Error = Error;

    fn try_from(b: wire::ZkBranch) -> Result<Self, Error> {
        Ok(ZkBranch {
            challenge: group::decode_scalar(&b.challenge)?,
            response: group::decode_scalar(&b.response)?,
        })
    }
}

impl TryFrom<wire::Zk1> for Zk1 {
    type Error = Error;

    fn try_from(zk1: wire::Zk1) -> Result<Self, Error> {
        Ok(Zk1 {
            commitments: collect(zk1.commitments)?,
        })
    }
}

impl TryFrom<wire::ZkState> for ZkState {
    type Error = Error;

    fn try_from(state: wire::ZkState) -> Result<Self, Error> {
        Ok(ZkState {
            randomness: group::decode_scalar(&state.randomness)?,
            index: state.index,
            nonce: group::decode_scalar(&state.nonce)?,
            simulated: collect(state.simulated)?,
        })
    }
}

impl TryFrom<wire::Zk2> for Zk2 {
    type Error = Error;

    fn try_from(zk2: wire::Zk2) -> Result<Self, Error> {
        Ok(Zk2 {
            branches: collect(zk2.branches)?,
        })
    }
}

impl TryFrom<wire::PendingZk> for PendingZk {
    type Error = Error;

    fn try_from(p: wire::PendingZk) -> Result<Self, Error> {
        Ok(PendingZk {
            zk1: Zk1::try_from(required(p.zk1, "zk1")?)?,
            zk_state: ZkState::try_from(required(p.zk_state, "zk_state")?)?,
        })
    }
}

impl TryFrom<wire::EncryptedOption> for EncryptedOption {
    type Error = Error;

    fn try_from(cell: wire::EncryptedOption) -> Result<Self, Error> {
        Ok(EncryptedOption {
            com: Com::try_from(required(cell.com, "com")?)?,
            decom: Decom::try_from(required(cell.decom, "decom")?)?,
            zk1: Zk1::try_from(required(cell.zk1, "zk1")?)?,
            zk_state: ZkState::try_from(required(cell.zk_state, "zk_state")?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        let mut rng = rand::rngs::OsRng {};
        key_gen(Group::Ristretto255, 9, 3, &mut rng).unwrap()
    }

    #[test]
    fn request_round_trip() {
        let key = key();
        let parts = gen_ballot(&key, 2);
        let cell = parts[0][1].clone();

        let requests = vec![
            Request::KeyGen {
                group: Group::Ristretto255,
                ballots: 9,
                options: 3,
            },
            Request::GenBallot {
                key: key.clone(),
                ballots: 9,
                options: 3,
                number: 4,
            },
            Request::AddCom {
                key: key.public_only(),
                coms: parts[1].iter().map(|c| c.com.clone()).collect(),
            },
            Request::AddDecom {
                key: key.public_only(),
                decoms: vec![],
            },
            Request::CompleteZk {
                key: key.clone(),
                options: 3,
                coins: Coins::from_bitmap(vec![true, false]),
                zk_set: vec![PendingZk {
                    zk1: cell.zk1.clone(),
                    zk_state: cell.zk_state.clone(),
                }],
            },
            Request::VerifyCom {
                key: key.clone(),
                com: cell.com.clone(),
                decom: cell.decom.clone(),
            },
        ];

        for request in requests {
            let bytes = encode_request(&request).unwrap();
            assert_eq!(decode_request(&bytes).unwrap(), request);
        }
    }

    #[test]
    fn response_round_trip() {
        let key = key();
        let parts = gen_ballot(&key, 2);
        let pending: Vec<PendingZk> = parts[0]
            .iter()
            .map(|cell| PendingZk {
                zk1: cell.zk1.clone(),
                zk_state: cell.zk_state.clone(),
            })
            .collect();
        let coins = Coins::from_bitmap(vec![false, true]);
        let zk2 = complete_zk(&key, coins.as_str(), &pending).unwrap();

        let responses = vec![
            (Command::KeyGen, Response::Key(key.clone())),
            (Command::KeyGen, Response::Key(key.public_only())),
            (Command::GenBallot, Response::BallotData(parts.clone())),
            (
                Command::AddCom,
                Response::AddedCom(add_com(&parts.iter().map(|p| p[0].com.clone()).collect::<Vec<_>>())),
            ),
            (Command::AddCom, Response::AddedCom(add_com(&[]))),
            (
                Command::AddDecom,
                Response::AddedDecom(add_decom(&parts.iter().map(|p| p[2].decom.clone()).collect::<Vec<_>>())),
            ),
            (Command::CompleteZk, Response::ZkSet(zk2)),
            (Command::CompleteZk, Response::ZkSet(Vec::new())),
            (Command::VerifyCom, Response::Check(false)),
            (Command::VerifyCom, Response::Check(true)),
        ];

        for (cmd, response) in responses {
            let bytes = encode_response(Ok(&response)).unwrap();
            assert_eq!(decode_response(&bytes, cmd).unwrap(), response);
        }
    }

    #[test]
    fn response_must_match_request() {
        let bytes = encode_response(Ok(&Response::Check(true))).unwrap();
        assert!(matches!(
            decode_response(&bytes, Command::AddCom),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn backend_error_is_surfaced() {
        let bytes = encode_response(Err("option count must be positive")).unwrap();
        match decode_response(&bytes, Command::GenBallot) {
            Err(Error::Backend(message)) => assert_eq!(message, "option count must be positive"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_requests() {
        // Garbage bytes
        assert!(matches!(
            decode_request(&[0xff, 0xff, 0xff]),
            Err(Error::MalformedMessage(_))
        ));

        // Unknown command
        let msg = wire::CryptoRequest {
            cmd: 42,
            request: Some(crypto_request::Request::Kg(wire::KeyGenRequest {
                group: 0,
                ballots: 1,
                options: 1,
            })),
        };
        assert!(matches!(
            decode_request(&to_bytes(&msg).unwrap()),
            Err(Error::MalformedMessage(_))
        ));

        // Command does not match the body
        let msg = wire::CryptoRequest {
            cmd: wire::Command::AddCom as i32,
            request: Some(crypto_request::Request::Kg(wire::KeyGenRequest {
                group: 0,
                ballots: 1,
                options: 1,
            })),
        };
        assert!(matches!(
            decode_request(&to_bytes(&msg).unwrap()),
            Err(Error::MalformedMessage(_))
        ));

        // Missing key
        let msg = wire::CryptoRequest {
            cmd: wire::Command::AddCom as i32,
            request: Some(crypto_request::Request::Ac(wire::AddComRequest {
                key: None,
                com: vec![],
            })),
        };
        assert!(matches!(
            decode_request(&to_bytes(&msg).unwrap()),
            Err(Error::MalformedMessage(_))
        ));

        // Bad group element
        let mut bad = wire::Key::from(&key());
        bad.public = vec![0xff; 32];
        let msg = wire::CryptoRequest {
            cmd: wire::Command::AddCom as i32,
            request: Some(crypto_request::Request::Ac(wire::AddComRequest {
                key: Some(bad),
                com: vec![],
            })),
        };
        assert!(matches!(
            decode_request(&to_bytes(&msg).unwrap()),
            Err(Error::MalformedMessage(_))
        ));
    }
}
