use crate::*;
use crate::zk;
use tracing::{debug, instrument, warn};

/// Most ballot parts one GenBallot request may ask for
pub const MAX_BALLOT_PARTS: u32 = 512;

/// Check a request's structural preconditions.
///
/// Nothing here touches key material beyond the public/secret consistency check.
/// `max_parts` bounds the work a single GenBallot request can cause.
pub fn validate(request: &Request, max_parts: u32) -> Result<(), ValidationError> {
    match request {
        Request::KeyGen {
            group,
            ballots,
            options,
        } => check_capacity(*group, *ballots, *options),

        Request::GenBallot {
            key,
            ballots,
            options,
            number,
        } => {
            key.validate()?;
            if *number == 0 || number % 2 != 0 {
                return Err(ValidationError::OddBallotNumber(*number));
            }
            if *number > max_parts {
                return Err(ValidationError::TooManyBallotParts {
                    number: *number,
                    limit: max_parts,
                });
            }
            if *options == 0 {
                return Err(ValidationError::ZeroOptions);
            }
            matches_key("ballots", key.ballots, *ballots)?;
            matches_key("options", key.options, *options)
        }

        Request::CompleteZk {
            key,
            options,
            coins,
            zk_set,
        } => {
            key.validate()?;
            matches_key("options", key.options, *options)?;
            if coins.as_str().is_empty() {
                return Err(ValidationError::EmptyCoins);
            }
            zk::check_pending(key, zk_set)
        }

        Request::AddCom { key, .. }
        | Request::AddDecom { key, .. }
        | Request::VerifyCom { key, .. } => key.validate(),
    }
}

fn matches_key(field: &'static str, expected: u32, actual: u32) -> Result<(), ValidationError> {
    if expected != actual {
        return Err(ValidationError::KeyMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Runs requests against the in-process engine.
#[derive(Clone, Copy, Debug)]
pub struct Dispatcher {
    max_parts: u32,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher {
            max_parts: MAX_BALLOT_PARTS,
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    pub fn with_max_parts(max_parts: u32) -> Self {
        Dispatcher { max_parts }
    }

    /// Validate then execute one request
    #[instrument(level = "debug", skip(self, request), fields(cmd = %request.command()))]
    pub fn dispatch(&self, request: Request) -> Result<Response, Error> {
        validate(&request, self.max_parts)?;

        let response = match request {
            Request::KeyGen {
                group,
                ballots,
                options,
            } => {
                let mut rng = rand::rngs::OsRng {};
                Response::Key(key_gen(group, ballots, options, &mut rng)?)
            }
            Request::GenBallot { key, number, .. } => {
                Response::BallotData(gen_ballot(&key, number))
            }
            Request::AddCom { coms, .. } => Response::AddedCom(add_com(&coms)),
            Request::AddDecom { decoms, .. } => Response::AddedDecom(add_decom(&decoms)),
            Request::CompleteZk {
                key, coins, zk_set, ..
            } => Response::ZkSet(zk::complete_zk(&key, coins.as_str(), &zk_set)?),
            Request::VerifyCom { key, com, decom } => {
                Response::Check(verify_com(&key, &com, &decom))
            }
        };

        Ok(response)
    }

    /// Handle one framed payload, producing the payload to send back.
    ///
    /// Decoding and validation failures are answered with an error response
    /// rather than dropped.
    pub fn handle(&self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let result = codec::decode_request(payload).and_then(|request| self.dispatch(request));

        match result {
            Ok(response) => {
                debug!(cmd = %response.command(), "request complete");
                codec::encode_response(Ok(&response))
            }
            Err(e) => {
                warn!(error = %e, "rejecting request");
                codec::encode_response(Err(&e.to_string()))
            }
        }
    }
}

impl Backend for Dispatcher {
    fn call(&self, request: Request) -> Result<Response, Error> {
        self.dispatch(request)
    }
}
