//! Proofs that a committed option cell holds one of the valid option values.
//!
//! Each cell carries a Cramer-Damgård-Schoenmakers OR-proof over the statements
//! "`(C1, C2 − m_i·G)` is a Diffie-Hellman tuple with `(G, H)`" for every option
//! value `m_i = (ballots+1)^i`. The prover simulates every branch except the real
//! one up front (ZK1, with the private ZKState), and completes the proof once the
//! election coins are known (ZK2). The challenge binds the coins to the cell's
//! commitment and first move, so it cannot be chosen before voting closes.

use crate::*;
use crate::group;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use tracing::instrument;

const CHALLENGE_DOMAIN: &[u8] = b"demos-crypto/zk/challenge";

/// First-move commitment of one proof branch: `(A_i, B_i)`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ZkCommitment {
    #[serde(with = "PointHex")]
    pub a: RistrettoPoint,

    #[serde(with = "PointHex")]
    pub b: RistrettoPoint,
}

/// Challenge and response of one proof branch: `(e_i, z_i)`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ZkBranch {
    #[serde(with = "ScalarHex")]
    pub challenge: Scalar,

    #[serde(with = "ScalarHex")]
    pub response: Scalar,
}

/// Public first move, one commitment per option
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Zk1 {
    pub commitments: Vec<ZkCommitment>,
}

/// Private prover state needed to answer the challenge.
///
/// `simulated[index]` is a placeholder; every other entry is a simulated branch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ZkState {
    #[serde(with = "ScalarHex")]
    pub randomness: Scalar,

    pub index: u32,

    #[serde(with = "ScalarHex")]
    pub nonce: Scalar,

    pub simulated: Vec<ZkBranch>,
}

/// Completed second move, one branch per option
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Zk2 {
    pub branches: Vec<ZkBranch>,
}

/// A proof waiting for its challenge
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PendingZk {
    pub zk1: Zk1,
    pub zk_state: ZkState,
}

/// Produce the first move for a cell committing to option `index` with `randomness`.
pub(crate) fn first_move<R: RngCore + CryptoRng>(
    key: &Key,
    com: &Com,
    index: u32,
    randomness: Scalar,
    rng: &mut R,
) -> (Zk1, ZkState) {
    let nonce = Scalar::random(rng);

    let mut commitments = Vec::with_capacity(key.options as usize);
    let mut simulated = Vec::with_capacity(key.options as usize);

    for i in 0..key.options {
        if i == index {
            commitments.push(ZkCommitment {
                a: group::mul_base(&nonce),
                b: nonce * key.public,
            });
            simulated.push(ZkBranch {
                challenge: Scalar::zero(),
                response: Scalar::zero(),
            });
        } else {
            let challenge = Scalar::random(rng);
            let response = Scalar::random(rng);
            let shifted = shifted_c2(key, com, i);

            commitments.push(ZkCommitment {
                a: group::mul_base(&response) - challenge * com.c1,
                b: response * key.public - challenge * shifted,
            });
            simulated.push(ZkBranch {
                challenge,
                response,
            });
        }
    }

    let state = ZkState {
        randomness,
        index,
        nonce,
        simulated,
    };
    (Zk1 { commitments }, state)
}

/// Check that every pending proof has one branch per option and a valid real index.
pub fn check_pending(key: &Key, pending: &[PendingZk]) -> Result<(), ValidationError> {
    for (n, p) in pending.iter().enumerate() {
        let branches = p.zk1.commitments.len();
        if branches != key.options as usize {
            return Err(ValidationError::BranchCountMismatch(n, branches, key.options));
        }
        let branches = p.zk_state.simulated.len();
        if branches != key.options as usize {
            return Err(ValidationError::BranchCountMismatch(n, branches, key.options));
        }
        if p.zk_state.index >= key.options {
            return Err(ValidationError::BranchIndexOutOfRange(n, p.zk_state.index));
        }
    }
    Ok(())
}

/// Complete pending proofs using the election coins as public randomness.
///
/// Must only be called once the coins are final.
#[instrument(level = "info", skip(key, pending), fields(proofs = pending.len()))]
pub fn complete_zk(
    key: &Key,
    coins: &str,
    pending: &[PendingZk],
) -> Result<Vec<Zk2>, ValidationError> {
    if coins.is_empty() {
        return Err(ValidationError::EmptyCoins);
    }
    check_pending(key, pending)?;

    Ok(pending
        .par_iter()
        .map(|p| complete_one(key, coins, p))
        .collect())
}

fn complete_one(key: &Key, coins: &str, pending: &PendingZk) -> Zk2 {
    let state = &pending.zk_state;
    let message = key.option_message(state.index);
    let com = commit(key, &message, &state.randomness);

    let e = challenge(coins, &com, &pending.zk1);
    let others: Scalar = state
        .simulated
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as u32 != state.index)
        .map(|(_, branch)| branch.challenge)
        .sum();

    let real_challenge = e - others;
    let real = ZkBranch {
        challenge: real_challenge,
        response: state.nonce + real_challenge * state.randomness,
    };

    let branches = state
        .simulated
        .iter()
        .enumerate()
        .map(|(i, branch)| {
            if i as u32 == state.index {
                real.clone()
            } else {
                branch.clone()
            }
        })
        .collect();

    Zk2 { branches }
}

/// Verify a completed proof against public data only.
pub fn verify_zk(key: &Key, coins: &str, com: &Com, zk1: &Zk1, zk2: &Zk2) -> bool {
    let options = key.options as usize;
    if zk1.commitments.len() != options || zk2.branches.len() != options {
        return false;
    }

    let e = challenge(coins, com, zk1);
    let sum: Scalar = zk2.branches.iter().map(|b| b.challenge).sum();
    if sum != e {
        return false;
    }

    for (i, (commitment, branch)) in zk1.commitments.iter().zip(zk2.branches.iter()).enumerate() {
        let shifted = shifted_c2(key, com, i as u32);

        let lhs_a = group::mul_base(&branch.response);
        let rhs_a = commitment.a + branch.challenge * com.c1;
        let lhs_b = branch.response * key.public;
        let rhs_b = commitment.b + branch.challenge * shifted;

        if lhs_a != rhs_a || lhs_b != rhs_b {
            return false;
        }
    }

    true
}

/// `C2 − m_i·G`
fn shifted_c2(key: &Key, com: &Com, index: u32) -> RistrettoPoint {
    let m = group::scalar_from_biguint(&key.option_message(index));
    com.c2 - group::mul_base(&m)
}

fn challenge(coins: &str, com: &Com, zk1: &Zk1) -> Scalar {
    let mut transcript = Vec::with_capacity(64 * (zk1.commitments.len() + 1));
    transcript.extend_from_slice(com.c1.compress().as_bytes());
    transcript.extend_from_slice(com.c2.compress().as_bytes());
    for commitment in zk1.commitments.iter() {
        transcript.extend_from_slice(commitment.a.compress().as_bytes());
        transcript.extend_from_slice(commitment.b.compress().as_bytes());
    }

    group::hash_to_scalar(CHALLENGE_DOMAIN, &[coins.as_bytes(), &transcript])
}
