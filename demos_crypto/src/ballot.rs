use crate::*;
use crate::group;
use crate::zk;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use tracing::instrument;

/// Commitment to an option value: lifted ElGamal `(r·G, m·G + r·H)`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Com {
    #[serde(with = "PointHex")]
    pub c1: RistrettoPoint,

    #[serde(with = "PointHex")]
    pub c2: RistrettoPoint,
}

/// Opening of a commitment
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Decom {
    #[serde(with = "ScalarHex")]
    pub randomness: Scalar,

    #[serde(with = "BigUintHex")]
    pub message: BigUint,
}

/// One encrypted option cell of a ballot part
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EncryptedOption {
    pub com: Com,
    pub decom: Decom,
    pub zk1: Zk1,
    pub zk_state: ZkState,
}

/// All option cells of one ballot part, in option order
pub type BallotPart = Vec<EncryptedOption>;

/// Commit to `message` with the given randomness
pub fn commit(key: &Key, message: &BigUint, randomness: &Scalar) -> Com {
    let m = group::scalar_from_biguint(message);
    Com {
        c1: group::mul_base(randomness),
        c2: group::mul_base(&m) + randomness * key.public,
    }
}

/// Generate `number` ballot parts for `key`.
///
/// Cell `j` of every part commits to `(ballots+1)^j`, so that exactly one cell
/// carries each option's unit. Parts are generated in parallel.
#[instrument(level = "info", skip(key), fields(ballots = key.ballots, options = key.options))]
pub fn gen_ballot(key: &Key, number: u32) -> Vec<BallotPart> {
    (0..number)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            gen_part(key, &mut rng)
        })
        .collect()
}

fn gen_part<R: RngCore + CryptoRng>(key: &Key, rng: &mut R) -> BallotPart {
    (0..key.options)
        .map(|index| encrypt_option(key, index, rng))
        .collect()
}

fn encrypt_option<R: RngCore + CryptoRng>(key: &Key, index: u32, rng: &mut R) -> EncryptedOption {
    let message = key.option_message(index);
    let randomness = Scalar::random(rng);
    let com = commit(key, &message, &randomness);
    let (zk1, zk_state) = zk::first_move(key, &com, index, randomness, rng);

    EncryptedOption {
        com,
        decom: Decom {
            randomness,
            message,
        },
        zk1,
        zk_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(ballots: u32, options: u32) -> Key {
        let mut rng = rand::rngs::OsRng {};
        key_gen(Group::Ristretto255, ballots, options, &mut rng).unwrap()
    }

    #[test]
    fn every_cell_opens() {
        let key = test_key(10, 3);
        let parts = gen_ballot(&key, 4);

        assert_eq!(parts.len(), 4);
        for part in parts.iter() {
            assert_eq!(part.len(), 3);
            for cell in part.iter() {
                assert!(verify_com(&key, &cell.com, &cell.decom));
            }
        }
    }

    #[test]
    fn one_hot() {
        let key = test_key(10, 4);

        for part in gen_ballot(&key, 6) {
            // digits[cell][position]
            let digits: Vec<Vec<u64>> = part
                .iter()
                .map(|cell| decode_tally(&cell.decom.message, key.ballots, key.options).unwrap())
                .collect();

            for (cell_index, cell_digits) in digits.iter().enumerate() {
                assert_eq!(cell_digits.iter().sum::<u64>(), 1);
                assert_eq!(cell_digits[cell_index], 1);
            }

            for position in 0..key.options as usize {
                let ones = digits.iter().filter(|d| d[position] == 1).count();
                assert_eq!(ones, 1);
            }
        }
    }

    #[test]
    fn commitments_hide_randomness() {
        let key = test_key(10, 2);
        let parts = gen_ballot(&key, 2);

        // Same option on two parts never produces the same commitment
        assert_ne!(parts[0][0].com, parts[1][0].com);
        assert_eq!(parts[0][0].decom.message, parts[1][0].decom.message);
    }
}
