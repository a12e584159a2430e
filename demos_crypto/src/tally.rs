use crate::*;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use sha2::{Digest, Sha256};

/// Public randomness for proof completion, derived from the final vote pattern.
///
/// One ASCII character per ballot in ascending serial order, `'1'` if the
/// ballot was cast with its `B` part, `'0'` otherwise; the SHA-256 of that string
/// in lowercase hex.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Coins(String);

impl Coins {
    pub fn from_bitmap<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let bitmap: String = bits
            .into_iter()
            .map(|bit| if bit { '1' } else { '0' })
            .collect();

        Coins(hex::encode(Sha256::digest(bitmap.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Coins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Coins {
    fn from(coins: String) -> Self {
        Coins(coins)
    }
}

/// Split an opened tally message into per-option vote counts.
///
/// The message is `Σ count_i·(ballots+1)^i`; digits are taken least significant
/// first, so the result is in option order. A remainder after the last option
/// means the message was not produced by this election's ballots.
pub fn decode_tally(message: &BigUint, ballots: u32, options: u32) -> Option<Vec<u64>> {
    let radix = BigUint::from(ballots) + 1u32;
    let mut message = message.clone();
    let mut counts = Vec::with_capacity(options as usize);

    for _ in 0..options {
        let count = &message % &radix;
        message = (message - &count) / &radix;

        // count < radix <= 2^32
        counts.push(count.to_u64().unwrap_or(u64::MAX));
    }

    if !message.is_zero() {
        return None;
    }

    Some(counts)
}
