use crate::*;
use crate::group;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use std::fmt;
use tracing::instrument;

/// Election key for one question.
///
/// A key is generated for a fixed number of ballots and options: each option's
/// value is a power of `ballots + 1`, so the sizing is part of the key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Key {
    pub group: Group,
    pub ballots: u32,
    pub options: u32,

    #[serde(with = "PointHex")]
    pub public: RistrettoPoint,

    /// Only the election authority holds the secret part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretScalar>,
}

/// A secret scalar that is never printed
#[derive(Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct SecretScalar(#[serde(with = "ScalarHex")] pub Scalar);

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretScalar(..)")
    }
}

/// Generate a fresh key sized for `ballots` ballots and `options` options.
#[instrument(level = "info", skip(rng))]
pub fn key_gen<R: RngCore + CryptoRng>(
    group: Group,
    ballots: u32,
    options: u32,
    rng: &mut R,
) -> Result<Key, ValidationError> {
    check_capacity(group, ballots, options)?;

    let secret = Scalar::random(rng);
    let public = group::mul_base(&secret);

    Ok(Key {
        group,
        ballots,
        options,
        public,
        secret: Some(SecretScalar(secret)),
    })
}

/// The largest tally `(ballots+1)^options - 1` must stay below the group order.
pub fn check_capacity(group: Group, ballots: u32, options: u32) -> Result<(), ValidationError> {
    if ballots == 0 {
        return Err(ValidationError::ZeroBallots);
    }
    if options == 0 {
        return Err(ValidationError::ZeroOptions);
    }

    let radix = BigUint::from(ballots) + 1u32;
    if radix.pow(options) >= group.order() {
        return Err(ValidationError::TallyCapacityExceeded { ballots, options });
    }

    Ok(())
}

impl Key {
    /// Radix of the packed tally
    pub fn radix(&self) -> BigUint {
        BigUint::from(self.ballots) + 1u32
    }

    /// The committed value of option `index`: `(ballots+1)^index`
    pub fn option_message(&self, index: u32) -> BigUint {
        self.radix().pow(index)
    }

    /// Copy of this key without the secret part
    pub fn public_only(&self) -> Key {
        Key {
            secret: None,
            ..self.clone()
        }
    }

    /// Check the key's sizing and, if present, that the secret matches the public part.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_capacity(self.group, self.ballots, self.options)?;

        if let Some(secret) = &self.secret {
            if group::mul_base(&secret.0) != self.public {
                return Err(ValidationError::InconsistentKey);
            }
        }

        Ok(())
    }
}
