use crate::*;
use curve25519_dalek::constants::{BASEPOINT_ORDER, RISTRETTO_BASEPOINT_TABLE};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use num_bigint::BigUint;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use sha2::{Digest, Sha512};
use std::convert::TryInto;
use std::fmt;

/// The prime-order group an election key lives in.
///
/// Only Ristretto255 is implemented; the selector travels on the wire so that
/// a backend can refuse keys it does not understand.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[repr(i32)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Ristretto255 = 0,
}

impl Default for Group {
    fn default() -> Self {
        Group::Ristretto255
    }
}

impl Group {
    pub fn from_wire(value: i32) -> Result<Self, Error> {
        Group::try_from_primitive(value)
            .map_err(|_| Error::MalformedMessage(format!("unknown group {}", value)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Group::Ristretto255 => "ristretto255",
        }
    }

    /// The group order ℓ as a big integer
    pub fn order(&self) -> BigUint {
        BigUint::from_bytes_le(BASEPOINT_ORDER.as_bytes())
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// s·G
pub(crate) fn mul_base(s: &Scalar) -> RistrettoPoint {
    s * &RISTRETTO_BASEPOINT_TABLE
}

pub(crate) fn encode_point(point: &RistrettoPoint) -> Vec<u8> {
    point.compress().to_bytes().to_vec()
}

pub(crate) fn decode_point(bytes: &[u8]) -> Result<RistrettoPoint, Error> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::MalformedMessage(format!("group element of {} bytes", bytes.len())))?;

    CompressedRistretto(bytes)
        .decompress()
        .ok_or_else(|| Error::MalformedMessage("invalid group element encoding".to_owned()))
}

pub(crate) fn encode_scalar(scalar: &Scalar) -> Vec<u8> {
    scalar.to_bytes().to_vec()
}

/// Decode a canonical little-endian scalar
pub(crate) fn decode_scalar(bytes: &[u8]) -> Result<Scalar, Error> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::MalformedMessage(format!("scalar of {} bytes", bytes.len())))?;

    Scalar::from_canonical_bytes(bytes)
        .ok_or_else(|| Error::MalformedMessage("non-canonical scalar encoding".to_owned()))
}

/// Reduce a big integer modulo ℓ
pub(crate) fn scalar_from_biguint(value: &BigUint) -> Scalar {
    let reduced = value % Group::Ristretto255.order();
    let mut bytes = [0u8; 32];
    let le = reduced.to_bytes_le();
    bytes[..le.len()].copy_from_slice(&le);
    Scalar::from_bytes_mod_order(bytes)
}

/// Domain-separated hash to scalar.
///
/// Each part is length-prefixed so that concatenations cannot collide.
pub(crate) fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    Scalar::from_hash(hasher)
}
