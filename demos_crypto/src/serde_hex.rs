use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use num_bigint::BigUint;
use std::borrow::Cow;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum PointHex {}

impl Hex<RistrettoPoint> for PointHex {
    type Error = String;

    fn create_bytes(point: &RistrettoPoint) -> Cow<[u8]> {
        Cow::from(crate::group::encode_point(point))
    }

    fn from_bytes(bytes: &[u8]) -> Result<RistrettoPoint, String> {
        crate::group::decode_point(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum ScalarHex {}

impl Hex<Scalar> for ScalarHex {
    type Error = String;

    fn create_bytes(scalar: &Scalar) -> Cow<[u8]> {
        Cow::from(crate::group::encode_scalar(scalar))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Scalar, String> {
        crate::group::decode_scalar(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum BigUintHex {}

impl Hex<BigUint> for BigUintHex {
    type Error = String;

    fn create_bytes(value: &BigUint) -> Cow<[u8]> {
        Cow::from(value.to_bytes_be())
    }

    fn from_bytes(bytes: &[u8]) -> Result<BigUint, String> {
        Ok(BigUint::from_bytes_be(bytes))
    }
}
