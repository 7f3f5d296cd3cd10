//! BN254 scalar field elements.
//!
//! Every leaf, root and intermediate hash lives in the scalar field of BN254,
//! the curve both the circuits and the contract operate over. Values coming
//! from outside (strings, byte encodings, serde) are checked against the
//! modulus and rejected rather than silently reduced.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::{BigInteger, MontFp, PrimeField, Zero};
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, Result};

/// Order of the BN254 scalar field, in decimal.
pub const SNARK_FIELD_SIZE: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

/// `keccak256("Maci") % SNARK_FIELD_SIZE`, the zero leaf of message queues.
pub const NOTHING_UP_MY_SLEEVE: FieldElement = FieldElement(MontFp!(
    "8370432830353022751713833565135785980866757267633941821328460903436894336785"
));

/// An element of the BN254 scalar field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(Fr);

impl FieldElement {
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The underlying arkworks field element.
    pub fn inner(&self) -> Fr {
        self.0
    }

    /// The field modulus as an unbounded integer.
    pub fn modulus() -> BigUint {
        BigUint::from_bytes_le(&Fr::MODULUS.to_bytes_le())
    }

    /// Convert an integer, failing if it is not below the modulus.
    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        if *value >= Self::modulus() {
            return Err(CryptoError::FieldElementOutOfRange(value.to_string()));
        }
        Ok(Self(Fr::from_le_bytes_mod_order(&value.to_bytes_le())))
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0.into_bigint().to_bytes_le())
    }

    /// Decode a 32-byte little-endian encoding.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidFieldEncoding(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        Self::from_biguint(&BigUint::from_bytes_le(bytes))
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.into_bigint().to_bytes_le()
    }

    /// 32-byte big-endian encoding, i.e. the EVM `uint256` word.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.into_bigint().to_bytes_be()
    }

    /// `0x`-prefixed, zero-padded big-endian hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_be_bytes()))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let value = BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| CryptoError::InvalidFieldEncoding(s.to_string()))?;
        Self::from_biguint(&value)
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        Self(value)
    }
}

impl From<FieldElement> for Fr {
    fn from(value: FieldElement) -> Self {
        value.0
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl FromStr for FieldElement {
    type Err = CryptoError;

    /// Parses decimal, or hex when prefixed with `0x`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("0x") {
            return Self::from_hex(s);
        }
        let value = BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| CryptoError::InvalidFieldEncoding(s.to_string()))?;
        Self::from_biguint(&value)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

// Decimal strings on the wire, matching how the coordinator stringifies bigints.
impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulus_matches_snark_field_size() {
        assert_eq!(FieldElement::modulus().to_string(), SNARK_FIELD_SIZE);
    }

    #[test]
    fn test_rejects_values_outside_field() {
        let p = FieldElement::modulus();
        assert!(matches!(
            FieldElement::from_biguint(&p),
            Err(CryptoError::FieldElementOutOfRange(_))
        ));
        assert!(FieldElement::from_biguint(&(p.clone() + 1u32)).is_err());

        let largest = FieldElement::from_biguint(&(p - 1u32)).unwrap();
        assert_eq!(largest.inner() + Fr::from(1u64), Fr::zero());
    }

    #[test]
    fn test_parse_decimal_and_hex() {
        let x: FieldElement = "255".parse().unwrap();
        assert_eq!(x, FieldElement::from(255u64));
        assert_eq!(x.to_hex(), format!("0x{}ff", "0".repeat(62)));
        assert_eq!(FieldElement::from_hex(&x.to_hex()).unwrap(), x);
        assert_eq!("0xff".parse::<FieldElement>().unwrap(), x);

        assert!(matches!(
            "not a number".parse::<FieldElement>(),
            Err(CryptoError::InvalidFieldEncoding(_))
        ));
        assert!(SNARK_FIELD_SIZE.parse::<FieldElement>().is_err());
    }

    #[test]
    fn test_byte_encodings() {
        let x = FieldElement::from(0x0102u64);
        let le = x.to_le_bytes();
        assert_eq!(le.len(), 32);
        assert_eq!(&le[..2], &[0x02, 0x01]);
        assert_eq!(FieldElement::from_le_bytes(&le).unwrap(), x);
        assert!(FieldElement::from_le_bytes(&le[..31]).is_err());
        assert!(FieldElement::from_le_bytes(&[0xff; 32]).is_err());
    }

    #[test]
    fn test_nothing_up_my_sleeve() {
        assert_eq!(
            NOTHING_UP_MY_SLEEVE.to_string(),
            "8370432830353022751713833565135785980866757267633941821328460903436894336785"
        );
    }

    #[test]
    fn test_serde_as_decimal_string() {
        let x = FieldElement::from(12345u64);
        let json = serde_json::to_string(&x).unwrap();
        assert_eq!(json, "\"12345\"");
        assert_eq!(serde_json::from_str::<FieldElement>(&json).unwrap(), x);

        let too_big = format!("\"{}\"", SNARK_FIELD_SIZE);
        assert!(serde_json::from_str::<FieldElement>(&too_big).is_err());
    }
}
