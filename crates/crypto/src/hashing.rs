//! Hash functions over field elements.
//!
//! Trees and queues are parametric over [`HashFunction`]. The hash must be
//! the same primitive the contract and the circuits use, otherwise roots
//! computed here will never match on-chain state. [`PoseidonHasher`] is the
//! circom-compatible Poseidon both of them use.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use light_poseidon::{Poseidon, PoseidonHasher as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, Result};
use crate::field::FieldElement;

/// A pure, deterministic hash from an ordered list of field elements to one
/// field element.
pub trait HashFunction: Clone {
    fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement>;
}

/// Number of children combined per hash call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum Arity {
    Binary,
    Quinary,
}

impl Arity {
    pub const fn width(self) -> usize {
        match self {
            Arity::Binary => 2,
            Arity::Quinary => 5,
        }
    }
}

impl TryFrom<usize> for Arity {
    type Error = CryptoError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            2 => Ok(Arity::Binary),
            5 => Ok(Arity::Quinary),
            other => Err(CryptoError::InvalidArity(other)),
        }
    }
}

impl From<Arity> for usize {
    fn from(arity: Arity) -> Self {
        arity.width()
    }
}

/// Circom-compatible Poseidon over BN254.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoseidonHasher;

impl HashFunction for PoseidonHasher {
    fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement> {
        let inputs: Vec<Fr> = inputs.iter().map(FieldElement::inner).collect();
        let mut poseidon =
            Poseidon::<Fr>::new_circom(inputs.len()).map_err(|e| CryptoError::Hash(e.to_string()))?;
        poseidon
            .hash(&inputs)
            .map(FieldElement::from)
            .map_err(|e| CryptoError::Hash(e.to_string()))
    }
}

/// SHA-256 over the packed `uint256` encoding of the inputs, reduced into the
/// field. Matches `uint256(sha256(abi.encodePacked(inputs))) % p` on the EVM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sha256Hasher;

impl HashFunction for Sha256Hasher {
    fn hash(&self, inputs: &[FieldElement]) -> Result<FieldElement> {
        Ok(sha256_hash(inputs))
    }
}

pub fn sha256_hash(inputs: &[FieldElement]) -> FieldElement {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input.to_be_bytes());
    }
    Fr::from_be_bytes_mod_order(&hasher.finalize()).into()
}

/// Poseidon of two elements.
pub fn hash_left_right(left: FieldElement, right: FieldElement) -> Result<FieldElement> {
    PoseidonHasher.hash(&[left, right])
}

/// Poseidon of up to `width` elements, zero-padded on the right.
pub fn hash_n(width: usize, elements: &[FieldElement]) -> Result<FieldElement> {
    if elements.len() > width {
        return Err(CryptoError::TooManyInputs {
            max: width,
            actual: elements.len(),
        });
    }
    let mut padded = elements.to_vec();
    padded.resize(width, FieldElement::zero());
    PoseidonHasher.hash(&padded)
}

pub fn hash5(elements: &[FieldElement]) -> Result<FieldElement> {
    hash_n(5, elements)
}

pub fn hash_one(pre_image: FieldElement) -> Result<FieldElement> {
    hash_left_right(pre_image, FieldElement::zero())
}

/// Zero values per level: `zeros[0] = zero_value` and
/// `zeros[i] = hash(arity copies of zeros[i - 1])`, for `levels` levels.
/// Also returns the next value up, i.e. the root of an empty tree of depth
/// `levels`.
pub(crate) fn zero_values<H: HashFunction>(
    hasher: &H,
    arity: Arity,
    zero_value: FieldElement,
    levels: usize,
) -> Result<(Vec<FieldElement>, FieldElement)> {
    let mut zeros = Vec::with_capacity(levels);
    let mut current = zero_value;
    for _ in 0..levels {
        zeros.push(current);
        current = hasher.hash(&vec![current; arity.width()])?;
    }
    Ok((zeros, current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_from_usize() {
        assert_eq!(Arity::try_from(2).unwrap(), Arity::Binary);
        assert_eq!(Arity::try_from(5).unwrap().width(), 5);
        for bad in [0, 1, 3, 4, 6] {
            assert_eq!(Arity::try_from(bad), Err(CryptoError::InvalidArity(bad)));
        }
        assert!(serde_json::from_str::<Arity>("3").is_err());
        assert_eq!(serde_json::to_string(&Arity::Quinary).unwrap(), "5");
    }

    #[test]
    fn test_poseidon_circom_vector() {
        // poseidon([1, 2]) from circomlibjs
        let expected: FieldElement =
            "7853200120776062878684798364095072458815029376092732009249414926327459813530"
                .parse()
                .unwrap();
        let hashed = hash_left_right(FieldElement::from(1u64), FieldElement::from(2u64)).unwrap();
        assert_eq!(hashed, expected);
    }

    #[test]
    fn test_hash5_pads_with_zeros() {
        let elements: Vec<FieldElement> = (1..=3).map(FieldElement::from).collect();
        let padded = [
            elements[0],
            elements[1],
            elements[2],
            FieldElement::zero(),
            FieldElement::zero(),
        ];
        assert_eq!(hash5(&elements).unwrap(), PoseidonHasher.hash(&padded).unwrap());

        let too_many: Vec<FieldElement> = (0..6).map(FieldElement::from).collect();
        assert_eq!(
            hash5(&too_many),
            Err(CryptoError::TooManyInputs { max: 5, actual: 6 })
        );
    }

    #[test]
    fn test_hash_one() {
        let x = FieldElement::from(42u64);
        assert_eq!(
            hash_one(x).unwrap(),
            hash_left_right(x, FieldElement::zero()).unwrap()
        );
    }

    #[test]
    fn test_sha256_is_reduced_and_order_sensitive() {
        let a = FieldElement::from(1u64);
        let b = FieldElement::from(2u64);
        let ab = sha256_hash(&[a, b]);
        assert_ne!(ab, sha256_hash(&[b, a]));
        assert!(ab.to_biguint() < FieldElement::modulus());
        assert_eq!(Sha256Hasher.hash(&[a, b]).unwrap(), ab);
    }

    #[test]
    fn test_zero_values() {
        let zero = FieldElement::zero();
        let (zeros, next) = zero_values(&PoseidonHasher, Arity::Binary, zero, 3).unwrap();
        assert_eq!(zeros.len(), 3);
        assert_eq!(zeros[0], zero);
        assert_eq!(zeros[1], hash_left_right(zero, zero).unwrap());
        assert_eq!(zeros[2], hash_left_right(zeros[1], zeros[1]).unwrap());
        assert_eq!(next, hash_left_right(zeros[2], zeros[2]).unwrap());
    }
}
