//! Merkle membership proofs for quin trees.

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};
use crate::field::FieldElement;
use crate::hashing::{Arity, HashFunction};

/// A path from a leaf (or a subtree root) up to the root.
///
/// `path_elements[i]` holds the `arity - 1` siblings at level `i` with the
/// path node's own slot removed, and `indices[i]` is that node's position
/// within its group of `arity`. This is the shape the circuits take as input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub path_elements: Vec<Vec<FieldElement>>,
    pub indices: Vec<usize>,
    pub depth: usize,
    pub root: FieldElement,
    pub leaf: FieldElement,
}

impl MerkleProof {
    /// Check the proof's shape and return its arity.
    pub fn validate(&self) -> Result<Arity> {
        if self.depth == 0 {
            return Err(CryptoError::MalformedProof("depth must be at least 1".into()));
        }
        if self.path_elements.len() != self.depth {
            return Err(CryptoError::MalformedProof(format!(
                "expected {} levels of path elements, got {}",
                self.depth,
                self.path_elements.len()
            )));
        }
        if self.indices.len() != self.depth {
            return Err(CryptoError::MalformedProof(format!(
                "expected {} indices, got {}",
                self.depth,
                self.indices.len()
            )));
        }

        let siblings = self.path_elements[0].len();
        let arity = Arity::try_from(siblings + 1).map_err(|_| {
            CryptoError::MalformedProof(format!("unsupported number of siblings: {}", siblings))
        })?;

        let levels = self.path_elements.iter().zip(&self.indices);
        for (level, (elements, &index)) in levels.enumerate() {
            if elements.len() != siblings {
                return Err(CryptoError::MalformedProof(format!(
                    "level {} has {} siblings, expected {}",
                    level,
                    elements.len(),
                    siblings
                )));
            }
            if index >= arity.width() {
                return Err(CryptoError::MalformedProof(format!(
                    "index {} at level {} exceeds arity {}",
                    index,
                    level,
                    arity.width()
                )));
            }
        }

        Ok(arity)
    }

    /// Recompute the root from the leaf and compare it with `root`.
    pub fn verify<H: HashFunction>(&self, hasher: &H) -> Result<bool> {
        self.validate()?;

        let mut current = self.leaf;
        for (elements, &index) in self.path_elements.iter().zip(&self.indices) {
            let mut level = elements.clone();
            level.insert(index, current);
            current = hasher.hash(&level)?;
        }

        Ok(current == self.root)
    }
}
