//! Incremental Merkle tree with 2 or 5 leaves per node.
//!
//! Conforms to the contract's incremental quin tree: appends cost
//! `O(depth)` hashes, empty slots hold the per-level zero value, and the root
//! is always that of the full `arity^depth` tree.

use tracing::trace;

use crate::error::{CryptoError, Result};
use crate::field::FieldElement;
use crate::hashing::{zero_values, Arity, HashFunction, PoseidonHasher};
use crate::proof::MerkleProof;
use crate::utils::capacity;

#[derive(Clone, Debug)]
pub struct MerkleTree<H = PoseidonHasher> {
    depth: usize,
    arity: Arity,
    zero_value: FieldElement,
    /// `zeros[i]` is the root of an empty subtree of depth `i`.
    zeros: Vec<FieldElement>,
    root: FieldElement,
    next_index: usize,
    leaves: Vec<FieldElement>,
    /// The node currently being filled at each level, `arity` slots wide.
    filled_subtrees: Vec<Vec<FieldElement>>,
    /// `filled_paths[i - 1][j]` is interior node `j` at level `i`.
    filled_paths: Vec<Vec<FieldElement>>,
    hasher: H,
}

impl<H: HashFunction> MerkleTree<H> {
    /// Create an empty tree.
    ///
    /// `arity` must be 2 or 5 and `depth` at least 1.
    pub fn new(depth: usize, zero_value: FieldElement, arity: usize, hasher: H) -> Result<Self> {
        let arity = Arity::try_from(arity)?;
        if depth == 0 {
            return Err(CryptoError::InvalidDepth {
                depth,
                reason: "a tree needs at least one level",
            });
        }

        let (zeros, root) = zero_values(&hasher, arity, zero_value, depth)?;
        let filled_subtrees = zeros.iter().map(|z| vec![*z; arity.width()]).collect();

        Ok(Self {
            depth,
            arity,
            zero_value,
            zeros,
            root,
            next_index: 0,
            leaves: Vec::new(),
            filled_subtrees,
            filled_paths: vec![Vec::new(); depth - 1],
            hasher,
        })
    }

    /// Append a leaf at `next_index`.
    pub fn insert(&mut self, leaf: FieldElement) -> Result<()> {
        let capacity = self.capacity();
        if self.next_index as u128 >= capacity {
            return Err(CryptoError::TreeFull { capacity });
        }

        let width = self.arity.width();
        let mut current_index = self.next_index;
        let mut m = current_index % width;

        // Starting a fresh node: its siblings are empty.
        if m == 0 {
            self.filled_subtrees[0][1..].fill(self.zeros[0]);
        }
        self.filled_subtrees[0][m] = leaf;

        for level in 1..self.depth {
            current_index /= width;
            m = current_index % width;

            if m == 0 {
                let zero = self.zeros[level];
                self.filled_subtrees[level][1..].fill(zero);
            }

            let hashed = self.hasher.hash(&self.filled_subtrees[level - 1])?;
            self.filled_subtrees[level][m] = hashed;

            let path = &mut self.filled_paths[level - 1];
            if path.len() <= current_index {
                path.push(hashed);
            } else {
                path[current_index] = hashed;
            }
        }

        self.leaves.push(leaf);
        self.next_index += 1;
        self.root = self.hasher.hash(&self.filled_subtrees[self.depth - 1])?;

        trace!(index = self.next_index - 1, "inserted leaf");
        Ok(())
    }

    /// Replace the leaf at `index`.
    ///
    /// Rebuilds the whole tree from the leaf list, exactly like the contract's
    /// naive update, so it costs `O(n * depth)` hashes.
    pub fn update(&mut self, index: usize, leaf: FieldElement) -> Result<()> {
        self.check_index(index)?;

        let mut leaves = self.leaves.clone();
        leaves[index] = leaf;

        let mut rebuilt = Self::new(
            self.depth,
            self.zero_value,
            self.arity.width(),
            self.hasher.clone(),
        )?;
        for leaf in leaves {
            rebuilt.insert(leaf)?;
        }

        *self = rebuilt;
        Ok(())
    }

    pub fn get_leaf(&self, index: usize) -> Result<FieldElement> {
        self.check_index(index)?;
        Ok(self.leaves[index])
    }

    /// Generate a membership proof for the leaf at `index`.
    pub fn gen_merkle_path(&self, index: usize) -> Result<MerkleProof> {
        self.check_index(index)?;
        let (path_elements, indices) = self.path_from(index);

        Ok(MerkleProof {
            path_elements,
            indices,
            depth: self.depth,
            root: self.root,
            leaf: self.leaves[index],
        })
    }

    /// Generate a proof that the root of the subtree spanning leaves
    /// `[start, end)` is part of this tree.
    ///
    /// The range must cover `arity^k` leaves for some `1 <= k < depth` and be
    /// aligned to that size. Slots past `next_index` count as zero leaves.
    pub fn gen_subroot_proof(&self, start: usize, end: usize) -> Result<MerkleProof> {
        let invalid = |reason| CryptoError::InvalidRange { start, end, reason };

        if start >= end {
            return Err(invalid("the start index must be below the end index"));
        }
        if end as u128 > self.capacity() {
            return Err(invalid("the range exceeds the tree capacity"));
        }

        let num_leaves = end - start;
        let width = self.arity.width();
        let sub_depth = (1..self.depth)
            .find(|&d| capacity(width, d) == num_leaves as u128)
            .ok_or_else(|| invalid("the range must hold arity^k leaves for 1 <= k < depth"))?;
        if start % num_leaves != 0 {
            return Err(invalid("the range must be aligned to its size"));
        }

        let mut subtree = Self::new(sub_depth, self.zero_value, width, self.hasher.clone())?;
        for leaf in self.leaves.iter().take(end).skip(start) {
            subtree.insert(*leaf)?;
        }

        let (mut path_elements, mut indices) = self.path_from(start);
        path_elements.drain(..sub_depth);
        indices.drain(..sub_depth);

        Ok(MerkleProof {
            path_elements,
            indices,
            depth: self.depth - sub_depth,
            root: self.root,
            leaf: subtree.root(),
        })
    }

    /// Verify a proof produced by [`MerkleTree::gen_merkle_path`] or
    /// [`MerkleTree::gen_subroot_proof`].
    pub fn verify_merkle_path(proof: &MerkleProof, hasher: &H) -> Result<bool> {
        proof.verify(hasher)
    }

    /// Hash exactly `arity` elements with this tree's hash function.
    pub fn hash(&self, leaves: &[FieldElement]) -> Result<FieldElement> {
        if leaves.len() != self.arity.width() {
            return Err(CryptoError::LeafCountMismatch {
                expected: self.arity.width(),
                actual: leaves.len(),
            });
        }
        self.hasher.hash(leaves)
    }

    fn path_from(&self, index: usize) -> (Vec<Vec<FieldElement>>, Vec<usize>) {
        let width = self.arity.width();
        let mut path_elements = Vec::with_capacity(self.depth);
        let mut indices = Vec::with_capacity(self.depth);

        let mut node_index = index;
        for level in 0..self.depth {
            let position = node_index % width;
            let group_start = node_index - position;

            path_elements.push(
                (0..width)
                    .filter(|&slot| slot != position)
                    .map(|slot| self.node(level, group_start + slot))
                    .collect(),
            );
            indices.push(position);

            node_index /= width;
        }

        (path_elements, indices)
    }

    fn node(&self, level: usize, index: usize) -> FieldElement {
        let stored = if level == 0 {
            self.leaves.get(index)
        } else {
            self.filled_paths[level - 1].get(index)
        };
        stored.copied().unwrap_or(self.zeros[level])
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.next_index {
            return Err(CryptoError::IndexOutOfRange {
                index,
                size: self.next_index,
            });
        }
        Ok(())
    }
}

impl<H> MerkleTree<H> {
    pub fn root(&self) -> FieldElement {
        self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn zero_value(&self) -> FieldElement {
        self.zero_value
    }

    pub fn zeros(&self) -> &[FieldElement] {
        &self.zeros
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn leaves(&self) -> &[FieldElement] {
        &self.leaves
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Number of leaves the tree can hold, `arity^depth`.
    pub fn capacity(&self) -> u128 {
        capacity(self.arity.width(), self.depth)
    }
}
