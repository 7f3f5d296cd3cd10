//! Accumulator queue.
//!
//! Leaves are batched into subtrees of `hash_length^sub_depth` leaves. Each
//! completed subtree root is kept, and the roots are merged into a main root
//! in two phases: [`AccQueue::merge_sub_roots`] builds the smallest tree that
//! fits every subroot (the SRT) in resumable batches, and [`AccQueue::merge`]
//! extends the SRT root to the requested depth with zero subtrees. Both
//! phases follow the steps the contract performs under its gas limit, so the
//! roots are bit-identical to the on-chain ones. [`AccQueue::merge_direct`]
//! computes the same root in one shot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{CryptoError, Result};
use crate::field::FieldElement;
use crate::hashing::{zero_values, Arity, HashFunction, PoseidonHasher};
use crate::quin_tree::MerkleTree;
use crate::utils::{calc_depth_from_num_leaves, capacity};
use crate::MAX_DEPTH;

/// Where a queue is in its merge lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccQueueState {
    /// No leaves and no subtrees.
    Empty,
    /// Leaves present, no merge for the current leaf set yet.
    Accumulating,
    /// The SRT root is known; [`AccQueue::merge`] may run.
    SubRootsMerged,
    /// A main root exists; carries the deepest merged depth.
    Rooted(usize),
}

/// Per-level buffer of nodes waiting for their siblings.
///
/// `levels[l]` holds up to `hash_length - 1` nodes at level `l` and
/// `indices[l]` is the next free slot. When a level receives its last
/// sibling the group is hashed and the parent is pushed to `l + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelQueue {
    pub(crate) levels: Vec<Vec<FieldElement>>,
    pub(crate) indices: Vec<usize>,
}

impl LevelQueue {
    pub(crate) fn new(arity: Arity) -> Self {
        Self {
            levels: vec![vec![FieldElement::zero(); arity.width() - 1]; MAX_DEPTH + 1],
            indices: vec![0; MAX_DEPTH + 1],
        }
    }

    /// Push `value` at `level`, carrying completed groups upwards. Nothing
    /// is carried past `max_level`.
    pub(crate) fn push<H: HashFunction>(
        &mut self,
        hasher: &H,
        mut value: FieldElement,
        mut level: usize,
        max_level: usize,
    ) -> Result<()> {
        while level <= max_level {
            let slots = self.levels[level].len();
            let n = self.indices[level];
            if n != slots {
                self.levels[level][n] = value;
                self.indices[level] += 1;
                return Ok(());
            }

            let mut inputs = self.levels[level].clone();
            inputs.push(value);
            value = hasher.hash(&inputs)?;

            self.clear_level(level);
            level += 1;
        }
        Ok(())
    }

    fn clear_level(&mut self, level: usize) {
        self.levels[level].fill(FieldElement::zero());
        self.indices[level] = 0;
    }

    fn reset(&mut self) {
        for level in 0..self.levels.len() {
            self.clear_level(level);
        }
    }
}

#[derive(Clone, Debug)]
pub struct AccQueue<H = PoseidonHasher> {
    pub(crate) sub_depth: usize,
    pub(crate) arity: Arity,
    pub(crate) zero_value: FieldElement,
    pub(crate) zeros: Vec<FieldElement>,
    pub(crate) subtree_capacity: u64,
    pub(crate) num_leaves: u64,
    pub(crate) current_subtree_index: u64,
    pub(crate) sub_roots: Vec<FieldElement>,
    pub(crate) leaf_queue: LevelQueue,
    pub(crate) sub_root_queue: LevelQueue,
    pub(crate) next_sr_index_to_queue: u64,
    pub(crate) small_srt_root: FieldElement,
    pub(crate) main_roots: BTreeMap<usize, FieldElement>,
    pub(crate) sub_trees_merged: bool,
    pub(crate) hasher: H,
}

impl<H: HashFunction> AccQueue<H> {
    pub fn new(
        sub_depth: usize,
        hash_length: usize,
        zero_value: FieldElement,
        hasher: H,
    ) -> Result<Self> {
        let arity = Arity::try_from(hash_length)?;
        if sub_depth == 0 || sub_depth >= MAX_DEPTH {
            return Err(CryptoError::InvalidDepth {
                depth: sub_depth,
                reason: "the subtree depth must be between 1 and 31",
            });
        }
        let subtree_capacity =
            u64::try_from(capacity(arity.width(), sub_depth)).map_err(|_| {
                CryptoError::InvalidDepth {
                    depth: sub_depth,
                    reason: "subtrees this deep cannot be counted",
                }
            })?;

        let (zeros, _) = zero_values(&hasher, arity, zero_value, MAX_DEPTH)?;

        Ok(Self {
            sub_depth,
            arity,
            zero_value,
            zeros,
            subtree_capacity,
            num_leaves: 0,
            current_subtree_index: 0,
            sub_roots: Vec::new(),
            leaf_queue: LevelQueue::new(arity),
            sub_root_queue: LevelQueue::new(arity),
            next_sr_index_to_queue: 0,
            small_srt_root: FieldElement::zero(),
            main_roots: BTreeMap::new(),
            sub_trees_merged: false,
            hasher,
        })
    }

    /// Append a leaf and return its index.
    pub fn enqueue(&mut self, leaf: FieldElement) -> Result<u64> {
        if u128::from(self.num_leaves) >= capacity(self.arity.width(), MAX_DEPTH) {
            return Err(CryptoError::QueueFull);
        }

        self.leaf_queue.push(&self.hasher, leaf, 0, self.sub_depth)?;

        let leaf_index = self.num_leaves;
        self.num_leaves += 1;
        self.invalidate();
        trace!(leaf_index, "enqueued leaf");

        if self.num_leaves % self.subtree_capacity == 0 {
            let sub_root = self.leaf_queue.levels[self.sub_depth][0];
            self.sub_roots.push(sub_root);
            self.current_subtree_index += 1;
            self.leaf_queue.reset();
            debug!(
                subtree = self.current_subtree_index - 1,
                %sub_root,
                "completed subtree"
            );
        }

        Ok(leaf_index)
    }

    /// Close the current subtree, padding it with zero leaves.
    ///
    /// If the current subtree holds no leaves a whole empty subtree is added.
    pub fn fill(&mut self) -> Result<()> {
        let pending = self.pending_leaves();
        let next_index = self.current_subtree_index + 1;
        let num_leaves = next_index
            .checked_mul(self.subtree_capacity)
            .filter(|&n| u128::from(n) <= capacity(self.arity.width(), MAX_DEPTH))
            .ok_or(CryptoError::QueueFull)?;

        let sub_root = if pending == 0 {
            self.zeros[self.sub_depth]
        } else {
            let width = self.arity.width();
            for level in 0..self.sub_depth {
                let n = self.leaf_queue.indices[level];
                if n == 0 {
                    continue;
                }
                let mut inputs = self.leaf_queue.levels[level][..n].to_vec();
                inputs.resize(width, self.zeros[level]);
                let hashed = self.hasher.hash(&inputs)?;

                self.leaf_queue.clear_level(level);
                self.leaf_queue.push(&self.hasher, hashed, level + 1, self.sub_depth)?;
            }
            let sub_root = self.leaf_queue.levels[self.sub_depth][0];
            self.leaf_queue.reset();
            sub_root
        };

        self.sub_roots.push(sub_root);
        self.current_subtree_index = next_index;
        self.num_leaves = num_leaves;
        self.invalidate();

        debug!(subtree = next_index - 1, pending, %sub_root, "filled subtree");
        Ok(())
    }

    /// Append the root of a complete subtree computed elsewhere.
    pub fn insert_sub_tree(&mut self, sub_root: FieldElement) -> Result<()> {
        let pending = self.pending_leaves();
        if pending != 0 {
            return Err(CryptoError::IncompleteSubtree { pending });
        }
        let num_leaves = self
            .num_leaves
            .checked_add(self.subtree_capacity)
            .filter(|&n| u128::from(n) <= capacity(self.arity.width(), MAX_DEPTH))
            .ok_or(CryptoError::QueueFull)?;

        self.sub_roots.push(sub_root);
        self.current_subtree_index += 1;
        self.num_leaves = num_leaves;
        self.invalidate();
        Ok(())
    }

    /// Depth of the smallest tree holding every subroot.
    pub fn calc_srt_depth(&self) -> usize {
        self.srt_depth_for(self.current_subtree_index)
    }

    fn srt_depth_for(&self, num_subtrees: u64) -> usize {
        let needed = u128::from(num_subtrees) * u128::from(self.subtree_capacity);
        let mut depth = self.sub_depth;
        while capacity(self.arity.width(), depth) < needed {
            depth += 1;
        }
        depth
    }

    /// Queue up to `num_sr_queue_ops` subroots into the SRT (0 means no
    /// limit). Returns early, keeping its place, when the limit is hit; the
    /// SRT root is set once every subroot has been queued.
    pub fn merge_sub_roots(&mut self, num_sr_queue_ops: usize) -> Result<()> {
        if self.sub_trees_merged {
            return Err(CryptoError::SubRootsAlreadyMerged);
        }
        if self.num_leaves == 0 {
            return Err(CryptoError::EmptyQueue);
        }

        if self.pending_leaves() != 0 {
            self.fill()?;
        }

        if self.current_subtree_index == 1 {
            self.small_srt_root = self.sub_roots[0];
            self.sub_trees_merged = true;
            debug!(root = %self.small_srt_root, "single subtree is the SRT root");
            return Ok(());
        }

        let depth = calc_depth_from_num_leaves(self.arity.width(), self.current_subtree_index);

        let mut ops = 0;
        while self.next_sr_index_to_queue < self.current_subtree_index {
            if num_sr_queue_ops != 0 && ops == num_sr_queue_ops {
                debug!(
                    queued = self.next_sr_index_to_queue,
                    total = self.current_subtree_index,
                    "paused subroot merge"
                );
                return Ok(());
            }
            let sub_root = self.sub_roots[self.next_sr_index_to_queue as usize];
            self.sub_root_queue.push(&self.hasher, sub_root, 0, depth)?;
            self.next_sr_index_to_queue += 1;
            ops += 1;
        }

        let srt_leaves = capacity(self.arity.width(), depth);
        let zero = self.zeros[self.sub_depth];
        for _ in u128::from(self.current_subtree_index)..srt_leaves {
            self.sub_root_queue.push(&self.hasher, zero, 0, depth)?;
        }

        self.small_srt_root = self.sub_root_queue.levels[depth][0];
        self.sub_trees_merged = true;
        debug!(depth, root = %self.small_srt_root, "merged subroots");
        Ok(())
    }

    /// Extend the SRT root to a main root of the given depth.
    pub fn merge(&mut self, depth: usize) -> Result<()> {
        if !self.sub_trees_merged {
            return Err(CryptoError::UnmergedSubtrees);
        }
        let srt_depth = self.check_main_depth(depth, self.current_subtree_index)?;

        let mut root = self.small_srt_root;
        for level in srt_depth..depth {
            let mut inputs = vec![self.zeros[level]; self.arity.width()];
            inputs[0] = root;
            root = self.hasher.hash(&inputs)?;
        }

        self.main_roots.insert(depth, root);
        debug!(depth, %root, "merged main root");
        Ok(())
    }

    /// Compute the main root of the given depth in one pass.
    ///
    /// Does not need [`AccQueue::merge_sub_roots`] and gives the same root as
    /// `merge_sub_roots(0)` followed by `merge(depth)`.
    pub fn merge_direct(&mut self, depth: usize) -> Result<()> {
        if self.num_leaves == 0 {
            return Err(CryptoError::EmptyQueue);
        }
        // Check the depth as if filled, before mutating anything.
        let pending_subtree = u64::from(self.pending_leaves() != 0);
        self.check_main_depth(depth, self.current_subtree_index + pending_subtree)?;
        if pending_subtree != 0 {
            self.fill()?;
        }

        let root = if depth == self.sub_depth {
            self.sub_roots[0]
        } else {
            let mut tree = MerkleTree::new(
                depth - self.sub_depth,
                self.zeros[self.sub_depth],
                self.arity.width(),
                self.hasher.clone(),
            )?;
            for sub_root in &self.sub_roots {
                tree.insert(*sub_root)?;
            }
            tree.root()
        };

        self.main_roots.insert(depth, root);
        debug!(depth, %root, "merged main root directly");
        Ok(())
    }

    /// Hash exactly `hash_length` elements.
    pub fn hash(&self, leaves: &[FieldElement]) -> Result<FieldElement> {
        if leaves.len() != self.arity.width() {
            return Err(CryptoError::LeafCountMismatch {
                expected: self.arity.width(),
                actual: leaves.len(),
            });
        }
        self.hasher.hash(leaves)
    }

    fn check_main_depth(&self, depth: usize, num_subtrees: u64) -> Result<usize> {
        if depth > MAX_DEPTH {
            return Err(CryptoError::InvalidDepth {
                depth,
                reason: "deeper than the maximum tree depth",
            });
        }
        let srt_depth = self.srt_depth_for(num_subtrees);
        if depth < srt_depth {
            return Err(CryptoError::InvalidDepth {
                depth,
                reason: "too shallow to hold every subtree",
            });
        }
        Ok(srt_depth)
    }
}

impl<H> AccQueue<H> {
    pub fn get_sub_root(&self, index: usize) -> Result<FieldElement> {
        self.sub_roots
            .get(index)
            .copied()
            .ok_or(CryptoError::IndexOutOfRange {
                index,
                size: self.sub_roots.len(),
            })
    }

    /// The main root merged at `depth`, if any.
    pub fn get_root(&self, depth: usize) -> Option<FieldElement> {
        self.main_roots.get(&depth).copied()
    }

    pub fn has_root(&self, depth: usize) -> bool {
        self.main_roots.contains_key(&depth)
    }

    pub fn small_srt_root(&self) -> FieldElement {
        self.small_srt_root
    }

    pub fn sub_roots(&self) -> &[FieldElement] {
        &self.sub_roots
    }

    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    pub fn current_subtree_index(&self) -> u64 {
        self.current_subtree_index
    }

    pub fn sub_trees_merged(&self) -> bool {
        self.sub_trees_merged
    }

    pub fn zeros(&self) -> &[FieldElement] {
        &self.zeros
    }

    pub fn sub_depth(&self) -> usize {
        self.sub_depth
    }

    pub fn hash_length(&self) -> usize {
        self.arity.width()
    }

    pub fn zero_value(&self) -> FieldElement {
        self.zero_value
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn state(&self) -> AccQueueState {
        if let Some((&depth, _)) = self.main_roots.iter().next_back() {
            AccQueueState::Rooted(depth)
        } else if self.sub_trees_merged {
            AccQueueState::SubRootsMerged
        } else if self.num_leaves == 0 {
            AccQueueState::Empty
        } else {
            AccQueueState::Accumulating
        }
    }

    /// Leaves in the current, incomplete subtree.
    fn pending_leaves(&self) -> u64 {
        self.num_leaves % self.subtree_capacity
    }

    /// Drop every merge result; the leaf set has changed.
    fn invalidate(&mut self) {
        self.sub_trees_merged = false;
        self.small_srt_root = FieldElement::zero();
        self.main_roots.clear();
        self.next_sr_index_to_queue = 0;
        self.sub_root_queue.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Sha256Hasher;

    fn leaf(i: u64) -> FieldElement {
        FieldElement::from(i)
    }

    fn queue(sub_depth: usize, hash_length: usize) -> AccQueue<Sha256Hasher> {
        AccQueue::new(sub_depth, hash_length, FieldElement::zero(), Sha256Hasher).unwrap()
    }

    #[test]
    fn test_new_validates_parameters() {
        assert!(matches!(
            AccQueue::new(2, 3, FieldElement::zero(), Sha256Hasher),
            Err(CryptoError::InvalidArity(3))
        ));
        assert!(matches!(
            AccQueue::new(0, 2, FieldElement::zero(), Sha256Hasher),
            Err(CryptoError::InvalidDepth { depth: 0, .. })
        ));
        assert!(matches!(
            AccQueue::new(MAX_DEPTH, 2, FieldElement::zero(), Sha256Hasher),
            Err(CryptoError::InvalidDepth { .. })
        ));

        let aq = queue(2, 5);
        assert_eq!(aq.zeros().len(), MAX_DEPTH);
        assert_eq!(aq.state(), AccQueueState::Empty);
    }

    #[test]
    fn test_level_queue_carries_groups() {
        let h = Sha256Hasher;
        let mut lq = LevelQueue::new(Arity::Binary);
        lq.push(&h, leaf(1), 0, 2).unwrap();
        assert_eq!(lq.indices[0], 1);
        lq.push(&h, leaf(2), 0, 2).unwrap();
        assert_eq!(lq.indices[0], 0);
        assert_eq!(lq.indices[1], 1);
        assert_eq!(lq.levels[1][0], h.hash(&[leaf(1), leaf(2)]).unwrap());
    }

    #[test]
    fn test_subtree_completion() {
        let mut aq = queue(1, 5);
        for i in 0..4 {
            assert_eq!(aq.enqueue(leaf(i)).unwrap(), i);
        }
        assert!(aq.sub_roots().is_empty());
        assert_eq!(aq.enqueue(leaf(4)).unwrap(), 4);

        let expected = Sha256Hasher.hash(&(0..5).map(leaf).collect::<Vec<_>>()).unwrap();
        assert_eq!(aq.get_sub_root(0).unwrap(), expected);
        assert_eq!(aq.current_subtree_index(), 1);
        assert!(matches!(
            aq.get_sub_root(1),
            Err(CryptoError::IndexOutOfRange { index: 1, size: 1 })
        ));
    }

    #[test]
    fn test_fill_matches_partial_tree() {
        let mut aq = queue(2, 5);
        let mut tree = MerkleTree::new(2, FieldElement::zero(), 5, Sha256Hasher).unwrap();
        for i in 1..=7 {
            aq.enqueue(leaf(i)).unwrap();
            tree.insert(leaf(i)).unwrap();
        }
        aq.fill().unwrap();

        assert_eq!(aq.get_sub_root(0).unwrap(), tree.root());
        assert_eq!(aq.num_leaves(), 25);
        assert_eq!(aq.current_subtree_index(), 1);

        // an empty subtree fills to the zero root
        aq.fill().unwrap();
        assert_eq!(aq.get_sub_root(1).unwrap(), aq.zeros()[2]);
        assert_eq!(aq.num_leaves(), 50);
    }

    #[test]
    fn test_insert_sub_tree() {
        let mut aq = queue(1, 2);
        aq.insert_sub_tree(leaf(99)).unwrap();
        assert_eq!(aq.num_leaves(), 2);
        assert_eq!(aq.get_sub_root(0).unwrap(), leaf(99));

        aq.enqueue(leaf(1)).unwrap();
        assert_eq!(
            aq.insert_sub_tree(leaf(5)).unwrap_err(),
            CryptoError::IncompleteSubtree { pending: 1 }
        );
    }

    #[test]
    fn test_calc_srt_depth() {
        let mut aq = queue(2, 2);
        assert_eq!(aq.calc_srt_depth(), 2);
        for _ in 0..3 {
            aq.insert_sub_tree(leaf(1)).unwrap();
        }
        assert_eq!(aq.calc_srt_depth(), 4);
    }

    #[test]
    fn test_state_machine() {
        let mut aq = queue(1, 2);
        assert_eq!(aq.state(), AccQueueState::Empty);
        for i in 0..3 {
            aq.enqueue(leaf(i)).unwrap();
        }
        assert_eq!(aq.state(), AccQueueState::Accumulating);

        aq.merge_sub_roots(0).unwrap();
        assert_eq!(aq.state(), AccQueueState::SubRootsMerged);
        assert_eq!(aq.merge_sub_roots(0).unwrap_err(), CryptoError::SubRootsAlreadyMerged);

        aq.merge(3).unwrap();
        aq.merge(4).unwrap();
        assert_eq!(aq.state(), AccQueueState::Rooted(4));
        assert!(aq.has_root(3));

        aq.enqueue(leaf(9)).unwrap();
        assert_eq!(aq.state(), AccQueueState::Accumulating);
        assert!(!aq.has_root(3));
        assert_eq!(aq.small_srt_root(), FieldElement::zero());
    }

    #[test]
    fn test_merge_depth_bounds() {
        let mut aq = queue(1, 2);
        for i in 0..5 {
            aq.enqueue(leaf(i)).unwrap();
        }
        aq.merge_sub_roots(0).unwrap();
        assert_eq!(aq.calc_srt_depth(), 3);
        assert!(matches!(aq.merge(2), Err(CryptoError::InvalidDepth { depth: 2, .. })));
        assert!(matches!(
            aq.merge(MAX_DEPTH + 1),
            Err(CryptoError::InvalidDepth { .. })
        ));
        assert!(matches!(aq.merge_direct(2), Err(CryptoError::InvalidDepth { .. })));
        aq.merge(MAX_DEPTH).unwrap();
    }

    #[test]
    fn test_single_subtree_merges_to_subroot() {
        let mut aq = queue(2, 2);
        for i in 1..=4 {
            aq.enqueue(leaf(i)).unwrap();
        }
        aq.merge_sub_roots(0).unwrap();
        assert_eq!(aq.small_srt_root(), aq.get_sub_root(0).unwrap());

        aq.merge(2).unwrap();
        let mut direct = aq.clone();
        direct.merge_direct(2).unwrap();
        assert_eq!(aq.get_root(2), direct.get_root(2));
        assert_eq!(aq.get_root(2), Some(aq.get_sub_root(0).unwrap()));
    }

    #[test]
    fn test_hash_checks_length() {
        let aq = queue(1, 5);
        assert!(matches!(
            aq.hash(&[leaf(1)]),
            Err(CryptoError::LeafCountMismatch {
                expected: 5,
                actual: 1
            })
        ));
        assert_eq!(
            aq.hash(&[leaf(1); 5]).unwrap(),
            Sha256Hasher.hash(&[leaf(1); 5]).unwrap()
        );
    }

    #[test]
    fn test_queue_full() {
        // two subtrees of 2^31 leaves fill a binary queue
        let mut aq = queue(MAX_DEPTH - 1, 2);
        aq.insert_sub_tree(leaf(1)).unwrap();
        aq.insert_sub_tree(leaf(2)).unwrap();
        assert_eq!(u128::from(aq.num_leaves()), capacity(2, MAX_DEPTH));

        assert_eq!(aq.insert_sub_tree(leaf(3)).unwrap_err(), CryptoError::QueueFull);
        assert_eq!(aq.enqueue(leaf(3)).unwrap_err(), CryptoError::QueueFull);
        assert_eq!(aq.fill().unwrap_err(), CryptoError::QueueFull);

        assert_eq!(aq.current_subtree_index(), 2);
        assert_eq!(aq.calc_srt_depth(), MAX_DEPTH);
        aq.merge_direct(MAX_DEPTH).unwrap();
    }

    #[test]
    fn test_merge_direct_rejects_depth_without_filling() {
        let mut aq = queue(2, 2);
        for i in 1..=3 {
            aq.enqueue(leaf(i)).unwrap();
        }
        let untouched = aq.clone();

        assert!(matches!(
            aq.merge_direct(MAX_DEPTH + 1),
            Err(CryptoError::InvalidDepth { .. })
        ));
        // five subtrees once the partial one is closed, so depth 3 is too shallow
        let mut wide = queue(1, 2);
        for i in 0..9 {
            wide.enqueue(leaf(i)).unwrap();
        }
        assert!(matches!(wide.merge_direct(3), Err(CryptoError::InvalidDepth { .. })));
        assert_eq!(wide.num_leaves(), 9);
        assert_eq!(wide.current_subtree_index(), 4);

        assert_eq!(aq.num_leaves(), 3);
        assert_eq!(aq.current_subtree_index(), 0);
        assert_eq!(aq.snapshot(), untouched.snapshot());
        assert_eq!(aq.enqueue(leaf(4)).unwrap(), 3);
    }
}
