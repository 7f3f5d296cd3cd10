//! Serializable snapshots of trees and queues.
//!
//! A coordinator rebuilding its view from chain events can persist a queue
//! between runs and resume a batched subroot merge where it stopped. Field
//! elements are written as decimal strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::acc_queue::{AccQueue, LevelQueue};
use crate::error::{CryptoError, Result};
use crate::field::FieldElement;
use crate::hashing::{Arity, HashFunction};
use crate::quin_tree::MerkleTree;
use crate::MAX_DEPTH;

/// A quin tree, reduced to what is needed to rebuild it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub depth: usize,
    pub arity: Arity,
    pub zero_value: FieldElement,
    pub leaves: Vec<FieldElement>,
}

impl TreeSnapshot {
    pub fn restore<H: HashFunction>(&self, hasher: H) -> Result<MerkleTree<H>> {
        let mut tree = MerkleTree::new(self.depth, self.zero_value, self.arity.width(), hasher)?;
        for leaf in &self.leaves {
            tree.insert(*leaf)?;
        }
        Ok(tree)
    }
}

impl<H: HashFunction> MerkleTree<H> {
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            depth: self.depth(),
            arity: self.arity(),
            zero_value: self.zero_value(),
            leaves: self.leaves().to_vec(),
        }
    }
}

/// The complete state of an [`AccQueue`], merge progress included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccQueueSnapshot {
    pub sub_depth: usize,
    pub hash_length: Arity,
    pub zero_value: FieldElement,
    pub num_leaves: u64,
    pub current_subtree_index: u64,
    pub sub_roots: Vec<FieldElement>,
    pub leaf_queue: LevelQueue,
    pub sub_root_queue: LevelQueue,
    pub next_sr_index_to_queue: u64,
    pub small_srt_root: FieldElement,
    pub sub_trees_merged: bool,
    pub main_roots: BTreeMap<usize, FieldElement>,
}

impl AccQueueSnapshot {
    /// Rebuild the queue. Zero values are recomputed with `hasher`, so it
    /// must be the hasher the snapshot was taken with.
    pub fn restore<H: HashFunction>(&self, hasher: H) -> Result<AccQueue<H>> {
        let mut queue = AccQueue::new(
            self.sub_depth,
            self.hash_length.width(),
            self.zero_value,
            hasher,
        )?;
        self.validate(&queue)?;

        queue.num_leaves = self.num_leaves;
        queue.current_subtree_index = self.current_subtree_index;
        queue.sub_roots = self.sub_roots.clone();
        queue.leaf_queue = self.leaf_queue.clone();
        queue.sub_root_queue = self.sub_root_queue.clone();
        queue.next_sr_index_to_queue = self.next_sr_index_to_queue;
        queue.small_srt_root = self.small_srt_root;
        queue.sub_trees_merged = self.sub_trees_merged;
        queue.main_roots = self.main_roots.clone();
        Ok(queue)
    }

    fn validate<H>(&self, queue: &AccQueue<H>) -> Result<()> {
        let invalid = |msg: String| Err(CryptoError::InvalidSnapshot(msg));

        if self.sub_roots.len() as u64 != self.current_subtree_index {
            return invalid(format!(
                "{} subroots for {} subtrees",
                self.sub_roots.len(),
                self.current_subtree_index
            ));
        }
        let completed = self
            .current_subtree_index
            .checked_mul(queue.subtree_capacity)
            .ok_or_else(|| CryptoError::InvalidSnapshot("subtree count overflows".into()))?;
        if self.num_leaves < completed || self.num_leaves - completed >= queue.subtree_capacity {
            return invalid(format!(
                "{} leaves do not fit {} complete subtrees",
                self.num_leaves, self.current_subtree_index
            ));
        }
        if self.next_sr_index_to_queue > self.current_subtree_index {
            return invalid(format!(
                "merge cursor {} is past the last subtree",
                self.next_sr_index_to_queue
            ));
        }
        if self.sub_trees_merged && self.current_subtree_index == 0 {
            return invalid("merged flag set without subtrees".into());
        }
        if let Some(&depth) = self.main_roots.keys().find(|&&d| d > MAX_DEPTH) {
            return invalid(format!("main root at depth {}", depth));
        }

        for (name, lq) in [("leaf", &self.leaf_queue), ("subroot", &self.sub_root_queue)] {
            let slots = self.hash_length.width() - 1;
            if lq.levels.len() != MAX_DEPTH + 1 || lq.indices.len() != MAX_DEPTH + 1 {
                return invalid(format!("{} queue must have {} levels", name, MAX_DEPTH + 1));
            }
            if lq.levels.iter().any(|level| level.len() != slots) {
                return invalid(format!("{} queue levels must hold {} nodes", name, slots));
            }
            if lq.indices.iter().any(|&i| i > slots) {
                return invalid(format!("{} queue index out of range", name));
            }
        }
        Ok(())
    }
}

impl<H> AccQueue<H> {
    pub fn snapshot(&self) -> AccQueueSnapshot {
        AccQueueSnapshot {
            sub_depth: self.sub_depth,
            hash_length: self.arity,
            zero_value: self.zero_value,
            num_leaves: self.num_leaves,
            current_subtree_index: self.current_subtree_index,
            sub_roots: self.sub_roots.clone(),
            leaf_queue: self.leaf_queue.clone(),
            sub_root_queue: self.sub_root_queue.clone(),
            next_sr_index_to_queue: self.next_sr_index_to_queue,
            small_srt_root: self.small_srt_root,
            sub_trees_merged: self.sub_trees_merged,
            main_roots: self.main_roots.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Sha256Hasher;

    fn leaf(i: u64) -> FieldElement {
        FieldElement::from(i)
    }

    #[test]
    fn test_tree_snapshot_restores_root() {
        let mut tree = MerkleTree::new(3, leaf(7), 5, Sha256Hasher).unwrap();
        for i in 0..9 {
            tree.insert(leaf(i)).unwrap();
        }

        let json = serde_json::to_string(&tree.snapshot()).unwrap();
        let snapshot: TreeSnapshot = serde_json::from_str(&json).unwrap();
        let restored = snapshot.restore(Sha256Hasher).unwrap();

        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.next_index(), 9);
    }

    #[test]
    fn test_queue_snapshot_resumes_merge() {
        let mut aq = AccQueue::new(1, 2, FieldElement::zero(), Sha256Hasher).unwrap();
        for i in 0..9 {
            aq.enqueue(leaf(i)).unwrap();
        }
        let mut reference = aq.clone();
        reference.merge_sub_roots(0).unwrap();
        reference.merge(4).unwrap();

        aq.merge_sub_roots(2).unwrap();
        let json = serde_json::to_string(&aq.snapshot()).unwrap();
        let mut resumed = serde_json::from_str::<AccQueueSnapshot>(&json)
            .unwrap()
            .restore(Sha256Hasher)
            .unwrap();

        assert_eq!(resumed.snapshot(), aq.snapshot());
        resumed.merge_sub_roots(0).unwrap();
        resumed.merge(4).unwrap();
        assert_eq!(resumed.get_root(4), reference.get_root(4));
    }

    #[test]
    fn test_invalid_queue_snapshots() {
        let mut aq = AccQueue::new(1, 5, FieldElement::zero(), Sha256Hasher).unwrap();
        for i in 0..7 {
            aq.enqueue(leaf(i)).unwrap();
        }
        let good = aq.snapshot();

        let mut missing_root = good.clone();
        missing_root.sub_roots.clear();
        assert!(matches!(
            missing_root.restore(Sha256Hasher),
            Err(CryptoError::InvalidSnapshot(_))
        ));

        let mut too_many_leaves = good.clone();
        too_many_leaves.num_leaves = 10;
        assert!(too_many_leaves.restore(Sha256Hasher).is_err());

        let mut short_queue = good.clone();
        short_queue.leaf_queue.levels.pop();
        assert!(short_queue.restore(Sha256Hasher).is_err());

        let mut bad_index = good.clone();
        bad_index.sub_root_queue.indices[0] = 5;
        assert!(bad_index.restore(Sha256Hasher).is_err());

        let mut cursor = good;
        cursor.next_sr_index_to_queue = 2;
        assert!(cursor.restore(Sha256Hasher).is_err());
    }
}
