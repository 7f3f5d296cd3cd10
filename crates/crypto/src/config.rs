//! Construction parameters for trees and queues.

use serde::{Deserialize, Serialize};

use crate::acc_queue::AccQueue;
use crate::error::Result;
use crate::field::{FieldElement, NOTHING_UP_MY_SLEEVE};
use crate::hashing::{Arity, HashFunction};
use crate::quin_tree::MerkleTree;

/// Configuration for an [`AccQueue`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Depth of each subtree
    pub sub_depth: usize,
    /// Leaves per node, 2 or 5
    pub hash_length: Arity,
    /// Value of an empty leaf
    #[serde(default)]
    pub zero_value: FieldElement,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::message_queue()
    }
}

impl QueueConfig {
    /// Queue of published messages: quinary, padded with
    /// [`NOTHING_UP_MY_SLEEVE`].
    pub fn message_queue() -> Self {
        Self {
            sub_depth: 2,
            hash_length: Arity::Quinary,
            zero_value: NOTHING_UP_MY_SLEEVE,
        }
    }

    /// Queue of signups: binary, zero padded.
    pub fn state_queue() -> Self {
        Self {
            sub_depth: 2,
            hash_length: Arity::Binary,
            zero_value: FieldElement::zero(),
        }
    }

    pub fn build<H: HashFunction>(&self, hasher: H) -> Result<AccQueue<H>> {
        AccQueue::new(
            self.sub_depth,
            self.hash_length.width(),
            self.zero_value,
            hasher,
        )
    }
}

/// Configuration for a [`MerkleTree`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub depth: usize,
    pub arity: Arity,
    #[serde(default)]
    pub zero_value: FieldElement,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            arity: Arity::Binary,
            zero_value: FieldElement::zero(),
        }
    }
}

impl TreeConfig {
    /// Per-voter vote option tree.
    pub fn vote_option_tree(depth: usize) -> Self {
        Self {
            depth,
            arity: Arity::Quinary,
            zero_value: FieldElement::zero(),
        }
    }

    pub fn build<H: HashFunction>(&self, hasher: H) -> Result<MerkleTree<H>> {
        MerkleTree::new(self.depth, self.zero_value, self.arity.width(), hasher)
    }
}
