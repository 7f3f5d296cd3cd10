//! # MACI crypto
//!
//! Off-chain mirrors of the Merkle structures MACI commits to on chain.
//!
//! ## Structures
//!
//! - [`MerkleTree`]: incremental quin tree with 2 or 5 leaves per node,
//!   membership proofs in the shape the circuits take.
//! - [`AccQueue`]: accumulator queue batching leaves into subtrees and
//!   merging their roots the way the contract does, in bounded steps.
//!
//! Both are generic over a [`HashFunction`]; [`PoseidonHasher`] is the
//! circom-compatible Poseidon used on chain and in the circuits.
//!
//! ## Example
//!
//! ```
//! use maci_crypto::{AccQueue, FieldElement, PoseidonHasher};
//!
//! let mut queue = AccQueue::new(2, 5, FieldElement::zero(), PoseidonHasher)?;
//! for i in 0..30u64 {
//!     queue.enqueue(FieldElement::from(i))?;
//! }
//! queue.merge_sub_roots(0)?;
//! queue.merge(4)?;
//! assert!(queue.has_root(4));
//! # Ok::<(), maci_crypto::CryptoError>(())
//! ```

pub mod acc_queue;
pub mod config;
pub mod error;
pub mod field;
pub mod hashing;
pub mod proof;
pub mod quin_tree;
pub mod replay;
pub mod snapshot;
mod utils;

pub use acc_queue::{AccQueue, AccQueueState, LevelQueue};
pub use config::{QueueConfig, TreeConfig};
pub use error::{CryptoError, Result};
pub use field::{FieldElement, NOTHING_UP_MY_SLEEVE, SNARK_FIELD_SIZE};
pub use hashing::{
    hash5, hash_left_right, hash_n, hash_one, sha256_hash, Arity, HashFunction, PoseidonHasher,
    Sha256Hasher,
};
pub use proof::MerkleProof;
pub use quin_tree::MerkleTree;
pub use snapshot::{AccQueueSnapshot, TreeSnapshot};
pub use utils::calc_depth_from_num_leaves;

/// Deepest main tree an [`AccQueue`] can merge into.
pub const MAX_DEPTH: usize = 32;

/// Leaves per node in the state tree.
pub const STATE_TREE_ARITY: usize = 2;

/// Leaves per node in the message tree.
pub const MESSAGE_TREE_ARITY: usize = 5;
