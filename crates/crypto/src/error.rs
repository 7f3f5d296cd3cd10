//! Errors raised by trees and queues.
//!
//! Every variant is a precondition violation detected synchronously. Nothing
//! here is transient, so callers decide whether to replay events from an
//! earlier point or abandon the round.

use thiserror::Error;

/// Errors raised by the quin tree, the accumulator queue and their helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid arity {0}: only 2 and 5 leaves per node are supported")]
    InvalidArity(usize),
    #[error("Invalid depth {depth}: {reason}")]
    InvalidDepth { depth: usize, reason: &'static str },
    #[error("AccQueue is full")]
    QueueFull,
    #[error("Merkle tree is full (capacity {capacity})")]
    TreeFull { capacity: u128 },
    #[error("AccQueue is empty: nothing to merge")]
    EmptyQueue,
    #[error("Index {index} is out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("Expected {expected} leaves to hash, got {actual}")]
    LeafCountMismatch { expected: usize, actual: usize },
    #[error("Subtrees must be merged before merging into a main root")]
    UnmergedSubtrees,
    #[error("Subtrees are already merged for the current set of leaves")]
    SubRootsAlreadyMerged,
    #[error("The current subtree still holds {pending} leaves")]
    IncompleteSubtree { pending: u64 },
    #[error("Malformed Merkle proof: {0}")]
    MalformedProof(String),
    #[error("Value {0} is not below the snark field size")]
    FieldElementOutOfRange(String),
    #[error("Invalid field element encoding: {0}")]
    InvalidFieldEncoding(String),
    #[error("Invalid leaf range [{start}, {end}): {reason}")]
    InvalidRange {
        start: usize,
        end: usize,
        reason: &'static str,
    },
    #[error("At most {max} inputs can be hashed, got {actual}")]
    TooManyInputs { max: usize, actual: usize },
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Hash failed: {0}")]
    Hash(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CryptoError>;
