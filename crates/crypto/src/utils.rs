//! Depth and capacity arithmetic shared by trees and queues.

/// `arity^depth`, saturating at `u128::MAX`.
pub(crate) fn capacity(arity: usize, depth: usize) -> u128 {
    u32::try_from(depth)
        .ok()
        .and_then(|depth| (arity as u128).checked_pow(depth))
        .unwrap_or(u128::MAX)
}

/// Smallest `depth >= 1` such that `hash_length^depth >= num_leaves`.
pub fn calc_depth_from_num_leaves(hash_length: usize, num_leaves: u64) -> usize {
    let mut depth = 1;
    while capacity(hash_length, depth) < u128::from(num_leaves) {
        depth += 1;
    }
    depth
}
