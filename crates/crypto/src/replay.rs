//! Replaying recorded queue events.
//!
//! A replay file lists the leaves enqueued on chain and the batch sizes the
//! coordinator passed to each `mergeSubRoots` transaction. Replaying it gives
//! the roots the contract must have ended up with, computed both through the
//! batched merge and through a direct merge.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::QueueConfig;
use crate::field::FieldElement;
use crate::hashing::{HashFunction, PoseidonHasher, Sha256Hasher};

/// Hash function named in a replay file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    #[default]
    Poseidon,
    Sha256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFile {
    pub queue: QueueConfig,
    #[serde(default)]
    pub hasher: HasherKind,
    pub leaves: Vec<FieldElement>,
    /// Subroots queued per `merge_sub_roots` call. A trailing unlimited
    /// call is added if these do not cover every subtree.
    #[serde(default)]
    pub batches: Vec<usize>,
    pub main_depth: usize,
}

/// Roots obtained from a replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub num_leaves: u64,
    pub num_subtrees: u64,
    pub srt_depth: usize,
    pub merge_calls: usize,
    pub small_srt_root: FieldElement,
    pub main_root: FieldElement,
    pub direct_root: FieldElement,
}

impl ReplayReport {
    pub fn roots_match(&self) -> bool {
        self.main_root == self.direct_root
    }
}

impl ReplayFile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))
    }

    pub fn run(&self) -> anyhow::Result<ReplayReport> {
        match self.hasher {
            HasherKind::Poseidon => self.run_with(PoseidonHasher),
            HasherKind::Sha256 => self.run_with(Sha256Hasher),
        }
    }

    pub fn run_with<H: HashFunction>(&self, hasher: H) -> anyhow::Result<ReplayReport> {
        ensure!(!self.leaves.is_empty(), "Replay file has no leaves");
        ensure!(
            self.batches.iter().all(|&b| b > 0),
            "Batch sizes must be positive; 0 would merge without limit"
        );

        let mut queue = self.queue.build(hasher).context("Invalid queue configuration")?;
        for leaf in &self.leaves {
            queue.enqueue(*leaf)?;
        }
        info!(
            leaves = queue.num_leaves(),
            subtrees = queue.current_subtree_index(),
            "replayed enqueues"
        );

        let mut direct = queue.clone();

        let mut merge_calls = 0;
        for &batch in &self.batches {
            if queue.sub_trees_merged() {
                break;
            }
            queue.merge_sub_roots(batch)?;
            merge_calls += 1;
        }
        if !queue.sub_trees_merged() {
            queue.merge_sub_roots(0)?;
            merge_calls += 1;
        }
        info!(merge_calls, root = %queue.small_srt_root(), "merged subroots");

        queue
            .merge(self.main_depth)
            .with_context(|| format!("Failed to merge at depth {}", self.main_depth))?;
        direct.merge_direct(self.main_depth)?;

        let main_root = queue
            .get_root(self.main_depth)
            .context("merge produced no root")?;
        let direct_root = direct
            .get_root(self.main_depth)
            .context("merge_direct produced no root")?;

        Ok(ReplayReport {
            num_leaves: queue.num_leaves(),
            num_subtrees: queue.current_subtree_index(),
            srt_depth: queue.calc_srt_depth(),
            merge_calls,
            small_srt_root: queue.small_srt_root(),
            main_root,
            direct_root,
        })
    }
}
