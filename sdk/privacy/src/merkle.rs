//! Merkle Trees
//!
//! Two trees share one SHA-256 hasher:
//!
//! - `BundleTree`: a dense tree built once over a bundle's transactions.
//!   The leaf list is padded by repeating the last leaf up to a power of two.
//! - `CommitmentTree`: a sparse, append-only tree of confirmed payment
//!   commitments, with a bounded `RootHistory`.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              L0  L1  L2   L2  (padded)
//! ```
//!
//! Leaves are hashed as `SHA-256(0x00 || leaf)`, interior nodes as
//! `SHA-256(0x01 || a || b)`. With `CombineMode::Positional`, `(a, b)` is
//! `(left, right)`. With `CombineMode::Sorted` the pair is sorted first,
//! which makes a proof unable to pin a leaf to its position: the same hash
//! claimed at its sibling's slot verifies too.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Depth of the payment commitment tree (supports 2^20 payments)
pub const COMMITMENT_TREE_DEPTH: usize = 20;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// How two sibling nodes are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// `H(left || right)`; binds every leaf to its position
    #[default]
    Positional,
    /// `H(min || max)`; order independent, kept for legacy bundle data
    Sorted,
}

/// SHA-256 Merkle hash function
#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleHasher {
    mode: CombineMode,
}

impl MerkleHasher {
    pub fn new(mode: CombineMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    /// Hash a serialized leaf
    pub fn hash_leaf(&self, leaf: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([LEAF_PREFIX]);
        hasher.update(leaf);
        hasher.finalize().into()
    }

    /// Hash two children to get parent
    pub fn hash_pair(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let (a, b) = match self.mode {
            CombineMode::Positional => (left, right),
            CombineMode::Sorted if left <= right => (left, right),
            CombineMode::Sorted => (right, left),
        };

        let mut hasher = Sha256::new();
        hasher.update([NODE_PREFIX]);
        hasher.update(a);
        hasher.update(b);
        hasher.finalize().into()
    }

    /// Compute root from leaf hash and authentication path
    pub fn compute_root_from_path(
        &self,
        leaf: &[u8; 32],
        siblings: &[[u8; 32]],
        path_bits: &[bool],
    ) -> [u8; 32] {
        let mut current = *leaf;

        for (sibling, is_right) in siblings.iter().zip(path_bits.iter()) {
            current = if *is_right {
                // Current node is on the right
                self.hash_pair(sibling, &current)
            } else {
                self.hash_pair(&current, sibling)
            };
        }

        current
    }
}

/// Inclusion proof for one leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash
    #[serde(with = "hex::serde")]
    pub leaf: [u8; 32],
    /// Sibling hashes from leaf to root
    pub path: Vec<[u8; 32]>,
    /// Direction bits (true = current node is the right child)
    pub indices: Vec<bool>,
    #[serde(with = "hex::serde")]
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Recombine `leaf` along the path and compare against `root`
    pub fn verify_leaf_hash(&self, leaf: &[u8; 32], mode: CombineMode) -> bool {
        if self.path.len() != self.indices.len() || leaf != &self.leaf {
            return false;
        }
        let hasher = MerkleHasher::new(mode);
        hasher.compute_root_from_path(leaf, &self.path, &self.indices) == self.root
    }
}

/// Check that `serialized` is included under `proof.root`
pub fn verify_inclusion(serialized: &str, proof: &MerkleProof, mode: CombineMode) -> bool {
    let leaf = MerkleHasher::new(mode).hash_leaf(serialized.as_bytes());
    proof.verify_leaf_hash(&leaf, mode)
}

/// Dense tree over a fixed list of leaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleTree {
    /// `layers[0]` are the padded leaf hashes, the last layer is the root
    layers: Vec<Vec<[u8; 32]>>,
    /// Number of real (unpadded) leaves
    leaf_count: usize,
    mode: CombineMode,
}

impl BundleTree {
    /// Build from serialized leaves; `None` for an empty list
    pub fn build<S: AsRef<[u8]>>(leaves: &[S], mode: CombineMode) -> Option<Self> {
        let last = leaves.last()?;
        let hasher = MerkleHasher::new(mode);

        let padded_len = leaves.len().next_power_of_two();
        let mut level: Vec<[u8; 32]> = leaves
            .iter()
            .chain(std::iter::repeat(last).take(padded_len - leaves.len()))
            .map(|leaf| hasher.hash_leaf(leaf.as_ref()))
            .collect();

        let mut layers = Vec::new();
        while level.len() > 1 {
            let next = level
                .chunks(2)
                .map(|pair| hasher.hash_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(std::mem::replace(&mut level, next));
        }
        layers.push(level);

        Some(Self {
            layers,
            leaf_count: leaves.len(),
            mode,
        })
    }

    pub fn root(&self) -> [u8; 32] {
        // build() always leaves a single-node top layer
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Inclusion proof for the leaf at `index`; `None` when out of range
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut indices = Vec::with_capacity(self.depth());
        let mut current = index;

        for layer in &self.layers[..self.depth()] {
            let is_right = current & 1 == 1;
            let sibling = if is_right { current - 1 } else { current + 1 };
            path.push(layer[sibling]);
            indices.push(is_right);
            current /= 2;
        }

        Some(MerkleProof {
            leaf: self.layers[0][index],
            path,
            indices,
            root: self.root(),
        })
    }
}

/// Sparse, append-only tree of payment commitments
///
/// Only stores non-empty nodes; empty subtrees use precomputed roots.
pub struct CommitmentTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), [u8; 32]>,
    depth: usize,
    /// Next available leaf position
    next_index: u64,
    hasher: MerkleHasher,
    /// Empty subtree root at each level
    empty_roots: Vec<[u8; 32]>,
    root: [u8; 32],
}

impl CommitmentTree {
    pub fn new() -> Self {
        Self::with_depth(COMMITMENT_TREE_DEPTH)
    }

    /// Tree holding at most `2^depth` commitments (depth clamped to 1..=32)
    pub fn with_depth(depth: usize) -> Self {
        let depth = depth.clamp(1, 32);
        let hasher = MerkleHasher::new(CombineMode::Positional);
        let mut empty_roots = vec![[0u8; 32]];
        for level in 0..depth {
            let prev = empty_roots[level];
            empty_roots.push(hasher.hash_pair(&prev, &prev));
        }
        let root = empty_roots[depth];

        Self {
            nodes: HashMap::new(),
            depth,
            next_index: 0,
            hasher,
            empty_roots,
            root,
        }
    }

    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn is_full(&self) -> bool {
        self.next_index >= self.capacity()
    }

    /// Leaf hash stored for a commitment
    pub fn leaf_hash(&self, commitment: &[u8; 32]) -> [u8; 32] {
        self.hasher.hash_leaf(commitment)
    }

    /// Append a commitment; `None` when the tree is full
    pub fn insert(&mut self, commitment: &[u8; 32]) -> Option<u64> {
        if self.is_full() {
            return None;
        }
        let position = self.next_index;
        let leaf = self.leaf_hash(commitment);
        self.nodes.insert((0, position), leaf);

        let mut current_index = position;
        let mut current_hash = leaf;
        for level in 0..self.depth {
            let is_right = current_index & 1 == 1;
            let sibling = self.node(level, current_index ^ 1);
            current_hash = if is_right {
                self.hasher.hash_pair(&sibling, &current_hash)
            } else {
                self.hasher.hash_pair(&current_hash, &sibling)
            };
            current_index /= 2;
            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
        self.next_index += 1;
        Some(position)
    }

    fn node(&self, level: usize, index: u64) -> [u8; 32] {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or(self.empty_roots[level])
    }

    /// Inclusion proof for a position against the current root
    pub fn proof(&self, position: u64) -> Option<MerkleProof> {
        if position >= self.next_index {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth);
        let mut indices = Vec::with_capacity(self.depth);
        let mut current_index = position;
        for level in 0..self.depth {
            indices.push(current_index & 1 == 1);
            path.push(self.node(level, current_index ^ 1));
            current_index /= 2;
        }

        Some(MerkleProof {
            leaf: self.node(0, position),
            path,
            indices,
            root: self.root,
        })
    }
}

impl Default for CommitmentTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Recent roots, most recent first, so proofs against a slightly stale
/// root still verify.
#[derive(Debug, Default)]
pub struct RootHistory {
    roots: Vec<[u8; 32]>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: Vec::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, root: [u8; 32]) {
        self.roots.insert(0, root);
        self.roots.truncate(self.max_size);
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_valid(&self, root: &[u8; 32]) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<&[u8; 32]> {
        self.roots.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("leaf-{}", i)).collect()
    }

    #[test]
    fn test_empty_tree_has_no_bundle() {
        let empty: Vec<String> = Vec::new();
        assert!(BundleTree::build(&empty, CombineMode::Positional).is_none());
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = BundleTree::build(&leaves(1), CombineMode::Positional).unwrap();
        let hasher = MerkleHasher::new(CombineMode::Positional);
        assert_eq!(tree.root(), hasher.hash_leaf(b"leaf-0"));
        assert_eq!(tree.depth(), 0);
        assert!(tree.proof(0).unwrap().path.is_empty());
    }

    #[test]
    fn test_padding_repeats_last_leaf() {
        let three = BundleTree::build(&leaves(3), CombineMode::Positional).unwrap();
        let mut four = leaves(3);
        four.push("leaf-2".into());
        let padded = BundleTree::build(&four, CombineMode::Positional).unwrap();
        assert_eq!(three.root(), padded.root());
        assert_eq!(three.leaf_count(), 3);
        assert!(three.proof(3).is_none());
    }

    #[test]
    fn test_every_leaf_proves() {
        for mode in [CombineMode::Positional, CombineMode::Sorted] {
            let items = leaves(7);
            let tree = BundleTree::build(&items, mode).unwrap();
            for (i, item) in items.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(verify_inclusion(item, &proof, mode), "leaf {} in {:?}", i, mode);
            }
        }
    }

    #[test]
    fn test_wrong_leaf_fails() {
        let items = leaves(4);
        let tree = BundleTree::build(&items, CombineMode::Positional).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!verify_inclusion("leaf-99", &proof, CombineMode::Positional));
    }

    #[test]
    fn test_sorted_mode_does_not_bind_position() {
        let items = leaves(2);
        let sorted = BundleTree::build(&items, CombineMode::Sorted).unwrap();
        let mut proof = sorted.proof(0).unwrap();
        proof.indices[0] = !proof.indices[0];
        assert!(verify_inclusion(&items[0], &proof, CombineMode::Sorted));

        let positional = BundleTree::build(&items, CombineMode::Positional).unwrap();
        let mut proof = positional.proof(0).unwrap();
        proof.indices[0] = !proof.indices[0];
        assert!(!verify_inclusion(&items[0], &proof, CombineMode::Positional));
    }

    #[test]
    fn test_modes_give_different_roots() {
        let items = leaves(4);
        let a = BundleTree::build(&items, CombineMode::Positional).unwrap();
        let b = BundleTree::build(&items, CombineMode::Sorted).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_commitment_tree_insert_and_path() {
        let mut tree = CommitmentTree::new();
        let empty_root = tree.root();

        let pos1 = tree.insert(&[1u8; 32]).unwrap();
        let pos2 = tree.insert(&[2u8; 32]).unwrap();
        assert_eq!((pos1, pos2), (0, 1));
        assert_ne!(tree.root(), empty_root);

        for (pos, c) in [(0u64, [1u8; 32]), (1, [2u8; 32])] {
            let proof = tree.proof(pos).unwrap();
            assert_eq!(proof.path.len(), COMMITMENT_TREE_DEPTH);
            assert!(proof.verify_leaf_hash(&tree.leaf_hash(&c), CombineMode::Positional));
        }
        assert!(tree.proof(2).is_none());
    }

    #[test]
    fn test_commitment_tree_wrong_commitment() {
        let mut tree = CommitmentTree::new();
        tree.insert(&[1u8; 32]);
        let proof = tree.proof(0).unwrap();
        assert!(!proof.verify_leaf_hash(&tree.leaf_hash(&[99u8; 32]), CombineMode::Positional));
    }

    #[test]
    fn test_small_tree_fills_up() {
        let mut tree = CommitmentTree::with_depth(2);
        assert_eq!(tree.capacity(), 4);
        for i in 0..4u8 {
            assert_eq!(tree.insert(&[i; 32]), Some(i as u64));
        }
        assert!(tree.is_full());
        let root = tree.root();
        assert_eq!(tree.insert(&[9u8; 32]), None);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.len(), 4);

        let proof = tree.proof(3).unwrap();
        assert_eq!(proof.path.len(), 2);
        assert!(proof.verify_leaf_hash(&tree.leaf_hash(&[3u8; 32]), CombineMode::Positional));
    }

    #[test]
    fn test_root_history() {
        let mut history = RootHistory::new(2);
        history.push([1u8; 32]);
        history.push([2u8; 32]);
        history.push([3u8; 32]);

        assert!(!history.is_valid(&[1u8; 32]));
        assert!(history.is_valid(&[2u8; 32]));
        assert_eq!(history.current(), Some(&[3u8; 32]));
    }
}
