//! Huffman tree over byte values.
//!
//! Nodes live in a flat arena and refer to their children by index, so a
//! finished tree is a plain `Vec` that can be shared read-only between
//! decoder threads.
//!
//! Construction order is fixed so that the same frequency table always yields
//! the same tree:
//! - leaves are laid out in ascending byte order and heapified bottom-up,
//! - extract-min moves the last element to the root and sifts it down,
//!   preferring the left child and only swapping on a strictly smaller count,
//! - insert sifts up while the new count is strictly smaller than the parent,
//! - the first node extracted becomes the left (`0`) child.

use crate::error::{Error, Result};
use crate::frequency::FrequencyTable;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanNode {
    Leaf { byte: u8, freq: u64 },
    Internal { freq: u64, left: NodeId, right: NodeId },
}

impl HuffmanNode {
    pub fn freq(&self) -> u64 {
        match *self {
            HuffmanNode::Leaf { freq, .. } => freq,
            HuffmanNode::Internal { freq, .. } => freq,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, HuffmanNode::Leaf { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTree {
    nodes: Vec<HuffmanNode>,
    root: NodeId,
}

impl HuffmanTree {
    /// Builds the tree for every byte value with a non-zero count.
    ///
    /// Fails with [`Error::EmptyAlphabet`] when the table is all zeros.
    pub fn build(freqs: &FrequencyTable) -> Result<Self> {
        let mut nodes: Vec<HuffmanNode> = freqs
            .symbols()
            .map(|(byte, freq)| HuffmanNode::Leaf {
                byte,
                freq: freq as u64,
            })
            .collect();
        if nodes.is_empty() {
            return Err(Error::EmptyAlphabet);
        }
        // A full binary tree with n leaves has 2n - 1 nodes
        nodes.reserve(nodes.len() - 1);

        let mut heap = NodeHeap::build((0..nodes.len()).collect(), &nodes);
        while heap.len() > 1 {
            let left = heap.extract_min(&nodes);
            let right = heap.extract_min(&nodes);
            let freq = nodes[left].freq() + nodes[right].freq();
            nodes.push(HuffmanNode::Internal { freq, left, right });
            heap.insert(nodes.len() - 1, &nodes);
        }
        let root = heap.extract_min(&nodes);

        Ok(HuffmanTree { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &HuffmanNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[HuffmanNode] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// True when only one byte value occurs; its code is the single bit `0`.
    pub fn is_single_leaf(&self) -> bool {
        self.nodes[self.root].is_leaf()
    }

    /// Follows one bit down from `at`. `false` is the left edge.
    ///
    /// From a leaf root only the `0` edge exists and it leads back to the
    /// root itself, which is how a one-symbol stream is decoded.
    #[inline]
    pub fn step(&self, at: NodeId, bit: bool) -> Result<NodeId> {
        match self.nodes.get(at) {
            Some(HuffmanNode::Internal { left, right, .. }) => {
                let next = if bit { *right } else { *left };
                if next < self.nodes.len() {
                    Ok(next)
                } else {
                    Err(Error::corrupt(format!("node {} has no child {}", at, next)))
                }
            }
            Some(HuffmanNode::Leaf { .. }) if at == self.root && !bit => Ok(at),
            _ => Err(Error::corrupt(format!(
                "bit {} leads nowhere from node {}",
                bit as u8, at
            ))),
        }
    }

    /// Length of the longest root-to-leaf path, counting a leaf root as 1.
    pub fn max_depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            match self.nodes[id] {
                HuffmanNode::Leaf { .. } => max = max.max(depth.max(1)),
                HuffmanNode::Internal { left, right, .. } => {
                    stack.push((left, depth + 1));
                    stack.push((right, depth + 1));
                }
            }
        }
        max
    }
}

// Binary min-heap of node ids keyed by node frequency. Kept separate from
// std's BinaryHeap because the tree shape depends on the exact sift rules.
struct NodeHeap {
    items: Vec<NodeId>,
}

impl NodeHeap {
    fn build(items: Vec<NodeId>, nodes: &[HuffmanNode]) -> Self {
        let mut heap = NodeHeap { items };
        let n = heap.items.len();
        if n > 1 {
            for i in (0..=(n - 2) / 2).rev() {
                heap.sift_down(i, nodes);
            }
        }
        heap
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn sift_down(&mut self, mut i: usize, nodes: &[HuffmanNode]) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.items.len() && self.freq(left, nodes) < self.freq(smallest, nodes) {
                smallest = left;
            }
            if right < self.items.len() && self.freq(right, nodes) < self.freq(smallest, nodes) {
                smallest = right;
            }
            if smallest == i {
                return;
            }
            self.items.swap(i, smallest);
            i = smallest;
        }
    }

    // Callers never extract from an empty heap: the build loop runs while
    // len > 1 and the final extract follows a non-empty build.
    fn extract_min(&mut self, nodes: &[HuffmanNode]) -> NodeId {
        let min = self.items.swap_remove(0);
        if !self.items.is_empty() {
            // swap_remove already moved the last element into slot 0
            self.sift_down(0, nodes);
        }
        min
    }

    fn insert(&mut self, id: NodeId, nodes: &[HuffmanNode]) {
        let freq = nodes[id].freq();
        self.items.push(id);
        let mut i = self.items.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if freq >= self.freq(parent, nodes) {
                break;
            }
            self.items[i] = self.items[parent];
            i = parent;
        }
        self.items[i] = id;
    }

    #[inline]
    fn freq(&self, slot: usize, nodes: &[HuffmanNode]) -> u64 {
        nodes[self.items[slot]].freq()
    }
}
