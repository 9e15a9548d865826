//! Prefix-free code table derived from a [`HuffmanTree`], and the MSB-first
//! bit packer used to emit codes.

use crate::huffman::{HuffmanNode, HuffmanTree};
use bitvec::prelude::*;

pub type Code = BitVec<u8, Msb0>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: Vec<Code>,
}

impl CodeTable {
    /// Walks the tree with an explicit stack: `0` on left edges, `1` on right
    /// edges. Skewed trees can be 255 levels deep, so no recursion here.
    pub fn from_tree(tree: &HuffmanTree) -> Self {
        let mut codes = vec![Code::new(); 256];

        if let HuffmanNode::Leaf { byte, .. } = *tree.node(tree.root()) {
            codes[byte as usize] = bitvec![u8, Msb0; 0];
            return CodeTable { codes };
        }

        let mut stack = vec![(tree.root(), Code::new())];
        while let Some((id, prefix)) = stack.pop() {
            match *tree.node(id) {
                HuffmanNode::Leaf { byte, .. } => codes[byte as usize] = prefix,
                HuffmanNode::Internal { left, right, .. } => {
                    let mut right_code = prefix.clone();
                    right_code.push(true);
                    let mut left_code = prefix;
                    left_code.push(false);
                    stack.push((right, right_code));
                    stack.push((left, left_code));
                }
            }
        }

        CodeTable { codes }
    }

    pub fn get(&self, byte: u8) -> Option<&BitSlice<u8, Msb0>> {
        let code = &self.codes[byte as usize];
        if code.is_empty() {
            None
        } else {
            Some(code.as_bitslice())
        }
    }

    pub fn len(&self) -> usize {
        self.codes.iter().filter(|c| !c.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_len(&self) -> usize {
        self.codes.iter().map(|c| c.len()).max().unwrap_or(0)
    }

    /// Exact number of bits needed to encode `data`, or `None` if some byte
    /// has no code.
    pub fn encoded_bits(&self, data: &[u8]) -> Option<u64> {
        data.iter()
            .map(|&b| self.get(b).map(|c| c.len() as u64))
            .sum()
    }
}

// Packs bits most-significant first into a byte buffer. The trailing partial
// byte is zero padded on finish.
pub struct BitWriter {
    out: Vec<u8>,
    output_byte: u8,
    output_bits: u8,
}

impl BitWriter {
    pub fn new(out: Vec<u8>) -> Self {
        BitWriter {
            out,
            output_byte: 0,
            output_bits: 0,
        }
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.output_byte = (self.output_byte << 1) | bit as u8;
        self.output_bits += 1;
        if self.output_bits == 8 {
            self.out.push(self.output_byte);
            self.output_byte = 0;
            self.output_bits = 0;
        }
    }

    pub fn write_code(&mut self, code: &BitSlice<u8, Msb0>) {
        for bit in code.iter().by_vals() {
            self.write_bit(bit);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.output_bits > 0 {
            self.out.push(self.output_byte << (8 - self.output_bits));
        }
        self.out
    }
}
