//! Per-file bitstream encode and decode.
//!
//! The decoder is used twice: by the offset indexer, which throws the bytes
//! away and only keeps the number of input bytes consumed, and by the
//! extraction workers, which write the bytes out.

use crate::codes::{BitWriter, CodeTable};
use crate::error::{Error, Result};
use crate::huffman::{HuffmanNode, HuffmanTree};
use std::io::{ErrorKind, Read, Write};

const CHUNK_SIZE: usize = 64 * 1024;

/// Encodes everything `reader` yields, appending packed bits to `out`.
/// Returns the packed buffer and the number of input bytes.
pub fn encode_reader<R: Read>(
    mut reader: R,
    table: &CodeTable,
    out: Vec<u8>,
) -> Result<(Vec<u8>, u64)> {
    let mut writer = BitWriter::new(out);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for &b in &buf[..n] {
            let code = table.get(b).ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("byte 0x{:02x} has no code, input changed after it was scanned", b),
                ))
            })?;
            writer.write_code(code);
        }
        total += n as u64;
    }

    Ok((writer.finish(), total))
}

pub fn encode_bytes(data: &[u8], table: &CodeTable) -> Result<Vec<u8>> {
    let (out, _) = encode_reader(data, table, Vec::new())?;
    Ok(out)
}

/// Decodes exactly `count` bytes from `reader` into `out`.
///
/// Returns how many input bytes were consumed, including the zero-padded
/// last one. Running out of input first is a corrupt archive.
pub fn decode_stream<R: Read, W: Write>(
    tree: &HuffmanTree,
    mut reader: R,
    count: u64,
    mut out: W,
) -> Result<u64> {
    if count == 0 {
        return Ok(0);
    }

    let root = tree.root();
    let mut node = root;
    let mut produced = 0u64;
    let mut consumed = 0u64;
    let mut inbuf = vec![0u8; CHUNK_SIZE];
    let mut outbuf = Vec::with_capacity(CHUNK_SIZE);

    'read: loop {
        let n = match reader.read(&mut inbuf) {
            Ok(0) => {
                return Err(Error::corrupt(format!(
                    "bitstream ended after {} of {} bytes",
                    produced, count
                )))
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        for &byte in &inbuf[..n] {
            consumed += 1;
            for shift in (0..8).rev() {
                node = tree.step(node, (byte >> shift) & 1 == 1)?;
                if let HuffmanNode::Leaf { byte: sym, .. } = *tree.node(node) {
                    outbuf.push(sym);
                    produced += 1;
                    node = root;
                    if produced == count {
                        break 'read;
                    }
                }
            }
            if outbuf.len() >= CHUNK_SIZE {
                out.write_all(&outbuf)?;
                outbuf.clear();
            }
        }
    }

    out.write_all(&outbuf)?;
    out.flush()?;
    Ok(consumed)
}

pub fn decode_bytes(tree: &HuffmanTree, data: &[u8], count: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(count.min(CHUNK_SIZE as u64) as usize);
    decode_stream(tree, data, count, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::FrequencyTable;

    fn setup(data: &[u8]) -> (HuffmanTree, CodeTable) {
        let mut t = FrequencyTable::new();
        t.add_bytes(data).unwrap();
        let tree = HuffmanTree::build(&t).unwrap();
        let table = CodeTable::from_tree(&tree);
        (tree, table)
    }

    #[test]
    fn test_encode_decode_text() {
        let data = b"she sells sea shells by the sea shore";
        let (tree, table) = setup(data);
        let packed = encode_bytes(data, &table).unwrap();
        let bits = table.encoded_bits(data).unwrap();
        assert_eq!(packed.len() as u64, (bits + 7) / 8);
        assert_eq!(decode_bytes(&tree, &packed, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn test_single_symbol_stream() {
        let data = vec![b'x'; 100];
        let (tree, table) = setup(&data);
        let packed = encode_bytes(&data, &table).unwrap();
        // one bit per byte, zero padded
        assert_eq!(packed.len(), 13);
        assert!(packed.iter().all(|&b| b == 0));
        assert_eq!(decode_bytes(&tree, &packed, 100).unwrap(), data);
    }

    #[test]
    fn test_consumed_stops_at_file_end() {
        let data = b"abcabcabcaaaa";
        let (tree, table) = setup(data);
        let mut packed = encode_bytes(data, &table).unwrap();
        let own_len = packed.len() as u64;
        packed.extend_from_slice(&[0xff; 16]);

        let mut out = Vec::new();
        let consumed = decode_stream(&tree, &packed[..], data.len() as u64, &mut out).unwrap();
        assert_eq!(consumed, own_len);
        assert_eq!(out, data);
    }

    #[test]
    fn test_zero_count_reads_nothing() {
        let (tree, _) = setup(b"ab");
        let mut out = Vec::new();
        assert_eq!(decode_stream(&tree, &b""[..], 0, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let data = b"hello huffman";
        let (tree, table) = setup(data);
        let packed = encode_bytes(data, &table).unwrap();
        let err = decode_bytes(&tree, &packed[..packed.len() - 1], data.len() as u64).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }

    #[test]
    fn test_missing_code_is_reported() {
        let (_, table) = setup(b"aaaa");
        assert!(encode_bytes(b"ab", &table).is_err());
    }
}
