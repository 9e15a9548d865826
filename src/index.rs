//! Offset index over an archive.
//!
//! Bitstreams carry no length field, so the only way to find where record
//! `k + 1` starts is to decode record `k`. This pass does exactly that, once,
//! sequentially, discarding the decoded bytes. Extraction workers then jump
//! straight to their own offset.

use crate::archive::{ArchiveHeader, RecordHeader, HEADER_LEN};
use crate::codec::decode_stream;
use crate::error::{Error, Result};
use crate::huffman::HuffmanTree;
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Location of one archived file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: usize,
    pub name: String,
    pub original_size: u64,
    /// Start of the record header (name length field)
    pub record_offset: u64,
    /// Start of the bitstream
    pub data_offset: u64,
    /// Bytes of bitstream, including the padded last byte
    pub data_len: u64,
    /// Set when the bitstream could not be replayed to its end
    pub defect: Option<String>,
}

impl IndexEntry {
    pub fn data_end(&self) -> u64 {
        self.data_offset + self.data_len
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    pub header: ArchiveHeader,
    pub tree: HuffmanTree,
    pub entries: Vec<IndexEntry>,
    pub archive_len: u64,
}

impl ArchiveIndex {
    /// Records the header promised but the archive does not contain.
    pub fn missing_records(&self) -> usize {
        (self.header.file_count as usize).saturating_sub(self.entries.len())
    }
}

/// Maps the archive at `path` and indexes it.
pub fn index_archive(path: &Path) -> Result<ArchiveIndex> {
    let file = File::open(path).map_err(|e| Error::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;
    let len = file.metadata()?.len();
    if len < HEADER_LEN as u64 {
        return Err(Error::corrupt(format!(
            "archive is {} bytes, header needs {}",
            len, HEADER_LEN
        )));
    }
    // The archive is opened read-only and never modified while mapped
    let mmap = unsafe { Mmap::map(&file)? };
    index_bytes(&mmap)
}

/// Indexes an archive already in memory.
///
/// A malformed record header or a bitstream that runs off the end stops the
/// walk: nothing after it can be located. The damaged entry is kept with its
/// `defect` set, everything after it counts as missing.
pub fn index_bytes(data: &[u8]) -> Result<ArchiveIndex> {
    let header = ArchiveHeader::parse(data)?;
    let tree = HuffmanTree::build(&header.frequencies).map_err(|e| match e {
        Error::EmptyAlphabet => Error::corrupt("frequency table is empty"),
        other => other,
    })?;

    let mut entries = Vec::with_capacity((header.file_count as usize).min(1 << 16));
    let mut pos = HEADER_LEN;

    for index in 0..header.file_count as usize {
        let (record, head_len) = match RecordHeader::parse(data, pos) {
            Ok(r) => r,
            Err(e) => {
                log::error!("Record #{} unreadable: {}", index, e);
                break;
            }
        };
        let data_offset = pos + head_len;

        match decode_stream(&tree, &data[data_offset..], record.original_size, io::sink()) {
            Ok(consumed) => {
                log::trace!(
                    "Indexed #{} {:?}: {} bytes at offset {}, {} packed",
                    index,
                    record.name,
                    record.original_size,
                    data_offset,
                    consumed
                );
                entries.push(IndexEntry {
                    index,
                    name: record.name,
                    original_size: record.original_size,
                    record_offset: pos as u64,
                    data_offset: data_offset as u64,
                    data_len: consumed,
                    defect: None,
                });
                pos = data_offset + consumed as usize;
            }
            Err(e) => {
                log::error!("Record #{} {:?} damaged: {}", index, record.name, e);
                entries.push(IndexEntry {
                    index,
                    name: record.name,
                    original_size: record.original_size,
                    record_offset: pos as u64,
                    data_offset: data_offset as u64,
                    data_len: (data.len() - data_offset) as u64,
                    defect: Some(e.to_string()),
                });
                pos = data.len();
                break;
            }
        }
    }

    if entries.len() < header.file_count as usize {
        log::warn!(
            "Archive declares {} records, only {} located",
            header.file_count,
            entries.len()
        );
    } else if pos < data.len() {
        log::warn!("{} trailing bytes after last record", data.len() - pos);
    }

    Ok(ArchiveIndex {
        header,
        tree,
        entries,
        archive_len: data.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_bytes;
    use crate::codes::CodeTable;
    use crate::frequency::FrequencyTable;
    use crate::types::CompressedFileRecord;
    use crate::archive::ArchiveWriter;

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut freqs = FrequencyTable::new();
        for (_, data) in files {
            freqs.add_bytes(data).unwrap();
        }
        let tree = HuffmanTree::build(&freqs).unwrap();
        let table = CodeTable::from_tree(&tree);

        let mut writer = ArchiveWriter::new(Vec::new());
        writer
            .write_header(&ArchiveHeader {
                frequencies: freqs,
                file_count: files.len() as u32,
            })
            .unwrap();
        for (i, (name, data)) in files.iter().enumerate() {
            writer
                .write_record(&CompressedFileRecord {
                    name: name.to_string(),
                    original_size: data.len() as u64,
                    data: encode_bytes(data, &table).unwrap(),
                    index: i,
                })
                .unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_offsets_chain() {
        let bytes = build_archive(&[("a", b"aaa"), ("b", b"bbb"), ("c", b"abc")]);
        let idx = index_bytes(&bytes).unwrap();
        assert_eq!(idx.entries.len(), 3);
        assert_eq!(idx.entries[0].record_offset, HEADER_LEN as u64);
        for pair in idx.entries.windows(2) {
            assert_eq!(pair[1].record_offset, pair[0].data_end());
        }
        assert_eq!(idx.entries[2].data_end(), bytes.len() as u64);
        assert_eq!(idx.missing_records(), 0);
    }

    #[test]
    fn test_empty_files_take_no_bitstream() {
        let bytes = build_archive(&[("e", b""), ("x", b"xyz"), ("f", b"")]);
        let idx = index_bytes(&bytes).unwrap();
        assert_eq!(idx.entries[0].data_len, 0);
        assert_eq!(idx.entries[2].data_len, 0);
        assert_eq!(idx.entries[2].data_end(), bytes.len() as u64);
    }

    #[test]
    fn test_truncated_archive_marks_defect() {
        let bytes = build_archive(&[("one", b"hello world"), ("two", b"goodbye world")]);
        let cut = &bytes[..bytes.len() - 2];
        let idx = index_bytes(cut).unwrap();
        assert_eq!(idx.entries.len(), 2);
        assert!(idx.entries[0].defect.is_none());
        assert!(idx.entries[1].defect.is_some());
    }

    #[test]
    fn test_missing_records_counted() {
        let mut bytes = build_archive(&[("one", b"hello")]);
        // Claim two records while only one is present
        bytes[1024..1028].copy_from_slice(&2i32.to_le_bytes());
        let idx = index_bytes(&bytes).unwrap();
        assert_eq!(idx.entries.len(), 1);
        assert_eq!(idx.missing_records(), 1);
    }

    #[test]
    fn test_empty_frequency_table_is_corrupt() {
        let bytes = vec![0u8; HEADER_LEN];
        assert!(matches!(index_bytes(&bytes), Err(Error::CorruptArchive(_))));
    }
}
