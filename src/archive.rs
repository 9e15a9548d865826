//! On-disk archive layout. All integers are little-endian, no padding.
//!
//! ```text
//! u32[256]   frequency table, index = byte value
//! i32        file count N
//! N times:
//!   i32      name length L
//!   u8[L]    name, no terminator
//!   u64      original size
//!   u8[..]   Huffman bitstream, MSB first, zero padded to a byte
//! ```
//!
//! The bitstream carries no length; it ends where decoding `original size`
//! bytes ends.

use crate::error::{Error, Result};
use crate::frequency::{FrequencyTable, NUM_SYMBOLS};
use crate::types::CompressedFileRecord;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub const HEADER_LEN: usize = NUM_SYMBOLS * 4 + 4;
pub const MAX_NAME_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub frequencies: FrequencyTable,
    pub file_count: u32,
}

impl ArchiveHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        for &c in self.frequencies.counts() {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        let count = i32::try_from(self.file_count)
            .map_err(|_| Error::corrupt(format!("too many files: {}", self.file_count)))?;
        buf.extend_from_slice(&count.to_le_bytes());
        w.write_all(&buf)?;
        Ok(())
    }

    /// Parses the fixed-size header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::corrupt(format!(
                "archive is {} bytes, header needs {}",
                data.len(),
                HEADER_LEN
            )));
        }
        let mut counts = [0u32; NUM_SYMBOLS];
        for (i, c) in counts.iter_mut().enumerate() {
            *c = read_u32(data, i * 4);
        }
        let file_count = read_i32(data, NUM_SYMBOLS * 4);
        if file_count < 0 {
            return Err(Error::corrupt(format!("negative file count {}", file_count)));
        }
        Ok(ArchiveHeader {
            frequencies: FrequencyTable::from_counts(counts),
            file_count: file_count as u32,
        })
    }
}

/// Per-file metadata that precedes each bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub name: String,
    pub original_size: u64,
}

impl RecordHeader {
    pub fn encoded_len(&self) -> usize {
        4 + self.name.len() + 8
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let name = self.name.as_bytes();
        if name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidName(self.name.clone()));
        }
        w.write_all(&(name.len() as i32).to_le_bytes())?;
        w.write_all(name)?;
        w.write_all(&self.original_size.to_le_bytes())?;
        Ok(())
    }

    /// Parses a record header at `pos`. Returns it with its encoded length.
    pub fn parse(data: &[u8], pos: usize) -> Result<(Self, usize)> {
        let rest = data.get(pos..).unwrap_or_default();
        if rest.len() < 4 {
            return Err(Error::corrupt(format!("record header truncated at offset {}", pos)));
        }
        let name_len = read_i32(rest, 0);
        if name_len < 0 || name_len as usize > MAX_NAME_LEN {
            return Err(Error::corrupt(format!(
                "name length {} out of range at offset {}",
                name_len, pos
            )));
        }
        let name_len = name_len as usize;
        if rest.len() < 4 + name_len + 8 {
            return Err(Error::corrupt(format!("record header truncated at offset {}", pos)));
        }
        let name = String::from_utf8_lossy(&rest[4..4 + name_len]).into_owned();
        let original_size = read_u64(rest, 4 + name_len);
        Ok((RecordHeader { name, original_size }, 4 + name_len + 8))
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(b)
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    read_u32(data, at) as i32
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(b)
}

// Single-threaded serializer. Only ever driven after the worker pool has
// been joined, so records arrive here already in index order.
pub struct ArchiveWriter<W: Write> {
    w: W,
    written: u64,
    records: u32,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(w: W) -> Self {
        ArchiveWriter {
            w,
            written: 0,
            records: 0,
        }
    }

    pub fn write_header(&mut self, header: &ArchiveHeader) -> Result<()> {
        header.write_to(&mut self.w)?;
        self.written += HEADER_LEN as u64;
        Ok(())
    }

    pub fn write_record(&mut self, record: &CompressedFileRecord) -> Result<()> {
        let head = RecordHeader {
            name: record.name.clone(),
            original_size: record.original_size,
        };
        head.write_to(&mut self.w)?;
        self.w.write_all(&record.data)?;
        self.written += (head.encoded_len() + record.data.len()) as u64;
        self.records += 1;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn records_written(&self) -> u32 {
        self.records
    }

    pub fn finish(mut self) -> Result<W> {
        self.w.flush()?;
        Ok(self.w)
    }
}

/// Writes a complete archive to `path`.
///
/// Output goes to a temporary file next to `path` and is renamed into place
/// only after every record is written, so a failed run leaves nothing behind.
/// Returns the archive size in bytes.
pub fn write_archive(
    path: &Path,
    frequencies: &FrequencyTable,
    records: &[CompressedFileRecord],
    fsync: bool,
    log_prefix: &str,
) -> Result<u64> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir).map_err(|e| Error::FileCreate {
        path: path.to_path_buf(),
        source: e,
    })?;

    let header = ArchiveHeader {
        frequencies: frequencies.clone(),
        file_count: records.len() as u32,
    };
    let mut writer = ArchiveWriter::new(BufWriter::new(tmp.as_file()));
    writer.write_header(&header)?;
    for record in records {
        writer.write_record(record)?;
    }
    let total = writer.bytes_written();
    writer.finish()?;

    if fsync {
        tmp.as_file().sync_all()?;
    }

    tmp.persist(path).map_err(|e| Error::FileRename {
        from: e.file.path().to_path_buf(),
        to: path.to_path_buf(),
        source: e.error,
    })?;

    // Make the rename itself durable. The archive is already complete, so a
    // failure here is reported but does not fail the run.
    if fsync {
        match fs::File::open(dir) {
            Ok(d) => {
                if let Err(e) = d.sync_all() {
                    log::warn!("[{}] fsync of directory {:?} failed: {}", log_prefix, dir, e);
                }
            }
            Err(e) => log::warn!("[{}] Cannot open {:?} for fsync: {}", log_prefix, dir, e),
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut freqs = FrequencyTable::new();
        freqs.add_bytes(b"aab").unwrap();
        let header = ArchiveHeader {
            frequencies: freqs,
            file_count: 3,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[b'a' as usize * 4..b'a' as usize * 4 + 4], &2u32.to_le_bytes());
        assert_eq!(&buf[1024..], &3i32.to_le_bytes());
        assert_eq!(ArchiveHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_short_and_negative() {
        assert!(matches!(ArchiveHeader::parse(&[0u8; 10]), Err(Error::CorruptArchive(_))));
        let mut buf = vec![0u8; HEADER_LEN];
        buf[1024..].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(ArchiveHeader::parse(&buf), Err(Error::CorruptArchive(_))));
    }

    #[test]
    fn test_record_header_parse() {
        let head = RecordHeader {
            name: "notes.txt".to_string(),
            original_size: 12345,
        };
        let mut buf = vec![0xaa; 3];
        head.write_to(&mut buf).unwrap();
        let (parsed, len) = RecordHeader::parse(&buf, 3).unwrap();
        assert_eq!(parsed, head);
        assert_eq!(len, head.encoded_len());
        assert_eq!(len, 4 + 9 + 8);
    }

    #[test]
    fn test_record_header_rejects_bad_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-5i32).to_le_bytes());
        assert!(RecordHeader::parse(&buf, 0).is_err());

        let mut buf = Vec::new();
        buf.extend_from_slice(&100i32.to_le_bytes());
        buf.extend_from_slice(b"short");
        assert!(RecordHeader::parse(&buf, 0).is_err());
        assert!(RecordHeader::parse(&buf, 500).is_err());
    }

    #[test]
    fn test_write_archive_persists_atomically() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.huff");
        let mut freqs = FrequencyTable::new();
        freqs.add_bytes(b"z").unwrap();
        let records = vec![CompressedFileRecord {
            name: "z".to_string(),
            original_size: 1,
            data: vec![0],
            index: 0,
        }];

        let size = write_archive(&path, &freqs, &records, false, "test").unwrap();
        assert_eq!(size, (HEADER_LEN + 4 + 1 + 8 + 1) as u64);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
        // Only the archive itself, no stray temp files
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_archive_with_fsync_and_no_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("synced.huff");
        let mut freqs = FrequencyTable::new();
        freqs.add_bytes(b"ab").unwrap();

        let size = write_archive(&path, &freqs, &[], true, "test").unwrap();
        assert_eq!(size, HEADER_LEN as u64);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(ArchiveHeader::parse(&bytes).unwrap().file_count, 0);
    }
}
