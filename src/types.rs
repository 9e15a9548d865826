use crate::error::Error;
use std::fmt;
use std::path::PathBuf;

// One input file, created during enumeration and consumed exactly once by a
// compression worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub name: String,
    pub declared_size: u64,
    pub index: usize,
}

impl FileTask {
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        declared_size: u64,
        index: usize,
    ) -> Self {
        FileTask {
            path: path.into(),
            name: name.into(),
            declared_size,
            index,
        }
    }
}

// Output of one compression worker. Written once into the results slot that
// matches `index`, never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct CompressedFileRecord {
    pub name: String,
    pub original_size: u64,
    pub data: Vec<u8>,
    pub index: usize,
}

impl fmt::Debug for CompressedFileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedFileRecord")
            .field("name", &self.name)
            .field("original_size", &self.original_size)
            .field("compressed_len", &self.data.len())
            .field("index", &self.index)
            .finish()
    }
}

// A file dropped from a batch. The rest of the run carries on without it.
#[derive(Debug)]
pub struct FileFailure {
    pub index: usize,
    pub name: String,
    pub error: Error,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.name, self.error)
    }
}
