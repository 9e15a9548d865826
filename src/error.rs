use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create {path:?}: {source}")]
    FileCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to rename {from:?} to {to:?}: {source}")]
    FileRename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path:?}: {source}")]
    DirRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create directory {path:?}: {source}")]
    DirCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No input files to compress")]
    EmptyInput,

    #[error("Input set contains no bytes, cannot build a Huffman tree")]
    EmptyAlphabet,

    #[error("Frequency count overflow for byte 0x{byte:02x}")]
    FrequencyOverflow { byte: u8 },

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Cannot allocate {requested} bytes for {name}")]
    Allocation { name: String, requested: usize },

    #[error("Unsafe file name in archive: {0:?}")]
    InvalidName(String),

    #[error("Work queue is closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    // Shorthand used by the archive parser and the decoders
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptArchive(msg.into())
    }
}
