pub mod archive;
pub mod codec;
pub mod codes;
pub mod compress;
pub mod decompress;
pub mod error;
pub mod frequency;
pub mod huffman;
pub mod index;
pub mod pool;
pub mod queue;
pub mod scanner;
pub mod types;

// Re-export main types
pub use archive::{write_archive, ArchiveHeader, ArchiveWriter, RecordHeader};
pub use codes::{Code, CodeTable};
pub use compress::{Cfg, CompressionSummary, Compressor};
pub use decompress::{DecompressCfg, Decompressor, ExtractionSummary};
pub use error::{Error, Result};
pub use frequency::{aggregate_frequencies, FrequencyTable};
pub use huffman::{HuffmanNode, HuffmanTree};
pub use index::{index_archive, ArchiveIndex, IndexEntry};
pub use queue::{BoundedWorkQueue, QueueState};
pub use scanner::scan_directory;
pub use types::{CompressedFileRecord, FileFailure, FileTask};
