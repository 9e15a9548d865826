use crate::codec::decode_stream;
use crate::error::{Error, Result};
use crate::huffman::HuffmanTree;
use crate::index::{index_archive, ArchiveIndex, IndexEntry};
use crate::pool::{spawn_per_task, ResultsTable, WorkerPool};
use crate::types::FileFailure;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DecompressCfg {
    // None spawns one worker per archived file. Some(n) drains a bounded
    // queue with n workers instead.
    pub max_workers: Option<usize>,
    pub log_prefix: String,
    pub no_fsync: bool,
}

impl Default for DecompressCfg {
    fn default() -> Self {
        DecompressCfg {
            max_workers: None,
            log_prefix: "huffpack".to_string(),
            no_fsync: false,
        }
    }
}

#[derive(Debug)]
pub struct ExtractionSummary {
    pub files_restored: usize,
    pub bytes_restored: u64,
    pub failures: Vec<FileFailure>,
    pub missing_records: usize,
    pub elapsed: Duration,
}

impl ExtractionSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.missing_records == 0
    }
}

/// Reader side of an archive: the offset index is built on open, entries
/// are then decoded independently of each other.
pub struct Decompressor {
    path: PathBuf,
    index: ArchiveIndex,
    cfg: DecompressCfg,
}

impl Decompressor {
    pub fn open(path: impl AsRef<Path>, cfg: DecompressCfg) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let start = Instant::now();
        let index = index_archive(&path)?;
        log::info!(
            "[{}] Indexed {} of {} records in {:?} ({} bytes)",
            cfg.log_prefix,
            index.entries.len(),
            index.header.file_count,
            start.elapsed(),
            index.archive_len
        );
        Ok(Decompressor { path, index, cfg })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.index.entries
    }

    pub fn tree(&self) -> &HuffmanTree {
        &self.index.tree
    }

    /// Decodes entry `i` into memory through a fresh file handle.
    pub fn read_entry(&self, i: usize) -> Result<Vec<u8>> {
        let entry = self
            .index
            .entries
            .get(i)
            .ok_or_else(|| Error::corrupt(format!("no entry #{}", i)))?;
        let reader = open_at(&self.path, entry.data_offset)?;
        let mut out = Vec::new();
        decode_stream(&self.index.tree, reader, entry.original_size, &mut out)?;
        Ok(out)
    }

    /// Restores every located entry into `out_dir`, creating it if needed.
    ///
    /// Failing to create `out_dir` aborts. Any per-file problem (unsafe or
    /// duplicate name, damaged bitstream, write error) is reported in the
    /// summary and the other files carry on.
    pub fn extract_all(&self, out_dir: &Path) -> Result<ExtractionSummary> {
        let start = Instant::now();
        let prefix = &self.cfg.log_prefix;
        fs::create_dir_all(out_dir).map_err(|e| Error::DirCreate {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

        let entries = &self.index.entries;
        let results = ResultsTable::new(entries.len());

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(entries.len());
        for (slot, entry) in entries.iter().enumerate() {
            if !seen.insert(entry.name.as_str()) {
                let dup = Error::InvalidName(format!("{} (duplicate)", entry.name));
                results.store(slot, Err(dup));
            } else {
                tasks.push((slot, entry));
            }
        }

        let fsync = !self.cfg.no_fsync;
        let job = |entry: &IndexEntry| {
            extract_entry(&self.path, &self.index.tree, entry, out_dir, fsync)
        };
        match self.cfg.max_workers {
            None => {
                log::debug!("[{}] Spawning {} extraction workers", prefix, tasks.len());
                spawn_per_task(tasks, &results, job);
            }
            Some(n) => {
                let pool = WorkerPool::new(n, n.saturating_mul(2), prefix.clone());
                log::debug!("[{}] Extracting with {} workers", prefix, pool.workers());
                pool.run(tasks, &results, job);
            }
        }

        let mut summary = ExtractionSummary {
            files_restored: 0,
            bytes_restored: 0,
            failures: Vec::new(),
            missing_records: self.index.missing_records(),
            elapsed: Duration::ZERO,
        };
        for (slot, outcome) in results.into_slots().enumerate() {
            let entry = &entries[slot];
            match outcome {
                Some(Ok(n)) => {
                    summary.files_restored += 1;
                    summary.bytes_restored += n;
                }
                Some(Err(e)) => {
                    log::error!("[{}] {} not restored: {}", prefix, entry.name, e);
                    summary.failures.push(FileFailure {
                        index: entry.index,
                        name: entry.name.clone(),
                        error: e,
                    });
                }
                None => log::error!("[{}] {} was never processed", prefix, entry.name),
            }
        }
        summary.elapsed = start.elapsed();

        log::info!(
            "[{}] Decompress took {:?}, restored {} files ({} bytes), {} failed, {} missing",
            prefix,
            summary.elapsed,
            summary.files_restored,
            summary.bytes_restored,
            summary.failures.len(),
            summary.missing_records
        );
        Ok(summary)
    }
}

/// Checks that an archived name is a single plain path component.
///
/// `\` is an ordinary file name byte on Unix and is only refused where it
/// separates paths.
pub fn validate_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    let ok = !name.is_empty()
        && !name.contains(['/', '\0'])
        && !(cfg!(windows) && name.contains('\\'))
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if ok {
        Ok(name)
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

fn open_at(archive: &Path, offset: u64) -> Result<impl Read> {
    let mut file = File::open(archive).map_err(|e| Error::FileOpen {
        path: archive.to_path_buf(),
        source: e,
    })?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(BufReader::new(file))
}

// One extraction worker: own handle on the archive, seek, decode exactly
// `original_size` bytes into the destination file.
fn extract_entry(
    archive: &Path,
    tree: &HuffmanTree,
    entry: &IndexEntry,
    out_dir: &Path,
    fsync: bool,
) -> Result<u64> {
    let name = validate_name(&entry.name)?;
    let dest = out_dir.join(name);
    let reader = open_at(archive, entry.data_offset)?;
    let out = File::create(&dest).map_err(|e| Error::FileCreate {
        path: dest.clone(),
        source: e,
    })?;

    match write_entry(tree, reader, entry.original_size, out, fsync) {
        Ok(()) => {
            log::debug!("Restored {:?} ({} bytes)", dest, entry.original_size);
            Ok(entry.original_size)
        }
        Err(e) => {
            let _ = fs::remove_file(&dest);
            Err(e)
        }
    }
}

fn write_entry<R: Read>(
    tree: &HuffmanTree,
    reader: R,
    size: u64,
    out: File,
    fsync: bool,
) -> Result<()> {
    let mut w = BufWriter::new(out);
    decode_stream(tree, reader, size, &mut w)?;
    w.flush()?;
    if fsync {
        w.get_ref().sync_all()?;
    }
    Ok(())
}
