use crate::archive::write_archive;
use crate::codec::encode_reader;
use crate::codes::CodeTable;
use crate::error::{Error, Result};
use crate::frequency::aggregate_frequencies;
use crate::huffman::HuffmanTree;
use crate::pool::{ResultsTable, WorkerPool};
use crate::scanner::scan_directory;
use crate::types::{CompressedFileRecord, FileFailure, FileTask};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Cfg {
    // Compression workers draining the task queue
    pub workers: usize,
    // Tasks buffered between the producer and the workers. Bounds memory
    // and makes the producer wait when the workers fall behind.
    pub queue_capacity: usize,
    pub aggregation_workers: usize,
    pub log_prefix: String,
    pub no_fsync: bool,
}

impl Default for Cfg {
    fn default() -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Cfg::with_workers(workers)
    }
}

impl Cfg {
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Cfg {
            workers,
            queue_capacity: workers * 2,
            aggregation_workers: workers,
            log_prefix: "huffpack".to_string(),
            no_fsync: false,
        }
    }
}

pub type CompressionRatio = f64;

pub fn ratio_to_string(ratio: CompressionRatio) -> String {
    format!("{:.2}", ratio)
}

#[derive(Debug)]
pub struct CompressionSummary {
    pub files_written: usize,
    pub failures: Vec<FileFailure>,
    pub input_bytes: u64,
    pub archive_bytes: u64,
    pub ratio: CompressionRatio,
    pub elapsed: Duration,
}

pub struct Compressor {
    cfg: Cfg,
    output_path: PathBuf,
}

impl Compressor {
    pub fn new(cfg: Cfg, output_path: impl Into<PathBuf>) -> Self {
        Compressor {
            cfg,
            output_path: output_path.into(),
        }
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn disable_fsync(&mut self) {
        self.cfg.no_fsync = true;
    }

    /// Archives every regular file directly inside `dir`.
    pub fn compress_directory(&self, dir: &Path) -> Result<CompressionSummary> {
        let tasks = scan_directory(dir)?;
        log::info!("[{}] Found {} files in {:?}", self.cfg.log_prefix, tasks.len(), dir);
        self.compress_files(tasks)
    }

    /// Archives `tasks`. Task indices are reassigned to match their position,
    /// which is also the record order in the archive.
    pub fn compress_files(&self, tasks: Vec<FileTask>) -> Result<CompressionSummary> {
        self.compress_with(tasks, encode_file)
    }

    /// Same as [`Compressor::compress_files`] with a custom per-file encoder.
    pub fn compress_with<F>(
        &self,
        mut tasks: Vec<FileTask>,
        encode: F,
    ) -> Result<CompressionSummary>
    where
        F: Fn(&FileTask, &CodeTable) -> Result<CompressedFileRecord> + Sync,
    {
        let start = Instant::now();
        let prefix = self.cfg.log_prefix.as_str();
        if tasks.is_empty() {
            return Err(Error::EmptyInput);
        }
        for (i, task) in tasks.iter_mut().enumerate() {
            task.index = i;
        }

        // Pass 1: global frequencies
        let agg = aggregate_frequencies(&tasks, self.cfg.aggregation_workers)?;
        for failure in &agg.failures {
            log::warn!("[{}] Skipping {}", prefix, failure);
        }
        if agg.failures.len() == tasks.len() {
            log::error!("[{}] None of the {} input files could be read", prefix, tasks.len());
            return Err(Error::EmptyInput);
        }
        let tree = HuffmanTree::build(&agg.table)?;
        let table = CodeTable::from_tree(&tree);
        log::debug!(
            "[{}] Scanned {} bytes: {} symbols, longest code {} bits",
            prefix,
            agg.bytes_scanned,
            table.len(),
            table.max_len()
        );

        // Pass 2: encode. Files that could not be scanned are settled up front
        // and never reach the queue.
        let results = ResultsTable::new(tasks.len());
        for failure in agg.failures {
            results.store(failure.index, Err(failure.error));
        }
        let pool = WorkerPool::new(self.cfg.workers, self.cfg.queue_capacity, prefix);
        let table = &table;
        let pending = tasks
            .iter()
            .filter(|t| !results.is_filled(t.index))
            .map(|t| (t.index, t));
        pool.run(pending, &results, |task| encode(task, table));

        let mut records = Vec::with_capacity(tasks.len());
        let mut failures = Vec::new();
        for (task, outcome) in tasks.iter().zip(results.into_slots()) {
            match outcome {
                Some(Ok(record)) => records.push(record),
                Some(Err(error)) => failures.push(FileFailure {
                    index: task.index,
                    name: task.name.clone(),
                    error,
                }),
                None => log::error!("[{}] {} was never processed", prefix, task.name),
            }
        }
        if records.is_empty() {
            log::error!("[{}] No file could be compressed", prefix);
            return Err(Error::EmptyInput);
        }

        // Pass 3: serialize in index order
        let input_bytes: u64 = records.iter().map(|r| r.original_size).sum();
        let archive_bytes = write_archive(
            &self.output_path,
            &agg.table,
            &records,
            !self.cfg.no_fsync,
            prefix,
        )?;
        let ratio = if archive_bytes == 0 {
            0.0
        } else {
            input_bytes as f64 / archive_bytes as f64
        };

        let summary = CompressionSummary {
            files_written: records.len(),
            failures,
            input_bytes,
            archive_bytes,
            ratio,
            elapsed: start.elapsed(),
        };
        log::info!(
            "[{}] Compress took {:?}, ratio: {}, files: {} written, {} skipped, file: {:?}",
            prefix,
            summary.elapsed,
            ratio_to_string(summary.ratio),
            summary.files_written,
            summary.failures.len(),
            self.output_path
        );
        Ok(summary)
    }
}

/// Encodes one file with the shared code table.
///
/// The output buffer is reserved up front from the size seen at scan time.
/// The recorded size is the number of bytes actually read.
pub fn encode_file(task: &FileTask, table: &CodeTable) -> Result<CompressedFileRecord> {
    let file = File::open(&task.path).map_err(|e| Error::FileOpen {
        path: task.path.clone(),
        source: e,
    })?;

    let requested = usize::try_from(task.declared_size).unwrap_or(usize::MAX);
    let mut out = Vec::new();
    out.try_reserve(requested).map_err(|_| Error::Allocation {
        name: task.name.clone(),
        requested,
    })?;

    let (data, read) = encode_reader(file, table, out)?;
    if read != task.declared_size {
        log::debug!(
            "{} changed size since scan: {} -> {} bytes",
            task.name,
            task.declared_size,
            read
        );
    }
    log::trace!("Encoded {} ({} -> {} bytes)", task.name, read, data.len());

    Ok(CompressedFileRecord {
        name: task.name.clone(),
        original_size: read,
        data,
        index: task.index,
    })
}

#[cfg(test)]
#[path = "compress_test.rs"]
mod compress_test;
