//! Global byte histogram over a set of input files.
//!
//! Each aggregation worker fills a private [`FrequencyTable`] and hands it
//! back through its join handle; the caller merges them by addition. No table
//! is ever shared between threads while it is being filled.

use crate::error::{Error, Result};
use crate::types::{FileFailure, FileTask};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::thread;

pub const NUM_SYMBOLS: usize = 256;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Occurrence count per byte value. The sum of all entries equals the number
/// of bytes fed into the table.
#[derive(Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: [u32; NUM_SYMBOLS],
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyTable {
    pub fn new() -> Self {
        FrequencyTable {
            counts: [0; NUM_SYMBOLS],
        }
    }

    pub fn from_counts(counts: [u32; NUM_SYMBOLS]) -> Self {
        FrequencyTable { counts }
    }

    pub fn counts(&self) -> &[u32; NUM_SYMBOLS] {
        &self.counts
    }

    pub fn get(&self, byte: u8) -> u32 {
        self.counts[byte as usize]
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Number of byte values that occur at least once.
    pub fn distinct(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Byte values with a non-zero count, ascending.
    pub fn symbols(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(b, &c)| (b as u8, c))
    }

    pub fn add_bytes(&mut self, data: &[u8]) -> Result<()> {
        let mut local = [0u64; NUM_SYMBOLS];
        for &b in data {
            local[b as usize] += 1;
        }
        self.add_wide(&local)
    }

    /// Counts every byte produced by `reader`. Returns how many bytes were read.
    pub fn add_reader<R: Read>(&mut self, mut reader: R) -> Result<u64> {
        let mut local = [0u64; NUM_SYMBOLS];
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            for &b in &buf[..n] {
                local[b as usize] += 1;
            }
            total += n as u64;
        }
        self.add_wide(&local)?;
        Ok(total)
    }

    /// Adds `other` into `self`. Merge order never changes the result.
    pub fn merge(&mut self, other: &FrequencyTable) -> Result<()> {
        for byte in 0..NUM_SYMBOLS {
            self.counts[byte] = self.counts[byte]
                .checked_add(other.counts[byte])
                .ok_or(Error::FrequencyOverflow { byte: byte as u8 })?;
        }
        Ok(())
    }

    fn add_wide(&mut self, local: &[u64; NUM_SYMBOLS]) -> Result<()> {
        for byte in 0..NUM_SYMBOLS {
            let sum = self.counts[byte] as u64 + local[byte];
            self.counts[byte] =
                u32::try_from(sum).map_err(|_| Error::FrequencyOverflow { byte: byte as u8 })?;
        }
        Ok(())
    }
}

impl fmt::Debug for FrequencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.symbols()).finish()
    }
}

/// Result of scanning a file set: the merged histogram and the files that
/// could not be read.
#[derive(Debug)]
pub struct Aggregation {
    pub table: FrequencyTable,
    pub failures: Vec<FileFailure>,
    pub bytes_scanned: u64,
}

/// Builds the global histogram of `tasks` using up to `workers` threads.
///
/// Worker `w` takes tasks `w, w + workers, ...`. A file that fails to open or
/// read is reported in [`Aggregation::failures`] and contributes nothing; a
/// count overflow aborts the whole aggregation.
pub fn aggregate_frequencies(tasks: &[FileTask], workers: usize) -> Result<Aggregation> {
    let workers = workers.clamp(1, tasks.len().max(1));

    let partials: Vec<Result<Aggregation>> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|w| s.spawn(move || scan_stride(tasks, w, workers)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(res) => res,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut merged = Aggregation {
        table: FrequencyTable::new(),
        failures: Vec::new(),
        bytes_scanned: 0,
    };
    for partial in partials {
        let partial = partial?;
        merged.table.merge(&partial.table)?;
        merged.failures.extend(partial.failures);
        merged.bytes_scanned += partial.bytes_scanned;
    }
    merged.failures.sort_by_key(|f| f.index);

    log::debug!(
        "Aggregated {} bytes over {} files, {} distinct byte values, {} failures",
        merged.bytes_scanned,
        tasks.len(),
        merged.table.distinct(),
        merged.failures.len()
    );
    Ok(merged)
}

fn scan_stride(tasks: &[FileTask], start: usize, step: usize) -> Result<Aggregation> {
    let mut table = FrequencyTable::new();
    let mut failures = Vec::new();
    let mut bytes_scanned = 0u64;

    for task in tasks.iter().skip(start).step_by(step) {
        let file = match File::open(&task.path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Skipping {:?}: {}", task.path, e);
                failures.push(FileFailure {
                    index: task.index,
                    name: task.name.clone(),
                    error: Error::FileOpen {
                        path: task.path.clone(),
                        source: e,
                    },
                });
                continue;
            }
        };

        // Count into a scratch table first so a read error halfway through
        // leaves no trace of the file in the histogram.
        let mut file_table = FrequencyTable::new();
        match file_table.add_reader(file) {
            Ok(n) => {
                table.merge(&file_table)?;
                bytes_scanned += n;
            }
            Err(Error::Io(e)) => {
                log::warn!("Skipping {:?}: {}", task.path, e);
                failures.push(FileFailure {
                    index: task.index,
                    name: task.name.clone(),
                    error: Error::Io(e),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Aggregation {
        table,
        failures,
        bytes_scanned,
    })
}
