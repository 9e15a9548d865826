use crate::error::{Error, Result};
use crate::types::FileTask;
use std::fs;
use std::path::Path;

/// Lists the regular files directly inside `dir`, sorted by name, as tasks
/// indexed 0..N in that order.
///
/// Subdirectories are not descended into. Symlinks count only when they
/// resolve to a regular file. Entries whose names are not valid UTF-8 are
/// skipped since they could not be restored under the same name.
pub fn scan_directory(dir: &Path) -> Result<Vec<FileTask>> {
    let dir_err = |e| Error::DirRead {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut found = Vec::new();

    for entry in fs::read_dir(dir).map_err(dir_err)? {
        let entry = entry.map_err(dir_err)?;
        let path = entry.path();
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };
        if !meta.is_file() {
            log::debug!("Skipping {:?}: not a regular file", path);
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => found.push((name, path, meta.len())),
            Err(raw) => log::warn!("Skipping {:?}: name is not UTF-8", raw),
        }
    }

    if found.is_empty() {
        return Err(Error::EmptyInput);
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(found
        .into_iter()
        .enumerate()
        .map(|(index, (name, path, size))| FileTask::new(path, name, size, index))
        .collect())
}
