//! Archive extraction into the staging root.
//!
//! An archive that cannot be opened at all fails fast; individual entry
//! failures (bad paths, write errors, decompression errors) are counted and
//! the rest of the archive still extracts. The caller deletes the staged
//! archive only when every entry landed cleanly.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// Per-archive extraction summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub destination_root: PathBuf,
    /// Entries that failed to extract. Zero means the archive may be
    /// deleted by the caller.
    pub entry_errors: usize,
    /// First directory entry seen, relative to the destination root.
    /// Callers use it to locate the unpacked payload tree.
    pub first_directory_entry: Option<String>,
}

impl ExtractionResult {
    pub fn is_clean(&self) -> bool {
        self.entry_errors == 0
    }
}

/// Unpack `archive_path` under `destination_root`, preserving the archive's
/// internal relative paths. `on_entry` is called once per entry with
/// `(entry_index, entry_count)`, 1-based.
pub fn extract<F>(
    archive_path: &Path,
    destination_root: &Path,
    mut on_entry: F,
) -> Result<ExtractionResult, UpdateError>
where
    F: FnMut(usize, usize),
{
    let file = std::fs::File::open(archive_path)
        .map_err(|e| UpdateError::io("open", archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| UpdateError::ExtractionFailed {
        path: archive_path.display().to_string(),
        reason: e.to_string(),
    })?;

    let entry_count = archive.len();
    let mut result = ExtractionResult {
        destination_root: destination_root.to_path_buf(),
        entry_errors: 0,
        first_directory_entry: None,
    };

    for i in 0..entry_count {
        on_entry(i + 1, entry_count);

        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("[Extract] Cannot read entry {}: {}", i, e);
                result.entry_errors += 1;
                continue;
            }
        };

        let name = entry.name().to_string();
        // Entries whose path would escape the destination root count as
        // errors rather than landing outside the staging area.
        let relative = match entry.enclosed_name().map(Path::to_path_buf) {
            Some(p) => p,
            None => {
                tracing::warn!("[Extract] Unsafe entry path rejected: {}", name);
                result.entry_errors += 1;
                continue;
            }
        };
        let out_path = destination_root.join(&relative);

        if name.ends_with('/') {
            if let Err(e) = std::fs::create_dir_all(&out_path) {
                tracing::warn!("[Extract] mkdir {} failed: {}", out_path.display(), e);
                result.entry_errors += 1;
                continue;
            }
            if result.first_directory_entry.is_none() {
                result.first_directory_entry = Some(name);
            }
        } else {
            if let Err(e) = write_entry(&mut entry, &out_path) {
                tracing::warn!("[Extract] {} failed: {}", out_path.display(), e);
                result.entry_errors += 1;
            }
        }
    }

    if result.entry_errors == 0 {
        tracing::info!(
            "[Extract] {} entries into {}",
            entry_count,
            destination_root.display()
        );
    } else {
        tracing::warn!(
            "[Extract] {} of {} entries failed for {}",
            result.entry_errors,
            entry_count,
            archive_path.display()
        );
    }

    Ok(result)
}

fn write_entry(entry: &mut zip::read::ZipFile<'_>, out_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::fs::File::create(out_path)?;
    // Decompression errors (bad CRC, truncated data) surface here as I/O
    // errors from the reader side.
    let mut buf = [0u8; 8192];
    loop {
        let n = entry.read(&mut buf)?;
        if n == 0 {
            break;
        }
        use std::io::Write;
        out.write_all(&buf[..n])?;
    }
    Ok(())
}
