use std::io::ErrorKind;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{BackupError, Result};
use crate::filter::PathFilter;

/// Aggregate totals from the pre-flight walk. `files` counts every archivable
/// entry including directories and the root itself; `bytes` sums regular-file
/// and symlink sizes (directories contribute 0). Computed once, read-only
/// afterwards: these size the ETA denominator and the progress bar total.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanTotals {
    pub files: u64,
    pub bytes: u64,
}

/// Walk `root` once and produce totals, honoring the exclusion filter.
///
/// Excluded directories are pruned without descending or statting. Device
/// nodes, sockets and FIFOs are silently ignored; any other exotic node type
/// is fatal. An entry that vanishes between listing and stat is treated as if
/// it never existed.
pub fn scan(root: &Path, filter: &PathFilter) -> Result<ScanTotals> {
    let meta = std::fs::metadata(root).map_err(|e| BackupError::io(root, e))?;
    if !meta.is_dir() {
        return Err(BackupError::Config(format!(
            "source '{}' is not a directory",
            root.display()
        )));
    }

    // The root itself counts, so an empty tree still reports one entry.
    let mut totals = ScanTotals { files: 1, bytes: 0 };

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let rel = e.path().strip_prefix(root).unwrap_or_else(|_| e.path());
            !filter.is_excluded(rel)
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) if vanished(&err) => continue,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| root.to_path_buf());
                return Err(BackupError::io(path, err.into()));
            }
        };

        let ft = entry.file_type();
        if ft.is_dir() {
            totals.files += 1;
        } else if ft.is_file() {
            match entry.metadata() {
                Ok(md) => {
                    totals.files += 1;
                    totals.bytes += md.len();
                }
                Err(err) if vanished(&err) => {}
                Err(err) => return Err(BackupError::io(entry.path(), err.into())),
            }
        } else if ft.is_symlink() {
            // Stat through the link; a dangling link is skipped entirely.
            match std::fs::metadata(entry.path()) {
                Ok(md) => {
                    totals.files += 1;
                    totals.bytes += md.len();
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(BackupError::io(entry.path(), err)),
            }
        } else if is_ignored_node(&ft) {
            // device/socket/FIFO: not counted, not an error
        } else {
            return Err(BackupError::UnsupportedEntry(entry.path().to_path_buf()));
        }
    }

    tracing::debug!(files = totals.files, bytes = totals.bytes, "scan pass complete");
    Ok(totals)
}

fn vanished(err: &walkdir::Error) -> bool {
    err.io_error().map_or(false, |e| e.kind() == ErrorKind::NotFound)
}

#[cfg(unix)]
fn is_ignored_node(ft: &std::fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    ft.is_fifo() || ft.is_socket() || ft.is_block_device() || ft.is_char_device()
}

#[cfg(not(unix))]
fn is_ignored_node(_ft: &std::fs::FileType) -> bool {
    false
}
