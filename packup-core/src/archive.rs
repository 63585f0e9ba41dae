use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

use crate::error::{BackupError, Result};
use crate::filter::PathFilter;
use crate::human;
use crate::progress::{ProgressSink, ProgressState};

/// gzip level used unless overridden (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub gzip: bool,
    pub compression_level: u32,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self { gzip: false, compression_level: DEFAULT_COMPRESSION_LEVEL }
    }
}

/// Result of a completed run. `uncompressed_bytes` is the content volume
/// archived (file bodies, not tar framing); `compressed_bytes` is the size
/// of the gzip output when compression was on.
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub created_utc: String,
    pub archive_path: PathBuf,
    pub files: u64,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: Option<u64>,
    pub duration_seconds: f64,
}

impl BackupSummary {
    /// Percentage saved by compression; `None` without gzip or when nothing
    /// was archived.
    pub fn ratio(&self) -> Option<f64> {
        human::compress_ratio(self.uncompressed_bytes, self.compressed_bytes?)
    }
}

/// Destination policy, checked before any I/O commit: the final path segment
/// must carry a `.`-separated extension (guard against an accidental
/// extensionless overwrite, not a format check) and the parent directory
/// must already exist.
pub fn check_destination(dest: &Path) -> Result<()> {
    let name = dest.file_name().and_then(|s| s.to_str()).unwrap_or("");
    if name.split('.').count() < 2 {
        return Err(BackupError::Config(format!(
            "--to should contain an extension: 'tar' 'gz' etc in a path, got '{}'",
            dest.display()
        )));
    }
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        return Err(BackupError::Config(format!(
            "destination directory '{}' does not exist or is not a directory",
            parent.display()
        )));
    }
    Ok(())
}

fn check_source(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(BackupError::Config(format!(
            "source '{}' is not a directory",
            root.display()
        )));
    }
    Ok(())
}

/// Stream `root` into a tar archive at `dest`.
///
/// Composition, each stage consuming the previous one incrementally:
/// walk → filter → tar encode → counting tap → [gzip → counting tap] → file.
/// A slow destination stalls the tar encoder and in turn the filesystem
/// reader; nothing buffers the whole archive. On any failure the pipeline
/// aborts as a whole and the partial output file is left for the caller.
pub fn run(
    root: &Path,
    dest: &Path,
    filter: &PathFilter,
    state: &ProgressState,
    sink: &dyn ProgressSink,
    opts: &BackupOptions,
) -> Result<BackupSummary> {
    check_source(root)?;
    check_destination(dest)?;

    let started = Instant::now();
    let top = root
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("backup")
        .to_string();

    let out = File::create(dest).map_err(|e| BackupError::io(dest, e))?;
    let out = BufWriter::new(out);

    let stats = if opts.gzip {
        let compressed_tap = CountingWriter::new(out, state.compressed_counter());
        let gz = GzEncoder::new(compressed_tap, Compression::new(opts.compression_level));
        let tar_tap = CountingWriter::new(gz, state.written_counter());
        let mut tar = TarBuilder::new(tar_tap);
        tar.follow_symlinks(false);
        let stats = append_tree(&mut tar, root, &top, filter, state, sink)?;
        let tar_tap = tar.into_inner().map_err(|e| BackupError::io(dest, e))?;
        let mut compressed_tap = tar_tap
            .into_inner()
            .finish()
            .map_err(|e| BackupError::io(dest, e))?;
        compressed_tap.flush().map_err(|e| BackupError::io(dest, e))?;
        stats
    } else {
        let tar_tap = CountingWriter::new(out, state.written_counter());
        let mut tar = TarBuilder::new(tar_tap);
        tar.follow_symlinks(false);
        let stats = append_tree(&mut tar, root, &top, filter, state, sink)?;
        let mut tar_tap = tar.into_inner().map_err(|e| BackupError::io(dest, e))?;
        tar_tap.flush().map_err(|e| BackupError::io(dest, e))?;
        stats
    };

    let summary = BackupSummary {
        created_utc: chrono::Utc::now().to_rfc3339(),
        archive_path: dest.to_path_buf(),
        files: stats.files,
        uncompressed_bytes: stats.content_bytes,
        compressed_bytes: opts.gzip.then(|| state.bytes_compressed()),
        duration_seconds: started.elapsed().as_secs_f64(),
    };
    tracing::debug!(
        files = summary.files,
        uncompressed = summary.uncompressed_bytes,
        "archive stream complete"
    );
    Ok(summary)
}

struct TreeStats {
    files: u64,
    content_bytes: u64,
}

fn append_tree<W: Write>(
    tar: &mut TarBuilder<W>,
    root: &Path,
    top: &str,
    filter: &PathFilter,
    state: &ProgressState,
    sink: &dyn ProgressSink,
) -> Result<TreeStats> {
    let mut stats = TreeStats { files: 0, content_bytes: 0 };

    // The archive always contains a single top-level folder named after the
    // source directory, wherever the source sits on disk.
    tar.append_path_with_name(root, top)
        .map_err(|e| BackupError::io(root, e))?;
    state.inc_files();
    stats.files += 1;

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
            // Vanished since listing: excluded, same as a pattern match.
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
        if !(ft.is_file() || ft.is_dir() || ft.is_symlink()) {
            // FIFO/socket/device. The scan already dropped these by type,
            // but the tree can change between passes.
            continue;
        }

        if ft.is_symlink() {
            // dangling links are dropped here exactly as in the scan pass
            match std::fs::metadata(entry.path()) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BackupError::io(entry.path(), e)),
            }
        }

        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let size = if ft.is_file() {
            match entry.metadata() {
                Ok(md) => md.len(),
                Err(err) if vanished(&err) => continue,
                Err(err) => return Err(BackupError::io(entry.path(), err.into())),
            }
        } else {
            0
        };

        sink.entry(rel, size);
        state.set_current_file(&rel.to_string_lossy());

        let name = Path::new(top).join(rel);
        match tar.append_path_with_name(entry.path(), &name) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(BackupError::io(entry.path(), e)),
        }
        state.inc_files();
        stats.files += 1;
        stats.content_bytes += size;
    }

    Ok(stats)
}

fn vanished(err: &walkdir::Error) -> bool {
    err.io_error().map_or(false, |e| e.kind() == io::ErrorKind::NotFound)
}

/// Write-through tap: forwards to the inner writer and adds whatever it
/// accepted to a shared counter. Sits between pipeline stages so progress is
/// observed without buffering.
struct CountingWriter<W: Write> {
    inner: W,
    count: Arc<AtomicU64>,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W, count: Arc<AtomicU64>) -> Self {
        Self { inner, count }
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_writer_tracks_accepted_bytes() {
        let count = Arc::new(AtomicU64::new(0));
        let mut w = CountingWriter::new(Vec::new(), count.clone());
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 11);
        assert_eq!(w.into_inner(), b"hello world");
    }

    #[test]
    fn destination_needs_an_extension() {
        assert!(check_destination(Path::new("backup")).is_err());
        assert!(check_destination(Path::new("backup.tar")).is_ok());
        assert!(check_destination(Path::new("./backup.tar.gz")).is_ok());
    }

    #[test]
    fn destination_parent_must_exist() {
        let err = check_destination(Path::new("no/such/dir/backup.tar")).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }
}
