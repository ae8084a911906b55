//! Durable file writes for session state
//!
//! Two primitives cover everything the engine persists:
//! - [`write_file_atomic`] replaces a whole file via temp file, fsync and rename
//! - [`append_line_synced`] appends one record to a log and fsyncs it
//!
//! Text is written as UTF-8 with LF line endings.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Atomically write `content` to `path`.
///
/// Readers observe either the previous file or the new one, never a torn
/// write. Parent directories are created as needed.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = normalize_line_endings(content);

    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("Failed to create parent directory: {dir}"))?;

    let mut temp_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in: {dir}"))?;
    temp_file
        .write_all(normalized.as_bytes())
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    atomic_rename(temp_file, path.as_std_path())
        .with_context(|| format!("Failed to atomically write file: {path}"))
}

/// Append `line` plus a trailing newline to `path` and fsync before returning.
///
/// The line must not contain a newline itself; each call is one record.
pub fn append_line_synced(path: &Utf8Path, line: &str) -> Result<()> {
    anyhow::ensure!(
        !line.contains('\n') && !line.contains('\r'),
        "Refusing to append a multi-line record to {path}"
    );

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create parent directory: {dir}"))?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {path} for append"))?;

    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');
    file.write_all(record.as_bytes())
        .with_context(|| format!("Failed to append to {path}"))?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync {path}"))?;
    Ok(())
}

/// Read a text file, tolerating CRLF line endings.
pub fn read_file_normalized(path: &Utf8Path) -> Result<String> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?;
    Ok(normalize_line_endings(&content))
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> Result<()> {
    temp_file
        .persist(target)
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!(e.error))
}

/// Windows may briefly refuse the rename while scanners hold the target open;
/// retry with bounded exponential backoff (at most ~250ms in total).
#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &Path) -> Result<()> {
    use std::io::ErrorKind;
    use std::{thread, time::Duration};

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;

    let mut retry = 0;
    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(()),
            Err(err) => {
                let retryable = matches!(
                    err.error.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Other
                );
                if !retryable || retry >= MAX_RETRIES {
                    return Err(anyhow::anyhow!(err.error));
                }
                thread::sleep(Duration::from_millis(INITIAL_DELAY_MS << retry));
                retry += 1;
                temp_file = err.file;
            }
        }
    }
}
