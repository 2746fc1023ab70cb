//! Atomic I/O operations with file locking

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Retry settings for the final rename of an atomic write.
///
/// On some platforms the rename fails transiently while another process
/// (an indexer, a virus scanner) holds the target open.
#[derive(Debug, Clone, Copy)]
pub struct RobustnessConfig {
    /// First delay between attempts.
    pub initial_interval: Duration,
    /// Give up once this much time has passed.
    pub max_elapsed: Duration,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(10),
            max_elapsed: Duration::from_millis(500),
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename strategy to prevent partial writes.
/// Acquires an advisory lock on the temp file while writing.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], robustness: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    // Same directory, so the rename never crosses filesystems
    let temp_name = format!(
        ".{}.{}.tmp",
        native_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed {
            path: native_path.clone(),
        })?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;
    drop(temp_file);

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(robustness.initial_interval)
        .with_max_elapsed_time(Some(robustness.max_elapsed))
        .build();

    let renamed = backoff::retry(policy, || {
        fs::rename(&temp_path, &native_path).map_err(|e| {
            tracing::debug!(path = %native_path.display(), error = %e, "rename failed, retrying");
            backoff::Error::transient(e)
        })
    });

    if let Err(err) = renamed {
        let _ = fs::remove_file(&temp_path);
        let source = match err {
            backoff::Error::Permanent(e) => e,
            backoff::Error::Transient { err, .. } => err,
        };
        return Err(Error::io(&native_path, source));
    }

    Ok(())
}

/// Read raw bytes from a file.
pub fn read_bytes(path: &NormalizedPath) -> Result<Vec<u8>> {
    let native_path = path.to_native();
    fs::read(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Write text content to a file atomically.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}
