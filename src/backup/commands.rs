//! Operations behind the `mariadb-backup` binary
//!
//! Each command works on a [`BackupStorage`] and a naming scheme, so the same
//! code serves the local directory used in the backup job and the tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::backup::error::{BackupError, Result};
use crate::backup::naming::BackupNaming;
use crate::backup::pitr::{BackupSelector, Clock};
use crate::backup::storage::{BackupStorage, FileSystemStorage, RetryConfig};

/// Parse `30s`, `15m`, `24h` or `7d`
pub fn parse_retention(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration {raw:?} (use s, m, h or d)"))?;
    let (value, unit) = raw.split_at(split);
    let value: i64 = value
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}"))?;

    let duration = match unit {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        other => return Err(format!("unknown duration unit {other:?} (use s, m, h or d)")),
    };
    duration.ok_or_else(|| format!("duration {raw:?} is out of range"))
}

/// Parse an RFC3339 instant
pub fn parse_time(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC3339 time {raw:?}: {e}"))
}

/// Pick the backup nearest to `target` and make it ready to load
///
/// A compressed backup is decompressed next to the original. The path of the
/// file to load is written to `target_path` and returned.
pub fn restore<C: Clock>(
    storage: &FileSystemStorage,
    naming: &dyn BackupNaming,
    clock: C,
    target: Option<DateTime<Utc>>,
    target_path: &Path,
) -> Result<PathBuf> {
    let target = target.unwrap_or_else(|| clock.now());
    let names = storage.list()?;
    let selected = BackupSelector::with_clock(naming, clock).target_file(&names, target)?;
    info!(file = %selected, %target, "selected backup to restore");

    let compression = naming.parse_compression(&selected)?;
    let restore_path = if compression.is_compressed() {
        let uncompressed = naming.uncompressed_name(&selected)?;
        let dst_path = storage.object_path(&uncompressed);
        let mut src = fs::File::open(storage.object_path(&selected))?;
        let mut dst = fs::File::create(&dst_path)?;
        compression.compressor().decompress(&mut dst, &mut src)?;
        info!(file = %uncompressed, algorithm = compression.token(), "decompressed backup");
        dst_path
    } else {
        storage.object_path(&selected)
    };

    write_target_file(target_path, &restore_path.to_string_lossy())?;
    Ok(restore_path)
}

/// Pick the backup nearest to `target` and stream it decompressed into `out`
///
/// The selected name is written to `target_file_path` when given. Reads go
/// through the resumable reader. Returns the bytes written.
pub fn stream<C: Clock, S: BackupStorage>(
    storage: &S,
    naming: &dyn BackupNaming,
    clock: C,
    target: Option<DateTime<Utc>>,
    target_file_path: Option<&Path>,
    retry: RetryConfig,
    out: &mut dyn Write,
) -> Result<u64> {
    let target = target.unwrap_or_else(|| clock.now());
    let names = storage.list()?;
    let selected = BackupSelector::with_clock(naming, clock).target_file(&names, target)?;
    info!(file = %selected, %target, "selected backup to stream");

    if let Some(path) = target_file_path {
        write_target_file(path, &selected)?;
    }

    let compression = naming.parse_compression(&selected)?;
    let (mut reader, size) = storage.pull_stream_resumable(&selected, retry)?;
    debug!(file = %selected, size, "streaming backup");

    let written = compression
        .compressor()
        .decompress_stream(out, &mut reader)?;
    info!(file = %selected, bytes = written, "backup streamed");
    Ok(written)
}

/// Delete every backup older than `max_retention`, returning their names
///
/// Every old backup is attempted. When some deletes fail the error carries
/// both the deleted names and each failure.
pub fn cleanup<C: Clock, S: BackupStorage>(
    storage: &S,
    naming: &dyn BackupNaming,
    clock: C,
    max_retention: Duration,
) -> Result<Vec<String>> {
    let names = storage.list()?;
    let old = BackupSelector::with_clock(naming, clock).old_files(&names, max_retention);
    if old.is_empty() {
        info!("no backups to clean up");
        return Ok(old);
    }

    let mut deleted = Vec::with_capacity(old.len());
    let mut failures = Vec::new();
    for name in old {
        match storage.delete(&name) {
            Ok(()) => {
                info!(file = %name, "deleted old backup");
                deleted.push(name);
            }
            Err(e) => {
                warn!(file = %name, "failed to delete old backup: {}", e);
                failures.push((name, e));
            }
        }
    }

    if failures.is_empty() {
        Ok(deleted)
    } else {
        Err(BackupError::CleanupFailed { deleted, failures })
    }
}

fn write_target_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).map_err(BackupError::Io)
}
