//! Backup file naming schemes
//!
//! Two incompatible conventions are in use:
//!
//! - Logical (dump) backups: `backup.<RFC3339>.sql`, compressed either with the
//!   legacy middle token (`backup.<ts>.gzip.sql`) or with a trailing extension
//!   (`backup.<ts>.sql.gz`).
//! - Physical (snapshot) backups: `physicalbackup-<YYYYMMDDhhmmss>.xb`,
//!   optionally followed by `.gz` / `.bz2`.
//!
//! Both implement [`BackupNaming`], which is the strategy consumed by the
//! selection and retention logic in [`crate::backup::pitr`]. [`CustomNaming`]
//! lets callers plug in their own validation and timestamp parsing, e.g. for
//! volume snapshot names.
//!
//! Object storage "directories" in front of the file name are preserved
//! verbatim by every method.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::compression::CompressAlgorithm;
use crate::backup::error::{BackupError, Result};

pub const LOGICAL_BACKUP_PREFIX: &str = "backup";
pub const LOGICAL_BACKUP_EXTENSION: &str = "sql";
pub const PHYSICAL_BACKUP_PREFIX: &str = "physicalbackup";
pub const PHYSICAL_BACKUP_EXTENSION: &str = "xb";

const COMPACT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const COMPACT_TIMESTAMP_LEN: usize = 14;

/// What selection does when the recovery target precedes every backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetBeforeFirst {
    /// Fail with [`BackupError::NoValidBackupsFound`]
    Fail,
    /// Use the earliest backup available
    Earliest,
}

/// Naming strategy for a family of backup files
pub trait BackupNaming: Send + Sync {
    /// Whether the name belongs to this scheme and carries a parseable timestamp
    fn is_valid(&self, name: &str) -> bool {
        self.parse_timestamp(name).is_ok()
    }

    /// Extract the instant embedded in the name
    fn parse_timestamp(&self, name: &str) -> Result<DateTime<Utc>>;

    /// Compression signaled by the name
    fn parse_compression(&self, name: &str) -> Result<CompressAlgorithm>;

    /// Name of the file once decompressed. Fails for uncompressed names.
    fn uncompressed_name(&self, name: &str) -> Result<String>;

    fn target_before_first(&self) -> TargetBeforeFirst;
}

/// Which naming family a backup belongs to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupContentType {
    #[default]
    Logical,
    Physical,
}

impl BackupContentType {
    pub fn naming(&self) -> Box<dyn BackupNaming> {
        match self {
            BackupContentType::Logical => Box::new(LogicalBackupNaming),
            BackupContentType::Physical => Box::new(PhysicalBackupNaming),
        }
    }
}

impl fmt::Display for BackupContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupContentType::Logical => write!(f, "logical"),
            BackupContentType::Physical => write!(f, "physical"),
        }
    }
}

impl FromStr for BackupContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logical" => Ok(BackupContentType::Logical),
            "physical" => Ok(BackupContentType::Physical),
            other => Err(format!("unknown backup content type: {other}")),
        }
    }
}

/// Split `dir/sub/file` into (`dir/sub/`, `file`)
fn split_path(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(idx) => (&name[..=idx], &name[idx + 1..]),
        None => ("", name),
    }
}

fn parse_compact_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    if raw.len() != COMPACT_TIMESTAMP_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BackupError::InvalidTimestamp {
            name: name.to_string(),
            reason: format!("expected {COMPACT_TIMESTAMP_LEN} digits, got {raw:?}"),
        });
    }
    NaiveDateTime::parse_from_str(raw, COMPACT_TIMESTAMP_FORMAT)
        .map(|ts| ts.and_utc())
        .map_err(|e| BackupError::InvalidTimestamp {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Format an instant the way physical backup names embed it
pub fn format_compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(COMPACT_TIMESTAMP_FORMAT).to_string()
}

/// `backup.<RFC3339>[.<token>].sql[.<ext>]`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogicalBackupNaming;

struct LogicalParts<'a> {
    prefix: &'a str,
    timestamp: &'a str,
    compression: CompressAlgorithm,
}

impl LogicalBackupNaming {
    /// Build a backup name for `ts`, using the extension form for compression
    pub fn backup_name(ts: DateTime<Utc>, compression: CompressAlgorithm) -> String {
        let ts = ts.to_rfc3339_opts(SecondsFormat::Secs, true);
        match compression.extension() {
            Some(ext) => {
                format!("{LOGICAL_BACKUP_PREFIX}.{ts}.{LOGICAL_BACKUP_EXTENSION}.{ext}")
            }
            None => format!("{LOGICAL_BACKUP_PREFIX}.{ts}.{LOGICAL_BACKUP_EXTENSION}"),
        }
    }

    fn parse(name: &str) -> Result<LogicalParts<'_>> {
        let (prefix, base) = split_path(name);
        let parts: Vec<&str> = base.split('.').collect();

        let (timestamp, compression) = match parts.as_slice() {
            [LOGICAL_BACKUP_PREFIX, ts, LOGICAL_BACKUP_EXTENSION] => (*ts, CompressAlgorithm::None),
            [LOGICAL_BACKUP_PREFIX, ts, LOGICAL_BACKUP_EXTENSION, ext] => {
                let algorithm = CompressAlgorithm::from_extension(ext)
                    .ok_or_else(|| BackupError::UnsupportedCompression(ext.to_string()))?;
                (*ts, algorithm)
            }
            [LOGICAL_BACKUP_PREFIX, ts, token, LOGICAL_BACKUP_EXTENSION] => {
                let algorithm: CompressAlgorithm = token.parse()?;
                if !algorithm.is_compressed() {
                    return Err(BackupError::UnsupportedCompression(token.to_string()));
                }
                (*ts, algorithm)
            }
            _ => return Err(BackupError::InvalidFileName(name.to_string())),
        };

        Ok(LogicalParts {
            prefix,
            timestamp,
            compression,
        })
    }
}

impl BackupNaming for LogicalBackupNaming {
    fn parse_timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        let parts = Self::parse(name)?;
        DateTime::parse_from_rfc3339(parts.timestamp)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| BackupError::InvalidTimestamp {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    fn parse_compression(&self, name: &str) -> Result<CompressAlgorithm> {
        Self::parse(name).map(|parts| parts.compression)
    }

    fn uncompressed_name(&self, name: &str) -> Result<String> {
        let parts = Self::parse(name)?;
        if !parts.compression.is_compressed() {
            return Err(BackupError::NotCompressed(name.to_string()));
        }
        Ok(format!(
            "{}{LOGICAL_BACKUP_PREFIX}.{}.{LOGICAL_BACKUP_EXTENSION}",
            parts.prefix, parts.timestamp
        ))
    }

    fn target_before_first(&self) -> TargetBeforeFirst {
        TargetBeforeFirst::Fail
    }
}

/// `physicalbackup-<YYYYMMDDhhmmss>.xb[.gz|.bz2]`
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicalBackupNaming;

struct PhysicalParts<'a> {
    prefix: &'a str,
    stem: &'a str,
    timestamp: &'a str,
    compression: CompressAlgorithm,
}

impl PhysicalBackupNaming {
    pub fn backup_name(ts: DateTime<Utc>, compression: CompressAlgorithm) -> String {
        let base = format!(
            "{PHYSICAL_BACKUP_PREFIX}-{}.{PHYSICAL_BACKUP_EXTENSION}",
            format_compact_timestamp(ts)
        );
        match compression.extension() {
            Some(ext) => format!("{base}.{ext}"),
            None => base,
        }
    }

    fn parse(name: &str) -> Result<PhysicalParts<'_>> {
        let (prefix, base) = split_path(name);

        let (rest, compression) = match base.rsplit_once('.') {
            Some((rest, ext)) if CompressAlgorithm::from_extension(ext).is_some() => (
                rest,
                CompressAlgorithm::from_extension(ext).unwrap_or_default(),
            ),
            _ => (base, CompressAlgorithm::None),
        };

        let stem = rest
            .strip_suffix(PHYSICAL_BACKUP_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| BackupError::InvalidFileName(name.to_string()))?;

        match stem.rsplit_once('-') {
            Some((PHYSICAL_BACKUP_PREFIX, timestamp)) => Ok(PhysicalParts {
                prefix,
                stem,
                timestamp,
                compression,
            }),
            _ => Err(BackupError::InvalidFileName(name.to_string())),
        }
    }
}

impl BackupNaming for PhysicalBackupNaming {
    fn parse_timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        let parts = Self::parse(name)?;
        parse_compact_timestamp(name, parts.timestamp)
    }

    fn parse_compression(&self, name: &str) -> Result<CompressAlgorithm> {
        Self::parse(name).map(|parts| parts.compression)
    }

    fn uncompressed_name(&self, name: &str) -> Result<String> {
        let parts = Self::parse(name)?;
        if !parts.compression.is_compressed() {
            return Err(BackupError::NotCompressed(name.to_string()));
        }
        Ok(format!(
            "{}{}.{PHYSICAL_BACKUP_EXTENSION}",
            parts.prefix, parts.stem
        ))
    }

    fn target_before_first(&self) -> TargetBeforeFirst {
        TargetBeforeFirst::Earliest
    }
}

pub type ValidateFn = Box<dyn Fn(&str) -> bool + Send + Sync>;
pub type ParseTimestampFn = Box<dyn Fn(&str) -> Result<DateTime<Utc>> + Send + Sync>;

/// Naming strategy assembled from caller supplied functions.
///
/// Names handled this way are never compressed.
pub struct CustomNaming {
    validate: ValidateFn,
    parse_timestamp: ParseTimestampFn,
    target_before_first: TargetBeforeFirst,
}

impl CustomNaming {
    pub fn new(validate: ValidateFn, parse_timestamp: ParseTimestampFn) -> Self {
        Self {
            validate,
            parse_timestamp,
            target_before_first: TargetBeforeFirst::Earliest,
        }
    }

    pub fn with_target_before_first(mut self, policy: TargetBeforeFirst) -> Self {
        self.target_before_first = policy;
        self
    }

    /// Bare snapshot names: `<prefix>-<YYYYMMDDhhmmss>`, no extension
    pub fn snapshots(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        let validate_prefix = prefix.clone();

        let timestamp_of = move |name: &str, prefix: &str| -> Option<String> {
            let (_, base) = split_path(name);
            base.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('-'))
                .map(str::to_string)
        };

        Self::new(
            Box::new(move |name| {
                timestamp_of(name, &validate_prefix)
                    .is_some_and(|ts| parse_compact_timestamp(name, &ts).is_ok())
            }),
            Box::new(move |name| {
                let ts = timestamp_of(name, &prefix)
                    .ok_or_else(|| BackupError::InvalidFileName(name.to_string()))?;
                parse_compact_timestamp(name, &ts)
            }),
        )
    }
}

impl fmt::Debug for CustomNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomNaming")
            .field("target_before_first", &self.target_before_first)
            .finish_non_exhaustive()
    }
}

impl BackupNaming for CustomNaming {
    fn is_valid(&self, name: &str) -> bool {
        (self.validate)(name) && (self.parse_timestamp)(name).is_ok()
    }

    fn parse_timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        if !(self.validate)(name) {
            return Err(BackupError::InvalidFileName(name.to_string()));
        }
        (self.parse_timestamp)(name)
    }

    fn parse_compression(&self, name: &str) -> Result<CompressAlgorithm> {
        if !(self.validate)(name) {
            return Err(BackupError::InvalidFileName(name.to_string()));
        }
        Ok(CompressAlgorithm::None)
    }

    fn uncompressed_name(&self, name: &str) -> Result<String> {
        Err(BackupError::NotCompressed(name.to_string()))
    }

    fn target_before_first(&self) -> TargetBeforeFirst {
        self.target_before_first
    }
}
