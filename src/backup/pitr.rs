//! Point-in-time recovery: backup selection and retention
//!
//! [`BackupSelector`] runs the same algorithms over any [`BackupNaming`]
//! strategy:
//!
//! - [`BackupSelector::target_file`] picks the backup whose embedded timestamp
//!   is nearest to the recovery target. An exact match wins immediately; ties
//!   on distance keep the input (listing) order.
//! - [`BackupSelector::old_files`] returns the backups whose age strictly
//!   exceeds the retention window, in input order.
//!
//! Names the strategy rejects are logged at debug level and skipped.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::backup::error::{BackupError, Result};
use crate::backup::naming::{BackupNaming, TargetBeforeFirst};

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A backup name paired with the instant it carries
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate<'a> {
    name: &'a str,
    timestamp: DateTime<Utc>,
}

pub struct BackupSelector<'a, C: Clock = SystemClock> {
    naming: &'a dyn BackupNaming,
    clock: C,
}

impl<'a> BackupSelector<'a, SystemClock> {
    pub fn new(naming: &'a dyn BackupNaming) -> Self {
        Self {
            naming,
            clock: SystemClock,
        }
    }
}

impl<'a, C: Clock> BackupSelector<'a, C> {
    pub fn with_clock(naming: &'a dyn BackupNaming, clock: C) -> Self {
        Self { naming, clock }
    }

    /// Valid entries in input order
    fn candidates<'n, S: AsRef<str>>(&self, names: &'n [S]) -> Vec<Candidate<'n>> {
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                match self.naming.parse_timestamp(name) {
                    Ok(timestamp) if self.naming.is_valid(name) => {
                        Some(Candidate { name, timestamp })
                    }
                    Ok(_) => {
                        debug!(file = name, "skipping invalid backup file");
                        None
                    }
                    Err(e) => {
                        debug!(file = name, error = %e, "skipping invalid backup file");
                        None
                    }
                }
            })
            .collect()
    }

    /// Select the backup nearest to `target`
    pub fn target_file<S: AsRef<str>>(&self, names: &[S], target: DateTime<Utc>) -> Result<String> {
        let mut candidates = self.candidates(names);
        if candidates.is_empty() {
            return Err(BackupError::NoValidBackupsFound);
        }

        if let Some(exact) = candidates.iter().find(|c| c.timestamp == target) {
            return Ok(exact.name.to_string());
        }

        if self.naming.target_before_first() == TargetBeforeFirst::Fail
            && candidates.iter().all(|c| c.timestamp > target)
        {
            debug!(%target, "recovery target precedes every backup");
            return Err(BackupError::NoValidBackupsFound);
        }

        // sort_by_key is stable: equidistant entries keep listing order
        candidates.sort_by_key(|c| (c.timestamp - target).abs());

        let selected = &candidates[0];
        debug!(
            file = selected.name,
            backup_time = %selected.timestamp,
            %target,
            "selected backup for recovery target"
        );
        Ok(selected.name.to_string())
    }

    /// Backups older than `max_retention`, in input order
    pub fn old_files<S: AsRef<str>>(&self, names: &[S], max_retention: Duration) -> Vec<String> {
        let now = self.clock.now();
        self.candidates(names)
            .into_iter()
            .filter(|c| now - c.timestamp > max_retention)
            .map(|c| {
                debug!(file = c.name, backup_time = %c.timestamp, "backup exceeds retention");
                c.name.to_string()
            })
            .collect()
    }
}
