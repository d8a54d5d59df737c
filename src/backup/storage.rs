//! Backup storage contract
//!
//! Backends (filesystem, S3, ...) expose a flat listing of backup names and
//! whole-object transfers. Streaming restores read through
//! [`ResumableReader`], which reopens the object at the last offset after a
//! read failure, backing off exponentially between attempts.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::backup::error::{BackupError, Result};

/// Retry policy for resumable reads
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Attempts allowed after the first failure
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()).max(0.0))
    }
}

pub trait BackupStorage: Send + Sync {
    /// Backup names, without any backend prefix
    fn list(&self) -> Result<Vec<String>>;

    /// Copy a stored backup to a local file
    fn pull(&self, name: &str, dst: &Path) -> Result<()>;

    /// Store a local file under `name`
    fn push(&self, src: &Path, name: &str) -> Result<()>;

    fn delete(&self, name: &str) -> Result<()>;

    /// Size of the stored object in bytes
    fn size(&self, name: &str) -> Result<u64>;

    /// Open the object for reading, starting at `offset`
    fn open_at(&self, name: &str, offset: u64) -> Result<Box<dyn Read + Send>>;

    /// Open a reader that survives transient read failures
    fn pull_stream_resumable(
        &self,
        name: &str,
        retry: RetryConfig,
    ) -> Result<(ResumableReader<'_, Self>, u64)>
    where
        Self: Sized,
    {
        let size = self.size(name)?;
        Ok((ResumableReader::new(self, name, retry), size))
    }
}

/// Reader that reopens the underlying object after failures
pub struct ResumableReader<'a, S: BackupStorage + ?Sized> {
    storage: &'a S,
    name: String,
    retry: RetryConfig,
    inner: Option<Box<dyn Read + Send>>,
    offset: u64,
    failures: u32,
}

impl<'a, S: BackupStorage + ?Sized> ResumableReader<'a, S> {
    pub fn new(storage: &'a S, name: &str, retry: RetryConfig) -> Self {
        Self {
            storage,
            name: name.to_string(),
            retry,
            inner: None,
            offset: 0,
            failures: 0,
        }
    }

    /// Bytes delivered so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn backoff(&mut self, error: io::Error) -> io::Result<()> {
        if self.failures >= self.retry.max_retries {
            return Err(io::Error::other(BackupError::RetriesExhausted {
                name: self.name.clone(),
                attempts: self.failures + 1,
                source: error,
            }));
        }
        let delay = self.retry.delay_for_attempt(self.failures);
        self.failures += 1;
        warn!(
            file = %self.name,
            offset = self.offset,
            attempt = self.failures,
            error = %error,
            "backup read failed, resuming in {:?}",
            delay
        );
        self.inner = None;
        std::thread::sleep(delay);
        Ok(())
    }
}

impl<S: BackupStorage + ?Sized> Read for ResumableReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.inner.is_none() {
                match self.storage.open_at(&self.name, self.offset) {
                    Ok(reader) => {
                        debug!(file = %self.name, offset = self.offset, "opened backup stream");
                        self.inner = Some(reader);
                    }
                    Err(BackupError::Io(e)) => {
                        self.backoff(e)?;
                        continue;
                    }
                    Err(e) => return Err(io::Error::other(e)),
                }
            }

            let Some(reader) = self.inner.as_mut() else {
                continue;
            };
            match reader.read(buf) {
                Ok(n) => {
                    self.offset += n as u64;
                    self.failures = 0;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => self.backoff(e)?,
            }
        }
    }
}

/// Backups stored as plain files in a directory
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    base_path: PathBuf,
    prefix: Option<String>,
}

impl FileSystemStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            prefix: None,
        }
    }

    /// Store objects under a sub directory of the base path
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        let prefix = prefix.trim_matches('/');
        self.prefix = (!prefix.is_empty()).then(|| prefix.to_string());
        self
    }

    fn root(&self) -> PathBuf {
        match &self.prefix {
            Some(prefix) => self.base_path.join(prefix),
            None => self.base_path.clone(),
        }
    }

    /// Local path of a stored backup
    pub fn object_path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    fn map_not_found(name: &str, error: io::Error) -> BackupError {
        if error.kind() == io::ErrorKind::NotFound {
            BackupError::NotFound(name.to_string())
        } else {
            BackupError::Io(error)
        }
    }
}

impl BackupStorage for FileSystemStorage {
    fn list(&self) -> Result<Vec<String>> {
        let root = self.root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        // Directory iteration order is unspecified, listings are by name
        names.sort();
        Ok(names)
    }

    fn pull(&self, name: &str, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(self.object_path(name), dst).map_err(|e| Self::map_not_found(name, e))?;
        Ok(())
    }

    fn push(&self, src: &Path, name: &str) -> Result<()> {
        let dst = self.object_path(name);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.object_path(name)).map_err(|e| Self::map_not_found(name, e))
    }

    fn size(&self, name: &str) -> Result<u64> {
        fs::metadata(self.object_path(name))
            .map(|m| m.len())
            .map_err(|e| Self::map_not_found(name, e))
    }

    fn open_at(&self, name: &str, offset: u64) -> Result<Box<dyn Read + Send>> {
        let mut file =
            fs::File::open(self.object_path(name)).map_err(|e| Self::map_not_found(name, e))?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(file))
    }
}
