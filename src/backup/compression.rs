//! Stream compression for backup artifacts
//!
//! A [`Compressor`] transforms one byte stream into another. Backup creation
//! compresses dumps before they are pushed to storage, restore and streaming
//! decompress them on the way back. The algorithm is chosen from the backup
//! file name (see [`crate::backup::naming`]).

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backup::error::BackupError;

/// Compression algorithm applied to a backup file
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompressAlgorithm {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl CompressAlgorithm {
    /// Token used in the legacy `backup.<ts>.<token>.sql` naming
    pub fn token(&self) -> &'static str {
        match self {
            CompressAlgorithm::None => "none",
            CompressAlgorithm::Gzip => "gzip",
            CompressAlgorithm::Bzip2 => "bzip2",
        }
    }

    /// File extension appended after the content extension, if any
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            CompressAlgorithm::None => None,
            CompressAlgorithm::Gzip => Some("gz"),
            CompressAlgorithm::Bzip2 => Some("bz2"),
        }
    }

    /// Parse a trailing file extension (`gz`, `bz2`)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(CompressAlgorithm::Gzip),
            "bz2" => Some(CompressAlgorithm::Bzip2),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        *self != CompressAlgorithm::None
    }

    /// Get the stream transform for this algorithm
    pub fn compressor(&self) -> Box<dyn Compressor> {
        match self {
            CompressAlgorithm::None => Box::new(NopCompressor),
            CompressAlgorithm::Gzip => Box::new(GzipCompressor::default()),
            CompressAlgorithm::Bzip2 => Box::new(Bzip2Compressor::default()),
        }
    }
}

impl fmt::Display for CompressAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for CompressAlgorithm {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(CompressAlgorithm::None),
            "gzip" => Ok(CompressAlgorithm::Gzip),
            "bzip2" => Ok(CompressAlgorithm::Bzip2),
            other => Err(BackupError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Stream-to-stream compression transform
pub trait Compressor: Send + Sync {
    /// Compress everything read from `src` into `dst`
    fn compress(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<()>;

    /// Decompress everything read from `src` into `dst`
    fn decompress(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<()> {
        self.decompress_stream(dst, src).map(|_| ())
    }

    /// Decompress `src` into `dst`, returning the number of bytes written
    fn decompress_stream(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<u64>;
}

/// Pass-through transform for uncompressed backups
#[derive(Debug, Default, Clone, Copy)]
pub struct NopCompressor;

impl Compressor for NopCompressor {
    fn compress(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<()> {
        io::copy(src, dst)?;
        dst.flush()
    }

    fn decompress_stream(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<u64> {
        let written = io::copy(src, dst)?;
        dst.flush()?;
        Ok(written)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: flate2::Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<()> {
        let mut encoder = flate2::write::GzEncoder::new(dst, self.level);
        io::copy(src, &mut encoder)?;
        encoder.finish()?.flush()
    }

    fn decompress_stream(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<u64> {
        // Dumps may be written as several concatenated gzip members
        let mut decoder = flate2::read::MultiGzDecoder::new(src);
        let written = io::copy(&mut decoder, dst)?;
        dst.flush()?;
        Ok(written)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Bzip2Compressor {
    level: bzip2::Compression,
}

impl Default for Bzip2Compressor {
    fn default() -> Self {
        Self {
            level: bzip2::Compression::default(),
        }
    }
}

impl Compressor for Bzip2Compressor {
    fn compress(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<()> {
        let mut encoder = bzip2::write::BzEncoder::new(dst, self.level);
        io::copy(src, &mut encoder)?;
        encoder.finish()?.flush()
    }

    fn decompress_stream(&self, dst: &mut dyn Write, src: &mut dyn Read) -> io::Result<u64> {
        let mut decoder = bzip2::read::MultiBzDecoder::new(src);
        let written = io::copy(&mut decoder, dst)?;
        dst.flush()?;
        Ok(written)
    }
}
