//! Backup artifacts: naming, compression, point-in-time selection and storage

pub mod commands;
pub mod compression;
pub mod error;
pub mod naming;
pub mod pitr;
pub mod storage;

pub use compression::{CompressAlgorithm, Compressor};
pub use error::BackupError;
pub use naming::{
    BackupContentType, BackupNaming, CustomNaming, LogicalBackupNaming, PhysicalBackupNaming,
    TargetBeforeFirst,
};
pub use pitr::{BackupSelector, Clock, FixedClock, SystemClock};
pub use storage::{BackupStorage, FileSystemStorage, ResumableReader, RetryConfig};
