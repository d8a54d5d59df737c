//! mariadb-backup: backup selection, streaming and retention for backup jobs

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::error;

use mariadb_operator::backup::commands::{self, parse_retention, parse_time};
use mariadb_operator::backup::{
    BackupContentType, BackupError, FileSystemStorage, LogicalBackupNaming, PhysicalBackupNaming,
    RetryConfig, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "mariadb-backup", version, about = "MariaDB backup management")]
struct Cli {
    /// Log output format, shared with the operator
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare the logical backup nearest to the recovery target
    Restore(RestoreArgs),
    /// Stream the physical backup nearest to the target time to stdout
    Stream(StreamArgs),
    /// Delete backups older than the retention window
    Cleanup(CleanupArgs),
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Directory holding the backups
    #[arg(long, env = "BACKUP_PATH")]
    backup_path: PathBuf,

    /// File receiving the path of the backup to load
    #[arg(long)]
    backup_target_path: PathBuf,

    /// Recovery target (RFC3339), defaults to now
    #[arg(long, value_parser = parse_time)]
    target_recovery_time: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Directory holding the backups
    #[arg(long, env = "BACKUP_PATH")]
    path: PathBuf,

    /// File receiving the name of the streamed backup
    #[arg(long)]
    target_file_path: Option<PathBuf>,

    /// Target time (RFC3339), defaults to now
    #[arg(long, value_parser = parse_time)]
    target_time: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct CleanupArgs {
    /// Directory holding the backups
    #[arg(long, env = "BACKUP_PATH")]
    path: PathBuf,

    /// Retention window, e.g. 30d or 12h
    #[arg(long, value_parser = parse_retention)]
    max_retention: Duration,

    #[arg(long, default_value = "logical")]
    backup_content_type: BackupContentType,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries backup data in `stream`
    if format == LogFormat::Json {
        tracing_subscriber::fmt()
            .json()
            .with_writer(io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

fn run(command: Commands) -> Result<(), BackupError> {
    match command {
        Commands::Restore(args) => {
            let storage = FileSystemStorage::new(args.backup_path);
            commands::restore(
                &storage,
                &LogicalBackupNaming,
                SystemClock,
                args.target_recovery_time,
                &args.backup_target_path,
            )?;
        }
        Commands::Stream(args) => {
            let storage = FileSystemStorage::new(args.path);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            commands::stream(
                &storage,
                &PhysicalBackupNaming,
                SystemClock,
                args.target_time,
                args.target_file_path.as_deref(),
                RetryConfig::default(),
                &mut out,
            )?;
        }
        Commands::Cleanup(args) => {
            let storage = FileSystemStorage::new(args.path);
            let naming = args.backup_content_type.naming();
            commands::cleanup(&storage, naming.as_ref(), SystemClock, args.max_retention)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
