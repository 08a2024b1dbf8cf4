use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::core::limits::MAX_PAGE_SIZE;

#[derive(Parser, Debug, Clone)]
#[command(name = "sqlboard")]
pub struct Args {
    /// Directory holding uploaded SQLite files. Request filenames resolve inside it.
    #[arg(long, default_value = "uploads")]
    pub data_dir: PathBuf,

    /// Logging level (stderr). Also supports RUST_LOG.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// SQLite busy timeout for every opened database handle.
    #[arg(long, default_value_t = 2_000)]
    pub busy_timeout_ms: u64,

    /// Upper bound for the requested page size (never above 1000).
    #[arg(long, default_value_t = MAX_PAGE_SIZE)]
    pub max_page_size: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}
