use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::ToolArgs;

/// Flags for `snackpdf serve`. Each one can also come from the environment.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "SNACKPDF_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Root for upload and output directories (defaults to <tmp>/snackpdf)
    #[arg(long, env = "SNACKPDF_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Built front-end to serve for non-API routes
    #[arg(long, env = "SNACKPDF_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Delay between finishing a download and deleting its files, in seconds
    #[arg(long, env = "SNACKPDF_CLEANUP_DELAY_SECS", default_value = "5")]
    pub cleanup_delay_secs: u64,

    /// Age after which unclaimed uploads and outputs are swept, in seconds
    #[arg(long, env = "SNACKPDF_STALE_AFTER_SECS", default_value = "3600")]
    pub stale_after_secs: u64,

    /// How often the stale sweep runs, in seconds
    #[arg(long, env = "SNACKPDF_SWEEP_INTERVAL_SECS", default_value = "600")]
    pub sweep_interval_secs: u64,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "SNACKPDF_MAX_UPLOAD_MB", default_value = "100")]
    pub max_upload_mb: usize,
}

/// Everything the server needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub work_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub cleanup_delay: Duration,
    pub stale_after: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub gs_command: Option<String>,
    pub tool_timeout: Duration,
}

impl Config {
    pub fn from_args(serve: ServeArgs, tool: ToolArgs) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", serve.host, serve.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", serve.host, serve.port))?;

        Ok(Config {
            addr,
            work_dir: serve.work_dir.unwrap_or_else(default_work_dir),
            static_dir: serve.static_dir,
            cleanup_delay: Duration::from_secs(serve.cleanup_delay_secs),
            stale_after: Duration::from_secs(serve.stale_after_secs),
            sweep_interval: Duration::from_secs(serve.sweep_interval_secs.max(1)),
            max_upload_bytes: serve.max_upload_mb.saturating_mul(1024 * 1024),
            gs_command: tool.gs_command,
            tool_timeout: Duration::from_secs(tool.tool_timeout_secs.max(1)),
        })
    }
}

pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("snackpdf")
}
