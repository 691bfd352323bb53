use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ServeArgs;

#[derive(Parser)]
#[command(name = "snackpdf")]
#[command(about = "PDF page counting and extraction server backed by Ghostscript")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub tool: ToolArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// How to reach Ghostscript
#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    /// Ghostscript executable (probes gs, gswin64c, gswin32c when unset)
    #[arg(long, global = true, env = "SNACKPDF_GS_COMMAND")]
    pub gs_command: Option<String>,

    /// Deadline for a single Ghostscript invocation, in seconds
    #[arg(
        long,
        global = true,
        env = "SNACKPDF_TOOL_TIMEOUT_SECS",
        default_value = "120"
    )]
    pub tool_timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (primary mode)
    Serve(ServeArgs),

    /// Print the page count of a PDF
    Pages {
        /// PDF file to inspect
        path: PathBuf,
    },

    /// Extract page ranges to a new PDF, or a ZIP when several ranges remain
    #[command(alias = "cat")]
    Extract {
        /// PDF file to extract from
        path: PathBuf,

        /// Page ranges (e.g., "1-5,10,15-end")
        pages: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Directory for intermediate files
        #[arg(long, env = "SNACKPDF_WORK_DIR")]
        work_dir: Option<PathBuf>,
    },
}
