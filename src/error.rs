use std::path::PathBuf;

use thiserror::Error;

use crate::page_range::RangeError;

/// Failure of a single external tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("unexpected output from {program}: {output}")]
    UnexpectedOutput { program: String, output: String },
}

/// Failure of a whole extraction request
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("PDF file not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Could not determine the page count of {}", .0.display())]
    PageCountUnknown(PathBuf),

    #[error("Failed to extract pages {pages}: {source}")]
    Tool {
        pages: String,
        #[source]
        source: ToolError,
    },

    #[error("Expected output was not created: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RangeError> for ExtractError {
    fn from(err: RangeError) -> Self {
        ExtractError::InvalidRequest(err.to_string())
    }
}
