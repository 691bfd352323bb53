pub mod ghostscript;
pub mod page_count;
#[cfg(test)]
pub mod testing;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ToolError;
use crate::page_range::PageRange;

pub use ghostscript::Ghostscript;

/// The external program that does the actual PDF work.
///
/// Every operation writes a brand new file; sources are never modified.
#[async_trait]
pub trait PdfTool: Send + Sync {
    /// Short name used in logs and the health endpoint
    fn name(&self) -> &str;

    /// Ask the tool for the page count directly
    async fn query_page_count(&self, source: &Path) -> Result<u32, ToolError>;

    /// Alternate page count: process the whole document and count what was rendered
    async fn render_page_count(&self, source: &Path) -> Result<u32, ToolError>;

    /// Write pages `range.from()..=range.to()` of `source` to `dest`, in original order
    async fn extract_range(
        &self,
        source: &Path,
        range: PageRange,
        dest: &Path,
    ) -> Result<(), ToolError>;

    /// Concatenate `inputs` in list order into `dest`
    async fn concatenate(&self, inputs: &[PathBuf], dest: &Path) -> Result<(), ToolError>;
}
