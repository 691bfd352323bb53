use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use super::PdfTool;

/// Rough density used when the tool cannot tell us anything
pub const BYTES_PER_PAGE_ESTIMATE: u64 = 50 * 1024;

/// Which step of the fallback chain produced a page count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    Query,
    Render,
    SizeEstimate,
    Default,
}

impl fmt::Display for CountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CountSource::Query => "query",
            CountSource::Render => "render",
            CountSource::SizeEstimate => "size estimate",
            CountSource::Default => "default",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCount {
    pub pages: u32,
    pub source: CountSource,
}

impl PageCount {
    /// Whether the tool itself reported the count
    pub fn is_exact(&self) -> bool {
        matches!(self.source, CountSource::Query | CountSource::Render)
    }
}

/// Best-effort page count from file size alone. Never below 1.
pub fn estimate_from_size(bytes: u64) -> u32 {
    let pages = bytes.div_ceil(BYTES_PER_PAGE_ESTIMATE).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Discover how many pages `path` has.
///
/// Tries the direct query, then a full render, then a size estimate. This
/// never fails and always returns at least 1, because callers need a bound
/// for range inputs even when the tool is missing entirely.
pub async fn discover_page_count(tool: &dyn PdfTool, path: &Path) -> PageCount {
    let found = |pages: u32, source: CountSource| {
        info!(path = %path.display(), pages, %source, "Page count discovered");
        PageCount { pages, source }
    };

    match tool.query_page_count(path).await {
        Ok(pages) if pages > 0 => return found(pages, CountSource::Query),
        Ok(_) => warn!(path = %path.display(), "Page count query returned zero"),
        Err(e) => warn!(path = %path.display(), error = %e, "Page count query failed"),
    }

    match tool.render_page_count(path).await {
        Ok(pages) if pages > 0 => return found(pages, CountSource::Render),
        Ok(_) => warn!(path = %path.display(), "Alternate page count returned zero"),
        Err(e) => warn!(path = %path.display(), error = %e, "Alternate page count failed"),
    }

    match tokio::fs::metadata(path).await {
        Ok(meta) => found(estimate_from_size(meta.len()), CountSource::SizeEstimate),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot stat file, defaulting to 1 page");
            found(1, CountSource::Default)
        }
    }
}
