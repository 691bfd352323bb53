//! Turning page selections into downloadable files.
//!
//! Each request owns every file it creates. Selections are processed one at
//! a time; the first failure aborts the request and removes whatever was
//! produced so far, so a bundle is never delivered with a range missing.

pub mod bundle;
pub mod naming;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{ExtractError, ToolError};
use crate::page_range::{merge_ranges, PageRange, PageSelection, RangeError};
use crate::pdf::page_count::{discover_page_count, PageCount};
use crate::pdf::PdfTool;
use crate::workspace::{remove_all, remove_path, WorkDirs};

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source: PathBuf,
    pub selections: Vec<PageSelection>,
    pub original_filename: String,
}

impl ExtractionRequest {
    /// One output per range, after merging
    pub fn from_ranges(
        source: PathBuf,
        ranges: &[PageRange],
        original_filename: impl Into<String>,
    ) -> Result<Self, ExtractError> {
        if ranges.is_empty() {
            return Err(ExtractError::InvalidRequest(
                "at least one page range is required".to_string(),
            ));
        }
        Ok(ExtractionRequest {
            source,
            selections: ranges.iter().copied().map(PageSelection::Range).collect(),
            original_filename: original_filename.into(),
        })
    }

    /// A single output holding an arbitrary set of pages
    pub fn from_pages(
        source: PathBuf,
        pages: &[u32],
        original_filename: impl Into<String>,
    ) -> Result<Self, ExtractError> {
        Ok(ExtractionRequest {
            source,
            selections: vec![PageSelection::from_pages(pages)?],
            original_filename: original_filename.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    pub path: PathBuf,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pdf,
    Zip,
}

impl ArtifactKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Zip => "application/zip",
        }
    }
}

/// The file to hand to the client
#[derive(Debug)]
pub struct Download {
    pub artifact: ExtractedArtifact,
    pub kind: ArtifactKind,
    /// Number of files produced before bundling
    pub parts: usize,
}

/// Ranges are merged into a minimal sorted set; page lists are kept as given
fn normalize_selections(selections: Vec<PageSelection>) -> Vec<PageSelection> {
    let mut ranges = Vec::new();
    let mut lists = Vec::new();
    for selection in selections {
        match selection {
            PageSelection::Range(range) => ranges.push(range),
            list @ PageSelection::Pages(_) => lists.push(list),
        }
    }

    merge_ranges(&ranges)
        .into_iter()
        .map(PageSelection::Range)
        .chain(lists)
        .collect()
}

/// Drives a `PdfTool` to produce one download per request
#[derive(Clone)]
pub struct Extractor {
    tool: Arc<dyn PdfTool>,
    dirs: WorkDirs,
}

impl Extractor {
    pub fn new(tool: Arc<dyn PdfTool>, dirs: WorkDirs) -> Self {
        Extractor { tool, dirs }
    }

    pub fn tool(&self) -> &dyn PdfTool {
        self.tool.as_ref()
    }

    pub fn dirs(&self) -> &WorkDirs {
        &self.dirs
    }

    pub async fn page_count(&self, path: &Path) -> PageCount {
        discover_page_count(self.tool.as_ref(), path).await
    }

    pub async fn extract(&self, request: ExtractionRequest) -> Result<Download, ExtractError> {
        if request.selections.is_empty() {
            return Err(ExtractError::InvalidRequest(
                "no pages selected".to_string(),
            ));
        }
        if !tokio::fs::try_exists(&request.source).await.unwrap_or(false) {
            return Err(ExtractError::SourceMissing(request.source));
        }

        let selections = normalize_selections(request.selections);
        self.check_bounds(&request.source, &selections).await?;
        let stem = naming::file_stem(&request.original_filename);
        info!(
            source = %request.source.display(),
            selections = selections.len(),
            "Extracting pages"
        );

        let mut produced: Vec<ExtractedArtifact> = Vec::with_capacity(selections.len());
        for selection in &selections {
            match self.extract_selection(&request.source, selection, &stem).await {
                Ok(artifact) => produced.push(artifact),
                Err(e) => {
                    error!(pages = %selection, error = %e, "Extraction failed, aborting request");
                    remove_all(&paths_of(&produced)).await;
                    return Err(e);
                }
            }
        }

        let parts = produced.len();
        if parts == 1 {
            if let Some(artifact) = produced.pop() {
                info!(output = %artifact.path.display(), name = %artifact.display_name, "Extraction successful");
                return Ok(Download {
                    artifact,
                    kind: ArtifactKind::Pdf,
                    parts,
                });
            }
        }

        let dest = self.dirs.new_output_path("zip");
        let archived = bundle::write_archive(produced.clone(), dest.clone()).await;
        remove_all(&paths_of(&produced)).await;
        if let Err(e) = archived {
            remove_path(&dest).await;
            return Err(e);
        }

        let artifact = ExtractedArtifact {
            path: dest,
            display_name: naming::bundle_file_name(&stem),
        };
        info!(output = %artifact.path.display(), parts, "Bundled extraction");
        Ok(Download {
            artifact,
            kind: ArtifactKind::Zip,
            parts,
        })
    }

    /// Every selection must end inside the document. Ghostscript clamps
    /// `LastPage` silently, so this cannot be left to the tool.
    async fn check_bounds(
        &self,
        source: &Path,
        selections: &[PageSelection],
    ) -> Result<(), ExtractError> {
        let count = self.page_count(source).await;
        if !count.is_exact() {
            return Err(ExtractError::PageCountUnknown(source.to_path_buf()));
        }

        match selections.iter().map(PageSelection::last_page).max() {
            Some(page) if page > count.pages => Err(RangeError::OutOfBounds {
                page,
                total: count.pages,
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn extract_selection(
        &self,
        source: &Path,
        selection: &PageSelection,
        stem: &str,
    ) -> Result<ExtractedArtifact, ExtractError> {
        let dest = self.dirs.new_output_path("pdf");

        let result = match selection.contiguous_range() {
            Some(range) => {
                debug!(pages = %range, "Extracting contiguous range");
                self.tool
                    .extract_range(source, range, &dest)
                    .await
                    .map_err(|e| tool_error(selection, e))
            }
            None => self.extract_scattered(source, selection, &dest).await,
        };

        if let Err(e) = result.and(verify_output(&dest).await) {
            remove_path(&dest).await;
            return Err(e);
        }

        Ok(ExtractedArtifact {
            path: dest,
            display_name: naming::selection_file_name(stem, selection),
        })
    }

    /// One call per page into a scratch directory, then a single concatenation
    async fn extract_scattered(
        &self,
        source: &Path,
        selection: &PageSelection,
        dest: &Path,
    ) -> Result<(), ExtractError> {
        let scratch = self.dirs.new_scratch_dir().await?;
        debug!(pages = %selection, scratch = %scratch.display(), "Extracting pages one by one");

        let result: Result<(), ExtractError> = async {
            let mut parts = Vec::with_capacity(selection.page_count());
            for (index, page) in selection.pages().into_iter().enumerate() {
                let part = scratch.join(format!("page-{}.pdf", index));
                self.tool
                    .extract_range(source, PageRange::single(page)?, &part)
                    .await
                    .map_err(|e| tool_error(selection, e))?;
                verify_output(&part).await?;
                parts.push(part);
            }

            self.tool
                .concatenate(&parts, dest)
                .await
                .map_err(|e| tool_error(selection, e))
        }
        .await;

        remove_path(&scratch).await;
        result
    }
}

fn tool_error(selection: &PageSelection, source: ToolError) -> ExtractError {
    ExtractError::Tool {
        pages: selection.to_string(),
        source,
    }
}

fn paths_of(artifacts: &[ExtractedArtifact]) -> Vec<PathBuf> {
    artifacts.iter().map(|a| a.path.clone()).collect()
}

/// The tool reported success; the file must also be there and non-empty
async fn verify_output(path: &Path) -> Result<(), ExtractError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(ExtractError::MissingOutput(path.to_path_buf())),
    }
}
