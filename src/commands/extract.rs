use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::default_work_dir;
use crate::extract::{ArtifactKind, ExtractionRequest, Extractor};
use crate::page_range::parse_page_ranges;
use crate::pdf::Ghostscript;
use crate::workspace::{remove_path, WorkDirs};

pub struct ExtractOptions<'a> {
    pub input: &'a Path,
    pub pages: &'a str,
    pub output: &'a Path,
    pub work_dir: Option<PathBuf>,
    pub gs_command: Option<&'a str>,
    pub timeout: Duration,
}

/// A ZIP result is written next to `output` with a `.zip` extension
fn final_output(output: &Path, kind: ArtifactKind) -> PathBuf {
    match kind {
        ArtifactKind::Pdf => output.to_path_buf(),
        ArtifactKind::Zip => output.with_extension("zip"),
    }
}

pub async fn run(options: ExtractOptions<'_>) -> Result<()> {
    let input = tokio::fs::canonicalize(options.input)
        .await
        .with_context(|| format!("Failed to open PDF: {}", options.input.display()))?;

    let gs = Ghostscript::detect(options.gs_command, options.timeout).await;
    let work_dir = options.work_dir.unwrap_or_else(default_work_dir);
    let dirs = WorkDirs::create(&work_dir)
        .await
        .with_context(|| format!("Failed to prepare work directory {}", work_dir.display()))?;
    let extractor = Extractor::new(Arc::new(gs), dirs);

    let count = extractor.page_count(&input).await;
    if !count.is_exact() {
        anyhow::bail!(
            "Could not determine the page count of {} (is Ghostscript installed?)",
            input.display()
        );
    }

    let ranges = parse_page_ranges(options.pages, count.pages)?;
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let request = ExtractionRequest::from_ranges(input.clone(), &ranges, file_name)?;

    let download = extractor.extract(request).await?;
    let output = final_output(options.output, download.kind);

    let copied = tokio::fs::copy(&download.artifact.path, &output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()));
    remove_path(&download.artifact.path).await;
    copied?;

    match download.kind {
        ArtifactKind::Pdf => println!("Extracted pages {} to {}", options.pages, output.display()),
        ArtifactKind::Zip => println!(
            "Extracted {} files ({}) into {}",
            download.parts,
            options.pages,
            output.display()
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_output_extension() {
        let out = Path::new("/tmp/result.pdf");
        assert_eq!(final_output(out, ArtifactKind::Pdf), out);
        assert_eq!(
            final_output(out, ArtifactKind::Zip),
            Path::new("/tmp/result.zip")
        );
        assert_eq!(
            final_output(Path::new("result"), ArtifactKind::Zip),
            Path::new("result.zip")
        );
    }
}
