use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pdf::page_count::discover_page_count;
use crate::pdf::Ghostscript;

pub async fn run(path: &Path, gs_command: Option<&str>, timeout: Duration) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to open PDF: {}", path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("Not a file: {}", path.display());
    }

    let gs = Ghostscript::detect(gs_command, timeout).await;
    let count = discover_page_count(&gs, path).await;

    println!(
        "{}: {} page(s) ({})",
        path.display(),
        count.pages,
        count.source
    );

    Ok(())
}
