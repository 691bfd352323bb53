use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ExtractedArtifact;
use crate::error::ExtractError;

/// Write `entries` into a ZIP at `dest`, each under its display name.
///
/// Member order follows `entries`.
pub async fn write_archive(entries: Vec<ExtractedArtifact>, dest: PathBuf) -> Result<(), ExtractError> {
    tokio::task::spawn_blocking(move || write_archive_blocking(&entries, &dest))
        .await
        .map_err(io::Error::other)?
}

fn write_archive_blocking(entries: &[ExtractedArtifact], dest: &Path) -> Result<(), ExtractError> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        zip.start_file(entry.display_name.as_str(), options)?;
        let mut source = File::open(&entry.path)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?.flush()?;
    Ok(())
}
