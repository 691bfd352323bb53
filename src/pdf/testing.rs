//! In-process stand-ins for Ghostscript.
//!
//! Fixture PDFs carry a `SnackMark` integer on every page so tests can check
//! exactly which source pages ended up in an output file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use lopdf::{dictionary, Document, Object};

use super::PdfTool;
use crate::error::ToolError;
use crate::page_range::PageRange;

/// Write a PDF with one page per mark, in order
pub fn write_marked_pdf(path: &Path, marks: &[u32]) -> Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(marks.len());
    for &mark in marks {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "SnackMark" => Object::Integer(mark as i64),
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path)?;
    Ok(())
}

/// Read back the marks of every page, in page order
pub fn read_marks(path: &Path) -> Result<Vec<u32>> {
    let doc = Document::load(path)?;
    doc.get_pages()
        .values()
        .map(|&id| -> Result<u32> {
            let page = doc.get_dictionary(id)?;
            Ok(page.get(b"SnackMark")?.as_i64()? as u32)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Query,
    Render,
    Extract(u32, u32),
    Concatenate(usize),
}

/// A `PdfTool` backed by lopdf, with failure injection
#[derive(Default)]
pub struct LopdfTool {
    calls: Mutex<Vec<ToolCall>>,
    /// Any extraction touching this page fails
    pub fail_on_page: Option<u32>,
    /// Report success without writing the output file
    pub skip_output: bool,
}

impl LopdfTool {
    pub fn failing_on(page: u32) -> Self {
        LopdfTool {
            fail_on_page: Some(page),
            ..Default::default()
        }
    }

    pub fn without_output() -> Self {
        LopdfTool {
            skip_output: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ToolCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn marks(&self, path: &Path) -> Result<Vec<u32>, ToolError> {
        read_marks(path).map_err(failed)
    }

    fn write(&self, dest: &Path, marks: &[u32]) -> Result<(), ToolError> {
        if self.skip_output {
            return Ok(());
        }
        write_marked_pdf(dest, marks).map_err(failed)
    }
}

fn failed(err: anyhow::Error) -> ToolError {
    ToolError::Failed {
        program: "lopdf".to_string(),
        status: "exit status: 1".to_string(),
        stderr: err.to_string(),
    }
}

#[async_trait]
impl PdfTool for LopdfTool {
    fn name(&self) -> &str {
        "lopdf"
    }

    async fn query_page_count(&self, source: &Path) -> Result<u32, ToolError> {
        self.record(ToolCall::Query);
        Ok(self.marks(source)?.len() as u32)
    }

    async fn render_page_count(&self, source: &Path) -> Result<u32, ToolError> {
        self.record(ToolCall::Render);
        Ok(self.marks(source)?.len() as u32)
    }

    async fn extract_range(
        &self,
        source: &Path,
        range: PageRange,
        dest: &Path,
    ) -> Result<(), ToolError> {
        self.record(ToolCall::Extract(range.from(), range.to()));

        if let Some(page) = self.fail_on_page {
            if range.pages().contains(&page) {
                return Err(failed(anyhow::anyhow!("injected failure on page {}", page)));
            }
        }

        let marks = self.marks(source)?;
        let total = marks.len() as u32;
        if range.to() > total {
            return Err(failed(anyhow::anyhow!(
                "page {} is out of range (1-{})",
                range.to(),
                total
            )));
        }

        let start = range.from() as usize - 1;
        let end = range.to() as usize;
        self.write(dest, &marks[start..end])
    }

    async fn concatenate(&self, inputs: &[PathBuf], dest: &Path) -> Result<(), ToolError> {
        self.record(ToolCall::Concatenate(inputs.len()));

        let mut marks = Vec::new();
        for input in inputs {
            marks.extend(self.marks(input)?);
        }
        self.write(dest, &marks)
    }
}

/// Only answers page-count questions, with fixed results
pub struct ScriptedCounts {
    pub query: Option<u32>,
    pub render: Option<u32>,
}

fn unavailable() -> ToolError {
    ToolError::Spawn {
        program: "scripted".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
    }
}

#[async_trait]
impl PdfTool for ScriptedCounts {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query_page_count(&self, _source: &Path) -> Result<u32, ToolError> {
        self.query.ok_or_else(unavailable)
    }

    async fn render_page_count(&self, _source: &Path) -> Result<u32, ToolError> {
        self.render.ok_or_else(unavailable)
    }

    async fn extract_range(&self, _: &Path, _: PageRange, _: &Path) -> Result<(), ToolError> {
        Err(unavailable())
    }

    async fn concatenate(&self, _: &[PathBuf], _: &Path) -> Result<(), ToolError> {
        Err(unavailable())
    }
}

/// A shell script standing in for the `gs` executable.
///
/// It records every argument vector, answers the page-count query with a
/// fixed number and writes a stub file to any `-sOutputFile`.
#[cfg(unix)]
pub struct FakeGhostscript {
    dir: tempfile::TempDir,
}

#[cfg(unix)]
impl FakeGhostscript {
    const LOG: &'static str = "invocations.log";
    const END: &'static str = "--end--";

    pub fn install(pages: u32) -> Result<Self> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("gs");
        std::fs::write(
            &script,
            format!(
                r#"#!/bin/sh
log="$(dirname "$0")/{log}"
for arg in "$@"; do printf '%s\n' "$arg" >> "$log"; done
printf '%s\n' '{end}' >> "$log"
for arg in "$@"; do
  case "$arg" in
    -dNODISPLAY) echo {pages} ;;
    -sOutputFile=*) printf '%%PDF-1.4 stub\n' > "${{arg#-sOutputFile=}}" ;;
  esac
done
"#,
                log = Self::LOG,
                end = Self::END,
            ),
        )?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        // a concurrent fork may still hold the write handle (ETXTBSY)
        for _ in 0..100 {
            match std::process::Command::new(&script).output() {
                Err(e) if e.raw_os_error() == Some(26) => {
                    std::thread::sleep(std::time::Duration::from_millis(10))
                }
                _ => break,
            }
        }
        let _ = std::fs::remove_file(dir.path().join(Self::LOG));

        Ok(FakeGhostscript { dir })
    }

    pub fn command(&self) -> String {
        self.dir.path().join("gs").display().to_string()
    }

    pub fn tool(&self) -> super::Ghostscript {
        super::Ghostscript::new(self.command(), std::time::Duration::from_secs(10))
    }

    /// Argument vectors of every run so far, oldest first
    pub fn invocations(&self) -> Result<Vec<Vec<String>>> {
        let log = match std::fs::read_to_string(self.dir.path().join(Self::LOG)) {
            Ok(log) => log,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        let mut current = Vec::new();
        for line in log.lines() {
            if line == Self::END {
                runs.push(std::mem::take(&mut current));
            } else {
                current.push(line.to_string());
            }
        }
        Ok(runs)
    }
}

#[test]
fn test_marked_fixture_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fixture.pdf");
    write_marked_pdf(&path, &[3, 1, 2])?;
    if read_marks(&path)? != vec![3, 1, 2] {
        bail!("marks were not preserved");
    }
    Ok(())
}
