use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::PdfTool;
use crate::error::ToolError;
use crate::page_range::PageRange;

/// Executable names probed when no command is configured, in order
pub const DEFAULT_CANDIDATES: &[&str] = &["gs", "gswin64c", "gswin32c"];

static PROCESSING_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Processing pages (\d+) through (\d+)\.").expect("valid banner regex")
});

static PAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Page (\d+)\s*$").expect("valid page regex"));

/// Ghostscript driven through argument vectors, never a shell.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    command: String,
    version: Option<String>,
    timeout: Duration,
}

impl Ghostscript {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Ghostscript {
            command: command.into(),
            version: None,
            timeout,
        }
    }

    /// Resolve the executable once.
    ///
    /// A configured command is the only candidate; otherwise the platform
    /// names are probed with `--version`. When nothing answers, the first
    /// candidate is kept so page counting can still fall back gracefully.
    pub async fn detect(configured: Option<&str>, timeout: Duration) -> Self {
        let candidates: Vec<String> = match configured {
            Some(command) => vec![command.to_string()],
            None => DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        };

        for candidate in &candidates {
            match run_command(candidate, &[OsString::from("--version")], timeout).await {
                Ok(stdout) => {
                    let version = stdout.trim().to_string();
                    info!(command = %candidate, %version, "Using Ghostscript");
                    let mut gs = Ghostscript::new(candidate.clone(), timeout);
                    gs.version = Some(version);
                    return gs;
                }
                Err(e) => debug!(command = %candidate, error = %e, "Ghostscript candidate unavailable"),
            }
        }

        error!(
            tried = %candidates.join(", "),
            "Ghostscript not found. Install it from https://ghostscript.com/releases/gsdnld.html and add it to PATH"
        );
        let fallback = candidates
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_CANDIDATES[0].to_string());
        Ghostscript::new(fallback, timeout)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    async fn run(&self, args: Vec<OsString>) -> Result<String, ToolError> {
        run_command(&self.command, &args, self.timeout).await
    }
}

#[async_trait]
impl PdfTool for Ghostscript {
    fn name(&self) -> &str {
        &self.command
    }

    async fn query_page_count(&self, source: &Path) -> Result<u32, ToolError> {
        let mut permit = OsString::from("--permit-file-read=");
        permit.push(source.as_os_str());

        let program = format!(
            "({}) (r) file runpdfbegin pdfpagecount = quit",
            escape_postscript_string(&source.to_string_lossy())
        );

        let args = vec![
            OsString::from("-q"),
            OsString::from("-dNODISPLAY"),
            OsString::from("-dNOPAUSE"),
            OsString::from("-dBATCH"),
            permit,
            OsString::from("-c"),
            OsString::from(program),
        ];

        let stdout = self.run(args).await?;
        parse_page_count(&stdout).ok_or_else(|| ToolError::UnexpectedOutput {
            program: self.command.clone(),
            output: stdout.trim().to_string(),
        })
    }

    async fn render_page_count(&self, source: &Path) -> Result<u32, ToolError> {
        let args = vec![
            OsString::from("-dNOPAUSE"),
            OsString::from("-dBATCH"),
            OsString::from("-dSAFER"),
            OsString::from("-sDEVICE=nullpage"),
            source.as_os_str().to_os_string(),
        ];

        let stdout = self.run(args).await?;
        parse_render_output(&stdout).ok_or_else(|| ToolError::UnexpectedOutput {
            program: self.command.clone(),
            output: stdout.lines().take(5).collect::<Vec<_>>().join(" | "),
        })
    }

    async fn extract_range(
        &self,
        source: &Path,
        range: PageRange,
        dest: &Path,
    ) -> Result<(), ToolError> {
        let args = pdfwrite_args(dest, Some(range), &[source]);
        self.run(args).await.map(|_| ())
    }

    async fn concatenate(&self, inputs: &[PathBuf], dest: &Path) -> Result<(), ToolError> {
        let inputs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
        let args = pdfwrite_args(dest, None, &inputs);
        self.run(args).await.map(|_| ())
    }
}

/// `pdfwrite` arguments, optionally limited to `bounds`, reading `inputs` in order
fn pdfwrite_args(dest: &Path, bounds: Option<PageRange>, inputs: &[&Path]) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-sDEVICE=pdfwrite", "-dNOPAUSE", "-dBATCH", "-dSAFER", "-q"]
        .into_iter()
        .map(OsString::from)
        .collect();

    if let Some(range) = bounds {
        args.push(OsString::from(format!("-dFirstPage={}", range.from())));
        args.push(OsString::from(format!("-dLastPage={}", range.to())));
    }

    let mut output = OsString::from("-sOutputFile=");
    output.push(escape_output_path(dest));
    args.push(output);

    args.extend(inputs.iter().map(|p| p.as_os_str().to_os_string()));
    args
}

/// Run a program with a hard deadline and return its stdout.
///
/// A non-zero exit status is an error carrying the trimmed stderr. The child
/// is killed if the deadline passes.
pub(crate) async fn run_command(
    program: &str,
    args: &[OsString],
    timeout: Duration,
) -> Result<String, ToolError> {
    debug!(program, ?args, "Running external command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(ToolError::Timeout {
                program: program.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    if !stderr.trim().is_empty() {
        debug!(program, stderr = %stderr.trim(), "External command wrote to stderr");
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Escape text for use inside a PostScript `( ... )` string literal
fn escape_postscript_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '(' | ')') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `-sOutputFile` treats `%` as a format directive
fn escape_output_path(path: &Path) -> OsString {
    match path.to_str() {
        Some(s) => OsString::from(s.replace('%', "%%")),
        None => path.as_os_str().to_os_string(),
    }
}

/// The page-count program prints a single integer
fn parse_page_count(stdout: &str) -> Option<u32> {
    let count = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())?
        .parse::<u32>()
        .ok()?;
    (count > 0).then_some(count)
}

/// Read the page count from a non-quiet `nullpage` run
fn parse_render_output(stdout: &str) -> Option<u32> {
    if let Some(caps) = PROCESSING_BANNER.captures(stdout) {
        let first: u32 = caps[1].parse().ok()?;
        let last: u32 = caps[2].parse().ok()?;
        if last >= first && first >= 1 {
            return Some(last - first + 1);
        }
    }

    PAGE_LINE
        .captures_iter(stdout)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postscript_escaping() {
        assert_eq!(escape_postscript_string("/tmp/a.pdf"), "/tmp/a.pdf");
        assert_eq!(
            escape_postscript_string(r"C:\up\report (1).pdf"),
            r"C:\\up\\report \(1\).pdf"
        );
    }

    #[test]
    fn test_output_path_percent_escaped() {
        assert_eq!(
            escape_output_path(Path::new("/tmp/100%/out.pdf")),
            OsString::from("/tmp/100%%/out.pdf")
        );
    }

    #[test]
    fn test_parse_page_count() {
        assert_eq!(parse_page_count("12\n"), Some(12));
        assert_eq!(parse_page_count("GPL Ghostscript banner\n  7  \n\n"), Some(7));
        assert_eq!(parse_page_count("0\n"), None);
        assert_eq!(parse_page_count("Error: /undefined\n"), None);
        assert_eq!(parse_page_count(""), None);
    }

    #[test]
    fn test_parse_render_banner() {
        let stdout = "GPL Ghostscript 10.02.1\nProcessing pages 1 through 14.\nPage 1\nPage 2\n";
        assert_eq!(parse_render_output(stdout), Some(14));
    }

    #[test]
    fn test_parse_render_page_lines() {
        let stdout = "Page 1\nPage 2\nPage 3\n";
        assert_eq!(parse_render_output(stdout), Some(3));
        assert_eq!(parse_render_output("nothing useful"), None);
    }

    #[test]
    fn test_pdfwrite_args_order() {
        let range = PageRange::new(2, 5).unwrap();
        let args = pdfwrite_args(
            Path::new("/work/out.pdf"),
            Some(range),
            &[Path::new("/work/in.pdf")],
        );
        assert_eq!(
            args,
            [
                "-sDEVICE=pdfwrite",
                "-dNOPAUSE",
                "-dBATCH",
                "-dSAFER",
                "-q",
                "-dFirstPage=2",
                "-dLastPage=5",
                "-sOutputFile=/work/out.pdf",
                "/work/in.pdf",
            ]
            .map(OsString::from)
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command(
            "snackpdf-no-such-ghostscript",
            &[OsString::from("--version")],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_detect_keeps_configured_command_when_missing() {
        let gs = Ghostscript::detect(
            Some("snackpdf-no-such-ghostscript"),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(gs.command(), "snackpdf-no-such-ghostscript");
        assert_eq!(gs.version(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invocation_arguments() {
        use crate::pdf::testing::FakeGhostscript;

        let fake = FakeGhostscript::install(4).unwrap();
        let gs = fake.tool();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let first = dir.path().join("page-0.pdf");
        let second = dir.path().join("page-1.pdf");
        let extracted = dir.path().join("extracted.pdf");
        let merged = dir.path().join("merged.pdf");

        assert_eq!(gs.query_page_count(&source).await.unwrap(), 4);
        gs.extract_range(&source, PageRange::new(3, 4).unwrap(), &extracted)
            .await
            .unwrap();
        gs.concatenate(&[second.clone(), first.clone()], &merged)
            .await
            .unwrap();
        assert!(std::fs::metadata(&extracted).unwrap().len() > 0);
        assert!(std::fs::metadata(&merged).unwrap().len() > 0);

        let path = |p: &Path| p.display().to_string();
        let pdfwrite = ["-sDEVICE=pdfwrite", "-dNOPAUSE", "-dBATCH", "-dSAFER", "-q"];
        let mut expected_extract: Vec<String> = pdfwrite.iter().map(|a| a.to_string()).collect();
        expected_extract.extend([
            "-dFirstPage=3".to_string(),
            "-dLastPage=4".to_string(),
            format!("-sOutputFile={}", path(&extracted)),
            path(&source),
        ]);
        let mut expected_concat: Vec<String> = pdfwrite.iter().map(|a| a.to_string()).collect();
        expected_concat.extend([
            format!("-sOutputFile={}", path(&merged)),
            path(&second),
            path(&first),
        ]);

        let runs = fake.invocations().unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs[0].contains(&format!("--permit-file-read={}", path(&source))));
        assert_eq!(runs[1], expected_extract);
        assert_eq!(runs[2], expected_concat);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let err = run_command("false", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_program_times_out() {
        let err = run_command("sleep", &[OsString::from("5")], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
