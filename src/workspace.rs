use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Upload and output directories for one server instance.
///
/// Both paths are canonical, so a path handed back to a client can be
/// checked for ownership with a plain prefix test.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    uploads: PathBuf,
    outputs: PathBuf,
}

impl WorkDirs {
    pub async fn create(root: &Path) -> io::Result<Self> {
        let uploads = root.join("uploads");
        let outputs = root.join("outputs");

        for dir in [&uploads, &outputs] {
            tokio::fs::create_dir_all(dir).await?;
        }

        let dirs = WorkDirs {
            uploads: tokio::fs::canonicalize(&uploads).await?,
            outputs: tokio::fs::canonicalize(&outputs).await?,
        };
        info!(
            uploads = %dirs.uploads.display(),
            outputs = %dirs.outputs.display(),
            "Work directories ready"
        );
        Ok(dirs)
    }

    #[cfg(test)]
    pub fn uploads(&self) -> &Path {
        &self.uploads
    }

    #[cfg(test)]
    pub fn outputs(&self) -> &Path {
        &self.outputs
    }

    pub fn new_upload_path(&self) -> PathBuf {
        self.uploads.join(unique_name("pdf", Some("pdf")))
    }

    pub fn new_output_path(&self, extension: &str) -> PathBuf {
        self.outputs.join(unique_name("out", Some(extension)))
    }

    /// Create an empty directory for per-page intermediates
    pub async fn new_scratch_dir(&self) -> io::Result<PathBuf> {
        let dir = self.outputs.join(unique_name("temp", None));
        tokio::fs::create_dir(&dir).await?;
        Ok(dir)
    }

    /// Map a client-supplied path to an upload we own.
    ///
    /// Returns `None` for anything outside the uploads directory, including
    /// relative paths and paths with `..` components. Existence is not checked.
    pub fn owned_upload(&self, raw: &str) -> Option<PathBuf> {
        let path = PathBuf::from(raw);
        is_inside(&path, &self.uploads).then_some(path)
    }

    /// Remove entries in both directories last modified more than `max_age` ago
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        let dirs = [self.uploads.clone(), self.outputs.clone()];
        let stale = tokio::task::spawn_blocking(move || {
            let now = SystemTime::now();
            dirs.iter()
                .flat_map(|dir| WalkDir::new(dir).min_depth(1).max_depth(1))
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(error = %e, "Failed to read work directory entry");
                        None
                    }
                })
                .filter(|entry| {
                    entry
                        .metadata()
                        .ok()
                        .and_then(|meta| meta.modified().ok())
                        .and_then(|modified| now.duration_since(modified).ok())
                        .is_some_and(|age| age >= max_age)
                })
                .map(|entry| entry.into_path())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Stale sweep task failed");
            Vec::new()
        });

        let count = stale.len();
        remove_all(&stale).await;
        if count > 0 {
            info!(count, "Removed stale artifacts");
        }
        count
    }

    /// Sweep stale artifacts now and then every `every`
    pub fn spawn_janitor(self: Arc<Self>, every: Duration, max_age: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.sweep_stale(max_age).await;
            }
        });
    }
}

fn is_inside(path: &Path, dir: &Path) -> bool {
    path.is_absolute()
        && !path.components().any(|c| matches!(c, Component::ParentDir))
        && path.starts_with(dir)
        && path != dir
}

/// `<prefix>-<unix millis>-<random>[.<extension>]`
pub fn unique_name(prefix: &str, extension: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = uuid::Uuid::new_v4().simple();

    match extension {
        Some(ext) => format!("{}-{}-{}.{}", prefix, millis, suffix, ext),
        None => format!("{}-{}-{}", prefix, millis, suffix),
    }
}

/// Best-effort removal of a file or directory tree. Failures are logged.
pub async fn remove_path(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => debug!(path = %path.display(), "Removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Already gone")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Cleanup failed"),
    }
}

pub async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        remove_path(path).await;
    }
}

/// Remove `paths` after `delay`, in the background
pub fn schedule_removal(paths: Vec<PathBuf>, delay: Duration) {
    if paths.is_empty() {
        return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(count = paths.len(), "No runtime available, cleanup skipped");
        return;
    };
    debug!(count = paths.len(), ?delay, "Scheduling cleanup");
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        remove_all(&paths).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_differ() {
        let a = unique_name("pdf", Some("pdf"));
        let b = unique_name("pdf", Some("pdf"));
        assert_ne!(a, b);
        assert!(a.starts_with("pdf-"));
        assert!(a.ends_with(".pdf"));
        assert!(!unique_name("temp", None).contains('.'));
    }

    #[tokio::test]
    async fn test_ownership_checks() {
        let root = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::create(root.path()).await.unwrap();

        let upload = dirs.new_upload_path();
        let raw = upload.to_str().unwrap();
        assert_eq!(dirs.owned_upload(raw), Some(upload.clone()));

        assert_eq!(dirs.owned_upload("/etc/passwd"), None);
        assert_eq!(dirs.owned_upload("relative.pdf"), None);
        assert_eq!(dirs.owned_upload(dirs.uploads().to_str().unwrap()), None);

        let escape = format!("{}/../../etc/passwd", dirs.uploads().display());
        assert_eq!(dirs.owned_upload(&escape), None);

        let output = dirs.new_output_path("pdf");
        assert_eq!(dirs.owned_upload(output.to_str().unwrap()), None);
        let scratch = dirs.new_scratch_dir().await.unwrap();
        assert_eq!(dirs.owned_upload(scratch.to_str().unwrap()), None);
    }

    #[tokio::test]
    async fn test_scheduled_removal() {
        let root = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::create(root.path()).await.unwrap();

        let file = dirs.new_output_path("pdf");
        tokio::fs::write(&file, b"data").await.unwrap();
        let scratch = dirs.new_scratch_dir().await.unwrap();
        tokio::fs::write(scratch.join("page-0.pdf"), b"data")
            .await
            .unwrap();
        let missing = dirs.new_output_path("pdf");

        schedule_removal(
            vec![file.clone(), scratch.clone(), missing],
            Duration::from_millis(20),
        );
        assert!(file.exists());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!file.exists());
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_sweep_respects_age() {
        let root = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::create(root.path()).await.unwrap();

        let upload = dirs.new_upload_path();
        tokio::fs::write(&upload, b"data").await.unwrap();
        let scratch = dirs.new_scratch_dir().await.unwrap();

        assert_eq!(dirs.sweep_stale(Duration::from_secs(3600)).await, 0);
        assert!(upload.exists());

        assert_eq!(dirs.sweep_stale(Duration::ZERO).await, 2);
        assert!(!upload.exists());
        assert!(!scratch.exists());
        assert!(dirs.uploads().exists());
    }
}
