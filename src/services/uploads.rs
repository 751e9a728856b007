use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Scratch directory holding the files of one evaluation request. The
/// directory is removed by [`UploadBatch::cleanup`], or on drop if the
/// request bailed out early.
#[derive(Debug)]
pub(crate) struct UploadBatch {
    dir: PathBuf,
    removed: bool,
}

impl UploadBatch {
    pub(crate) async fn create(upload_dir: &Path) -> io::Result<Self> {
        let dir = upload_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, removed: false })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` as `<field>_<sanitized filename>` and returns the path.
    pub(crate) async fn store(&self, field: &str, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("{field}_{}", sanitized_filename(filename)));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub(crate) async fn cleanup(mut self) {
        self.removed = true;
        if let Err(err) = tokio::fs::remove_dir_all(&self.dir).await {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    error = %err,
                    dir = %self.dir.display(),
                    "Failed to remove upload directory"
                );
            }
        }
    }
}

impl Drop for UploadBatch {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    error = %err,
                    dir = %self.dir.display(),
                    "Failed to remove upload directory"
                );
            }
        }
    }
}

/// Safe on-disk name for a client filename. The stem falls back to `upload`
/// when nothing usable survives, the extension is always kept.
pub(crate) fn sanitized_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let (stem, extension) = base.rsplit_once('.').unwrap_or((base, ""));

    let stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();
    let stem = match stem.trim_start_matches('.') {
        "" => "upload",
        stem => stem,
    };
    let extension: String = extension.chars().filter(char::is_ascii_alphanumeric).collect();

    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

/// Lowercased extension of a client-supplied filename, without the dot.
pub(crate) fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("scriptmark-uploads-{}", Uuid::new_v4()))
    }

    #[test]
    fn sanitized_filename_strips_paths_and_symbols() {
        assert_eq!(sanitized_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitized_filename("C:\\scans\\page 1.png"), "page1.png");
        assert_eq!(sanitized_filename("ключ.txt"), "upload.txt");
        assert_eq!(sanitized_filename("скан.PNG"), "upload.PNG");
        assert_eq!(sanitized_filename("v1.2 final.json"), "v1.2final.json");
        assert_eq!(sanitized_filename("..."), "upload");
        assert_eq!(sanitized_filename(""), "upload");
    }

    #[test]
    fn file_extension_is_lowercased() {
        assert_eq!(file_extension("Scan.PNG").as_deref(), Some("png"));
        assert_eq!(file_extension("scheme.json").as_deref(), Some("json"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension("archive."), None);
    }

    #[tokio::test]
    async fn store_and_cleanup_remove_directory() {
        let root = scratch_root();
        let batch = UploadBatch::create(&root).await.expect("batch");
        let dir = batch.dir().to_path_buf();

        let path = batch.store("teacher_key", "key.txt", b"answers").await.expect("store");

        assert_eq!(path, dir.join("teacher_key_key.txt"));
        assert_eq!(tokio::fs::read(&path).await.expect("read"), b"answers");

        batch.cleanup().await;
        assert!(!dir.exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let root = scratch_root();
        let dir = {
            let batch = UploadBatch::create(&root).await.expect("batch");
            batch.store("student_script", "page.png", &[1, 2]).await.expect("store");
            batch.dir().to_path_buf()
        };

        assert!(!dir.exists());
        let _ = std::fs::remove_dir_all(root);
    }
}
