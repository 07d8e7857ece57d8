//! HTML archive on the filesystem.
//!
//! Layout:
//! - `{root}/Temporary/{name}`: uploaded, not yet indexed
//! - `{root}/{domain}/{name}`: indexed, served under `/archive`

use crate::error::ServiceError;
use crate::search::Document;

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const TEMPORARY_DIR: &str = "Temporary";
const ALLOWED_EXTENSIONS: &[&str] = &["html", "htm"];

/// Filesystem archive of uploaded HTML documents
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the archive and upload directories
    pub async fn init(&self) -> Result<(), ServiceError> {
        fs::create_dir_all(self.root.join(TEMPORARY_DIR)).await?;
        Ok(())
    }

    /// Store an uploaded file under `Temporary/`
    pub async fn store_upload(&self, name: &str, content: &[u8]) -> Result<PathBuf, ServiceError> {
        let name = sanitize_file_name(name)?;
        let dir = self.root.join(TEMPORARY_DIR);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&name);
        let temp_path = dir.join(format!(".{}.part", name));
        if let Err(e) = write_atomic(&temp_path, &path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::info!(file = %name, bytes = content.len(), "Stored upload");
        Ok(path)
    }

    /// Build the document for an uploaded file. The file stays in
    /// `Temporary/` until [`Archive::promote`].
    pub async fn prepare(&self, name: &str, domain: &str) -> Result<Document, ServiceError> {
        let name = sanitize_file_name(name)?;
        let domain = sanitize_domain(domain)?;

        let source = self.root.join(TEMPORARY_DIR).join(&name);
        let content = match fs::read(&source).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::NotFound(format!(
                    "No uploaded file named '{}'",
                    name
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Document {
            id: Uuid::new_v4().simple().to_string(),
            path: format!("{}/{}", domain, name),
            name,
            domain,
            content,
        })
    }

    /// Move a prepared document's file into its domain directory
    pub async fn promote(&self, document: &Document) -> Result<PathBuf, ServiceError> {
        let source = self.root.join(TEMPORARY_DIR).join(&document.name);
        let dir = self.root.join(&document.domain);
        fs::create_dir_all(&dir).await?;

        let target = dir.join(&document.name);
        fs::rename(&source, &target).await?;

        Ok(target)
    }
}

async fn write_atomic(temp_path: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    fs::rename(temp_path, path).await
}

/// Reduce a client-supplied name to a bare HTML file name
fn sanitize_file_name(name: &str) -> Result<String, ServiceError> {
    let base = Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.'))
        .ok_or_else(|| ServiceError::Validation("Invalid file name".into()))?;

    let extension = Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(base.to_string()),
        _ => Err(ServiceError::Validation(
            "Only .html and .htm files are accepted".into(),
        )),
    }
}

fn sanitize_domain(domain: &str) -> Result<String, ServiceError> {
    let domain = domain.trim();
    let valid = !domain.is_empty()
        && domain != TEMPORARY_DIR
        && !domain.starts_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid {
        Ok(domain.to_string())
    } else {
        Err(ServiceError::Validation(format!("Invalid domain '{}'", domain)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_promote() {
        let temp_dir = TempDir::new().unwrap();
        let archive = Archive::new(temp_dir.path());
        archive.init().await.unwrap();

        let stored = archive
            .store_upload("page.html", b"<html><body>hello</body></html>")
            .await
            .unwrap();
        assert_eq!(stored, temp_dir.path().join("Temporary").join("page.html"));

        let document = archive.prepare("page.html", "example.com").await.unwrap();
        assert_eq!(document.name, "page.html");
        assert_eq!(document.domain, "example.com");
        assert_eq!(document.path, "example.com/page.html");
        assert!(document.content.contains("hello"));
        assert!(stored.exists());

        let promoted = archive.promote(&document).await.unwrap();
        assert_eq!(promoted, temp_dir.path().join("example.com/page.html"));
        assert!(promoted.exists());
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn test_promote_missing_upload() {
        let temp_dir = TempDir::new().unwrap();
        let archive = Archive::new(temp_dir.path());
        archive.init().await.unwrap();

        assert!(matches!(
            archive.prepare("missing.html", "example.com").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_is_contained() {
        let temp_dir = TempDir::new().unwrap();
        let archive = Archive::new(temp_dir.path());

        let stored = archive
            .store_upload("../../etc/evil.html", b"x")
            .await
            .unwrap();
        assert_eq!(stored, temp_dir.path().join("Temporary").join("evil.html"));

        assert!(matches!(
            archive.prepare("evil.html", "../outside").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let archive = Archive::new(temp_dir.path());
        archive.init().await.unwrap();

        // A non-empty directory at the final name makes the rename fail
        let blocker = temp_dir.path().join("Temporary").join("page.html");
        fs::create_dir_all(blocker.join("child")).await.unwrap();

        assert!(archive.store_upload("page.html", b"x").await.is_err());
        assert!(!temp_dir
            .path()
            .join("Temporary")
            .join(".page.html.part")
            .exists());
    }

    #[test]
    fn test_file_name_rules() {
        assert_eq!(sanitize_file_name("Index.HTM").unwrap(), "Index.HTM");
        assert!(sanitize_file_name("notes.txt").is_err());
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name(".hidden.html").is_err());
    }

    #[test]
    fn test_domain_rules() {
        assert!(sanitize_domain("docs.rs").is_ok());
        assert!(sanitize_domain("").is_err());
        assert!(sanitize_domain("Temporary").is_err());
        assert!(sanitize_domain("a/b").is_err());
        assert!(sanitize_domain("..").is_err());
    }
}
