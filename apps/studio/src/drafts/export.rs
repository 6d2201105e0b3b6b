use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use tracing::info;

use crate::models::draft::{DocumentKind, Version, VersionId};

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename="?([^";\n]+)"?"#).expect("valid filename regex"));

/// A rendered document as returned by `api/document-version/{id}/pdf/`.
#[derive(Debug, Clone)]
pub struct ExportedArtifact {
    pub version_id: VersionId,
    pub kind: DocumentKind,
    pub filename: String,
    pub bytes: Bytes,
}

impl ExportedArtifact {
    pub fn new(version: &Version, content_disposition: Option<&str>, bytes: Bytes) -> Self {
        Self {
            version_id: version.id,
            kind: version.kind(),
            filename: resolve_filename(content_disposition, version),
            bytes,
        }
    }

    pub async fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.filename.replace(['/', '\\'], "_"));
        tokio::fs::write(&path, &self.bytes).await?;
        info!(
            "Wrote {} ({} bytes) to {}",
            self.kind.display_name(),
            self.bytes.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Server-provided filename when present, otherwise `<label or kind>.pdf`.
pub fn resolve_filename(content_disposition: Option<&str>, version: &Version) -> String {
    content_disposition
        .and_then(|header| FILENAME_RE.captures(header))
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            let stem = if version.label.is_empty() {
                version.kind().display_name()
            } else {
                version.label.as_str()
            };
            format!("{stem}.pdf")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::version_json;

    fn version(label: &str) -> Version {
        serde_json::from_value(version_json(7, 3, "cover_letter", "Dear team", label)).unwrap()
    }

    #[test]
    fn test_filename_from_header() {
        let v = version("");
        assert_eq!(
            resolve_filename(Some(r#"attachment; filename="Jane Doe.pdf""#), &v),
            "Jane Doe.pdf"
        );
        assert_eq!(
            resolve_filename(Some("attachment; FILENAME=resume_v2.pdf"), &v),
            "resume_v2.pdf"
        );
    }

    #[test]
    fn test_filename_fallbacks() {
        assert_eq!(resolve_filename(None, &version("")), "Cover Letter.pdf");
        assert_eq!(
            resolve_filename(Some("inline"), &version("Manager Position")),
            "Manager Position.pdf"
        );
    }

    #[tokio::test]
    async fn test_write_to_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ExportedArtifact::new(
            &version("a/b"),
            None,
            Bytes::from_static(b"%PDF-1.7"),
        );
        let path = artifact.write_to(&dir.path().join("out")).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "a_b.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }
}
