use std::path::Path;
use tokio::fs;

use crate::error::{Error, Result};

pub struct FileReader;

impl FileReader {
    /// Read a plain-text or markdown document
    pub async fn read_file(path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        if !Self::is_supported(extension) {
            return Err(Error::UsagePrecondition(format!(
                "Unsupported file format: {:?} (only .txt and .md are accepted)",
                extension
            )));
        }

        let content = fs::read_to_string(path).await?;
        Ok(content)
    }

    pub fn is_supported(extension: &str) -> bool {
        matches!(extension, "txt" | "md")
    }

    /// File name component used as the document's display name
    pub fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let err = FileReader::read_file(Path::new("report.pdf")).await.unwrap_err();
        assert!(matches!(err, Error::UsagePrecondition(_)));
    }

    #[tokio::test]
    async fn test_reads_markdown() {
        let path = std::env::temp_dir().join(format!("ingest-reader-{}.md", uuid::Uuid::new_v4()));
        fs::write(&path, "# Title\n\nBody").await.unwrap();

        let content = FileReader::read_file(&path).await.unwrap();
        assert_eq!(content, "# Title\n\nBody");
        assert!(FileReader::display_name(&path).ends_with(".md"));

        fs::remove_file(&path).await.unwrap();
    }
}
