//! Documents and document loading
//!
//! A [`Document`] is the plain-text (Markdown) view of a source file. Plain
//! text formats are read directly; everything else goes through the docling
//! bridge subprocess.

mod converter;

pub use converter::{Converter, DoclingConverter, TextConverter, converter_for, is_text_format};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ConverterConfig;

/// Characters kept in [`Document::preview`]
pub const PREVIEW_CHARS: usize = 500;

/// Errors from loading a document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source metadata reported by the converter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub source_path: String,
    pub source_format: String,
    pub file_size_bytes: u64,
    pub page_count: Option<u32>,
    pub word_count: usize,
    pub converted_at: Option<String>,
}

impl Metadata {
    /// Human-readable file size
    pub fn file_size_human(&self) -> String {
        let bytes = self.file_size_bytes;
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }
}

/// A loaded document
#[derive(Debug, Clone)]
pub struct Document {
    /// Markdown/plain text content
    pub content: String,

    /// Display title; may be empty
    pub title: String,

    pub word_count: usize,

    /// First [`PREVIEW_CHARS`] characters, with an ellipsis when truncated
    pub preview: String,

    pub metadata: Metadata,
}

impl Document {
    /// Build a document from already-converted text
    pub fn from_text(content: impl Into<String>, title: impl Into<String>) -> Self {
        let content = content.into();
        let title = title.into();
        debug!(content_len = content.len(), %title, "Document::from_text: called");
        let word_count = content.split_whitespace().count();
        Self {
            preview: make_preview(&content),
            metadata: Metadata {
                title: title.clone(),
                word_count,
                ..Default::default()
            },
            word_count,
            title,
            content,
        }
    }

    /// True when there is nothing but whitespace to process
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Truncate to [`PREVIEW_CHARS`] characters
pub fn make_preview(content: &str) -> String {
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    let truncated = content.chars().nth(PREVIEW_CHARS).is_some();
    preview = preview.trim().to_string();
    if truncated {
        preview.push_str("...");
    }
    preview
}

/// Load a document from disk with the converter suited to its extension
pub async fn load(path: &Path, config: &ConverterConfig) -> Result<Document, DocumentError> {
    debug!(?path, "load: called");
    if !path.exists() {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }

    let converter = converter_for(path, config)?;
    let doc = converter.convert(path).await?;
    info!(
        "Loaded {} ({} words) via {}",
        path.display(),
        doc.word_count,
        converter.name()
    );
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_counts_words() {
        let doc = Document::from_text("one two  three\nfour", "T");
        assert_eq!(doc.word_count, 4);
        assert_eq!(doc.metadata.word_count, 4);
        assert_eq!(doc.preview, "one two  three\nfour");
        assert!(!doc.is_blank());
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        let long = "é".repeat(PREVIEW_CHARS + 10);
        let preview = make_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_blank_document() {
        assert!(Document::from_text("  \n\n ", "").is_blank());
    }

    #[test]
    fn test_file_size_human() {
        let mut meta = Metadata::default();
        meta.file_size_bytes = 512;
        assert_eq!(meta.file_size_human(), "512 B");
        meta.file_size_bytes = 2048;
        assert_eq!(meta.file_size_human(), "2.0 KB");
        meta.file_size_bytes = 3 * 1024 * 1024;
        assert_eq!(meta.file_size_human(), "3.0 MB");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/report.md"), &ConverterConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_load_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Quarterly Notes\n\nRevenue grew.").unwrap();

        let doc = load(&path, &ConverterConfig::default()).await.unwrap();
        assert_eq!(doc.title, "Quarterly Notes");
        assert_eq!(doc.metadata.source_format, "md");
        assert!(doc.content.contains("Revenue grew."));
    }
}
