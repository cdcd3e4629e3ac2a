//! PDF discovery and per-page text extraction
//!
//! Pages are read with lopdf so each one keeps its page number. Files lopdf
//! cannot parse fall back to pdf-extract, which yields the whole document as
//! a single page.

use crate::error::{QaError, Result};
use crate::utils::is_pdf;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A source document discovered during ingestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Path to the PDF file
    pub path: PathBuf,
    /// Number of pages found in the file
    pub page_count: usize,
}

impl Document {
    /// File name used as the document identifier in chunks and citations
    pub fn name(&self) -> String {
        document_name(&self.path)
    }
}

/// Raw text of a single page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageText {
    /// Source document name
    pub source: String,
    /// 1-based page number
    pub page: u32,
    pub text: String,
}

/// Everything read from a documents folder
#[derive(Debug, Clone, Default)]
pub struct Ingestion {
    pub documents: Vec<Document>,
    pub pages: Vec<PageText>,
    /// Files that could not be read, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

pub(crate) fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// PDF reader
pub struct PdfProcessor;

impl PdfProcessor {
    /// List the PDF files directly inside `folder`, sorted by path
    pub fn discover<P: AsRef<Path>>(folder: P) -> Result<Vec<PathBuf>> {
        let folder = folder.as_ref();

        if !folder.is_dir() {
            return Err(QaError::NoDocumentsFound(folder.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            if path.is_file() && is_pdf(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(QaError::NoDocumentsFound(folder.to_path_buf()));
        }

        // read_dir order is platform dependent
        files.sort();
        log::info!("Found {} PDF files in {}", files.len(), folder.display());
        Ok(files)
    }

    /// Extract the text of every page of one PDF
    pub fn extract_pages<P: AsRef<Path>>(path: P) -> Result<(Document, Vec<PageText>)> {
        let path = path.as_ref();
        let source = document_name(path);

        let pages = match Self::extract_with_lopdf(path, &source) {
            Ok(pages) => pages,
            Err(e) => {
                log::warn!(
                    "Per-page extraction failed for {}: {}. Falling back to whole-document text",
                    path.display(),
                    e
                );
                vec![PageText {
                    source,
                    page: 1,
                    text: Self::extract_whole_document(path)?,
                }]
            }
        };

        let document = Document {
            path: path.to_path_buf(),
            page_count: pages.len(),
        };
        Ok((document, pages))
    }

    fn extract_with_lopdf(path: &Path, source: &str) -> Result<Vec<PageText>> {
        let doc = lopdf::Document::load(path)
            .map_err(|e| QaError::Pdf(format!("Failed to load {}: {}", path.display(), e)))?;

        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys().copied() {
            let text = match doc.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("No text on page {} of {}: {}", page_number, source, e);
                    String::new()
                }
            };
            pages.push(PageText {
                source: source.to_string(),
                page: page_number,
                text,
            });
        }

        if pages.is_empty() {
            return Err(QaError::Pdf(format!("{} has no pages", path.display())));
        }
        Ok(pages)
    }

    // pdf-extract panics on some malformed font tables
    fn extract_whole_document(path: &Path) -> Result<String> {
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text(path));
        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(QaError::Pdf(format!("{}: {}", path.display(), e))),
            Err(_) => Err(QaError::Pdf(format!(
                "{}: text extraction aborted on malformed content",
                path.display()
            ))),
        }
    }

    /// Read every PDF in a folder. Unreadable files are recorded, not fatal.
    pub fn load_folder<P: AsRef<Path>>(folder: P) -> Result<Ingestion> {
        let files = Self::discover(folder)?;
        let mut ingestion = Ingestion::default();

        for file in files {
            log::info!("Processing: {}", document_name(&file));
            match Self::extract_pages(&file) {
                Ok((document, pages)) => {
                    ingestion.documents.push(document);
                    ingestion.pages.extend(pages);
                }
                Err(e) => {
                    log::error!("Skipping {}: {}", file.display(), e);
                    ingestion.failures.push((file, e.to_string()));
                }
            }
        }

        log::info!(
            "Extracted {} pages from {} documents ({} failed)",
            ingestion.pages.len(),
            ingestion.documents.len(),
            ingestion.failures.len()
        );
        Ok(ingestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        match PdfProcessor::discover(&missing) {
            Err(QaError::NoDocumentsFound(path)) => assert_eq!(path, missing),
            other => panic!("Expected NoDocumentsFound, got {:?}", other),
        }
    }

    #[test]
    fn test_discover_ignores_other_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(temp_dir.path().join("folder.pdf")).unwrap();

        assert!(matches!(
            PdfProcessor::discover(temp_dir.path()),
            Err(QaError::NoDocumentsFound(_))
        ));
    }

    #[test]
    fn test_discover_sorted() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.pdf", "a.PDF", "c.pdf"] {
            std::fs::write(temp_dir.path().join(name), b"%PDF-1.4").unwrap();
        }

        let files = PdfProcessor::discover(temp_dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| document_name(p)).collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_corrupt_pdf_is_reported_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.pdf"), b"this is not a pdf").unwrap();

        let ingestion = PdfProcessor::load_folder(temp_dir.path()).unwrap();
        assert!(ingestion.documents.is_empty());
        assert!(ingestion.pages.is_empty());
        assert_eq!(ingestion.failures.len(), 1);
    }

    #[test]
    fn test_document_name() {
        let document = Document {
            path: PathBuf::from("/papers/thesis.pdf"),
            page_count: 3,
        };
        assert_eq!(document.name(), "thesis.pdf");
    }
}
