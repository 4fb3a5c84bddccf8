//! Input resolution: discover the corpus and load one document at a time.
//!
//! Discovery only lists file names and derives each [`Fingerprint`]; bytes are
//! read later, by a [`DocumentLoader`], and only for documents that survive the
//! resume check. Loading validates the PDF magic bytes (`%PDF`) before pdfium
//! sees the file so callers get a meaningful error rather than a pdfium crash.

use crate::error::Pdf2RecError;
use crate::fingerprint::Fingerprint;
use crate::pipeline::render;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A discovered document that has not been read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub identity: Fingerprint,
    /// External name (the file name); the identity is derived from it.
    pub name: String,
    pub path: PathBuf,
}

impl DocumentRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            identity: Fingerprint::from_name(&name),
            name,
            path: path.into(),
        }
    }
}

/// A document read into memory. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub identity: Fingerprint,
    pub name: String,
    /// Pages eligible for annotation (may stop short of the physical count).
    pub page_count: usize,
    pub content: Arc<Vec<u8>>,
}

/// Reads a discovered document and determines its page count.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, doc: &DocumentRef) -> Result<SourceDocument, Pdf2RecError>;
}

/// List `*.pdf` files in `dir` (non-recursive), ordered by file name.
pub async fn discover_documents(dir: &Path) -> Result<Vec<DocumentRef>, Pdf2RecError> {
    let meta = tokio::fs::metadata(dir)
        .await
        .map_err(|_| Pdf2RecError::InputDirNotFound {
            path: dir.to_path_buf(),
        })?;
    if !meta.is_dir() {
        return Err(Pdf2RecError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Pdf2RecError::Internal(format!("read_dir {}: {e}", dir.display())))?;

    let mut docs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Pdf2RecError::Internal(format!("read_dir {}: {e}", dir.display())))?
    {
        let path = entry.path();
        if !is_pdf_path(&path) {
            continue;
        }
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        docs.push(DocumentRef::new(name, path));
    }

    docs.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("Discovered {} PDFs in {}", docs.len(), dir.display());
    Ok(docs)
}

fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// The default loader: read bytes from disk, count pages with pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfDocumentLoader {
    pub password: Option<String>,
    /// Truncate the page count at a references/bibliography heading.
    pub stop_at_references: bool,
}

impl PdfDocumentLoader {
    pub fn new(password: Option<String>, stop_at_references: bool) -> Self {
        Self {
            password,
            stop_at_references,
        }
    }
}

#[async_trait]
impl DocumentLoader for PdfDocumentLoader {
    async fn load(&self, doc: &DocumentRef) -> Result<SourceDocument, Pdf2RecError> {
        let bytes = tokio::fs::read(&doc.path)
            .await
            .map_err(|e| Pdf2RecError::SourceRead {
                name: doc.name.clone(),
                detail: e.to_string(),
            })?;
        check_pdf_magic(&doc.name, &bytes)?;

        let content = Arc::new(bytes);
        let page_count = render::count_pages(
            Arc::clone(&content),
            &doc.name,
            self.password.clone(),
            self.stop_at_references,
        )
        .await?;

        debug!(name = %doc.name, page_count, "Loaded document");
        Ok(SourceDocument {
            identity: doc.identity.clone(),
            name: doc.name.clone(),
            page_count,
            content,
        })
    }
}

/// Reject files that do not start with `%PDF`.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), Pdf2RecError> {
    if bytes.len() < 4 {
        return Err(Pdf2RecError::SourceRead {
            name: name.to_string(),
            detail: format!("file is only {} bytes", bytes.len()),
        });
    }
    if &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(Pdf2RecError::NotAPdf {
            name: name.to_string(),
            magic,
        });
    }
    Ok(())
}
