// Text extraction
// Reads PDF files page by page and discovers PDFs inside a directory


use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse PDF {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
}

/// A PDF read end to end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub path: PathBuf,
    pub page_count: usize,
    /// Text of every page concatenated in page order
    pub text: String,
}

impl PdfDocument {
    /// File name used to tag chunks, falling back to the full path
    #[inline]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |name| {
                name.to_string_lossy().into_owned()
            })
    }
}

/// Read a PDF and return the concatenated text of all its pages.
///
/// No separator is inserted between pages. A page whose text cannot be
/// decoded contributes nothing.
#[inline]
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    load_document(path).map(|document| document.text)
}

#[inline]
pub fn load_document(path: &Path) -> Result<PdfDocument, ExtractError> {
    let bytes = fs::read(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let document = Document::load_mem(&bytes).map_err(|source| ExtractError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let pages = document.get_pages();
    let mut text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => warn!(
                "Could not extract text from page {} of {}: {}",
                page_number,
                path.display(),
                e
            ),
        }
    }

    debug!(
        "Extracted {} characters from {} pages of {}",
        text.chars().count(),
        pages.len(),
        path.display()
    );

    Ok(PdfDocument {
        path: path.to_path_buf(),
        page_count: pages.len(),
        text,
    })
}

/// List the `*.pdf` files directly inside `dir`, sorted by file name
#[inline]
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let read_error = |source| ExtractError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    debug!("Found {} PDF files in {}", files.len(), dir.display());
    Ok(files)
}
