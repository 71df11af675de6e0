// Indexer module
// Turns PDFs into tagged chunks and writes their embeddings into a vector index


use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::{ChunkPayload, IndexRecord, LocalIndex, VectorIndex};
use crate::embeddings::{Embedder, TextChunker};
use crate::extract::{discover_pdfs, load_document};

const POLICIES_DIRECTORY: &str = "policies";
const POLICIES_INDEX: &str = "pdf-policies";
const PRODUCTS_INDEX: &str = "pdf-products";

/// Identifier of the chunk at `position` within `filename`
#[inline]
pub fn chunk_id(filename: &str, position: usize) -> String {
    format!("{}_{}", filename, position)
}

/// Remote index name for a source directory: `pdf-policies` for a directory
/// named `policies`, `pdf-products` for anything else
#[inline]
pub fn index_name_for_directory(dir: &Path) -> &'static str {
    match dir.file_name() {
        Some(name) if name == POLICIES_DIRECTORY => POLICIES_INDEX,
        _ => PRODUCTS_INDEX,
    }
}

/// A chunk of one document's text, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub source: String,
    pub position: usize,
    pub text: String,
}

impl DocumentChunk {
    #[inline]
    pub fn id(&self) -> String {
        chunk_id(&self.source, self.position)
    }

    fn into_record(self, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: self.id(),
            vector,
            payload: ChunkPayload {
                text: self.text,
                source: self.source,
                chunk_index: self.position,
            },
        }
    }
}

/// Chunks written for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file: PathBuf,
    pub chunks: usize,
}

/// Files fully written to an index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub index_name: String,
    pub files: Vec<FileReport>,
}

impl UploadReport {
    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|file| file.chunks).sum()
    }
}

impl fmt::Display for UploadReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chunks from {} files in '{}'",
            self.total_chunks(),
            self.files.len(),
            self.index_name
        )
    }
}

/// An upload that stopped part way.
///
/// Files listed in `completed` are fully in the index; `failed_file` may be
/// partially written and later files were not attempted.
#[derive(Error, Debug)]
#[error(
    "Upload to '{}' stopped at {} after {} completed files: {}",
    .completed.index_name,
    .failed_file.display(),
    .completed.files.len(),
    .source
)]
pub struct UploadFailure {
    pub completed: UploadReport,
    pub failed_file: PathBuf,
    #[source]
    pub source: Box<crate::RagError>,
}

/// Builds local indexes and uploads directories to remote ones
#[derive(Clone)]
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    batch_size: usize,
}

impl fmt::Debug for Indexer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("chunker", &self.chunker)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    /// `batch_size` is how many chunks are embedded and written per upload step
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, chunker: TextChunker, batch_size: usize) -> Self {
        Self {
            embedder,
            chunker,
            batch_size: batch_size.max(1),
        }
    }

    /// Split `text` and tag every piece with `source` and its position
    #[inline]
    pub fn chunk_text(&self, source: &str, text: &str) -> Vec<DocumentChunk> {
        self.chunker
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| DocumentChunk {
                source: source.to_string(),
                position,
                text,
            })
            .collect()
    }

    /// Extract, split and tag one PDF
    #[inline]
    pub fn chunk_document(&self, path: &Path) -> Result<Vec<DocumentChunk>> {
        let document = load_document(path)?;
        let chunks = self.chunk_text(&document.file_name(), &document.text);

        if chunks.is_empty() {
            warn!("No text extracted from {}", path.display());
        }
        debug!(
            "Split {} ({} pages) into {} chunks",
            path.display(),
            document.page_count,
            chunks.len()
        );
        Ok(chunks)
    }

    /// Build a fresh in-memory index holding every chunk of every file.
    ///
    /// All chunks are embedded in one call and inserted in one call.
    #[inline]
    pub fn build_local_index(&self, name: &str, files: &[PathBuf]) -> Result<LocalIndex> {
        let mut chunks = Vec::new();
        for file in files {
            chunks.extend(self.chunk_document(file)?);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts)?;

        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| chunk.into_record(vector))
            .collect();

        let mut index = LocalIndex::new(name, self.embedder.dimension());
        index.upsert(records)?;

        info!(
            "Built local index '{}' with {} chunks from {} files",
            name,
            index.count()?,
            files.len()
        );
        Ok(index)
    }

    /// Embed and write every PDF in `dir` to `index`, one file at a time.
    ///
    /// Stops at the first failure; chunks already written stay in the index.
    #[inline]
    pub fn upload_directory(
        &self,
        dir: &Path,
        index: &mut dyn VectorIndex,
    ) -> std::result::Result<UploadReport, UploadFailure> {
        let files = match discover_pdfs(dir) {
            Ok(files) => files,
            Err(e) => {
                return Err(UploadFailure {
                    completed: UploadReport {
                        index_name: index.name().to_string(),
                        files: Vec::new(),
                    },
                    failed_file: dir.to_path_buf(),
                    source: Box::new(e.into()),
                });
            }
        };

        self.upload_files(&files, index)
    }

    /// Embed and write `files` to `index` in order, stopping at the first failure
    #[inline]
    pub fn upload_files(
        &self,
        files: &[PathBuf],
        index: &mut dyn VectorIndex,
    ) -> std::result::Result<UploadReport, UploadFailure> {
        let mut report = UploadReport {
            index_name: index.name().to_string(),
            files: Vec::new(),
        };

        let bar = progress_bar(files.len());
        for file in files {
            bar.set_message(file.display().to_string());
            info!("Processing {}", file.display());

            match self.upload_file(file, index) {
                Ok(chunks) => report.files.push(FileReport {
                    file: file.clone(),
                    chunks,
                }),
                Err(e) => {
                    bar.abandon();
                    return Err(UploadFailure {
                        completed: report,
                        failed_file: file.clone(),
                        source: Box::new(e),
                    });
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!("Uploaded {}", report);
        Ok(report)
    }

    fn upload_file(&self, file: &Path, index: &mut dyn VectorIndex) -> Result<usize> {
        let chunks = self.chunk_document(file)?;
        let total = chunks.len();

        let mut pending = chunks.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<DocumentChunk> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.embed_documents(&texts)?;

            let records = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| chunk.into_record(vector))
                .collect();
            index.upsert(records)?;
        }

        debug!("Wrote {} chunks from {}", total, file.display());
        Ok(total)
    }
}

fn progress_bar(files: usize) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Uploading {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(files as u64).with_style(style)
}
