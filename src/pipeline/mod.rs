// Pipeline assembly
// Wires the embedding client, chunker, indexer and answerer for the selected backend


use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::config::{Backend, Config};
use crate::database::{PineconeClient, VectorIndex};
use crate::embeddings::{Embedder, OpenAiClient, TextChunker, TextGenerator};
use crate::extract::discover_pdfs;
use crate::history::SessionHistory;
use crate::indexer::{Indexer, UploadReport, index_name_for_directory};
use crate::qa::{Answer, QuestionAnswerer};

/// What to build an index from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    File(PathBuf),
    Directory(PathBuf),
}

impl IndexSource {
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Directory(path) => path,
        }
    }

    /// Name of the index built from this source.
    ///
    /// A file is named after the directory that holds it.
    #[inline]
    pub fn index_name(&self) -> &'static str {
        match self {
            Self::File(path) => index_name_for_directory(path.parent().unwrap_or(path)),
            Self::Directory(dir) => index_name_for_directory(dir),
        }
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        match self {
            Self::File(path) => Ok(vec![path.clone()]),
            Self::Directory(dir) => Ok(discover_pdfs(dir)?),
        }
    }
}

/// An index ready for questions, plus what was uploaded to build it
pub struct PreparedIndex {
    pub index: Box<dyn VectorIndex>,
    pub upload: Option<UploadReport>,
}

impl fmt::Debug for PreparedIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedIndex")
            .field("index", &self.index.name())
            .field("upload", &self.upload)
            .finish()
    }
}

/// The extract, chunk, embed, store and answer steps for one backend
#[derive(Debug, Clone)]
pub struct Pipeline {
    backend: Backend,
    indexer: Indexer,
    answerer: QuestionAnswerer,
    remote: Option<PineconeClient>,
}

impl Pipeline {
    /// Assemble from configuration; credentials must already be attached.
    ///
    /// Fails when the OpenAI key is missing, or the Pinecone key and
    /// environment for the remote backend.
    #[inline]
    pub fn from_config(config: &Config, backend: Backend) -> Result<Self> {
        let openai_key = config.credentials.require_openai_key()?;
        let openai = Arc::new(OpenAiClient::new(&config.openai, openai_key)?);

        let remote = match backend {
            Backend::Local => None,
            Backend::Remote => {
                let (api_key, environment) = config.credentials.require_pinecone()?;
                Some(PineconeClient::new(
                    &config.pinecone,
                    api_key,
                    environment,
                    openai.dimension(),
                )?)
            }
        };

        let embedder: Arc<dyn Embedder> = Arc::clone(&openai) as Arc<dyn Embedder>;
        let generator: Arc<dyn TextGenerator> = openai;
        let chunker = TextChunker::new(config.chunking.clone())?;

        Ok(Self {
            backend,
            indexer: Indexer::new(
                Arc::clone(&embedder),
                chunker,
                config.pinecone.upsert_batch_size as usize,
            ),
            answerer: QuestionAnswerer::new(
                embedder,
                generator,
                config.top_k(backend),
                config.retrieval.wrap_width,
            ),
            remote,
        })
    }

    /// Assemble from parts; `remote` is required for [`Backend::Remote`]
    #[inline]
    pub fn new(
        backend: Backend,
        indexer: Indexer,
        answerer: QuestionAnswerer,
        remote: Option<PineconeClient>,
    ) -> Self {
        Self {
            backend,
            indexer,
            answerer,
            remote,
        }
    }

    #[inline]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Make `source` searchable.
    ///
    /// The local backend embeds everything into a fresh in-memory index. The
    /// remote backend creates or connects to the named index and, when
    /// `upload` is set, writes every chunk to it.
    #[inline]
    pub fn prepare_index(&self, source: &IndexSource, upload: bool) -> Result<PreparedIndex> {
        let name = source.index_name();

        match (self.backend, &self.remote) {
            (Backend::Local, _) => {
                let index = self.indexer.build_local_index(name, &source.files()?)?;
                Ok(PreparedIndex {
                    index: Box::new(index),
                    upload: None,
                })
            }
            (Backend::Remote, Some(client)) => {
                let mut index = client.create_or_connect(name)?;
                let report = if upload {
                    Some(match source {
                        IndexSource::Directory(dir) => {
                            self.indexer.upload_directory(dir, &mut index)?
                        }
                        IndexSource::File(file) => self
                            .indexer
                            .upload_files(std::slice::from_ref(file), &mut index)?,
                    })
                } else {
                    info!("Skipping upload, querying '{}' as it is", name);
                    None
                };
                Ok(PreparedIndex {
                    index: Box::new(index),
                    upload: report,
                })
            }
            (Backend::Remote, None) => Err(crate::RagError::Index(
                "Remote backend selected without a Pinecone client".to_string(),
            )),
        }
    }

    /// Answer `question` against `index` with no history
    #[inline]
    pub fn answer(&self, index: &dyn VectorIndex, question: &str) -> Result<Answer> {
        self.answerer.answer(index, question)
    }

    /// Answer `question`, replaying `history` in front of it and recording the exchange
    #[inline]
    pub fn ask(
        &self,
        index: &dyn VectorIndex,
        history: Option<&mut SessionHistory>,
        question: &str,
    ) -> Result<Answer> {
        match history {
            Some(history) => {
                let composed = history.compose_query(question);
                let answer = self.answerer.answer(index, &composed)?;
                history.record(question, &answer.plain());
                Ok(answer)
            }
            None => self.answerer.answer(index, question),
        }
    }
}
