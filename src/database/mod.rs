// Database module
// Vector indexes: a transient in-memory store and a remote Pinecone-compatible store

pub mod memory;
pub mod pinecone;

pub use memory::LocalIndex;
pub use pinecone::{PineconeClient, PineconeIndex};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Metadata stored next to every vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
}

/// One vector ready to be written to an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A stored chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Nearest-neighbour store over chunk embeddings.
///
/// Writing a record whose id already exists replaces it.
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    fn upsert(&mut self, records: Vec<IndexRecord>) -> Result<()>;

    /// Return at most `top_k` records, most similar first
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    fn count(&self) -> Result<usize>;
}
