// Embeddings module
// Text chunking plus the embedding and text-generation seams backed by the OpenAI API

pub mod chunking;
pub mod openai;

pub use chunking::{ChunkingConfig, TextChunker, split_text};
pub use openai::OpenAiClient;

use crate::Result;

/// Turns text into fixed-dimension vectors.
///
/// `embed_documents` should batch natively where the backend allows it;
/// the default implementation embeds one text at a time.
pub trait Embedder: Send + Sync {
    /// Embed a single query string
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, returning vectors in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_query(text)).collect()
    }

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;
}

/// Produces a completion for a prompt
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
