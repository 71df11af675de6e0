// Question answering over a vector index
// Retrieves the closest chunks, asks the completion model, and wraps the reply for display


use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::Result;
use crate::database::{SearchResult, VectorIndex};
use crate::embeddings::{Embedder, TextGenerator};

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// A model reply and the chunks it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Reply filled to the display width
    pub text: String,
    /// Reply exactly as the model produced it
    pub raw: String,
    pub sources: Vec<SearchResult>,
}

impl Answer {
    /// Reply on a single line with whitespace collapsed
    #[inline]
    pub fn plain(&self) -> String {
        self.raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Clone)]
pub struct QuestionAnswerer {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    top_k: usize,
    wrap_width: usize,
}

impl fmt::Debug for QuestionAnswerer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionAnswerer")
            .field("top_k", &self.top_k)
            .field("wrap_width", &self.wrap_width)
            .finish_non_exhaustive()
    }
}

impl QuestionAnswerer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        top_k: usize,
        wrap_width: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            top_k: top_k.max(1),
            wrap_width: wrap_width.max(1),
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` from the chunks of `index` most similar to it.
    ///
    /// An empty index gives an empty context; the model is still asked.
    #[inline]
    pub fn answer(&self, index: &dyn VectorIndex, question: &str) -> Result<Answer> {
        let query = self.embedder.embed_query(question)?;
        let sources = index.query(&query, self.top_k)?;
        debug!(
            "Retrieved {} chunks from '{}' for question",
            sources.len(),
            index.name()
        );

        let prompt = build_prompt(question, &sources);
        let raw = self.generator.generate(&prompt)?;
        info!("Answered question from {} context chunks", sources.len());

        Ok(Answer {
            text: wrap_answer(&raw, self.wrap_width),
            raw,
            sources,
        })
    }
}

/// Prompt asking the model to answer `question` using only `context`
#[inline]
pub fn build_prompt(question: &str, context: &[SearchResult]) -> String {
    let context = context
        .iter()
        .map(|result| result.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        PROMPT_PREAMBLE, context, question
    )
}

/// Collapse whitespace and fill to `width` columns
#[inline]
pub fn wrap_answer(raw: &str, width: usize) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    textwrap::fill(&collapsed, width)
}
