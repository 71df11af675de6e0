
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigError;

/// Configuration for text chunking. Sizes are counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length, exceeded only by a run of text longer than this with no separator in it
    pub chunk_size: usize,
    /// Number of characters each chunk repeats from the end of the previous one
    pub chunk_overlap: usize,
    /// Preferred break point; chunks end right after it when possible
    pub separator: String,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separator: "\n".to_string(),
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }

        if self.separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }

        Ok(())
    }
}

/// Splits text into overlapping chunks.
///
/// Every chunk after the first starts with exactly `chunk_overlap` characters
/// copied from the end of the previous chunk, so dropping those prefixes and
/// concatenating the chunks gives back the input text.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkingConfig,
    separator: Vec<char>,
}

impl TextChunker {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let separator = config.separator.chars().collect();
        Ok(Self { config, separator })
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into chunks. Empty input gives no chunks.
    #[inline]
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        if len == 0 {
            return chunks;
        }

        let mut chunk_start = 0;
        let mut content_start = 0;

        loop {
            let limit = chunk_start + size;
            let end = if limit >= len {
                len
            } else {
                // Each chunk must add new text and be long enough to seed the next overlap
                let min_end = (content_start + 1).max(chunk_start + overlap);
                self.last_break_between(&chars, min_end, limit)
                    .unwrap_or_else(|| self.fallback_end(&chars, chunk_start, limit))
            };

            if end - chunk_start > size {
                warn!(
                    "Created a chunk of {} characters, longer than the configured maximum of {}",
                    end - chunk_start,
                    size
                );
            }

            chunks.push(chars[chunk_start..end].iter().collect());

            if end >= len {
                break;
            }

            content_start = end;
            chunk_start = end - overlap;
        }

        debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            len,
            chunks.len(),
            size,
            overlap
        );

        chunks
    }

    fn ends_with_separator(&self, chars: &[char], end: usize) -> bool {
        end >= self.separator.len() && chars[end - self.separator.len()..end] == self.separator[..]
    }

    /// Largest break position in `min_end..=limit` that falls right after a separator
    fn last_break_between(&self, chars: &[char], min_end: usize, limit: usize) -> Option<usize> {
        (min_end..=limit)
            .rev()
            .find(|&end| self.ends_with_separator(chars, end))
    }

    /// End for a window with no usable separator.
    ///
    /// Cuts at `limit` unless the separator-free run around it is longer than
    /// `chunk_size` by itself; only then is the chunk stretched to the run's end.
    fn fallback_end(&self, chars: &[char], chunk_start: usize, limit: usize) -> usize {
        let run_start = ((chunk_start + 1)..=limit)
            .rev()
            .find(|&end| self.ends_with_separator(chars, end))
            .unwrap_or(chunk_start);
        let run_end = self.next_break_after(chars, limit);

        if run_end - run_start > self.config.chunk_size {
            run_end
        } else {
            limit
        }
    }

    /// First break position after `limit`, or the end of the text
    fn next_break_after(&self, chars: &[char], limit: usize) -> usize {
        (limit + 1..=chars.len())
            .find(|&end| self.ends_with_separator(chars, end))
            .unwrap_or(chars.len())
    }
}

/// Split `text` with the given configuration
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, ConfigError> {
    Ok(TextChunker::new(config.clone())?.split(text))
}
