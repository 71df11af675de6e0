
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::{IndexRecord, SearchResult, VectorIndex};
use crate::{RagError, Result};

/// Process-local vector index searched by cosine similarity.
///
/// Rebuilt on every run and dropped with the process.
#[derive(Debug, Clone)]
pub struct LocalIndex {
    name: String,
    dimension: usize,
    records: Vec<IndexRecord>,
    positions: HashMap<String, usize>,
}

impl LocalIndex {
    #[inline]
    pub fn new(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Cosine similarity, or 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex for LocalIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn upsert(&mut self, records: Vec<IndexRecord>) -> Result<()> {
        for record in &records {
            if record.vector.len() != self.dimension {
                return Err(RagError::Index(format!(
                    "Vector for '{}' has dimension {}, index '{}' expects {}",
                    record.id,
                    record.vector.len(),
                    self.name,
                    self.dimension
                )));
            }
        }

        let written = records.len();
        for record in records {
            match self.positions.get(&record.id) {
                Some(&position) => self.records[position] = record,
                None => {
                    self.positions.insert(record.id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }

        debug!(
            "Upserted {} records into local index '{}' ({} total)",
            written,
            self.name,
            self.records.len()
        );
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if vector.len() != self.dimension {
            return Err(RagError::Index(format!(
                "Query vector has dimension {}, index '{}' expects {}",
                vector.len(),
                self.name,
                self.dimension
            )));
        }

        let mut scored: Vec<(f32, &IndexRecord)> = self
            .records
            .iter()
            .map(|record| (cosine_similarity(&record.vector, vector), record))
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchResult {
                id: record.id.clone(),
                text: record.payload.text.clone(),
                source: record.payload.source.clone(),
                score,
            })
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}
