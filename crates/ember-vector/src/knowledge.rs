//! Immutable index of embedded question/answer pairs.
//!
//! Built once at startup and shared by reference for the lifetime of the
//! process. Lookup is a brute-force scan: the knowledge base holds tens to
//! low hundreds of entries, so no index structure is needed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedding::{l2_normalize, DynEmbeddingService};
use crate::error::RetrievalError;

/// Restaurant knowledge base shipped with the crate.
const BUNDLED_KNOWLEDGE_BASE: &str = include_str!("../data/knowledge_base.json");

/// A (question, answer, source) triple before embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSeed {
    pub query: String,
    pub answer: String,
    pub source: String,
}

impl KnowledgeSeed {
    pub fn new(
        query: impl Into<String>,
        answer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            source: source.into(),
        }
    }

    /// The bundled restaurant knowledge base.
    pub fn bundled() -> Result<Vec<KnowledgeSeed>, RetrievalError> {
        Self::parse_json(BUNDLED_KNOWLEDGE_BASE)
    }

    /// Parse a JSON array of `{query, answer, source}` objects.
    pub fn parse_json(json: &str) -> Result<Vec<KnowledgeSeed>, RetrievalError> {
        serde_json::from_str(json).map_err(|e| RetrievalError::InvalidKnowledgeBase(e.to_string()))
    }

    /// Read a JSON knowledge base file.
    pub fn load_json(path: &Path) -> Result<Vec<KnowledgeSeed>, RetrievalError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::InvalidKnowledgeBase(format!("{}: {}", path.display(), e))
        })?;
        Self::parse_json(&content)
    }
}

/// A knowledge-base entry with its unit-length question embedding.
#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub query: String,
    pub answer: String,
    pub source: String,
    embedding: Vec<f32>,
}

impl KnowledgeEntry {
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// Read-only collection of knowledge entries in insertion order.
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    entries: Vec<KnowledgeEntry>,
    dimensions: usize,
}

impl KnowledgeIndex {
    /// Embed every seed's question with `embedder` and build the index.
    ///
    /// Fails if `seeds` is empty, if a question cannot be embedded, or if
    /// the embedder produces vectors of inconsistent length.
    pub async fn build(
        seeds: Vec<KnowledgeSeed>,
        embedder: &dyn DynEmbeddingService,
    ) -> Result<Self, RetrievalError> {
        let mut vectors = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            let vector = embedder
                .embed_boxed(&seed.query)
                .await
                .map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;
            vectors.push(vector);
        }

        let index = Self::from_vectors(seeds.into_iter().zip(vectors))?;
        info!(
            entries = index.len(),
            dimensions = index.dimensions,
            "Knowledge index built"
        );
        Ok(index)
    }

    /// Build an index from seeds paired with precomputed vectors.
    ///
    /// Vectors are normalised here, so callers may pass raw embeddings.
    pub fn from_vectors(
        pairs: impl IntoIterator<Item = (KnowledgeSeed, Vec<f32>)>,
    ) -> Result<Self, RetrievalError> {
        let mut entries = Vec::new();
        let mut dimensions = None;

        for (seed, mut embedding) in pairs {
            let expected = *dimensions.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            if l2_normalize(&mut embedding) == 0.0 {
                return Err(RetrievalError::InvalidKnowledgeBase(format!(
                    "zero-magnitude embedding for {:?}",
                    seed.query
                )));
            }
            entries.push(KnowledgeEntry {
                query: seed.query,
                answer: seed.answer,
                source: seed.source,
                embedding,
            });
        }

        match dimensions {
            Some(dimensions) if dimensions > 0 => Ok(Self {
                entries,
                dimensions,
            }),
            _ => Err(RetrievalError::EmptyKnowledgeBase),
        }
    }

    /// Find the entry with the highest dot product against `query`.
    ///
    /// `query` must already be unit length. Ties keep the earliest entry.
    /// Returns the entry's position, the entry, and its score.
    pub fn best_match(
        &self,
        query: &[f32],
    ) -> Result<(usize, &KnowledgeEntry, f64), RetrievalError> {
        if query.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut best: Option<(usize, f64)> = None;
        for (position, entry) in self.entries.iter().enumerate() {
            let score = dot(query, &entry.embedding);
            // Strictly greater, so the first maximum wins.
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((position, score));
            }
        }

        let (position, score) = best.ok_or(RetrievalError::EmptyKnowledgeBase)?;
        debug!(position, score, "Best knowledge match");
        Ok((position, &self.entries[position], score))
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dot product accumulated in f64.
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TermHashEmbedding;

    fn seed(q: &str) -> KnowledgeSeed {
        KnowledgeSeed::new(q, format!("answer to {}", q), "test.pdf")
    }

    #[test]
    fn test_bundled_knowledge_base_parses() {
        let seeds = KnowledgeSeed::bundled().unwrap();
        assert_eq!(seeds.len(), 64);
        assert!(seeds.iter().all(|s| !s.query.is_empty() && !s.source.is_empty()));
        assert!(seeds
            .iter()
            .any(|s| s.answer.contains("Strawberry, Malai, Chocolate, Kesar Badam, Paan, and Mango")));
    }

    #[test]
    fn test_parse_json_rejects_malformed() {
        let err = KnowledgeSeed::parse_json(r#"[{"query": "q"}]"#).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidKnowledgeBase(_)));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[{"query": "Do you have a bar?", "answer": "Yes.", "source": "faq.pdf"}]"#,
        )
        .unwrap();

        let seeds = KnowledgeSeed::load_json(&path).unwrap();
        assert_eq!(seeds, vec![KnowledgeSeed::new("Do you have a bar?", "Yes.", "faq.pdf")]);
    }

    #[test]
    fn test_load_json_missing_file() {
        let err = KnowledgeSeed::load_json(Path::new("/no/such/kb.json")).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidKnowledgeBase(_)));
    }

    #[test]
    fn test_from_vectors_normalizes() {
        let index = KnowledgeIndex::from_vectors(vec![(seed("a"), vec![3.0, 4.0])]).unwrap();
        let v = index.entries()[0].embedding();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_from_vectors_empty() {
        let err = KnowledgeIndex::from_vectors(Vec::new()).unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyKnowledgeBase));
    }

    #[test]
    fn test_from_vectors_dimension_mismatch() {
        let err = KnowledgeIndex::from_vectors(vec![
            (seed("a"), vec![1.0, 0.0]),
            (seed("b"), vec![1.0, 0.0, 0.0]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_from_vectors_rejects_zero_vector() {
        let err = KnowledgeIndex::from_vectors(vec![(seed("a"), vec![0.0, 0.0])]).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidKnowledgeBase(_)));
    }

    #[test]
    fn test_best_match_picks_closest() {
        let index = KnowledgeIndex::from_vectors(vec![
            (seed("east"), vec![1.0, 0.0]),
            (seed("north"), vec![0.0, 1.0]),
        ])
        .unwrap();

        let (position, entry, score) = index.best_match(&[0.0, 1.0]).unwrap();
        assert_eq!(position, 1);
        assert_eq!(entry.query, "north");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_best_match_tie_keeps_first_inserted() {
        let index = KnowledgeIndex::from_vectors(vec![
            (seed("first"), vec![1.0, 1.0]),
            (seed("second"), vec![1.0, 1.0]),
            (seed("third"), vec![-1.0, 0.0]),
        ])
        .unwrap();

        let (position, entry, _) = index.best_match(&[0.6, 0.8]).unwrap();
        assert_eq!(position, 0);
        assert_eq!(entry.query, "first");
    }

    #[test]
    fn test_best_match_dimension_mismatch() {
        let index = KnowledgeIndex::from_vectors(vec![(seed("a"), vec![1.0, 0.0])]).unwrap();
        let err = index.best_match(&[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_build_with_term_hash() {
        let embedder = TermHashEmbedding::default();
        let seeds = vec![seed("Does the outlet have a bar?"), seed("What desserts are served?")];
        let index = KnowledgeIndex::build(seeds, &embedder).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimensions(), 384);
    }

    #[tokio::test]
    async fn test_build_propagates_embedding_failure() {
        let embedder = TermHashEmbedding::default();
        let err = KnowledgeIndex::build(vec![seed("?")], &embedder)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }
}
