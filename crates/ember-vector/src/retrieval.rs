//! Semantic fallback retrieval.
//!
//! RetrievalEngine encodes a free-text question with the embedding service
//! that built the [`KnowledgeIndex`], picks the nearest entry, and applies a
//! confidence threshold. The best score is always reported, including on
//! the low-confidence fallback.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::{l2_normalize, DynEmbeddingService, EmbeddingService};
use crate::error::RetrievalError;
use crate::knowledge::KnowledgeIndex;

/// Default minimum similarity for a confident answer.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Default upper bound on a single encode call.
const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(2);

/// Answer returned when no entry reaches the threshold.
pub const FALLBACK_ANSWER: &str = "I'm sorry, I don't have enough information to answer that question accurately. Would you like to speak with a customer service representative?";

/// Outcome of a knowledge-base lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub answer: String,
    /// Citation of the matched entry; `None` on the low-confidence fallback.
    pub source: Option<String>,
    /// Similarity of the best candidate, whether or not it was accepted.
    pub score: f64,
}

impl RetrievalResult {
    /// True when the answer came from the knowledge base.
    pub fn is_confident(&self) -> bool {
        self.source.is_some()
    }
}

/// Nearest-neighbour question answering over a fixed knowledge base.
pub struct RetrievalEngine {
    index: Arc<KnowledgeIndex>,
    embedder: Box<dyn DynEmbeddingService>,
    threshold: f64,
    encode_timeout: Duration,
}

impl RetrievalEngine {
    /// Create an engine over a shared index and the embedder that built it.
    pub fn new(
        index: Arc<KnowledgeIndex>,
        embedder: impl EmbeddingService + 'static,
        threshold: f64,
    ) -> Self {
        Self::new_dyn(index, Box::new(embedder), threshold)
    }

    /// Create an engine from a pre-boxed dynamic embedding service.
    pub fn new_dyn(
        index: Arc<KnowledgeIndex>,
        embedder: Box<dyn DynEmbeddingService>,
        threshold: f64,
    ) -> Self {
        Self {
            index,
            embedder,
            threshold,
            encode_timeout: DEFAULT_ENCODE_TIMEOUT,
        }
    }

    /// Bound each encode call; an expired call is reported as
    /// [`RetrievalError::EmbeddingUnavailable`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = timeout;
        self
    }

    /// Answer a free-text question.
    ///
    /// Returns the best entry's answer and source when its score is at least
    /// the threshold, otherwise [`FALLBACK_ANSWER`] with no source. Fails
    /// only when the question cannot be encoded.
    pub async fn answer(&self, question: &str) -> Result<RetrievalResult, RetrievalError> {
        let query = self.encode(question).await?;
        let (position, entry, score) = self.index.best_match(&query)?;

        if score >= self.threshold {
            debug!(position, score, "Knowledge base answer accepted");
            Ok(RetrievalResult {
                answer: entry.answer.clone(),
                source: Some(entry.source.clone()),
                score,
            })
        } else {
            debug!(
                position,
                score,
                threshold = self.threshold,
                "Best match below threshold, using fallback answer"
            );
            Ok(RetrievalResult {
                answer: FALLBACK_ANSWER.to_string(),
                source: None,
                score,
            })
        }
    }

    async fn encode(&self, question: &str) -> Result<Vec<f32>, RetrievalError> {
        if question.trim().is_empty() {
            return Err(RetrievalError::EmbeddingUnavailable(
                "question is empty".to_string(),
            ));
        }

        let mut vector =
            match tokio::time::timeout(self.encode_timeout, self.embedder.embed_boxed(question))
                .await
            {
                Ok(Ok(vector)) => vector,
                Ok(Err(e)) => {
                    warn!(error = %e, "Question encoding failed");
                    return Err(RetrievalError::EmbeddingUnavailable(e.to_string()));
                }
                Err(_) => {
                    warn!(timeout_ms = self.encode_timeout.as_millis() as u64, "Question encoding timed out");
                    return Err(RetrievalError::EmbeddingUnavailable(format!(
                        "encoder timed out after {:?}",
                        self.encode_timeout
                    )));
                }
            };

        // The encoder is not trusted to return unit vectors.
        if l2_normalize(&mut vector) == 0.0 {
            return Err(RetrievalError::EmbeddingUnavailable(
                "encoder returned a zero vector".to_string(),
            ));
        }
        Ok(vector)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ember_core::error::EmberError;

    use super::*;
    use crate::embedding::{TermHashEmbedding, TERM_HASH_THRESHOLD};
    use crate::knowledge::KnowledgeSeed;

    /// Embedder with hand-picked vectors per text.
    struct FixedEmbedding {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl FixedEmbedding {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    impl EmbeddingService for FixedEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmberError> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| EmberError::Embedding(format!("no vector for {:?}", text)))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    /// Embedder that never finishes.
    struct StalledEmbedding;

    impl EmbeddingService for StalledEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmberError> {
            std::future::pending().await
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn two_entry_index() -> Arc<KnowledgeIndex> {
        Arc::new(
            KnowledgeIndex::from_vectors(vec![
                (KnowledgeSeed::new("east", "go east", "east.pdf"), vec![1.0, 0.0]),
                (KnowledgeSeed::new("north", "go north", "north.pdf"), vec![0.0, 1.0]),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_confident_answer() {
        let embedder = FixedEmbedding::new(&[("which way?", vec![0.1, 0.9])]);
        let engine = RetrievalEngine::new(two_entry_index(), embedder, DEFAULT_THRESHOLD);

        let result = engine.answer("which way?").await.unwrap();
        assert_eq!(result.answer, "go north");
        assert_eq!(result.source.as_deref(), Some("north.pdf"));
        assert!(result.is_confident());
        assert!(result.score > 0.9);
    }

    #[tokio::test]
    async fn test_low_confidence_fallback_keeps_score() {
        // Equidistant from both entries: cos = 0.7071 < 0.9.
        let embedder = FixedEmbedding::new(&[("diagonal", vec![1.0, 1.0])]);
        let engine = RetrievalEngine::new(two_entry_index(), embedder, 0.9);

        let result = engine.answer("diagonal").await.unwrap();
        assert_eq!(result.answer, FALLBACK_ANSWER);
        assert!(result.source.is_none());
        assert!(!result.is_confident());
        assert!((result.score - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let index = two_entry_index();

        // Exact score 1.0 against a threshold of exactly 1.0.
        let embedder = FixedEmbedding::new(&[("east", vec![1.0, 0.0])]);
        let engine = RetrievalEngine::new(Arc::clone(&index), embedder, 1.0);
        let result = engine.answer("east").await.unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.source.as_deref(), Some("east.pdf"));

        // Threshold set to the observed score of an off-axis query.
        let probe = RetrievalEngine::new(
            Arc::clone(&index),
            FixedEmbedding::new(&[("tilted", vec![0.8, 0.3])]),
            0.0,
        );
        let observed = probe.answer("tilted").await.unwrap().score;

        let engine = RetrievalEngine::new(
            index,
            FixedEmbedding::new(&[("tilted", vec![0.8, 0.3])]),
            observed,
        );
        let result = engine.answer("tilted").await.unwrap();
        assert_eq!(result.score, observed);
        assert_eq!(result.answer, "go east");
    }

    #[tokio::test]
    async fn test_tie_resolves_to_earliest_entry() {
        let index = Arc::new(
            KnowledgeIndex::from_vectors(vec![
                (KnowledgeSeed::new("a", "first answer", "a.pdf"), vec![1.0, 0.0]),
                (KnowledgeSeed::new("b", "second answer", "b.pdf"), vec![1.0, 0.0]),
            ])
            .unwrap(),
        );
        let engine = RetrievalEngine::new(
            index,
            FixedEmbedding::new(&[("q", vec![1.0, 0.0])]),
            DEFAULT_THRESHOLD,
        );

        for _ in 0..5 {
            let result = engine.answer("q").await.unwrap();
            assert_eq!(result.answer, "first answer");
        }
    }

    #[tokio::test]
    async fn test_unnormalized_query_is_normalized() {
        let embedder = FixedEmbedding::new(&[("loud", vec![0.0, 50.0])]);
        let engine = RetrievalEngine::new(two_entry_index(), embedder, DEFAULT_THRESHOLD);
        let result = engine.answer("loud").await.unwrap();
        assert!((result.score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_encoder_failure_is_embedding_unavailable() {
        let engine = RetrievalEngine::new(
            two_entry_index(),
            FixedEmbedding::new(&[]),
            DEFAULT_THRESHOLD,
        );
        let err = engine.answer("unknown text").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_question_is_embedding_unavailable() {
        let engine = RetrievalEngine::new(
            two_entry_index(),
            FixedEmbedding::new(&[("", vec![1.0, 0.0])]),
            DEFAULT_THRESHOLD,
        );
        let err = engine.answer("  ").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_zero_vector_is_embedding_unavailable() {
        let engine = RetrievalEngine::new(
            two_entry_index(),
            FixedEmbedding::new(&[("zero", vec![0.0, 0.0])]),
            DEFAULT_THRESHOLD,
        );
        let err = engine.answer("zero").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_surfaces() {
        let engine = RetrievalEngine::new(
            two_entry_index(),
            FixedEmbedding::new(&[("wide", vec![1.0, 0.0, 0.0])]),
            DEFAULT_THRESHOLD,
        );
        let err = engine.answer("wide").await.unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_encoder_timeout() {
        let engine = RetrievalEngine::new(two_entry_index(), StalledEmbedding, DEFAULT_THRESHOLD)
            .with_timeout(Duration::from_millis(20));
        let err = engine.answer("anything").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bundled_knowledge_base_answers_kulfi_question() {
        let embedder = TermHashEmbedding::default();
        let index = KnowledgeIndex::build(KnowledgeSeed::bundled().unwrap(), &embedder)
            .await
            .unwrap();
        let engine = RetrievalEngine::new(Arc::new(index), embedder, TERM_HASH_THRESHOLD);

        let first = engine
            .answer("What flavors of kulfi do you serve?")
            .await
            .unwrap();
        assert!(first
            .answer
            .contains("Strawberry, Malai, Chocolate, Kesar Badam, Paan, and Mango"));
        assert_eq!(
            first.source.as_deref(),
            Some("Menu and Drinks _ Barbeque Nation.pdf")
        );

        // Same question, same index: identical result including the score.
        let second = engine
            .answer("What flavors of kulfi do you serve?")
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    async fn bundled_term_hash_engine() -> RetrievalEngine {
        let embedder = TermHashEmbedding::default();
        let index = KnowledgeIndex::build(KnowledgeSeed::bundled().unwrap(), &embedder)
            .await
            .unwrap();
        RetrievalEngine::new(Arc::new(index), embedder, TERM_HASH_THRESHOLD)
    }

    #[tokio::test]
    async fn test_off_topic_questions_sharing_filler_words_fall_back() {
        let engine = bundled_term_hash_engine().await;
        for question in [
            "What types of cars are available at Barbeque Nation?",
            "What is the address of the moon?",
            "What are the dinosaurs available?",
        ] {
            let result = engine.answer(question).await.unwrap();
            assert_eq!(result.source, None, "{question} matched {:?}", result.answer);
            assert_eq!(result.answer, FALLBACK_ANSWER);
            assert!(result.score < TERM_HASH_THRESHOLD);
        }
    }

    #[tokio::test]
    async fn test_paraphrased_questions_still_match() {
        let engine = bundled_term_hash_engine().await;

        let kulfi = engine
            .answer("Which kulfi flavours are available?")
            .await
            .unwrap();
        assert_eq!(
            kulfi.source.as_deref(),
            Some("Menu and Drinks _ Barbeque Nation.pdf")
        );
        assert!(kulfi.answer.contains("Kesar Badam"));

        let veg = engine.answer("Do you serve vegetarian food?").await.unwrap();
        assert_eq!(veg.source.as_deref(), Some("Menu List _ Barbeque Nation.pdf"));
    }
}
