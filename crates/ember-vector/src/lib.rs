//! Ember Vector crate - embedding services, knowledge index, and semantic
//! fallback retrieval.
//!
//! Provides an embedding service trait with an ONNX sentence-transformer
//! backend and a deterministic term-hash backend, an immutable in-memory
//! index of embedded question/answer pairs, and a retrieval engine that
//! answers free-text questions by nearest-neighbour lookup with a
//! confidence threshold.

pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod retrieval;

pub use embedding::{
    DynEmbeddingService, EmbeddingService, OnnxEmbeddingService, TermHashEmbedding,
    TERM_HASH_THRESHOLD,
};
pub use error::RetrievalError;
pub use knowledge::{KnowledgeEntry, KnowledgeIndex, KnowledgeSeed};
pub use retrieval::{RetrievalEngine, RetrievalResult, DEFAULT_THRESHOLD, FALLBACK_ANSWER};
