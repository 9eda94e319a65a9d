//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate.
//! - `TermHashEmbedding` hashes stemmed content words into a fixed number of
//!   buckets. Deterministic and model-free; used when no model is installed.
//!
//! Every backend returns L2-normalised vectors and refuses blank input.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ember_core::error::EmberError;
use ort::session::Session;
use ort::value::TensorRef;
use sha2::{Digest, Sha256};
use tokenizers::Tokenizer;
use tracing::info;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. The same
/// service must be used to build the knowledge index and to encode live
/// questions.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, EmberError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Box<dyn DynEmbeddingService>` to be stored in structs without generics.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, EmberError>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, EmberError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Scale `v` to unit length in place. Returns the original magnitude.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in v.iter_mut() {
            *val /= norm;
        }
    }
    norm
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - sentence-transformer inference
// ---------------------------------------------------------------------------

/// Fallback width when the model does not declare its output shape.
const MINILM_DIMENSIONS: usize = 384;

fn onnx_err(stage: &str, e: impl std::fmt::Display) -> EmberError {
    EmberError::Embedding(format!("{stage}: {e}"))
}

/// Sentence-transformer embeddings through ONNX Runtime.
///
/// The model directory holds `model.onnx` and the fast-tokenizer file
/// `tokenizer.json`. Token embeddings are mean-pooled over the attention
/// mask.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
}

// ort::Session is Send + Sync internally (uses Arc<SharedSessionInner>).
unsafe impl Send for OnnxEmbeddingService {}
unsafe impl Sync for OnnxEmbeddingService {}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingService {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn from_directory(model_dir: &Path) -> Result<Self, EmberError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, EmberError> {
        for (what, path) in [("model", model_path), ("tokenizer", tokenizer_path)] {
            if !path.is_file() {
                return Err(EmberError::Embedding(format!(
                    "{what} file missing: {}",
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(|e| onnx_err("session builder", e))?
            .with_intra_threads(1)
            .map_err(|e| onnx_err("session threads", e))?
            .commit_from_file(model_path)
            .map_err(|e| onnx_err("load model", e))?;

        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .and_then(|d| usize::try_from(d).ok())
            .filter(|&d| d > 0)
            .unwrap_or(MINILM_DIMENSIONS);

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| onnx_err("load tokenizer", e))?;

        info!(model = %model_path.display(), dimensions, "ONNX embedding model ready");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
        })
    }

    fn encode_blocking(&self, text: &str) -> Result<Vec<f32>, EmberError> {
        if text.trim().is_empty() {
            return Err(EmberError::Embedding("Cannot embed empty text".to_string()));
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| onnx_err("tokenize", e))?;
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        let row = |values: &[u32]| {
            ndarray::Array2::from_shape_vec(
                (1, values.len()),
                values.iter().map(|&v| v as i64).collect(),
            )
            .map_err(|e| onnx_err("input tensor", e))
        };
        let ids = row(encoding.get_ids())?;
        let attention = row(encoding.get_attention_mask())?;
        let type_ids = row(encoding.get_type_ids())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| onnx_err("session lock", e))?;
        let ids = TensorRef::from_array_view(&ids).map_err(|e| onnx_err("input_ids", e))?;
        let attention =
            TensorRef::from_array_view(&attention).map_err(|e| onnx_err("attention_mask", e))?;
        let type_ids =
            TensorRef::from_array_view(&type_ids).map_err(|e| onnx_err("token_type_ids", e))?;
        let outputs = session
            .run(ort::inputs![ids, attention, type_ids])
            .map_err(|e| onnx_err("inference", e))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| onnx_err("read output", e))?;
        let hidden = match shape.iter().copied().collect::<Vec<i64>>().as_slice() {
            [_, .., last] if *last > 0 => *last as usize,
            dims => {
                return Err(EmberError::Embedding(format!(
                    "unexpected output shape {dims:?}"
                )))
            }
        };

        let mut pooled = masked_mean_pool(data, &mask, hidden);
        l2_normalize(&mut pooled);
        Ok(pooled)
    }
}

/// Average the rows of a `[tokens, hidden]` buffer whose mask entry is set.
fn masked_mean_pool(token_embeddings: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut kept = 0usize;
    for (row, _) in token_embeddings
        .chunks_exact(hidden)
        .zip(mask)
        .filter(|(_, m)| **m > 0)
    {
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
        kept += 1;
    }
    if kept > 0 {
        let scale = 1.0 / kept as f32;
        pooled.iter_mut().for_each(|v| *v *= scale);
    }
    pooled
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmberError> {
        // Inference is CPU-bound.
        let service = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || service.encode_blocking(&text))
            .await
            .map_err(|e| onnx_err("embedding task", e))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// TermHashEmbedding - hashed bag of content terms
// ---------------------------------------------------------------------------

/// Minimum similarity that separates a real match from shared vocabulary
/// when questions are encoded with [`TermHashEmbedding`].
pub const TERM_HASH_THRESHOLD: f64 = 0.65;

/// Function words, question words, and words present in nearly every
/// question about the restaurant. They carry no signal for matching.
static STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "aren",
    "available", "barbeque", "been", "before", "being", "below", "between", "both", "but",
    "can", "cannot", "could", "did", "does", "doing", "don", "down", "during", "each", "few",
    "for", "from", "further", "get", "got", "had", "has", "have", "having", "her", "here",
    "hers", "him", "his", "how", "however", "into", "isn", "its", "itself", "just", "know",
    "let", "like", "more", "most", "much", "myself", "nation", "need", "nor", "not", "off",
    "once", "only", "other", "our", "ours", "out", "outlet", "outlets", "over", "own",
    "please", "restaurant", "restaurants", "same", "she", "should", "some", "such", "tell",
    "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they",
    "this", "those", "through", "too", "under", "until", "very", "want", "was", "were",
    "what", "whats", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours",
];

/// Strip `suffix` and append `replacement` if at least three characters remain.
fn replace_suffix(word: &str, suffix: &str, replacement: &str) -> Option<String> {
    let stem = word.strip_suffix(suffix)?;
    (stem.len() + replacement.len() >= 3).then(|| format!("{stem}{replacement}"))
}

/// Light suffix stemming so plural, tense, and British spellings meet.
///
/// Applied identically to indexed questions and live questions, so the
/// stems only need to be consistent, not real words.
fn stem(word: &str) -> String {
    let mut w = word.to_string();

    let plural = if w.ends_with("ies") {
        replace_suffix(&w, "ies", "y")
    } else if w.ends_with("sses") {
        replace_suffix(&w, "es", "")
    } else if ["ches", "shes", "xes", "zes"].iter().any(|s| w.ends_with(s)) {
        replace_suffix(&w, "es", "")
    } else if w.ends_with('s') && !["ss", "us", "is"].iter().any(|s| w.ends_with(s)) {
        replace_suffix(&w, "s", "")
    } else {
        None
    };
    if let Some(p) = plural {
        w = p;
    }

    if let Some(t) = ["ing", "ed"].iter().find_map(|s| {
        if w.ends_with(s) {
            replace_suffix(&w, s, "")
        } else {
            None
        }
    }) {
        w = t;
    }
    if let Some(t) = replace_suffix(&w, "e", "") {
        w = t;
    }
    // flavour -> flavor
    if w.len() > 5 && w.ends_with("our") {
        w.truncate(w.len() - 3);
        w.push_str("or");
    }
    w
}

/// Hashed bag-of-terms embedding.
///
/// Text is lowercased and split on anything that is not a letter or digit.
/// Words shorter than three characters and stop words are dropped, the rest
/// are stemmed. Each stem adds 1.0 to a bucket chosen from its SHA-256
/// digest, so vectors are identical across platforms and toolchains.
///
/// Scores from this backend run higher than sentence-embedding scores for
/// unrelated text; pair it with [`TERM_HASH_THRESHOLD`].
#[derive(Debug, Clone)]
pub struct TermHashEmbedding {
    dimensions: usize,
}

impl TermHashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// The stems that `text` contributes to its vector.
    pub fn terms(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(w))
            .map(stem)
            .collect()
    }

    fn bucket(&self, term: &str) -> usize {
        let digest = Sha256::digest(term.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmberError> {
        if text.trim().is_empty() {
            return Err(EmberError::Embedding("Cannot embed empty text".to_string()));
        }

        let terms = Self::terms(text);
        if terms.is_empty() {
            return Err(EmberError::Embedding(format!(
                "No indexable terms in {:?}",
                text
            )));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for term in &terms {
            vector[self.bucket(term)] += 1.0;
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl Default for TermHashEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for TermHashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmberError> {
        self.encode(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
