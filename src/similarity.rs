//! Document similarity scoring.
//!
//! The [`SimilarityEngine`] scores a pair of texts with one of four
//! methods:
//!
//! | Method | Score |
//! |--------|-------|
//! | `embedding` | Cosine similarity of whole-document embeddings |
//! | `text` | Jaccard coefficient over lowercased token sets |
//! | `hybrid` | Arithmetic mean of the two above |
//! | `chunked` | Top-quartile mean of pairwise chunk-embedding cosines |
//!
//! A zero-magnitude vector or an empty token set always scores `0.0` —
//! never NaN, never an error. In hybrid mode an embedding-provider
//! failure degrades the embedding component to `0.0` instead of aborting,
//! since the lexical component is always computable locally.
//!
//! The `chunked` method bounds cost for large documents: when the number
//! of chunk pairs exceeds [`MAX_CHUNK_PAIRS`], each side is randomly
//! sampled down to at most [`MAX_SAMPLED_CHUNKS`] chunks before pairing.
//! The top quartile aggregation is robust to length mismatch and noisy
//! outlier chunks; the best individual pairs are kept as evidence.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::chunk::chunk_with_defaults;
use crate::completion::ChatCompletionProvider;
use crate::embedding::EmbeddingProvider;

/// Pair-count threshold above which chunked comparison samples chunks.
pub const MAX_CHUNK_PAIRS: usize = 2_500;

/// Per-side chunk cap applied when sampling kicks in.
pub const MAX_SAMPLED_CHUNKS: usize = 50;

/// Number of best chunk pairs retained as evidence in the result.
const TOP_PAIR_EVIDENCE: usize = 10;

/// Similarity scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMethod {
    Embedding,
    Text,
    Hybrid,
    Chunked,
}

impl SimilarityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::Embedding => "embedding",
            SimilarityMethod::Text => "text",
            SimilarityMethod::Hybrid => "hybrid",
            SimilarityMethod::Chunked => "chunked",
        }
    }
}

impl FromStr for SimilarityMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "embedding" => Ok(SimilarityMethod::Embedding),
            "text" => Ok(SimilarityMethod::Text),
            "hybrid" => Ok(SimilarityMethod::Hybrid),
            "chunked" => Ok(SimilarityMethod::Chunked),
            other => bail!(
                "Unknown similarity method: {}. Use embedding, text, hybrid, or chunked.",
                other
            ),
        }
    }
}

/// One scored chunk pair kept as evidence by the `chunked` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPairScore {
    /// Chunk index within document A.
    pub chunk_a: usize,
    /// Chunk index within document B.
    pub chunk_b: usize,
    pub score: f64,
}

/// Result of a similarity computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Overall score for the requested method, in `[0, 1]`.
    pub similarity: f64,
    /// Embedding submetric (`0.0` when not computed or degraded).
    pub embedding_similarity: f64,
    /// Lexical submetric (`0.0` when not computed).
    pub text_similarity: f64,
    pub method: String,
    pub elapsed_ms: u64,
    /// Best chunk pairs, populated by the `chunked` method only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_pairs: Vec<ChunkPairScore>,
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, mismatched lengths, or zero
/// magnitude — never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Compute the Jaccard coefficient over lowercased whitespace tokens.
///
/// Returns `0.0` when both token sets are empty.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / union as f64
}

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Scores text pairs using the configured embedding and completion
/// collaborators.
pub struct SimilarityEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn ChatCompletionProvider>,
}

impl SimilarityEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn ChatCompletionProvider>,
    ) -> Self {
        Self {
            embedder,
            completion,
        }
    }

    /// Score two texts with the given method.
    ///
    /// Errors only when the method itself cannot produce a score (e.g.
    /// the embedding provider fails for a pure `embedding` comparison).
    /// Hybrid comparisons degrade instead of failing.
    pub async fn compare(
        &self,
        a: &str,
        b: &str,
        method: SimilarityMethod,
    ) -> Result<SimilarityResult> {
        let started = Instant::now();

        let mut result = SimilarityResult {
            similarity: 0.0,
            embedding_similarity: 0.0,
            text_similarity: 0.0,
            method: method.as_str().to_string(),
            elapsed_ms: 0,
            top_pairs: Vec::new(),
        };

        match method {
            SimilarityMethod::Text => {
                result.text_similarity = jaccard_similarity(a, b);
                result.similarity = result.text_similarity;
            }
            SimilarityMethod::Embedding => {
                result.embedding_similarity = self.embedding_pair(a, b).await?;
                result.similarity = result.embedding_similarity;
            }
            SimilarityMethod::Hybrid => {
                result.text_similarity = jaccard_similarity(a, b);
                result.embedding_similarity = match self.embedding_pair(a, b).await {
                    Ok(score) => score,
                    Err(e) => {
                        eprintln!("Warning: embedding similarity degraded to 0.0: {}", e);
                        0.0
                    }
                };
                result.similarity = (result.text_similarity + result.embedding_similarity) / 2.0;
            }
            SimilarityMethod::Chunked => {
                let (score, pairs) = self.chunked_pair(a, b).await?;
                result.embedding_similarity = score;
                result.similarity = score;
                result.top_pairs = pairs;
            }
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Score two texts after optionally running a preprocessing
    /// instruction over both.
    ///
    /// A preprocessing failure is non-fatal: scoring proceeds with the
    /// original, unmodified text.
    pub async fn compare_preprocessed(
        &self,
        a: &str,
        b: &str,
        method: SimilarityMethod,
        instruction: Option<&str>,
        model: Option<&str>,
    ) -> Result<SimilarityResult> {
        match instruction {
            None => self.compare(a, b, method).await,
            Some(instruction) => {
                let model = model.unwrap_or_else(|| self.completion.default_model());
                let a = self.preprocess(a, instruction, model).await;
                let b = self.preprocess(b, instruction, model).await;
                self.compare(&a, &b, method).await
            }
        }
    }

    async fn preprocess(&self, text: &str, instruction: &str, model: &str) -> String {
        let prompt = format!(
            "{}\n\nApply the instruction above to the following text and \
             return only the transformed text.\n\n{}",
            instruction, text
        );
        match self.completion.complete(&prompt, model).await {
            Ok(transformed) if !transformed.trim().is_empty() => transformed,
            Ok(_) => text.to_string(),
            Err(e) => {
                eprintln!("Warning: similarity preprocessing failed, using original text: {}", e);
                text.to_string()
            }
        }
    }

    async fn embedding_pair(&self, a: &str, b: &str) -> Result<f64> {
        let vectors = self
            .embedder
            .embed(&[a.to_string(), b.to_string()])
            .await?;
        if vectors.len() != 2 {
            bail!("embedding provider returned {} vectors for 2 inputs", vectors.len());
        }
        Ok(cosine_similarity(&vectors[0], &vectors[1]))
    }

    /// Chunk-level comparison for large documents.
    ///
    /// Embeds every chunk of both sides (sampling first when the pair
    /// count would exceed [`MAX_CHUNK_PAIRS`]), scores all pairs by
    /// cosine, and aggregates the top quartile.
    async fn chunked_pair(&self, a: &str, b: &str) -> Result<(f64, Vec<ChunkPairScore>)> {
        let chunks_a = chunk_with_defaults(a);
        let chunks_b = chunk_with_defaults(b);
        if chunks_a.is_empty() || chunks_b.is_empty() {
            return Ok((0.0, Vec::new()));
        }

        let (indices_a, indices_b) = sample_indices(chunks_a.len(), chunks_b.len());

        let texts_a: Vec<String> = indices_a.iter().map(|&i| chunks_a[i].clone()).collect();
        let texts_b: Vec<String> = indices_b.iter().map(|&i| chunks_b[i].clone()).collect();

        let vectors_a = self.embedder.embed(&texts_a).await?;
        let vectors_b = self.embedder.embed(&texts_b).await?;

        let mut scored: Vec<ChunkPairScore> = Vec::with_capacity(vectors_a.len() * vectors_b.len());
        for (ai, va) in indices_a.iter().zip(vectors_a.iter()) {
            for (bi, vb) in indices_b.iter().zip(vectors_b.iter()) {
                scored.push(ChunkPairScore {
                    chunk_a: *ai,
                    chunk_b: *bi,
                    score: cosine_similarity(va, vb),
                });
            }
        }

        scored.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let quartile = (scored.len() / 4).max(1);
        let score = scored[..quartile].iter().map(|p| p.score).sum::<f64>() / quartile as f64;

        let mut evidence = scored;
        evidence.truncate(TOP_PAIR_EVIDENCE);

        Ok((score, evidence))
    }
}

/// Pick the chunk indices to compare on each side.
///
/// All pairs are compared when the cross product fits under
/// [`MAX_CHUNK_PAIRS`]; otherwise each side is shuffled and truncated to
/// [`MAX_SAMPLED_CHUNKS`] indices (returned sorted for deterministic
/// embed ordering).
fn sample_indices(len_a: usize, len_b: usize) -> (Vec<usize>, Vec<usize>) {
    if len_a * len_b <= MAX_CHUNK_PAIRS {
        return ((0..len_a).collect(), (0..len_b).collect());
    }

    let mut rng = rand::rng();

    let mut pick = |len: usize| -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(&mut rng);
        indices.truncate(MAX_SAMPLED_CHUNKS);
        indices.sort_unstable();
        indices
    };

    (pick(len_a), pick(len_b))
}
