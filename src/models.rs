//! Core data models used throughout Corral.
//!
//! These types represent the sessions, documents, chunks, and clustering
//! audit records that flow through the ingestion and assignment pipeline.
//! Everything here is serialized to JSON blobs by the [`crate::registry`]
//! module, so all types derive `Serialize`/`Deserialize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document processing session: a container with its own similarity
/// threshold, optional preprocessing instruction, and set of buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Hybrid-similarity score a new document must reach to join an
    /// existing bucket, in `[0, 1]`.
    pub similarity_threshold: f64,
    /// Optional instruction applied to both texts before scoring
    /// (e.g. "strip boilerplate headers and footers").
    #[serde(default)]
    pub preprocessing: Option<String>,
    /// Completion model used to run the preprocessing instruction.
    #[serde(default)]
    pub preprocessing_model: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Blob-store prefix owning all of this session's buckets
    /// (`sessions/<id>`).
    pub folder_path: String,
    /// Cached count, recomputed by full rescan on every placement.
    pub document_count: usize,
    /// Cached bucket count, recomputed alongside `document_count`.
    pub folder_count: usize,
    /// Monotonic bucket-number allocator. Advanced under the session's
    /// exclusive lock; never reused, even after bucket deletions.
    #[serde(default = "default_next_bucket")]
    pub next_bucket: u64,
}

fn default_next_bucket() -> u64 {
    1
}

/// A document placed into a session bucket. Immutable once placed; only
/// the processing-status fields are updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub session_id: String,
    /// Bucket name within the session (`bucket<N>`).
    pub bucket: String,
    /// Full blob-store prefix, also used as the vector-index namespace:
    /// `<session_folder>/<bucket>`.
    pub folder_path: String,
    /// Uploaded payload size in bytes.
    pub size: usize,
    /// Length of the extracted text in characters.
    pub text_length: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub processing: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// A chunk of a document's extracted text, produced once by the chunker
/// and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// Populated after the embedding pass; `None` until then.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// One scored comparison between the incoming document and an existing
/// bucket member, recorded in the [`SimilarityLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub candidate_id: String,
    pub candidate_name: String,
    pub target_id: String,
    pub target_name: String,
    pub bucket: String,
    pub method: String,
    pub score: f64,
    /// `"match"` when the score reached the session threshold,
    /// `"below threshold"` otherwise.
    pub decision: String,
}

/// Per-placement audit record: every comparison performed, every bucket
/// inspected, and the final decision. This is the only audit trail for
/// clustering decisions, so it is never discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityLog {
    pub comparisons: Vec<Comparison>,
    pub buckets_scanned: Vec<String>,
    pub final_bucket: String,
    pub is_new_bucket: bool,
    pub placement_reason: String,
    pub threshold: f64,
}

/// Outcome of a bucket-assignment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub bucket_name: String,
    pub is_new_bucket: bool,
    pub placement_reason: String,
    pub similarity_log: SimilarityLog,
}

/// One step of the best-effort session-deletion cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionStep {
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Report of which cascade steps succeeded or failed when deleting a
/// session. A failed step never blocks the remaining steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDeletionReport {
    pub session_id: String,
    pub steps: Vec<DeletionStep>,
}

impl SessionDeletionReport {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, result: Result<(), anyhow::Error>) {
        let name = name.into();
        match result {
            Ok(()) => self.steps.push(DeletionStep {
                name,
                ok: true,
                detail: None,
            }),
            Err(e) => {
                eprintln!("Warning: session deletion step '{}' failed: {}", name, e);
                self.steps.push(DeletionStep {
                    name,
                    ok: false,
                    detail: Some(e.to_string()),
                });
            }
        }
    }

    /// True when every cascade step succeeded.
    pub fn fully_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

/// Per-bucket statistics returned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketStats {
    pub name: String,
    pub document_count: usize,
    pub documents: Vec<DocumentRef>,
}

/// Lightweight pointer to a stored document, parsed from its blob key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub filename: String,
    pub bucket: String,
    /// Full blob key of the stored payload.
    pub key: String,
}
