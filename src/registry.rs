//! Session registry: session bookkeeping, document ingestion, and
//! cascade deletion.
//!
//! The registry owns the collaborator seams (blob store, vector index,
//! extractor, embedding and completion providers) and orchestrates the
//! full ingestion flow:
//!
//! ```text
//! bytes ──▶ extract ──▶ assign bucket ──▶ chunk ──▶ embed ──▶ upsert
//!                │                                              │
//!                └── session lock ──────────────────────────────┘
//! ```
//!
//! # Storage layout
//!
//! | Key | Contents |
//! |-----|----------|
//! | `session_metadata/<id>.json` | [`Session`] record |
//! | `sessions/<id>/bucket<N>/<doc_id>_<filename>` | raw document payload |
//! | `metadata/<doc_id>.json` | [`Document`] record |
//! | `metadata/<doc_id>/chunk_<i>.json` | [`Chunk`] records with embeddings |
//!
//! The vector-index namespace for a bucket is its full folder path,
//! `sessions/<id>/bucket<N>`.
//!
//! # Concurrency
//!
//! Each session has an exclusive `tokio::Mutex`; every mutation
//! (placement, deletion, counter advance) runs under it, so concurrent
//! uploads into the same session serialize and never allocate the same
//! bucket number. Cross-session operations do not contend.
//!
//! Document and bucket counts are recomputed by full rescans of the
//! session's blobs rather than maintained incrementally — correctness
//! over performance, acceptable for sessions with modest document
//! counts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::assign::{
    bucket_number, fallback_assignment, BucketAssigner, BucketSnapshot, MemberDocument,
};
use crate::blobstore::{BlobStore, LocalBlobStore, MemoryBlobStore};
use crate::chunk::chunk_text;
use crate::completion::ChatCompletionProvider;
use crate::config::Config;
use crate::embedding::{embed_corpus, EmbeddingProvider};
use crate::extract::{MultiFormatExtractor, TextExtractor};
use crate::index::{create_index, VectorIndex, VectorMetadata, VectorRecord};
use crate::models::{
    AssignmentResult, BucketStats, Chunk, Document, DocumentRef, Session, SessionDeletionReport,
};
use crate::s3::S3BlobStore;
use crate::similarity::SimilarityEngine;

/// Prefix under which session folders live.
pub const SESSIONS_FOLDER: &str = "sessions";
/// Prefix under which session records live.
pub const SESSION_METADATA_FOLDER: &str = "session_metadata";
/// Prefix under which per-document records live.
pub const DOC_METADATA_FOLDER: &str = "metadata";

/// Vector metadata keeps only the head of each chunk's text.
const VECTOR_TEXT_LIMIT: usize = 500;

/// The external collaborators the core depends on, constructed once
/// from configuration and injected everywhere.
pub struct Collaborators {
    pub blob: Arc<dyn BlobStore>,
    pub index: Arc<dyn VectorIndex>,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub completion: Arc<dyn ChatCompletionProvider>,
}

impl Collaborators {
    /// Build the collaborator bundle named in the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let blob: Arc<dyn BlobStore> = match config.blobstore.backend.as_str() {
            "local" => Arc::new(LocalBlobStore::new(config.blobstore.root.clone())?),
            "s3" => Arc::new(S3BlobStore::new(&config.blobstore)?),
            "memory" => Arc::new(MemoryBlobStore::new()),
            other => anyhow::bail!("Unknown blobstore backend: {}", other),
        };

        Ok(Self {
            blob,
            index: Arc::from(create_index(&config.index)?),
            extractor: Arc::new(MultiFormatExtractor),
            embedder: Arc::from(crate::embedding::create_provider(&config.embedding)?),
            completion: Arc::from(crate::completion::create_provider(&config.completion)?),
        })
    }
}

/// Fields a session update may change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub active: Option<bool>,
    pub preprocessing: Option<String>,
    pub preprocessing_model: Option<String>,
}

/// Manages sessions, their buckets, and document membership.
pub struct SessionRegistry {
    blob: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn ChatCompletionProvider>,
    assigner: BucketAssigner,
    engine: SimilarityEngine,
    default_threshold: f64,
    chunk_size: usize,
    overlap: usize,
    batch_size: usize,
    batch_delay: Duration,
    sample_limit: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new(collab: Collaborators, config: &Config) -> Self {
        let engine = SimilarityEngine::new(collab.embedder.clone(), collab.completion.clone());
        let assigner = BucketAssigner::new(
            SimilarityEngine::new(collab.embedder.clone(), collab.completion.clone()),
            config.clustering.high_confidence,
            Duration::from_millis(config.clustering.scan_budget_ms),
        );

        Self {
            blob: collab.blob,
            index: collab.index,
            extractor: collab.extractor,
            embedder: collab.embedder,
            completion: collab.completion,
            assigner,
            engine,
            default_threshold: config.clustering.default_threshold,
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size,
            batch_delay: Duration::from_millis(config.embedding.batch_delay_ms),
            sample_limit: config.clustering.sample_limit,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The exclusive lock for one session's mutable state.
    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ============ Session CRUD ============

    /// Create a new session with a generated identifier and zeroed
    /// counters.
    pub async fn create_session(
        &self,
        name: &str,
        description: Option<String>,
        similarity_threshold: Option<f64>,
        preprocessing: Option<String>,
        preprocessing_model: Option<String>,
    ) -> Result<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = Session {
            folder_path: format!("{}/{}", SESSIONS_FOLDER, id),
            id,
            name: name.to_string(),
            description,
            similarity_threshold: similarity_threshold.unwrap_or(self.default_threshold),
            preprocessing,
            preprocessing_model,
            active: true,
            created_at: now,
            updated_at: now,
            document_count: 0,
            folder_count: 0,
            next_bucket: 1,
        };
        self.save_session(&session).await?;
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        let key = session_key(session_id);
        let bytes = self
            .blob
            .get(&key)
            .await
            .with_context(|| format!("Session not found: {}", session_id))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt session record: {}", session_id))
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let bytes = serde_json::to_vec(session)?;
        self.blob.put(&session_key(&session.id), &bytes).await
    }

    /// List all sessions, newest first. Unreadable records are skipped
    /// with a warning.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let keys = self
            .blob
            .list(&format!("{}/", SESSION_METADATA_FOLDER))
            .await?;

        let mut sessions = Vec::new();
        for key in keys.iter().filter(|k| k.ends_with(".json")) {
            match self.blob.get(key).await.and_then(|bytes| {
                serde_json::from_slice::<Session>(&bytes).map_err(anyhow::Error::from)
            }) {
                Ok(session) => sessions.push(session),
                Err(e) => eprintln!("Warning: skipping unreadable session record {}: {}", key, e),
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Apply a partial update to a session's metadata.
    pub async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<Session> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.get_session(session_id).await?;
        if let Some(name) = update.name {
            session.name = name;
        }
        if let Some(description) = update.description {
            session.description = Some(description);
        }
        if let Some(threshold) = update.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("similarity_threshold must be in [0.0, 1.0]");
            }
            session.similarity_threshold = threshold;
        }
        if let Some(active) = update.active {
            session.active = active;
        }
        if let Some(preprocessing) = update.preprocessing {
            session.preprocessing = Some(preprocessing);
        }
        if let Some(model) = update.preprocessing_model {
            session.preprocessing_model = Some(model);
        }
        session.updated_at = Utc::now();

        self.save_session(&session).await?;
        Ok(session)
    }

    // ============ Buckets and documents ============

    /// Bucket names of a session, in creation (number) order.
    pub async fn session_buckets(&self, session: &Session) -> Result<Vec<String>> {
        let prefix = format!("{}/", session.folder_path);
        let keys = self.blob.list(&prefix).await?;

        let mut buckets: Vec<String> = Vec::new();
        for key in keys {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            // Only paths with a payload below the bucket level count.
            if let Some((bucket, _)) = rest.split_once('/') {
                if !bucket.is_empty() && !buckets.iter().any(|b| b == bucket) {
                    buckets.push(bucket.to_string());
                }
            }
        }

        buckets.sort_by_key(|name| (bucket_number(name).unwrap_or(u64::MAX), name.clone()));
        Ok(buckets)
    }

    /// Documents stored in one bucket of a session.
    pub async fn bucket_documents(
        &self,
        session: &Session,
        bucket: &str,
    ) -> Result<Vec<DocumentRef>> {
        let prefix = format!("{}/{}/", session.folder_path, bucket);
        let keys = self.blob.list(&prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|key| parse_document_key(key, &session.folder_path))
            .collect())
    }

    /// All documents in a session across all buckets.
    pub async fn session_documents(&self, session_id: &str) -> Result<Vec<DocumentRef>> {
        let session = self.get_session(session_id).await?;
        let mut documents = Vec::new();
        for bucket in self.session_buckets(&session).await? {
            documents.extend(self.bucket_documents(&session, &bucket).await?);
        }
        Ok(documents)
    }

    /// Per-bucket statistics for a session.
    pub async fn bucket_stats(&self, session_id: &str) -> Result<Vec<BucketStats>> {
        let session = self.get_session(session_id).await?;
        let mut stats = Vec::new();
        for bucket in self.session_buckets(&session).await? {
            let documents = self.bucket_documents(&session, &bucket).await?;
            stats.push(BucketStats {
                name: bucket,
                document_count: documents.len(),
                documents,
            });
        }
        Ok(stats)
    }

    /// Fetch a document record by id.
    pub async fn get_document(&self, doc_id: &str) -> Result<Document> {
        let bytes = self
            .blob
            .get(&document_key(doc_id))
            .await
            .with_context(|| format!("Document not found: {}", doc_id))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt document record: {}", doc_id))
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        self.blob.put(&document_key(&document.id), &bytes).await
    }

    /// Load the stored payload of a document and extract its text.
    async fn document_text(&self, doc: &DocumentRef) -> Result<String> {
        let bytes = self.blob.get(&doc.key).await?;
        self.extractor
            .extract(&bytes, &doc.filename)
            .map_err(|e| anyhow!("extraction failed for {}: {}", doc.filename, e))
    }

    /// Load comparison targets for every bucket: up to `sample_limit`
    /// members each, skipping members whose text cannot be loaded.
    async fn load_snapshots(&self, session: &Session) -> Result<Vec<BucketSnapshot>> {
        let mut snapshots = Vec::new();
        for bucket in self.session_buckets(session).await? {
            let refs = self.bucket_documents(session, &bucket).await?;
            let mut members = Vec::new();
            for doc in refs.into_iter().take(self.sample_limit) {
                match self.document_text(&doc).await {
                    Ok(text) => members.push(MemberDocument {
                        id: doc.id,
                        filename: doc.filename,
                        text,
                    }),
                    Err(e) => {
                        eprintln!("Warning: skipping unreadable member {}: {}", doc.id, e);
                    }
                }
            }
            snapshots.push(BucketSnapshot {
                name: bucket,
                members,
            });
        }
        Ok(snapshots)
    }

    // ============ Ingestion ============

    /// Ingest a document into a session: extract, place into a bucket,
    /// chunk, embed, and index.
    ///
    /// Clustering failures never fail ingestion (the document degrades
    /// into a fresh bucket). Embedding or index failures are recorded on
    /// the document's status and warned, leaving the placement intact.
    pub async fn ingest_document(
        &self,
        session_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<(Document, AssignmentResult)> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.get_session(session_id).await?;

        let text = self
            .extractor
            .extract(content, filename)
            .map_err(|e| anyhow!("extraction failed for {}: {}", filename, e))?;

        // The counter may trail reality for records written before it
        // existed; never fall below the highest stored bucket.
        let buckets = self.session_buckets(&session).await.unwrap_or_default();
        let highest = buckets.iter().filter_map(|b| bucket_number(b)).max();
        let next_bucket = session.next_bucket.max(highest.unwrap_or(0) + 1);

        let assignment = match self.load_snapshots(&session).await {
            Ok(snapshots) => {
                self.assigner
                    .assign(&session, &snapshots, next_bucket, &text, filename)
                    .await
            }
            Err(e) => {
                eprintln!("Warning: similarity scan failed: {}", e);
                fallback_assignment(session.similarity_threshold, next_bucket, &e.to_string())
            }
        };

        let bucket = assignment.bucket_name.clone();
        let folder_path = format!("{}/{}", session.folder_path, bucket);
        let doc_id = Uuid::new_v4().to_string();

        let payload_key = format!("{}/{}_{}", folder_path, doc_id, filename);
        self.blob.put(&payload_key, content).await?;

        let chunking = chunk_text(&text, self.chunk_size, self.overlap);

        let mut document = Document {
            id: doc_id,
            filename: filename.to_string(),
            session_id: session.id.clone(),
            bucket,
            folder_path: folder_path.clone(),
            size: content.len(),
            text_length: text.chars().count(),
            chunk_count: chunking.chunks.len(),
            created_at: Utc::now(),
            processed: false,
            processing: true,
            error: None,
        };
        self.save_document(&document).await?;

        match self
            .store_chunk_vectors(&document, &chunking.chunks, &folder_path)
            .await
        {
            Ok(()) => {
                document.processed = true;
                document.processing = false;
            }
            Err(e) => {
                eprintln!("Warning: embedding/indexing failed for {}: {}", document.id, e);
                document.processing = false;
                document.error = Some(e.to_string());
            }
        }
        self.save_document(&document).await?;

        if assignment.is_new_bucket {
            session.next_bucket = next_bucket + 1;
        } else {
            session.next_bucket = next_bucket;
        }
        if let Err(e) = self.refresh_counts(&mut session).await {
            eprintln!("Warning: failed to refresh session counts: {}", e);
        }
        session.updated_at = Utc::now();
        self.save_session(&session).await?;

        Ok((document, assignment))
    }

    /// Embed chunks in batches, persist the chunk records, and upsert
    /// their vectors under the bucket's namespace.
    async fn store_chunk_vectors(
        &self,
        document: &Document,
        chunks: &[String],
        namespace: &str,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let vectors = embed_corpus(
            self.embedder.as_ref(),
            chunks,
            self.batch_size,
            self.batch_delay,
        )
        .await?;

        let mut records: Vec<VectorRecord> = Vec::with_capacity(chunks.len());
        for (i, (text, values)) in chunks.iter().zip(vectors).enumerate() {
            let chunk = Chunk {
                document_id: document.id.clone(),
                chunk_index: i,
                text: text.clone(),
                embedding: Some(values.clone()),
            };
            let chunk_key = format!("{}/{}/chunk_{}.json", DOC_METADATA_FOLDER, document.id, i);
            self.blob.put(&chunk_key, &serde_json::to_vec(&chunk)?).await?;

            records.push(VectorRecord {
                id: format!("{}_{}", document.id, i),
                values,
                metadata: VectorMetadata {
                    doc_id: document.id.clone(),
                    chunk_index: i,
                    text: text.chars().take(VECTOR_TEXT_LIMIT).collect(),
                    filename: document.filename.clone(),
                },
            });
        }

        for batch in records.chunks(self.batch_size.max(1)) {
            self.index.upsert(namespace, batch).await?;
        }
        Ok(())
    }

    /// Recompute the cached document and bucket counts by a full rescan.
    async fn refresh_counts(&self, session: &mut Session) -> Result<()> {
        let buckets = self.session_buckets(session).await?;
        let mut document_count = 0;
        for bucket in &buckets {
            document_count += self.bucket_documents(session, bucket).await?.len();
        }
        session.document_count = document_count;
        session.folder_count = buckets.len();
        Ok(())
    }

    // ============ Comparison and question answering ============

    /// Score two raw texts with the given method.
    pub async fn compare_texts(
        &self,
        a: &str,
        b: &str,
        method: crate::similarity::SimilarityMethod,
    ) -> Result<crate::similarity::SimilarityResult> {
        self.engine.compare(a, b, method).await
    }

    /// Answer a question against a session's documents.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        top_k: Option<usize>,
        model: Option<&str>,
    ) -> Result<crate::qa::QuestionAnswer> {
        let session = self.get_session(session_id).await?;
        let buckets = self.session_buckets(&session).await?;
        crate::qa::answer_question(
            &self.embedder,
            &self.index,
            &self.completion,
            &session,
            &buckets,
            question,
            top_k,
            model,
        )
        .await
    }

    /// List all namespaces currently held by the vector index.
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.index.list_namespaces().await
    }

    // ============ Deletion ============

    /// Delete a session and cascade to its buckets, documents, vectors,
    /// and namespaces.
    ///
    /// Every step is best-effort: a failing step is recorded on the
    /// report and the remaining steps still run, so a session deletion
    /// cannot get stuck on one unreachable subsystem.
    pub async fn delete_session(&self, session_id: &str) -> Result<SessionDeletionReport> {
        let session = self.get_session(session_id).await?;

        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut report = SessionDeletionReport::new(session_id);

        let all_namespaces = match self.index.list_namespaces().await {
            Ok(names) => {
                report.record("list_namespaces", Ok(()));
                names
            }
            Err(e) => {
                report.record("list_namespaces", Err(e));
                Vec::new()
            }
        };

        let documents = self.session_documents(session_id).await.unwrap_or_default();
        let buckets = self.session_buckets(&session).await.unwrap_or_default();

        // Step 1: per-document vector deletes under the standard
        // namespace, with a back-compat attempt under the bare bucket
        // name for vectors written by older layouts.
        let mut failed_docs = 0usize;
        for doc in &documents {
            let namespace = format!("{}/{}", session.folder_path, doc.bucket);
            if let Err(e) = self.index.delete_document(&namespace, &doc.id).await {
                eprintln!("Warning: failed to delete vectors for {}: {}", doc.id, e);
                failed_docs += 1;
            }
            // Legacy format failures are ignored outright.
            let _ = self.index.delete_document(&doc.bucket, &doc.id).await;
        }
        report.record(
            "document_vectors",
            if failed_docs == 0 {
                Ok(())
            } else {
                Err(anyhow!("{}/{} documents failed", failed_docs, documents.len()))
            },
        );

        // Step 2: namespace deletes for every bucket (standard path and
        // bare name), plus the session folder itself.
        let mut targets: Vec<String> = Vec::new();
        for bucket in &buckets {
            targets.push(format!("{}/{}", session.folder_path, bucket));
            targets.push(bucket.clone());
        }
        targets.push(session.folder_path.clone());

        let mut deleted: Vec<String> = Vec::new();
        let mut failed_namespaces = 0usize;
        for namespace in &targets {
            if !all_namespaces.contains(namespace) {
                continue;
            }
            match self.index.delete_namespace(namespace).await {
                Ok(()) => deleted.push(namespace.clone()),
                Err(e) => {
                    eprintln!("Warning: failed to delete namespace '{}': {}", namespace, e);
                    failed_namespaces += 1;
                }
            }
        }
        report.record(
            "bucket_namespaces",
            if failed_namespaces == 0 {
                Ok(())
            } else {
                Err(anyhow!("{} namespaces failed", failed_namespaces))
            },
        );

        // Step 3: defensive sweep for any namespace that merely contains
        // the session id, catching historical naming schemes.
        let mut swept_failures = 0usize;
        for namespace in &all_namespaces {
            if namespace.contains(session_id) && !deleted.contains(namespace) {
                if let Err(e) = self.index.delete_namespace(namespace).await {
                    eprintln!("Warning: sweep failed for namespace '{}': {}", namespace, e);
                    swept_failures += 1;
                }
            }
        }
        report.record(
            "namespace_sweep",
            if swept_failures == 0 {
                Ok(())
            } else {
                Err(anyhow!("{} namespaces failed", swept_failures))
            },
        );

        // Step 4: document metadata and chunk records.
        let mut failed_meta = 0usize;
        for doc in &documents {
            let prefix = format!("{}/{}", DOC_METADATA_FOLDER, doc.id);
            if let Err(e) = self.blob.delete_prefix(&prefix).await {
                eprintln!("Warning: failed to delete metadata for {}: {}", doc.id, e);
                failed_meta += 1;
            }
        }
        report.record(
            "document_metadata",
            if failed_meta == 0 {
                Ok(())
            } else {
                Err(anyhow!("{} records failed", failed_meta))
            },
        );

        // Step 5: the session's blob folder.
        report.record(
            "session_blobs",
            self.blob.delete_prefix(&session.folder_path).await,
        );

        // Step 6: the session record itself.
        report.record(
            "session_metadata",
            self.blob.delete_prefix(&session_key(session_id)).await,
        );

        Ok(report)
    }
}

fn session_key(session_id: &str) -> String {
    format!("{}/{}.json", SESSION_METADATA_FOLDER, session_id)
}

fn document_key(doc_id: &str) -> String {
    format!("{}/{}.json", DOC_METADATA_FOLDER, doc_id)
}

/// Parse a payload key `<session_folder>/<bucket>/<doc_id>_<filename>`
/// into a [`DocumentRef`].
fn parse_document_key(key: &str, session_folder: &str) -> Option<DocumentRef> {
    let rest = key.strip_prefix(session_folder)?.strip_prefix('/')?;
    let (bucket, file) = rest.split_once('/')?;
    if file.is_empty() || file.contains('/') {
        return None;
    }
    let (id, filename) = file.split_once('_')?;
    Some(DocumentRef {
        id: id.to_string(),
        filename: filename.to_string(),
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_key() {
        let doc = parse_document_key(
            "sessions/s1/bucket2/abc-123_report.pdf",
            "sessions/s1",
        )
        .unwrap();
        assert_eq!(doc.id, "abc-123");
        assert_eq!(doc.filename, "report.pdf");
        assert_eq!(doc.bucket, "bucket2");
        assert_eq!(doc.key, "sessions/s1/bucket2/abc-123_report.pdf");
    }

    #[test]
    fn test_parse_document_key_rejects_foreign_and_nested_keys() {
        assert!(parse_document_key("sessions/s2/bucket1/a_b.txt", "sessions/s1").is_none());
        assert!(parse_document_key("sessions/s1/bucket1/sub/a_b.txt", "sessions/s1").is_none());
        assert!(parse_document_key("sessions/s1/bucket1/noseparator", "sessions/s1").is_none());
    }

    #[test]
    fn test_session_and_document_keys() {
        assert_eq!(session_key("s1"), "session_metadata/s1.json");
        assert_eq!(document_key("d1"), "metadata/d1.json");
    }
}
