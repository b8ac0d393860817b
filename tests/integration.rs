//! End-to-end pipeline tests over in-memory collaborators.
//!
//! The embedding fake returns the same unit vector for every text, so
//! hybrid similarity reduces to `(1 + jaccard) / 2` — which makes the
//! clustering decisions in these tests exact arithmetic over token
//! overlap instead of model behavior.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use corral::blobstore::{BlobStore, MemoryBlobStore};
use corral::completion::ChatCompletionProvider;
use corral::config::Config;
use corral::embedding::EmbeddingProvider;
use corral::extract::MultiFormatExtractor;
use corral::index::{MemoryVectorIndex, VectorIndex, VectorMatch, VectorRecord};
use corral::registry::{Collaborators, SessionRegistry};

// ============ Fakes ============

struct ConstantEmbedder;

#[async_trait]
impl EmbeddingProvider for ConstantEmbedder {
    fn model_name(&self) -> &str {
        "constant"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider unavailable")
    }
}

struct NoCompletion;

#[async_trait]
impl ChatCompletionProvider for NoCompletion {
    fn default_model(&self) -> &str {
        "none"
    }
    async fn complete(&self, _prompt: &str, _model: &str) -> Result<String> {
        bail!("no completion provider in tests")
    }
}

/// Delegates to a real memory index but refuses namespace deletion,
/// for exercising the best-effort deletion cascade.
struct BrokenNamespaceIndex {
    inner: MemoryVectorIndex,
}

#[async_trait]
impl VectorIndex for BrokenNamespaceIndex {
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<()> {
        self.inner.upsert(namespace, vectors).await
    }
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        self.inner.query(namespace, vector, top_k).await
    }
    async fn delete_document(&self, namespace: &str, doc_id: &str) -> Result<()> {
        self.inner.delete_document(namespace, doc_id).await
    }
    async fn delete_namespace(&self, _namespace: &str) -> Result<()> {
        bail!("namespace deletion unavailable")
    }
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.inner.list_namespaces().await
    }
}

struct Harness {
    registry: Arc<SessionRegistry>,
    blob: Arc<MemoryBlobStore>,
    index: Arc<dyn VectorIndex>,
}

fn harness_with(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Harness {
    let config: Config = toml::from_str("").unwrap();
    let blob = Arc::new(MemoryBlobStore::new());
    let collab = Collaborators {
        blob: blob.clone(),
        index: index.clone(),
        extractor: Arc::new(MultiFormatExtractor),
        embedder,
        completion: Arc::new(NoCompletion),
    };
    Harness {
        registry: Arc::new(SessionRegistry::new(collab, &config)),
        blob,
        index,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(ConstantEmbedder), Arc::new(MemoryVectorIndex::new()))
}

// ============ Tests ============

#[tokio::test]
async fn test_first_document_lands_in_bucket1() {
    let h = harness();
    let session = h
        .registry
        .create_session("invoices", None, Some(0.7), None, None)
        .await
        .unwrap();

    let (document, assignment) = h
        .registry
        .ingest_document(&session.id, "first.txt", b"quarterly invoice for acme corp")
        .await
        .unwrap();

    assert_eq!(assignment.bucket_name, "bucket1");
    assert!(assignment.is_new_bucket);
    assert_eq!(assignment.placement_reason, "First document in session");
    assert_eq!(document.bucket, "bucket1");
    assert!(document.processed);
    assert!(document.error.is_none());

    // Vectors landed under the full folder path namespace.
    let namespaces = h.index.list_namespaces().await.unwrap();
    assert_eq!(namespaces, vec![format!("{}/bucket1", session.folder_path)]);

    // Counts were recomputed by rescan.
    let session = h.registry.get_session(&session.id).await.unwrap();
    assert_eq!(session.document_count, 1);
    assert_eq!(session.folder_count, 1);
    assert_eq!(session.next_bucket, 2);
}

#[tokio::test]
async fn test_similar_joins_existing_bucket_dissimilar_opens_new() {
    let h = harness();
    let session = h
        .registry
        .create_session("reports", None, Some(0.7), None, None)
        .await
        .unwrap();

    // Seed document.
    let base = "annual financial report with revenue figures and growth numbers";
    h.registry
        .ingest_document(&session.id, "a.txt", base.as_bytes())
        .await
        .unwrap();

    // Identical tokens: hybrid = (1 + 1) / 2 = 1.0 >= 0.7.
    let (_, assignment) = h
        .registry
        .ingest_document(&session.id, "b.txt", base.as_bytes())
        .await
        .unwrap();
    assert_eq!(assignment.bucket_name, "bucket1");
    assert!(!assignment.is_new_bucket);
    assert!(assignment.placement_reason.contains("a.txt"));

    // Disjoint tokens: hybrid = (1 + 0) / 2 = 0.5 < 0.7.
    let (_, assignment) = h
        .registry
        .ingest_document(
            &session.id,
            "c.txt",
            b"kitchen recipe collection soups stews baking",
        )
        .await
        .unwrap();
    assert_eq!(assignment.bucket_name, "bucket2");
    assert!(assignment.is_new_bucket);
    assert!(assignment.placement_reason.contains("below threshold"));

    let session = h.registry.get_session(&session.id).await.unwrap();
    assert_eq!(session.document_count, 3);
    assert_eq!(session.folder_count, 2);
    assert_eq!(session.next_bucket, 3);

    let stats = h.registry.bucket_stats(&session.id).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].name, "bucket1");
    assert_eq!(stats[0].document_count, 2);
    assert_eq!(stats[1].name, "bucket2");
    assert_eq!(stats[1].document_count, 1);
}

#[tokio::test]
async fn test_placement_decisions_are_fully_audited() {
    let h = harness();
    let session = h
        .registry
        .create_session("audit", None, Some(0.7), None, None)
        .await
        .unwrap();

    h.registry
        .ingest_document(&session.id, "a.txt", b"alpha beta gamma delta")
        .await
        .unwrap();
    let (_, assignment) = h
        .registry
        .ingest_document(&session.id, "b.txt", b"unrelated words entirely different")
        .await
        .unwrap();

    let log = &assignment.similarity_log;
    assert_eq!(log.buckets_scanned, vec!["bucket1"]);
    assert_eq!(log.comparisons.len(), 1);
    assert_eq!(log.comparisons[0].target_name, "a.txt");
    assert_eq!(log.comparisons[0].bucket, "bucket1");
    assert_eq!(log.comparisons[0].method, "hybrid");
    assert_eq!(log.comparisons[0].decision, "below threshold");
    assert_eq!(log.threshold, 0.7);
    assert_eq!(log.final_bucket, "bucket2");
    assert!(log.is_new_bucket);
}

#[tokio::test]
async fn test_deletion_cascade_clears_namespaces_blobs_and_metadata() {
    let h = harness();
    let session = h
        .registry
        .create_session("doomed", None, Some(0.7), None, None)
        .await
        .unwrap();

    let base = "contract terms and conditions for services";
    h.registry
        .ingest_document(&session.id, "a.txt", base.as_bytes())
        .await
        .unwrap();
    h.registry
        .ingest_document(&session.id, "b.txt", b"totally different content about gardens")
        .await
        .unwrap();

    assert_eq!(h.index.list_namespaces().await.unwrap().len(), 2);

    let report = h.registry.delete_session(&session.id).await.unwrap();
    assert!(report.fully_succeeded(), "steps: {:?}", report.steps);

    // No namespace related to the session survives.
    let namespaces = h.index.list_namespaces().await.unwrap();
    assert!(
        namespaces.iter().all(|n| !n.contains(&session.id)),
        "leftover namespaces: {:?}",
        namespaces
    );

    // No blobs survive: payloads, document records, session record.
    assert!(h.blob.list(&session.folder_path).await.unwrap().is_empty());
    assert!(h.registry.get_session(&session.id).await.is_err());
    assert!(h
        .registry
        .session_documents(&session.id)
        .await
        .is_err());
}

#[tokio::test]
async fn test_deletion_is_best_effort_per_step() {
    let h = harness_with(
        Arc::new(ConstantEmbedder),
        Arc::new(BrokenNamespaceIndex {
            inner: MemoryVectorIndex::new(),
        }),
    );
    let session = h
        .registry
        .create_session("stuck", None, Some(0.7), None, None)
        .await
        .unwrap();
    h.registry
        .ingest_document(&session.id, "a.txt", b"some document body")
        .await
        .unwrap();

    let report = h.registry.delete_session(&session.id).await.unwrap();

    // Namespace deletion failed but the cascade kept going: the session
    // record itself is gone.
    assert!(!report.fully_succeeded());
    let failed: Vec<&str> = report
        .steps
        .iter()
        .filter(|s| !s.ok)
        .map(|s| s.name.as_str())
        .collect();
    assert!(failed.contains(&"bucket_namespaces") || failed.contains(&"namespace_sweep"));
    assert!(report.steps.iter().any(|s| s.name == "session_metadata" && s.ok));
    assert!(h.registry.get_session(&session.id).await.is_err());
}

#[tokio::test]
async fn test_ingestion_survives_embedding_failure() {
    let h = harness_with(Arc::new(FailingEmbedder), Arc::new(MemoryVectorIndex::new()));
    let session = h
        .registry
        .create_session("degraded", None, Some(0.7), None, None)
        .await
        .unwrap();

    let (document, assignment) = h
        .registry
        .ingest_document(&session.id, "a.txt", b"some content that cannot be embedded")
        .await
        .unwrap();

    assert_eq!(assignment.bucket_name, "bucket1");
    assert!(!document.processed);
    assert!(document.error.as_deref().unwrap().contains("unavailable"));

    // The payload is stored even though no vectors were written.
    assert_eq!(h.blob.list(&session.folder_path).await.unwrap().len(), 1);
    assert!(h.index.list_namespaces().await.unwrap().is_empty());

    // A second dissimilar document still clusters: the hybrid metric
    // degrades to its lexical half.
    let (_, assignment) = h
        .registry
        .ingest_document(&session.id, "b.txt", b"entirely different tokens in this one")
        .await
        .unwrap();
    assert_eq!(assignment.bucket_name, "bucket2");
}

#[tokio::test]
async fn test_concurrent_ingests_never_duplicate_bucket_numbers() {
    let h = harness();
    let session = h
        .registry
        .create_session("racy", None, Some(0.9), None, None)
        .await
        .unwrap();

    let r1 = h.registry.clone();
    let r2 = h.registry.clone();
    let id1 = session.id.clone();
    let id2 = session.id.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move {
            r1.ingest_document(&id1, "x.txt", b"first upload wholly unique words")
                .await
        }),
        tokio::spawn(async move {
            r2.ingest_document(&id2, "y.txt", b"second upload completely distinct tokens")
                .await
        }),
    );

    let (_, a) = a.unwrap().unwrap();
    let (_, b) = b.unwrap().unwrap();

    // Both are dissimilar, so each gets its own bucket, and the
    // per-session lock guarantees the numbers differ.
    assert_ne!(a.bucket_name, b.bucket_name);

    let session = h.registry.get_session(&session.id).await.unwrap();
    assert_eq!(session.folder_count, 2);
    assert_eq!(session.next_bucket, 3);
}

#[tokio::test]
async fn test_update_session_changes_threshold_behavior() {
    let h = harness();
    let session = h
        .registry
        .create_session("tunable", None, Some(0.95), None, None)
        .await
        .unwrap();

    let base = "shared vocabulary for both documents plus extras";
    h.registry
        .ingest_document(&session.id, "a.txt", base.as_bytes())
        .await
        .unwrap();

    // Overlapping but not identical: hybrid < 0.95 → new bucket.
    let text = "shared vocabulary for both documents plus divergence";
    let (_, assignment) = h
        .registry
        .ingest_document(&session.id, "b.txt", text.as_bytes())
        .await
        .unwrap();
    assert!(assignment.is_new_bucket);

    // Lower the threshold; the same text now matches bucket1.
    h.registry
        .update_session(
            &session.id,
            corral::registry::SessionUpdate {
                similarity_threshold: Some(0.6),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (_, assignment) = h
        .registry
        .ingest_document(&session.id, "c.txt", text.as_bytes())
        .await
        .unwrap();
    assert!(!assignment.is_new_bucket);
}

#[tokio::test]
async fn test_reingesting_identical_content_creates_new_document() {
    let h = harness();
    let session = h
        .registry
        .create_session("dupes", None, Some(0.7), None, None)
        .await
        .unwrap();

    let (first, _) = h
        .registry
        .ingest_document(&session.id, "same.txt", b"identical bytes")
        .await
        .unwrap();
    let (second, assignment) = h
        .registry
        .ingest_document(&session.id, "same.txt", b"identical bytes")
        .await
        .unwrap();

    // No deduplication: a fresh identity every time.
    assert_ne!(first.id, second.id);
    assert_eq!(assignment.bucket_name, "bucket1");

    let session = h.registry.get_session(&session.id).await.unwrap();
    assert_eq!(session.document_count, 2);
}
