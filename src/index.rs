//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the retrieval seam: chunk embeddings are
//! upserted under a namespace (one namespace per session bucket, named
//! `<session_folder>/<bucket>`), queried by vector, and deleted by
//! document or by whole namespace during session teardown.
//!
//! Implementations:
//! - **[`MemoryVectorIndex`]** — brute-force cosine search over vectors
//!   held in an `RwLock`ed map; used by tests.
//! - **[`PineconeIndex`]** — REST client for a Pinecone-compatible
//!   serverless index. Requires the `PINECONE_API_KEY` environment
//!   variable.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::similarity::cosine_similarity;

/// Metadata stored alongside each chunk vector.
///
/// `text` is truncated by the caller to keep per-vector metadata small.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VectorMetadata {
    pub doc_id: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filename: String,
}

/// A vector to upsert.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A ranked match returned from a query.
#[derive(Debug, Clone, Serialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub doc_id: String,
    pub text: String,
    pub filename: String,
    pub namespace: String,
}

/// Abstract vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or update vectors under a namespace.
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<()>;

    /// Return the `top_k` nearest vectors in a namespace.
    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize)
        -> Result<Vec<VectorMatch>>;

    /// Delete all vectors belonging to a document within a namespace.
    async fn delete_document(&self, namespace: &str, doc_id: &str) -> Result<()>;

    /// Delete an entire namespace and all vectors within it.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// List all namespaces currently holding vectors.
    async fn list_namespaces(&self) -> Result<Vec<String>>;
}

/// Instantiate the index backend named in the configuration.
pub fn create_index(config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
    match config.backend.as_str() {
        "pinecone" => Ok(Box::new(PineconeIndex::new(config)?)),
        "memory" => Ok(Box::new(MemoryVectorIndex::new())),
        other => bail!("Unknown vector index backend: {}", other),
    }
}

// ============ In-memory index ============

struct StoredVector {
    id: String,
    values: Vec<f32>,
    metadata: VectorMetadata,
}

/// In-memory vector index for tests.
///
/// Queries are brute-force cosine similarity over all vectors in the
/// namespace. A namespace disappears from [`VectorIndex::list_namespaces`]
/// once its last vector is deleted, matching serverless index behavior.
pub struct MemoryVectorIndex {
    namespaces: RwLock<HashMap<String, Vec<StoredVector>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        let stored = namespaces.entry(namespace.to_string()).or_default();
        for v in vectors {
            stored.retain(|s| s.id != v.id);
            stored.push(StoredVector {
                id: v.id.clone(),
                values: v.values.clone(),
                metadata: v.metadata.clone(),
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().unwrap();
        let Some(stored) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .map(|s| VectorMatch {
                id: s.id.clone(),
                score: cosine_similarity(vector, &s.values),
                doc_id: s.metadata.doc_id.clone(),
                text: s.metadata.text.clone(),
                filename: s.metadata.filename.clone(),
                namespace: namespace.to_string(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_document(&self, namespace: &str, doc_id: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        if let Some(stored) = namespaces.get_mut(namespace) {
            stored.retain(|s| s.metadata.doc_id != doc_id);
            if stored.is_empty() {
                namespaces.remove(namespace);
            }
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().unwrap().remove(namespace);
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.namespaces.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

// ============ Pinecone index ============

/// REST client for a Pinecone-compatible serverless index.
///
/// The data-plane host (e.g.
/// `my-index-abc123.svc.us-east-1.pinecone.io`) comes from the
/// configuration; the API key from `PINECONE_API_KEY`.
pub struct PineconeIndex {
    host: String,
    api_key: String,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .context("index.host must be set for the pinecone backend")?;
        let api_key = std::env::var("PINECONE_API_KEY")
            .context("PINECONE_API_KEY environment variable not set")?;
        Ok(Self {
            host: host
                .trim_start_matches("https://")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: reqwest::Client::new(),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("https://{}{}", self.host, path);
        let resp = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("vector index request failed: {}", path))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "vector index request {} failed (HTTP {}): {}",
                path,
                status,
                text.chars().take(300).collect::<String>()
            );
        }

        resp.json()
            .await
            .with_context(|| format!("failed to parse vector index response for {}", path))
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f64,
    #[serde(default)]
    metadata: Option<VectorMetadata>,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        self.post(
            "/vectors/upsert",
            serde_json::json!({
                "vectors": vectors,
                "namespace": namespace,
            }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let value = self
            .post(
                "/query",
                serde_json::json!({
                    "vector": vector,
                    "topK": top_k,
                    "includeMetadata": true,
                    "namespace": namespace,
                }),
            )
            .await?;

        let parsed: QueryResponse =
            serde_json::from_value(value).context("unexpected query response shape")?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| {
                let meta = m.metadata.unwrap_or_default();
                VectorMatch {
                    id: m.id,
                    score: m.score,
                    doc_id: meta.doc_id,
                    text: meta.text,
                    filename: meta.filename,
                    namespace: namespace.to_string(),
                }
            })
            .collect())
    }

    async fn delete_document(&self, namespace: &str, doc_id: &str) -> Result<()> {
        self.post(
            "/vectors/delete",
            serde_json::json!({
                "filter": { "doc_id": { "$eq": doc_id } },
                "namespace": namespace,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.post(
            "/vectors/delete",
            serde_json::json!({
                "deleteAll": true,
                "namespace": namespace,
            }),
        )
        .await?;
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let value = self.post("/describe_index_stats", serde_json::json!({})).await?;
        let mut names: Vec<String> = value
            .get("namespaces")
            .and_then(|n| n.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, doc_id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: VectorMetadata {
                doc_id: doc_id.to_string(),
                chunk_index: 0,
                text: format!("text of {}", id),
                filename: format!("{}.txt", doc_id),
            },
        }
    }

    #[tokio::test]
    async fn test_memory_query_ranks_by_cosine() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(
                "ns",
                &[
                    record("c1", "d1", vec![1.0, 0.0]),
                    record("c2", "d2", vec![0.0, 1.0]),
                    record("c3", "d3", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let matches = index.query("ns", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "c1");
        assert_eq!(matches[1].id, "c3");
    }

    #[tokio::test]
    async fn test_memory_query_unknown_namespace_is_empty() {
        let index = MemoryVectorIndex::new();
        assert!(index.query("nope", &[1.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces_by_id() {
        let index = MemoryVectorIndex::new();
        index
            .upsert("ns", &[record("c1", "d1", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("ns", &[record("c1", "d1", vec![0.0, 1.0])])
            .await
            .unwrap();

        let matches = index.query("ns", &[0.0, 1.0], 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_memory_delete_document_empties_namespace() {
        let index = MemoryVectorIndex::new();
        index
            .upsert("ns", &[record("c1", "d1", vec![1.0]), record("c2", "d1", vec![0.5])])
            .await
            .unwrap();
        assert_eq!(index.list_namespaces().await.unwrap(), vec!["ns"]);

        index.delete_document("ns", "d1").await.unwrap();
        assert!(index.list_namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_delete_namespace() {
        let index = MemoryVectorIndex::new();
        index
            .upsert("a", &[record("c1", "d1", vec![1.0])])
            .await
            .unwrap();
        index
            .upsert("b", &[record("c2", "d2", vec![1.0])])
            .await
            .unwrap();

        index.delete_namespace("a").await.unwrap();
        assert_eq!(index.list_namespaces().await.unwrap(), vec!["b"]);
    }
}
