//! Question answering over a session's documents.
//!
//! Retrieval-augmented flow: embed the question, query every bucket
//! namespace of the session, merge the matches by score, and hand the
//! best chunks to the completion provider as context. This sits
//! downstream of the clustering core and is the only consumer of the
//! completion collaborator besides similarity preprocessing.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::completion::ChatCompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::index::{VectorIndex, VectorMatch};
use crate::models::Session;

/// Chunks retrieved as answer context.
const DEFAULT_TOP_K: usize = 5;

/// Answer returned by [`answer_question`].
#[derive(Debug, Clone, Serialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
    pub model: String,
    /// The retrieved chunks the answer was grounded on.
    pub matches: Vec<VectorMatch>,
}

/// Answer a question against the documents of a session.
///
/// Queries each of the session's bucket namespaces independently (a
/// namespace that fails to answer is skipped with a warning), merges all
/// matches by score, and prompts the completion provider with the top
/// chunks. Returns a fixed fallback answer when no chunks are found.
pub async fn answer_question(
    embedder: &Arc<dyn EmbeddingProvider>,
    index: &Arc<dyn VectorIndex>,
    completion: &Arc<dyn ChatCompletionProvider>,
    session: &Session,
    buckets: &[String],
    question: &str,
    top_k: Option<usize>,
    model: Option<&str>,
) -> Result<QuestionAnswer> {
    let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
    let model = model.unwrap_or_else(|| completion.default_model()).to_string();

    let query_vec = embedder
        .embed(&[question.to_string()])
        .await
        .context("failed to embed question")?
        .into_iter()
        .next()
        .context("embedding provider returned no vector for question")?;

    let mut matches: Vec<VectorMatch> = Vec::new();
    for bucket in buckets {
        let namespace = format!("{}/{}", session.folder_path, bucket);
        match index.query(&namespace, &query_vec, top_k).await {
            Ok(mut found) => matches.append(&mut found),
            Err(e) => {
                eprintln!("Warning: query failed for namespace '{}': {}", namespace, e);
            }
        }
    }

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(top_k);

    if matches.is_empty() {
        return Ok(QuestionAnswer {
            question: question.to_string(),
            answer: "No document content found to answer the question.".to_string(),
            model,
            matches,
        });
    }

    let context_text = matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Answer the question using only the context below. If the context \
         does not contain the answer, say so.\n\nContext:\n{}\n\nQuestion: {}",
        context_text, question
    );

    let answer = completion.complete(&prompt, &model).await?;

    Ok(QuestionAnswer {
        question: question.to_string(),
        answer,
        model,
        matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemoryVectorIndex, VectorMetadata, VectorRecord};
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::Utc;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct EchoCompletion;

    #[async_trait]
    impl ChatCompletionProvider for EchoCompletion {
        fn default_model(&self) -> &str {
            "echo"
        }
        async fn complete(&self, prompt: &str, _model: &str) -> Result<String> {
            Ok(format!("answered from {} chars of prompt", prompt.len()))
        }
    }

    struct NeverCalledCompletion;

    #[async_trait]
    impl ChatCompletionProvider for NeverCalledCompletion {
        fn default_model(&self) -> &str {
            "never"
        }
        async fn complete(&self, _prompt: &str, _model: &str) -> Result<String> {
            bail!("completion should not be called without context")
        }
    }

    fn session() -> Session {
        let now = Utc::now();
        Session {
            id: "s1".to_string(),
            name: "test".to_string(),
            description: None,
            similarity_threshold: 0.7,
            preprocessing: None,
            preprocessing_model: None,
            active: true,
            created_at: now,
            updated_at: now,
            folder_path: "sessions/s1".to_string(),
            document_count: 0,
            folder_count: 0,
            next_bucket: 1,
        }
    }

    #[tokio::test]
    async fn test_answers_from_retrieved_context() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(UnitEmbedder);
        let index: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());
        let completion: Arc<dyn ChatCompletionProvider> = Arc::new(EchoCompletion);

        index
            .upsert(
                "sessions/s1/bucket1",
                &[VectorRecord {
                    id: "d1_0".to_string(),
                    values: vec![1.0, 0.0],
                    metadata: VectorMetadata {
                        doc_id: "d1".to_string(),
                        chunk_index: 0,
                        text: "the deploy runs at midnight".to_string(),
                        filename: "runbook.md".to_string(),
                    },
                }],
            )
            .await
            .unwrap();

        let result = answer_question(
            &embedder,
            &index,
            &completion,
            &session(),
            &["bucket1".to_string()],
            "when does the deploy run?",
            None,
            None,
        )
        .await
        .unwrap();

        assert!(result.answer.starts_with("answered from"));
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].doc_id, "d1");
    }

    #[tokio::test]
    async fn test_no_matches_returns_fallback_without_completion_call() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(UnitEmbedder);
        let index: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());
        let completion: Arc<dyn ChatCompletionProvider> = Arc::new(NeverCalledCompletion);

        let result = answer_question(
            &embedder,
            &index,
            &completion,
            &session(),
            &["bucket1".to_string()],
            "anything?",
            None,
            None,
        )
        .await
        .unwrap();

        assert!(result.answer.contains("No document content found"));
        assert!(result.matches.is_empty());
    }
}
