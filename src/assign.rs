//! Greedy nearest-bucket assignment.
//!
//! The [`BucketAssigner`] decides which bucket of a session an incoming
//! document belongs to, producing a full [`SimilarityLog`] audit trail
//! alongside the placement.
//!
//! # State machine
//!
//! ```text
//!            ┌─────────────┐  session owns no buckets
//!  assign ──▶│ no_buckets  │─────────────────────────▶ new_bucket (bucket1)
//!            └──────┬──────┘
//!                   │ buckets exist
//!                   ▼
//!            ┌─────────────┐  best >= threshold        ┌─────────┐
//!            │  scanning   │──────────────────────────▶│ matched │
//!            └──────┬──────┘                           └─────────┘
//!                   │ best < threshold, budget spent,
//!                   │ or nothing comparable
//!                   ▼
//!             new_bucket (bucket<next>)
//! ```
//!
//! The scan is greedy, not exhaustive nearest-neighbor: buckets are
//! visited in creation order, and a comparison above the
//! high-confidence cutoff short-circuits the rest of that bucket's
//! members. Ties between buckets are resolved by scan order — the best
//! score is only replaced by a strictly greater one, so the first
//! bucket encountered keeps a tied score.
//!
//! Failures never block ingestion: a comparison that errors is skipped,
//! and callers degrade a failed assignment procedure into a new-bucket
//! decision via [`fallback_assignment`].

use std::time::{Duration, Instant};

use crate::models::{AssignmentResult, Comparison, Session, SimilarityLog};
use crate::similarity::{SimilarityEngine, SimilarityMethod};

/// Identifier recorded for the incoming document in comparison entries,
/// before it has been assigned a real id.
const CANDIDATE_ID: &str = "new_document";

/// A bucket member loaded for comparison.
#[derive(Debug, Clone)]
pub struct MemberDocument {
    pub id: String,
    pub filename: String,
    pub text: String,
}

/// A session bucket with the members selected as comparison targets.
#[derive(Debug, Clone)]
pub struct BucketSnapshot {
    pub name: String,
    pub members: Vec<MemberDocument>,
}

/// Format a bucket name from its number (`bucket<N>`).
pub fn bucket_name(number: u64) -> String {
    format!("bucket{}", number)
}

/// Parse the number out of a `bucket<N>` name.
///
/// Used to recover the counter from sessions written before the
/// persisted allocator existed, and by the deletion sweep.
pub fn bucket_number(name: &str) -> Option<u64> {
    name.strip_prefix("bucket")?.parse().ok()
}

/// Decides bucket placement for incoming documents.
pub struct BucketAssigner {
    engine: SimilarityEngine,
    /// Per-bucket short-circuit cutoff: a comparison above this score
    /// stops scanning that bucket's remaining members.
    high_confidence: f64,
    /// Wall-clock budget for the whole scan.
    scan_budget: Duration,
}

impl BucketAssigner {
    pub fn new(engine: SimilarityEngine, high_confidence: f64, scan_budget: Duration) -> Self {
        Self {
            engine,
            high_confidence,
            scan_budget,
        }
    }

    /// Place a new document into one of the session's buckets, or decide
    /// that a new bucket is needed.
    ///
    /// `buckets` must be in creation order; `next_bucket` is the number
    /// a newly created bucket will take. This function never fails: any
    /// comparison error is skipped and the scan continues with the
    /// remaining candidates.
    pub async fn assign(
        &self,
        session: &Session,
        buckets: &[BucketSnapshot],
        next_bucket: u64,
        text: &str,
        label: &str,
    ) -> AssignmentResult {
        let threshold = session.similarity_threshold;
        let mut log = SimilarityLog {
            comparisons: Vec::new(),
            buckets_scanned: buckets.iter().map(|b| b.name.clone()).collect(),
            final_bucket: String::new(),
            is_new_bucket: false,
            placement_reason: String::new(),
            threshold,
        };

        if buckets.is_empty() {
            let first = bucket_name(next_bucket);
            log.final_bucket = first.clone();
            log.is_new_bucket = true;
            log.placement_reason = "First document in session".to_string();
            return AssignmentResult {
                bucket_name: first,
                is_new_bucket: true,
                placement_reason: log.placement_reason.clone(),
                similarity_log: log,
            };
        }

        let started = Instant::now();
        let mut budget_spent = false;

        let mut best_score = 0.0f64;
        let mut best: Option<(&BucketSnapshot, &MemberDocument)> = None;

        'scan: for bucket in buckets {
            for member in &bucket.members {
                if started.elapsed() > self.scan_budget {
                    budget_spent = true;
                    break 'scan;
                }

                let result = match self
                    .engine
                    .compare_preprocessed(
                        text,
                        &member.text,
                        SimilarityMethod::Hybrid,
                        session.preprocessing.as_deref(),
                        session.preprocessing_model.as_deref(),
                    )
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        eprintln!(
                            "Warning: skipping comparison with document {}: {}",
                            member.id, e
                        );
                        continue;
                    }
                };

                let score = result.similarity;
                log.comparisons.push(Comparison {
                    candidate_id: CANDIDATE_ID.to_string(),
                    candidate_name: label.to_string(),
                    target_id: member.id.clone(),
                    target_name: member.filename.clone(),
                    bucket: bucket.name.clone(),
                    method: result.method,
                    score,
                    decision: if score >= threshold {
                        "match".to_string()
                    } else {
                        "below threshold".to_string()
                    },
                });

                // Strictly greater, so the first bucket keeps a tied score.
                if score > best_score {
                    best_score = score;
                    best = Some((bucket, member));
                }

                if score > self.high_confidence {
                    // Good enough; skip this bucket's remaining members.
                    continue 'scan;
                }
            }
        }

        if let Some((bucket, member)) = best {
            if best_score >= threshold {
                log.final_bucket = bucket.name.clone();
                log.placement_reason = format!(
                    "Similar to document '{}' with score {:.2}",
                    member.filename, best_score
                );
                return AssignmentResult {
                    bucket_name: bucket.name.clone(),
                    is_new_bucket: false,
                    placement_reason: log.placement_reason.clone(),
                    similarity_log: log,
                };
            }
        }

        let new_bucket = bucket_name(next_bucket);
        log.final_bucket = new_bucket.clone();
        log.is_new_bucket = true;
        log.placement_reason = match best {
            Some((bucket, _)) if best_score > 0.0 => format!(
                "Best match was {:.2} with document in '{}' bucket, below threshold of {}",
                best_score, bucket.name, threshold
            ),
            _ => "No similar documents found".to_string(),
        };
        if budget_spent {
            log.placement_reason = format!(
                "{} (scan budget exceeded after {} comparisons)",
                log.placement_reason,
                log.comparisons.len()
            );
        }

        AssignmentResult {
            bucket_name: new_bucket,
            is_new_bucket: true,
            placement_reason: log.placement_reason.clone(),
            similarity_log: log,
        }
    }
}

/// Degrade a failed assignment procedure into a new-bucket decision.
///
/// Document ingestion must never fail purely because clustering failed:
/// when anything around the scan errors (loading members, reading the
/// session), the caller places the document into the next available
/// bucket and records why.
pub fn fallback_assignment(threshold: f64, next_bucket: u64, detail: &str) -> AssignmentResult {
    let name = bucket_name(next_bucket);
    let reason = format!("Error during similarity check: {}", detail);
    AssignmentResult {
        bucket_name: name.clone(),
        is_new_bucket: true,
        placement_reason: reason.clone(),
        similarity_log: SimilarityLog {
            comparisons: Vec::new(),
            buckets_scanned: Vec::new(),
            final_bucket: name,
            is_new_bucket: true,
            placement_reason: reason,
            threshold,
        },
    }
}
