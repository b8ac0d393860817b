//! # Corral CLI
//!
//! The `corral` binary manages document processing sessions: creating
//! them, ingesting documents (which are automatically clustered into
//! similarity buckets), inspecting the resulting buckets, asking
//! questions over a session's documents, and serving the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! corral --config ./corral.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corral session create --name <name>` | Create a session |
//! | `corral session list` | List sessions |
//! | `corral session show <id>` | Show one session |
//! | `corral session delete <id>` | Delete a session and everything in it |
//! | `corral ingest <id> <file>` | Upload a document into a session |
//! | `corral buckets <id>` | Show a session's buckets and members |
//! | `corral compare <file-a> <file-b>` | Score two documents |
//! | `corral ask <id> "<question>"` | Ask a question over a session |
//! | `corral serve` | Start the HTTP API |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use corral::config::load_config;
use corral::registry::{Collaborators, SessionRegistry, SessionUpdate};
use corral::similarity::SimilarityMethod;

/// Corral — similarity-driven document ingestion and auto-clustering.
#[derive(Parser)]
#[command(
    name = "corral",
    about = "Similarity-driven document ingestion and auto-clustering",
    version,
    long_about = "Documents uploaded into a corral session are chunked, embedded, and \
    automatically grouped into similarity buckets. Sessions, buckets, and placement \
    decisions are inspectable from this CLI or over the HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./corral.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage sessions.
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Upload a document into a session and report its placement.
    Ingest {
        /// Session id.
        session_id: String,
        /// Path to the document (pdf, txt, or md).
        file: PathBuf,
    },

    /// Show a session's buckets and their member documents.
    Buckets {
        /// Session id.
        session_id: String,
    },

    /// Score the similarity of two local documents.
    Compare {
        file_a: PathBuf,
        file_b: PathBuf,
        /// Scoring method: embedding, text, hybrid, or chunked.
        #[arg(long, default_value = "hybrid")]
        method: String,
    },

    /// Ask a question over a session's documents.
    Ask {
        /// Session id.
        session_id: String,
        /// The question.
        question: String,
        /// Number of chunks retrieved as context.
        #[arg(long)]
        top_k: Option<usize>,
        /// Completion model override.
        #[arg(long)]
        model: Option<String>,
    },

    /// Start the HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Create a new session.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Similarity threshold in [0, 1]; defaults from config.
        #[arg(long)]
        threshold: Option<f64>,
        /// Preprocessing instruction applied before similarity scoring.
        #[arg(long)]
        preprocessing: Option<String>,
    },
    /// List all sessions, newest first.
    List,
    /// Show one session.
    Show { session_id: String },
    /// Update a session's metadata.
    Update {
        session_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete a session and cascade to its buckets and documents.
    Delete { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        // Run with defaults when no config file is present.
        toml::from_str("").context("failed to build default configuration")?
    };

    let registry = Arc::new(SessionRegistry::new(
        Collaborators::from_config(&config)?,
        &config,
    ));

    match cli.command {
        Commands::Session { command } => run_session_command(&registry, command).await,
        Commands::Ingest { session_id, file } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file has no usable name")?
                .to_string();
            let content = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;

            let (document, assignment) =
                registry.ingest_document(&session_id, &filename, &content).await?;

            println!("ingested {}", document.filename);
            println!("  document id: {}", document.id);
            println!(
                "  bucket: {}{}",
                assignment.bucket_name,
                if assignment.is_new_bucket { " (new)" } else { "" }
            );
            println!("  reason: {}", assignment.placement_reason);
            println!("  chunks: {}", document.chunk_count);
            if let Some(err) = &document.error {
                println!("  warning: {}", err);
            }
            for comparison in &assignment.similarity_log.comparisons {
                println!(
                    "  compared against {} in {}: {:.3} ({})",
                    comparison.target_name, comparison.bucket, comparison.score,
                    comparison.decision
                );
            }
            Ok(())
        }
        Commands::Buckets { session_id } => {
            let stats = registry.bucket_stats(&session_id).await?;
            if stats.is_empty() {
                println!("no buckets yet");
                return Ok(());
            }
            for bucket in stats {
                println!("{} ({} documents)", bucket.name, bucket.document_count);
                for doc in bucket.documents {
                    println!("  {}  {}", doc.id, doc.filename);
                }
            }
            Ok(())
        }
        Commands::Compare {
            file_a,
            file_b,
            method,
        } => {
            let method: SimilarityMethod = method.parse()?;
            let text_a = read_document(&file_a)?;
            let text_b = read_document(&file_b)?;

            let result = registry.compare_texts(&text_a, &text_b, method).await?;
            println!("similarity: {:.4} ({})", result.similarity, result.method);
            println!("  embedding: {:.4}", result.embedding_similarity);
            println!("  text:      {:.4}", result.text_similarity);
            println!("  elapsed:   {}ms", result.elapsed_ms);
            for pair in &result.top_pairs {
                println!(
                    "  chunk pair {}:{} scored {:.4}",
                    pair.chunk_a, pair.chunk_b, pair.score
                );
            }
            Ok(())
        }
        Commands::Ask {
            session_id,
            question,
            top_k,
            model,
        } => {
            let answer = registry
                .ask(&session_id, &question, top_k, model.as_deref())
                .await?;
            println!("{}", answer.answer);
            if !answer.matches.is_empty() {
                println!();
                println!("sources:");
                for m in &answer.matches {
                    println!("  {} ({:.3}) — {}", m.filename, m.score, m.namespace);
                }
            }
            Ok(())
        }
        Commands::Serve => corral::server::run_server(registry, &config.server.bind).await,
    }
}

async fn run_session_command(
    registry: &Arc<SessionRegistry>,
    command: SessionCommands,
) -> Result<()> {
    match command {
        SessionCommands::Create {
            name,
            description,
            threshold,
            preprocessing,
        } => {
            let session = registry
                .create_session(&name, description, threshold, preprocessing, None)
                .await?;
            println!("created session {}", session.id);
            println!("  name: {}", session.name);
            println!("  threshold: {}", session.similarity_threshold);
            Ok(())
        }
        SessionCommands::List => {
            let sessions = registry.list_sessions().await?;
            if sessions.is_empty() {
                println!("no sessions");
                return Ok(());
            }
            for session in sessions {
                println!(
                    "{}  {}  ({} documents, {} buckets, threshold {})",
                    session.id,
                    session.name,
                    session.document_count,
                    session.folder_count,
                    session.similarity_threshold
                );
            }
            Ok(())
        }
        SessionCommands::Show { session_id } => {
            let session = registry.get_session(&session_id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(())
        }
        SessionCommands::Update {
            session_id,
            name,
            description,
            threshold,
            active,
        } => {
            let session = registry
                .update_session(
                    &session_id,
                    SessionUpdate {
                        name,
                        description,
                        similarity_threshold: threshold,
                        active,
                        ..Default::default()
                    },
                )
                .await?;
            println!("updated session {}", session.id);
            Ok(())
        }
        SessionCommands::Delete { session_id } => {
            let report = registry.delete_session(&session_id).await?;
            for step in &report.steps {
                let status = if step.ok { "ok" } else { "FAILED" };
                match &step.detail {
                    Some(detail) => println!("  {}: {} ({})", step.name, status, detail),
                    None => println!("  {}: {}", step.name, status),
                }
            }
            if report.fully_succeeded() {
                println!("deleted session {}", session_id);
            } else {
                println!("deleted session {} with failed steps", session_id);
            }
            Ok(())
        }
    }
}

/// Read and extract a local file for the compare command.
fn read_document(path: &PathBuf) -> Result<String> {
    use corral::extract::{MultiFormatExtractor, TextExtractor};

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file has no usable name")?;
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    MultiFormatExtractor
        .extract(&bytes, filename)
        .map_err(|e| anyhow::anyhow!("{}", e))
}
