//! External collaborators the orchestrator's enrichment stages delegate to:
//! one LLM call per stage (content analysis, summarization, extraction,
//! connection confirmation, follow-ups) plus the embedding call used for
//! connection discovery.

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{Concept, RelationshipType};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("LLM call failed: {0}")]
    Llm(String),
    #[error("LLM output failed schema validation: {0}")]
    InvalidOutput(String),
    #[error("embedding call failed: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// Stage 2 output: `content analysis`.
#[derive(Debug, Clone)]
pub struct ContentAnalysis {
    pub content_type: String,
    pub domain: String,
    pub complexity: String,
    pub estimated_length: String,
    pub has_code: bool,
    pub has_math: bool,
    pub has_diagrams: bool,
    /// At most 10, enforced by the caller.
    pub key_topics: Vec<String>,
    pub language: String,
}

/// Stage 4 output: concepts plus the surrounding extraction context cards
/// are generated from.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub concepts: Vec<Concept>,
    pub key_findings: Vec<String>,
    pub methodologies: Vec<String>,
    pub tools: Vec<String>,
    pub people: Vec<String>,
    /// Example sentences and misconception (claim, correction) pairs per
    /// concept canonical_name, feeding C12's card generation.
    pub examples_by_concept: std::collections::BTreeMap<String, Vec<String>>,
    pub misconceptions_by_concept: std::collections::BTreeMap<String, Vec<(String, String)>>,
}

/// Stage 5 output: tags the LLM proposed, before taxonomy filtering.
#[derive(Debug, Clone, Default)]
pub struct ProposedTags {
    pub tags: Vec<String>,
}

/// Stage 6 output: the LLM's confirmation of a candidate connection's
/// relationship type and strength.
#[derive(Debug, Clone)]
pub struct ConnectionJudgment {
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub explanation: String,
}

/// Stage 7 output.
#[derive(Debug, Clone, Default)]
pub struct FollowUps {
    pub follow_ups: Vec<String>,
    pub mastery_questions: Vec<String>,
}

/// The set of LLM calls the enrichment pipeline makes. A single trait
/// because every stage is "ask the configured model something about this
/// content" — concrete implementations route each method to whichever
/// provider/model the caller has configured per operation.
#[async_trait]
pub trait EnrichmentCollaborator: Send + Sync {
    async fn analyze_content(&self, full_text: &str) -> Result<ContentAnalysis>;

    /// Produces `brief`, `standard`, `detailed` summaries keyed by level.
    async fn summarize(&self, full_text: &str, analysis: &ContentAnalysis) -> Result<std::collections::BTreeMap<String, String>>;

    async fn extract(&self, full_text: &str, analysis: &ContentAnalysis) -> Result<ExtractionResult>;

    async fn propose_tags(&self, analysis: &ContentAnalysis, extraction: &ExtractionResult) -> Result<ProposedTags>;

    async fn confirm_connection(&self, source_summary: &str, candidate_title: &str, candidate_summary: &str) -> Result<ConnectionJudgment>;

    async fn generate_follow_ups(&self, standard_summary: &str, extraction: &ExtractionResult) -> Result<FollowUps>;
}

/// Embeds text for connection-discovery vector search.
#[async_trait]
pub trait EmbeddingCollaborator: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
