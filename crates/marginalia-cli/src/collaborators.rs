//! Local collaborator wiring for the CLI.
//!
//! Every trait here is the seam where a host application is expected to
//! inject a provider-specific client (an LLM adapter, an OCR client, an
//! HTTP fetcher) per the library's external-collaborator interfaces. This
//! binary is a thin CLI for local/manual use, not the HTTP façade, so it
//! does not ship provider integrations: the collaborators below either
//! return a clear "not configured" error, or — for note rendering, which is
//! plain text formatting rather than a provider call — a real minimal
//! implementation.

use std::path::Path;

use async_trait::async_trait;
use marginalia_core::content::{Concept, ContentRecord, Difficulty, ExerciseType, ProcessingRun};
use marginalia_core::generators::{GeneratedCard, GeneratedExercise, LlmCollaborator};
use marginalia_core::orchestrator::{
    CollaboratorError as EnrichmentError, ConnectionJudgment, ContentAnalysis, EmbeddingCollaborator, EnrichmentCollaborator,
    ExtractionResult, FollowUps, ProposedTags,
};
use marginalia_core::pipeline::{
    CollaboratorError as PipelineError, FetchedArticle, HttpFetchCollaborator, OcrCollaborator, OcrPage, RepoSummarizer, RepoSummary,
    TranscriptionCollaborator,
};
use marginalia_core::tristore::NoteTemplateRenderer;

/// Placeholder for every LLM-backed and OCR/HTTP-backed collaborator: no
/// provider is wired into this binary, so each call fails immediately
/// rather than silently returning fabricated content.
pub struct Unconfigured;

#[async_trait]
impl EnrichmentCollaborator for Unconfigured {
    async fn analyze_content(&self, _full_text: &str) -> Result<ContentAnalysis, EnrichmentError> {
        Err(EnrichmentError::Llm("no LLM provider configured for this CLI".into()))
    }

    async fn summarize(&self, _full_text: &str, _analysis: &ContentAnalysis) -> Result<std::collections::BTreeMap<String, String>, EnrichmentError> {
        Err(EnrichmentError::Llm("no LLM provider configured for this CLI".into()))
    }

    async fn extract(&self, _full_text: &str, _analysis: &ContentAnalysis) -> Result<ExtractionResult, EnrichmentError> {
        Err(EnrichmentError::Llm("no LLM provider configured for this CLI".into()))
    }

    async fn propose_tags(&self, _analysis: &ContentAnalysis, _extraction: &ExtractionResult) -> Result<ProposedTags, EnrichmentError> {
        Err(EnrichmentError::Llm("no LLM provider configured for this CLI".into()))
    }

    async fn confirm_connection(&self, _source_summary: &str, _candidate_title: &str, _candidate_summary: &str) -> Result<ConnectionJudgment, EnrichmentError> {
        Err(EnrichmentError::Llm("no LLM provider configured for this CLI".into()))
    }

    async fn generate_follow_ups(&self, _standard_summary: &str, _extraction: &ExtractionResult) -> Result<FollowUps, EnrichmentError> {
        Err(EnrichmentError::Llm("no LLM provider configured for this CLI".into()))
    }
}

#[async_trait]
impl EmbeddingCollaborator for Unconfigured {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EnrichmentError> {
        Err(EnrichmentError::Embedding("no embedding provider configured for this CLI".into()))
    }
}

#[async_trait]
impl LlmCollaborator for Unconfigured {
    async fn generate_cards(&self, _topic: &str, _context: &str, _count: u32) -> marginalia_core::generators::Result<Vec<GeneratedCard>> {
        Err(marginalia_core::generators::GeneratorError::Llm("no LLM provider configured for this CLI".into()))
    }

    async fn generate_exercise(&self, _topic: &str, _context: &str, _exercise_type: ExerciseType, _difficulty: Difficulty) -> marginalia_core::generators::Result<GeneratedExercise> {
        Err(marginalia_core::generators::GeneratorError::Llm("no LLM provider configured for this CLI".into()))
    }
}

#[async_trait]
impl OcrCollaborator for Unconfigured {
    async fn ocr_document(&self, _path: &Path) -> Result<Vec<OcrPage>, PipelineError> {
        Err(PipelineError::Ocr("no OCR provider configured for this CLI".into()))
    }
}

#[async_trait]
impl TranscriptionCollaborator for Unconfigured {
    async fn transcribe(&self, _path: &Path) -> Result<String, PipelineError> {
        Err(PipelineError::Transcription("no transcription provider configured for this CLI".into()))
    }
}

#[async_trait]
impl HttpFetchCollaborator for Unconfigured {
    async fn fetch_article(&self, _url: &str) -> Result<FetchedArticle, PipelineError> {
        Err(PipelineError::Fetch("no HTTP fetch client configured for this CLI".into()))
    }

    async fn fetch_repo_tree(&self, _url: &str, _max_files: usize) -> Result<Vec<String>, PipelineError> {
        Err(PipelineError::Fetch("no HTTP fetch client configured for this CLI".into()))
    }

    async fn fetch_repo_readme(&self, _url: &str) -> Result<Option<String>, PipelineError> {
        Err(PipelineError::Fetch("no HTTP fetch client configured for this CLI".into()))
    }
}

#[async_trait]
impl RepoSummarizer for Unconfigured {
    async fn summarize_repo(&self, _readme: Option<&str>, _file_tree: &[String]) -> Result<RepoSummary, PipelineError> {
        Err(PipelineError::Fetch("no repo-summarization provider configured for this CLI".into()))
    }
}

/// Minimal Markdown + YAML frontmatter renderer. Plain text formatting, not
/// a provider call, so a real implementation lives here rather than behind
/// `Unconfigured`.
pub struct PlainNoteRenderer;

impl NoteTemplateRenderer for PlainNoteRenderer {
    fn render_content_note(&self, record: &ContentRecord, run: &ProcessingRun) -> String {
        let tags: Vec<String> = record.tags.iter().cloned().collect();
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("content_uuid: {}\n", record.content_uuid));
        out.push_str(&format!("source_type: {}\n", record.source_type.as_str()));
        out.push_str(&format!("status: {}\n", record.processing_status));
        out.push_str(&format!("tags: [{}]\n", tags.join(", ")));
        if let Some(url) = &record.source_url {
            out.push_str(&format!("source_url: {}\n", url));
        }
        out.push_str("---\n\n");
        out.push_str(&format!("# {}\n\n", record.title));
        if let Some(summary) = run.summaries.get("standard") {
            out.push_str("## Summary\n\n");
            out.push_str(summary);
            out.push_str("\n\n");
        }
        out.push_str("## Full Text\n\n");
        out.push_str(record.full_text.as_deref().unwrap_or(""));
        out.push('\n');
        out
    }

    fn render_concept_note(&self, concept: &Concept) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("canonical_name: {}\n", concept.canonical_name));
        out.push_str(&format!("importance: {:?}\n", concept.importance));
        out.push_str("---\n\n");
        out.push_str(&format!("# {}\n\n", concept.name));
        if let Some(def) = &concept.definition {
            out.push_str(def);
            out.push('\n');
        }
        out
    }
}
