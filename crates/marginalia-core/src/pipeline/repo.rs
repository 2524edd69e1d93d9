use async_trait::async_trait;

use crate::content::{ContentRecord, SourceType};

use super::{CollaboratorResult, HttpFetchCollaborator, Input, Pipeline, PipelineError, PipelineOutput, Result};

/// Cap on how many file-tree entries are sent to the LLM for summarization.
const MAX_REPO_TREE_FILES: usize = 500;

/// LLM-generated summary of a source repository's purpose and design.
#[derive(Debug, Clone)]
pub struct RepoSummary {
    pub purpose: String,
    pub architecture: String,
    pub tech_stack: Vec<String>,
    pub learnings: Vec<String>,
}

/// Narrow collaborator for repo summarization, kept separate from
/// `generators::LlmCollaborator` since the output shape differs.
#[async_trait]
pub trait RepoSummarizer: Send + Sync {
    async fn summarize_repo(&self, readme: Option<&str>, file_tree: &[String]) -> CollaboratorResult<RepoSummary>;
}

/// Fetches README and file tree up to a cap, then LLM-summarizes purpose,
/// architecture, tech stack, and learnings.
pub struct SourceRepoPipeline {
    fetcher: std::sync::Arc<dyn HttpFetchCollaborator>,
    summarizer: std::sync::Arc<dyn RepoSummarizer>,
}

impl SourceRepoPipeline {
    pub fn new(fetcher: std::sync::Arc<dyn HttpFetchCollaborator>, summarizer: std::sync::Arc<dyn RepoSummarizer>) -> Self {
        Self { fetcher, summarizer }
    }
}

#[async_trait]
impl Pipeline for SourceRepoPipeline {
    fn name(&self) -> &'static str {
        "source_repo"
    }

    fn supports(&self, input: &Input) -> bool {
        matches!(input, Input::Code { .. })
    }

    async fn process(&self, input: Input) -> Result<PipelineOutput> {
        let Input::Code { url } = input else {
            unreachable!("supports() guards this variant");
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PipelineError::UnsupportedMedia(url));
        }

        let readme = self.fetcher.fetch_repo_readme(&url).await?;
        let mut tree = self.fetcher.fetch_repo_tree(&url, MAX_REPO_TREE_FILES).await?;
        tree.truncate(MAX_REPO_TREE_FILES);

        let summary = self.summarizer.summarize_repo(readme.as_deref(), &tree).await?;

        let title = url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(&url).to_string();
        let mut record = ContentRecord::new(SourceType::Code, title);
        record.source_url = Some(url);
        let mut text = format!("## Purpose\n{}\n\n## Architecture\n{}\n", summary.purpose, summary.architecture);
        if !summary.tech_stack.is_empty() {
            text.push_str(&format!("\n## Tech stack\n{}\n", summary.tech_stack.join(", ")));
        }
        if !summary.learnings.is_empty() {
            text.push_str(&format!("\n## Learnings\n{}\n", summary.learnings.iter().map(|l| format!("- {l}")).collect::<Vec<_>>().join("\n")));
        }
        record.full_text = Some(text);
        record.metadata.insert("file_count".to_string(), serde_json::json!(tree.len()));

        Ok(PipelineOutput { record, costs: Vec::new() })
    }
}
