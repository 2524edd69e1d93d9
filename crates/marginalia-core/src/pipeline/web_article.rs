use async_trait::async_trait;

use crate::content::{ContentRecord, SourceType};

use super::{HttpFetchCollaborator, Input, Pipeline, PipelineError, PipelineOutput, Result};

/// Fetches a URL and extracts main-content text via readability-style
/// extraction. Also used as a sub-step by a bookmark-sync pipeline.
pub struct WebArticlePipeline {
    fetcher: std::sync::Arc<dyn HttpFetchCollaborator>,
}

impl WebArticlePipeline {
    pub fn new(fetcher: std::sync::Arc<dyn HttpFetchCollaborator>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Pipeline for WebArticlePipeline {
    fn name(&self) -> &'static str {
        "web_article"
    }

    fn supports(&self, input: &Input) -> bool {
        matches!(input, Input::Article { .. })
    }

    async fn process(&self, input: Input) -> Result<PipelineOutput> {
        let Input::Article { url } = input else {
            unreachable!("supports() guards this variant");
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PipelineError::UnsupportedMedia(url));
        }

        let article = self.fetcher.fetch_article(&url).await?;
        if article.main_text.trim().is_empty() {
            return Err(PipelineError::Empty);
        }

        let title = article.title.unwrap_or_else(|| url.clone());
        let mut record = ContentRecord::new(SourceType::Article, title);
        record.full_text = Some(article.main_text);
        record.source_url = Some(url);

        Ok(PipelineOutput { record, costs: Vec::new() })
    }
}
