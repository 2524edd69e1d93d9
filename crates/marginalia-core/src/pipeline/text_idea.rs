use async_trait::async_trait;

use crate::content::{ContentRecord, SourceType};

use super::{Input, Pipeline, PipelineError, PipelineOutput, Result};

/// Maximum characters taken from the raw text to stand in as a title when
/// the caller didn't supply one.
const TITLE_FROM_TEXT_MAX_CHARS: usize = 120;

/// Captures a raw text idea verbatim: no OCR, transcription, or fetch
/// needed. The title defaults to the text itself (truncated).
pub struct TextIdeaPipeline;

#[async_trait]
impl Pipeline for TextIdeaPipeline {
    fn name(&self) -> &'static str {
        "text_idea"
    }

    fn supports(&self, input: &Input) -> bool {
        matches!(input, Input::TextIdea { .. })
    }

    async fn process(&self, input: Input) -> Result<PipelineOutput> {
        let Input::TextIdea { text } = input else {
            unreachable!("supports() guards this variant");
        };
        if text.trim().is_empty() {
            return Err(PipelineError::Empty);
        }

        let title = truncate_title(&text);
        let mut record = ContentRecord::new(SourceType::Idea, title);
        record.full_text = Some(text);

        Ok(PipelineOutput { record, costs: Vec::new() })
    }
}

fn truncate_title(text: &str) -> String {
    if text.chars().count() <= TITLE_FROM_TEXT_MAX_CHARS {
        text.to_string()
    } else {
        text.chars().take(TITLE_FROM_TEXT_MAX_CHARS).collect::<String>() + "…"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn title_defaults_to_full_text_when_short() {
        let pipeline = TextIdeaPipeline;
        let output = pipeline.process(Input::TextIdea { text: "The key to learning is spaced repetition".into() }).await.unwrap();
        assert_eq!(output.record.title, "The key to learning is spaced repetition");
        assert_eq!(output.record.full_text.as_deref(), Some("The key to learning is spaced repetition"));
        assert_eq!(output.record.source_type, SourceType::Idea);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let pipeline = TextIdeaPipeline;
        let result = pipeline.process(Input::TextIdea { text: "   ".into() }).await;
        assert!(matches!(result, Err(PipelineError::Empty)));
    }
}
