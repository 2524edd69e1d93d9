use async_trait::async_trait;

use crate::content::{ContentRecord, SourceType};

use super::{validate_file_size, Input, Pipeline, PipelineOutput, Result, TranscriptionCollaborator, MAX_FILE_SIZE_BYTES};

/// Transcribes a voice memo, optionally expanding the raw transcript into a
/// structured note via an LLM collaborator. Dispatched on the high-priority
/// queue by the caller (not this type's concern).
pub struct VoiceMemoPipeline {
    transcriber: std::sync::Arc<dyn TranscriptionCollaborator>,
    expander: Option<std::sync::Arc<dyn TranscriptExpander>>,
}

/// Optional LLM-driven step from raw transcript to structured note text.
#[async_trait]
pub trait TranscriptExpander: Send + Sync {
    async fn expand(&self, transcript: &str) -> super::CollaboratorResult<String>;
}

impl VoiceMemoPipeline {
    pub fn new(transcriber: std::sync::Arc<dyn TranscriptionCollaborator>) -> Self {
        Self { transcriber, expander: None }
    }

    pub fn with_expander(mut self, expander: std::sync::Arc<dyn TranscriptExpander>) -> Self {
        self.expander = Some(expander);
        self
    }
}

#[async_trait]
impl Pipeline for VoiceMemoPipeline {
    fn name(&self) -> &'static str {
        "voice_memo"
    }

    fn supports(&self, input: &Input) -> bool {
        matches!(input, Input::VoiceMemo { .. })
    }

    async fn process(&self, input: Input) -> Result<PipelineOutput> {
        let Input::VoiceMemo { path } = input else {
            unreachable!("supports() guards this variant");
        };
        validate_file_size(&path, MAX_FILE_SIZE_BYTES)?;
        let raw_hash = super::hash_file(&path)?;

        let transcript = self.transcriber.transcribe(&path).await?;
        let full_text = match &self.expander {
            Some(expander) => expander.expand(&transcript).await?,
            None => transcript,
        };

        let title = full_text.lines().next().unwrap_or("Voice memo").trim().to_string();
        let mut record = ContentRecord::new(SourceType::VoiceMemo, if title.is_empty() { "Voice memo".to_string() } else { title });
        record.full_text = Some(full_text);
        record.source_file_path = Some(path.to_string_lossy().to_string());
        record.raw_file_hash = Some(raw_hash);

        Ok(PipelineOutput { record, costs: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubTranscriber(&'static str);
    #[async_trait]
    impl TranscriptionCollaborator for StubTranscriber {
        async fn transcribe(&self, _path: &std::path::Path) -> crate::pipeline::CollaboratorResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn transcribes_and_titles_from_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.wav");
        std::fs::write(&path, b"fake audio bytes").unwrap();

        let pipeline = VoiceMemoPipeline::new(std::sync::Arc::new(StubTranscriber("Ideas on spaced repetition\nMore detail follows.")));
        let output = pipeline.process(Input::VoiceMemo { path }).await.unwrap();
        assert_eq!(output.record.title, "Ideas on spaced repetition");
        assert_eq!(output.record.source_type, SourceType::VoiceMemo);
        assert!(output.record.raw_file_hash.is_some());
    }
}
