//! Pipeline Registry (C5) and Pipelines (C6): normalize a tagged `Input`
//! variant into a `ContentRecord` via an order-sensitive chain of
//! strategies, each delegating OCR/transcription/fetch to an external
//! collaborator and writing its final record through the content store.

mod collaborators;
mod pdf;
mod repo;
mod text_idea;
mod voice_memo;
mod web_article;

pub use collaborators::{BoundingBox, CollaboratorError, FetchedArticle, HttpFetchCollaborator, OcrCollaborator, OcrImage, OcrPage, Result as CollaboratorResult, TranscriptionCollaborator};
pub use pdf::{BookBatchPipeline, PdfPipeline};
pub use repo::{RepoSummarizer, RepoSummary, SourceRepoPipeline};
pub use text_idea::TextIdeaPipeline;
pub use voice_memo::VoiceMemoPipeline;
pub use web_article::WebArticlePipeline;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::content::ContentRecord;
use crate::cost::CostRecord;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("input too large: {size} bytes exceeds cap of {cap} bytes")]
    TooLarge { size: u64, cap: u64 },
    #[error("unsupported MIME/extension: {0}")]
    UnsupportedMedia(String),
    #[error("empty payload")]
    Empty,
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Tagged variant over every input shape a capture endpoint can produce.
/// Carries at most one of {local path, URL, raw text}.
#[derive(Debug, Clone)]
pub enum Input {
    Pdf { path: std::path::PathBuf },
    Photo { path: std::path::PathBuf },
    VoiceMemo { path: std::path::PathBuf },
    Book { paths: Vec<std::path::PathBuf> },
    Code { url: String },
    Article { url: String },
    Document { path: std::path::PathBuf },
    Whiteboard { path: std::path::PathBuf },
    TextIdea { text: String },
}

/// The byproduct of running a pipeline: a normalized record plus the cost
/// records accrued along the way, batch-submitted to the cost ledger by the
/// caller on completion.
pub struct PipelineOutput {
    pub record: ContentRecord,
    pub costs: Vec<CostRecord>,
}

/// A leaf strategy that can accept one `Input` shape and normalize it into a
/// `ContentRecord`.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, input: &Input) -> bool;
    async fn process(&self, input: Input) -> Result<PipelineOutput>;
}

/// File-size cap enforced by every pipeline before reading a file input.
pub const MAX_FILE_SIZE_BYTES: u64 = 200 * 1024 * 1024;

/// Validate a file's size against `cap`, returning its byte length.
pub fn validate_file_size(path: &std::path::Path, cap: u64) -> Result<u64> {
    let size = std::fs::metadata(path)?.len();
    if size > cap {
        return Err(PipelineError::TooLarge { size, cap });
    }
    if size == 0 {
        return Err(PipelineError::Empty);
    }
    Ok(size)
}

/// Streaming SHA-256 of a file, for `raw_file_hash` dedup keys.
pub fn hash_file(path: &std::path::Path) -> Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A process-wide, order-sensitive list of pipeline instances. `get_pipeline`
/// returns the first registered pipeline that supports a given input.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: Vec<Box<dyn Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pipeline: Box<dyn Pipeline>) {
        self.pipelines.push(pipeline);
    }

    pub fn get_pipeline(&self, input: &Input) -> Option<&dyn Pipeline> {
        self.pipelines.iter().find(|p| p.supports(input)).map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysTrue(&'static str);
    #[async_trait]
    impl Pipeline for AlwaysTrue {
        fn name(&self) -> &'static str {
            self.0
        }
        fn supports(&self, _input: &Input) -> bool {
            true
        }
        async fn process(&self, _input: Input) -> Result<PipelineOutput> {
            unimplemented!()
        }
    }

    #[test]
    fn get_pipeline_returns_first_registered_match() {
        let mut registry = PipelineRegistry::new();
        registry.register(Box::new(AlwaysTrue("first")));
        registry.register(Box::new(AlwaysTrue("second")));
        let matched = registry.get_pipeline(&Input::TextIdea { text: "x".into() }).unwrap();
        assert_eq!(matched.name(), "first");
    }

    #[test]
    fn hash_bytes_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn validate_file_size_rejects_oversized_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        std::fs::write(&big, vec![0u8; 100]).unwrap();
        assert!(matches!(validate_file_size(&big, 10), Err(PipelineError::TooLarge { .. })));

        let empty = dir.path().join("empty.bin");
        std::fs::write(&empty, []).unwrap();
        assert!(matches!(validate_file_size(&empty, 10), Err(PipelineError::Empty)));
    }
}
