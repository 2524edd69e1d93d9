//! External collaborator traits (§6): OCR, transcription, and HTTP fetch are
//! provided by the host application, not implemented here — pipelines only
//! depend on these narrow interfaces.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("HTTP fetch failed: {0}")]
    Fetch(String),
}

pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// A bounding box on a source page, used by OCR-derived annotations.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One OCR-extracted image, with its caption/type classification.
#[derive(Debug, Clone)]
pub struct OcrImage {
    pub bbox: BoundingBox,
    pub description: Option<String>,
    pub asset_path: String,
}

/// Per-page OCR output: Markdown text plus any images found on that page.
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub page_number: u32,
    pub markdown: String,
    pub images: Vec<OcrImage>,
    pub detected_running_header: Option<String>,
}

#[async_trait]
pub trait OcrCollaborator: Send + Sync {
    async fn ocr_document(&self, path: &std::path::Path) -> Result<Vec<OcrPage>>;
}

#[async_trait]
pub trait TranscriptionCollaborator: Send + Sync {
    async fn transcribe(&self, path: &std::path::Path) -> Result<String>;
}

/// Readability-extracted article content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArticle {
    pub title: Option<String>,
    pub main_text: String,
    pub html: String,
}

#[async_trait]
pub trait HttpFetchCollaborator: Send + Sync {
    async fn fetch_article(&self, url: &str) -> Result<FetchedArticle>;
    async fn fetch_repo_tree(&self, url: &str, max_files: usize) -> Result<Vec<String>>;
    async fn fetch_repo_readme(&self, url: &str) -> Result<Option<String>>;
}
