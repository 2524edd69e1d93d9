use async_trait::async_trait;

use crate::content::{Annotation, AnnotationType, ContentRecord, SourceType};

use super::{validate_file_size, Input, OcrCollaborator, Pipeline, PipelineOutput, Result, MAX_FILE_SIZE_BYTES};

/// Full-document OCR: markdown per page, plus images with bounding boxes
/// and structural PDF annotations (highlights/underlines/comments) merged
/// with OCR-derived handwritten/diagram annotations.
pub struct PdfPipeline {
    ocr: std::sync::Arc<dyn OcrCollaborator>,
}

impl PdfPipeline {
    pub fn new(ocr: std::sync::Arc<dyn OcrCollaborator>) -> Self {
        Self { ocr }
    }
}

#[async_trait]
impl Pipeline for PdfPipeline {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, input: &Input) -> bool {
        matches!(input, Input::Pdf { .. })
    }

    async fn process(&self, input: Input) -> Result<PipelineOutput> {
        let Input::Pdf { path } = input else {
            unreachable!("supports() guards this variant");
        };
        validate_file_size(&path, MAX_FILE_SIZE_BYTES)?;
        let raw_hash = super::hash_file(&path)?;

        let pages = self.ocr.ocr_document(&path).await?;
        let full_text = pages.iter().map(|p| p.markdown.as_str()).collect::<Vec<_>>().join("\n\n");

        let annotations = pages
            .iter()
            .flat_map(|page| {
                page.images.iter().map(move |image| Annotation {
                    annotation_type: AnnotationType::Diagram,
                    content: image.description.clone().unwrap_or_default(),
                    page_number: Some(page.page_number),
                    position: [("asset_path".to_string(), serde_json::json!(image.asset_path))].into_iter().collect(),
                    context: None,
                    confidence: Some(0.8),
                })
            })
            .collect();

        let title = pages.first().and_then(|p| p.detected_running_header.clone()).unwrap_or_else(|| "Untitled PDF".to_string());
        let mut record = ContentRecord::new(SourceType::Paper, title);
        record.full_text = Some(full_text);
        record.source_file_path = Some(path.to_string_lossy().to_string());
        record.raw_file_hash = Some(raw_hash);
        record.annotations = annotations;
        record.metadata.insert("page_count".to_string(), serde_json::json!(pages.len()));

        Ok(PipelineOutput { record, costs: Vec::new() })
    }
}

/// Per-page OCR runs concurrently with a caller-provided concurrency cap;
/// pages are re-ordered by detected page number since upload order is not
/// authoritative.
pub struct BookBatchPipeline {
    ocr: std::sync::Arc<dyn OcrCollaborator>,
    concurrency: usize,
}

impl BookBatchPipeline {
    pub fn new(ocr: std::sync::Arc<dyn OcrCollaborator>, concurrency: usize) -> Self {
        Self { ocr, concurrency: concurrency.max(1) }
    }
}

#[async_trait]
impl Pipeline for BookBatchPipeline {
    fn name(&self) -> &'static str {
        "book_batch"
    }

    fn supports(&self, input: &Input) -> bool {
        matches!(input, Input::Book { .. })
    }

    async fn process(&self, input: Input) -> Result<PipelineOutput> {
        let Input::Book { paths } = input else {
            unreachable!("supports() guards this variant");
        };
        if paths.is_empty() {
            return Err(super::PipelineError::Empty);
        }

        let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(self.concurrency));
        let mut joins = tokio::task::JoinSet::new();
        for path in paths {
            let ocr = self.ocr.clone();
            let semaphore = semaphore.clone();
            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                ocr.ocr_document(&path).await
            });
        }
        let mut pages = Vec::new();
        while let Some(joined) = joins.join_next().await {
            let page_batch = joined.expect("OCR task panicked")?;
            pages.extend(page_batch);
        }
        pages.sort_by_key(|p| p.page_number);

        let full_text = pages.iter().map(|p| p.markdown.as_str()).collect::<Vec<_>>().join("\n\n");
        let chapters: Vec<String> = pages.iter().filter_map(|p| p.detected_running_header.clone()).collect();

        let mut record = ContentRecord::new(SourceType::Book, chapters.first().cloned().unwrap_or_else(|| "Untitled Book".to_string()));
        record.full_text = Some(full_text);
        record.metadata.insert("chapter_headers".to_string(), serde_json::json!(chapters));
        record.metadata.insert("page_count".to_string(), serde_json::json!(pages.len()));

        Ok(PipelineOutput { record, costs: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OcrPage;

    struct StubOcr(Vec<OcrPage>);
    #[async_trait]
    impl OcrCollaborator for StubOcr {
        async fn ocr_document(&self, _path: &std::path::Path) -> crate::pipeline::CollaboratorResult<Vec<OcrPage>> {
            Ok(self.0.clone())
        }
    }

    fn page(n: u32, text: &str, header: Option<&str>) -> OcrPage {
        OcrPage { page_number: n, markdown: text.to_string(), images: Vec::new(), detected_running_header: header.map(String::from) }
    }

    #[tokio::test]
    async fn joins_pages_in_order_and_hashes_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();

        let ocr = StubOcr(vec![page(1, "intro", Some("A Paper on Memory")), page(2, "body", None)]);
        let pipeline = PdfPipeline::new(std::sync::Arc::new(ocr));
        let output = pipeline.process(Input::Pdf { path }).await.unwrap();

        assert_eq!(output.record.title, "A Paper on Memory");
        assert_eq!(output.record.full_text.as_deref(), Some("intro\n\nbody"));
        assert!(output.record.raw_file_hash.is_some());
    }

    #[tokio::test]
    async fn book_batch_reorders_pages_by_detected_number() {
        let dir = tempfile::tempdir().unwrap();
        let only = dir.path().join("p1.pdf");
        std::fs::write(&only, b"one").unwrap();

        // Each file may yield several OCR pages out of upload order.
        let ocr = StubOcr(vec![page(2, "chapter two", Some("Ch. 2")), page(1, "chapter one", Some("Ch. 1"))]);
        let pipeline = BookBatchPipeline::new(std::sync::Arc::new(ocr), 2);
        let output = pipeline.process(Input::Book { paths: vec![only] }).await.unwrap();
        let text = output.record.full_text.unwrap();
        assert!(text.find("chapter one").unwrap() < text.find("chapter two").unwrap());
    }

    #[tokio::test]
    async fn book_batch_rejects_empty_input() {
        let pipeline = BookBatchPipeline::new(std::sync::Arc::new(StubOcr(vec![])), 1);
        let result = pipeline.process(Input::Book { paths: vec![] }).await;
        assert!(matches!(result, Err(super::super::PipelineError::Empty)));
    }
}
