use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of content categories a pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Paper,
    Article,
    Book,
    Code,
    Idea,
    VoiceMemo,
    Concept,
    Daily,
    Exercise,
    Career,
    Personal,
    Project,
    Reflection,
    NonTech,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Article => "article",
            Self::Book => "book",
            Self::Code => "code",
            Self::Idea => "idea",
            Self::VoiceMemo => "voice_memo",
            Self::Concept => "concept",
            Self::Daily => "daily",
            Self::Exercise => "exercise",
            Self::Career => "career",
            Self::Personal => "personal",
            Self::Project => "project",
            Self::Reflection => "reflection",
            Self::NonTech => "non_tech",
        }
    }

    /// Vault folder (relative to root) this source type's notes live under.
    /// `Concept` and `Daily` are root-level folders per the vault layout;
    /// every other type nests under `sources/`.
    pub fn vault_folder(&self) -> String {
        match self {
            Self::Concept => "concepts".to_string(),
            Self::Daily => "daily".to_string(),
            other => format!("sources/{}", other.as_str()),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "paper" => Self::Paper,
            "article" => Self::Article,
            "book" => Self::Book,
            "code" => Self::Code,
            "idea" => Self::Idea,
            "voice_memo" => Self::VoiceMemo,
            "concept" => Self::Concept,
            "daily" => Self::Daily,
            "exercise" => Self::Exercise,
            "career" => Self::Career,
            "personal" => Self::Personal,
            "project" => Self::Project,
            "reflection" => Self::Reflection,
            "non_tech" => Self::NonTech,
            other => return Err(format!("unknown source_type: {other}")),
        })
    }
}

/// Lifecycle status of a `ContentRecord` as it moves through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of highlight or note a PDF/reader annotation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    DigitalHighlight,
    HandwrittenNote,
    TypedComment,
    Diagram,
    Underline,
}

/// A single highlight/note captured against a `ContentRecord`, owned by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub annotation_type: AnnotationType,
    pub content: String,
    pub page_number: Option<u32>,
    /// Opaque positional data: bbox rect, quad-points, image id, author, color.
    pub position: BTreeMap<String, Value>,
    pub context: Option<String>,
    /// OCR confidence in `0.0..=1.0`; absent for manually typed annotations.
    pub confidence: Option<f64>,
}

/// The canonical unit of ingested material: a paper, article, voice memo,
/// idea, or any of the other source types, normalized into one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ContentRecord {
    pub content_uuid: Uuid,
    /// Internal relational key. Never exposed beyond storage adapters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_id: Option<i64>,
    pub source_type: SourceType,
    pub title: String,
    pub authors: Vec<String>,
    pub source_url: Option<String>,
    pub source_file_path: Option<String>,
    pub full_text: Option<String>,
    /// Content-addressed dedup key for file inputs (sha256 hex digest).
    pub raw_file_hash: Option<String>,
    pub processing_status: ProcessingStatus,
    pub vault_path: Option<String>,
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, Value>,
    pub annotations: Vec<Annotation>,
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    /// Create a fresh, unprocessed record. `content_uuid` is assigned here and
    /// is immutable for the lifetime of the record.
    pub fn new(source_type: SourceType, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            content_uuid: Uuid::new_v4(),
            db_id: None,
            source_type,
            title: title.into(),
            authors: Vec::new(),
            source_url: None,
            source_file_path: None,
            full_text: None,
            raw_file_hash: None,
            processing_status: ProcessingStatus::Pending,
            vault_path: None,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            annotations: Vec::new(),
            created_at: now,
            ingested_at: now,
            processed_at: None,
        }
    }

    /// The dedup key used by the content store: prefer the file hash, fall
    /// back to a normalized source URL.
    pub fn dedup_key(&self) -> Option<DedupKey<'_>> {
        if let Some(hash) = &self.raw_file_hash {
            return Some(DedupKey::FileHash(hash));
        }
        self.source_url.as_deref().map(DedupKey::SourceUrl)
    }

    /// Transition to `processed`, stamping `processed_at`. No-op (other than
    /// the timestamp bump) if already processed.
    pub fn mark_processed(&mut self) {
        self.processing_status = ProcessingStatus::Processed;
        self.processed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.processing_status = ProcessingStatus::Failed;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.processing_status,
            ProcessingStatus::Processed | ProcessingStatus::Failed
        )
    }
}

/// The key under which a `ContentRecord` is deduplicated at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey<'a> {
    FileHash(&'a str),
    SourceUrl(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_pending_with_no_processed_at() {
        let record = ContentRecord::new(SourceType::Article, "Some Article");
        assert_eq!(record.processing_status, ProcessingStatus::Pending);
        assert!(record.processed_at.is_none());
        assert!(record.db_id.is_none());
    }

    #[test]
    fn mark_processed_sets_timestamp() {
        let mut record = ContentRecord::new(SourceType::Paper, "Paper");
        record.mark_processed();
        assert_eq!(record.processing_status, ProcessingStatus::Processed);
        assert!(record.processed_at.is_some());
    }

    #[test]
    fn dedup_key_prefers_file_hash_over_url() {
        let mut record = ContentRecord::new(SourceType::Paper, "Paper");
        record.source_url = Some("https://example.com/a".into());
        record.raw_file_hash = Some("abc123".into());
        assert_eq!(record.dedup_key(), Some(DedupKey::FileHash("abc123")));
    }

    #[test]
    fn source_type_round_trips_through_str() {
        for s in [
            SourceType::Paper,
            SourceType::VoiceMemo,
            SourceType::NonTech,
        ] {
            let parsed: SourceType = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
