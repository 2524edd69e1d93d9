use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single enrichment attempt over a `ContentRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One record per enrichment attempt: stage outputs, model attribution, and
/// aggregate cost/latency for that run. Reprocessing deletes prior runs
/// wholesale rather than layering on top of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRun {
    pub id: Uuid,
    pub content_uuid: Uuid,
    pub status: RunStatus,
    pub analysis: Option<String>,
    /// Summary level ("one_line", "paragraph", "detailed", ...) -> text.
    pub summaries: BTreeMap<String, String>,
    pub extraction: Option<String>,
    pub tags: BTreeSet<String>,
    pub model: Option<String>,
    pub total_cost_usd: f64,
    pub total_latency_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ProcessingRun {
    pub fn new(content_uuid: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_uuid,
            status: RunStatus::Pending,
            analysis: None,
            summaries: BTreeMap::new(),
            extraction: None,
            tags: BTreeSet::new(),
            model: None,
            total_cost_usd: 0.0,
            total_latency_ms: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// How central a concept is to the content it was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Core,
    Supporting,
    Tangential,
}

/// A relation between two concepts, as extracted by the LLM (not yet a graph
/// edge — `related_concepts` entries are resolved to edges at write time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedConcept {
    pub target_name: String,
    pub relationship_type: String,
}

/// A concept extracted during enrichment. `canonical_name` is the merge key
/// in the graph store: two concepts with the same canonical_name collapse to
/// one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: Uuid,
    pub name: String,
    pub canonical_name: String,
    pub aliases: BTreeSet<String>,
    pub definition: Option<String>,
    pub importance: Importance,
    pub embedding: Option<Vec<f32>>,
    pub related_concepts: Vec<RelatedConcept>,
}

/// Closed set of content-to-content relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    RelatesTo,
    Extends,
    Contradicts,
    PrerequisiteFor,
    Applies,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RelatesTo => "RELATES_TO",
            Self::Extends => "EXTENDS",
            Self::Contradicts => "CONTRADICTS",
            Self::PrerequisiteFor => "PREREQUISITE_FOR",
            Self::Applies => "APPLIES",
        };
        f.write_str(s)
    }
}

/// A relationship between two pieces of content. Mirrored as a graph edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_content: Uuid,
    pub target_content: Uuid,
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub explanation: Option<String>,
    pub verified_by_user: bool,
}

impl Connection {
    pub fn new(
        source_content: Uuid,
        target_content: Uuid,
        relationship_type: RelationshipType,
        strength: f64,
    ) -> Self {
        Self {
            source_content,
            target_content,
            relationship_type,
            strength: strength.clamp(0.0, 1.0),
            explanation: None,
            verified_by_user: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_pending() {
        let run = ProcessingRun::new(Uuid::new_v4());
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn fail_records_error_and_timestamp() {
        let mut run = ProcessingRun::new(Uuid::new_v4());
        run.fail("llm timeout");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("llm timeout"));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn connection_clamps_strength() {
        let c = Connection::new(Uuid::new_v4(), Uuid::new_v4(), RelationshipType::Extends, 1.5);
        assert_eq!(c.strength, 1.0);
    }

    #[test]
    fn relationship_type_display_matches_graph_label() {
        assert_eq!(RelationshipType::PrerequisiteFor.to_string(), "PREREQUISITE_FOR");
    }
}
