//! Tri-Store Writer (C9): writes a processed content record across the
//! vault, the relational store, and the graph store in a fixed order, each
//! step best-effort — a failure in one store logs and proceeds rather than
//! rolling back the others.

use chrono::Utc;
use tracing::warn;

use crate::content::{Concept, Connection, ContentRecord, ProcessingRun};
use crate::graph::{GraphStore, NodeId};
use crate::store::ContentStore;
use crate::vault::VaultManager;

/// Renders the Markdown body + YAML frontmatter for a note; pipelines and
/// the orchestrator supply a concrete implementation per content type.
pub trait NoteTemplateRenderer: Send + Sync {
    fn render_content_note(&self, record: &ContentRecord, run: &ProcessingRun) -> String;
    fn render_concept_note(&self, concept: &Concept) -> String;
}

/// Everything C9 needs beyond what is already in the relational store for
/// one processed piece of content.
pub struct TriStoreWrite<'a> {
    pub record: &'a ContentRecord,
    pub run: &'a ProcessingRun,
    pub summary_embedding: Option<Vec<f32>>,
    pub concepts: &'a [Concept],
    pub connections: &'a [Connection],
}

/// Outcome of a tri-store write: which steps succeeded, so the orchestrator
/// can decide whether a repair pass (idempotent reprocess) is warranted.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub note_written: bool,
    pub run_persisted: bool,
    pub concepts_written: u32,
    pub content_node_upserted: bool,
    pub connections_written: u32,
    pub represents_edge_linked: bool,
}

/// Execute the six-step tri-store write. Every step is best-effort: a
/// failure is logged via `tracing::warn!` and the next step still runs.
pub async fn write(
    vault: &VaultManager,
    content_store: &ContentStore,
    graph: &GraphStore,
    renderer: &dyn NoteTemplateRenderer,
    input: TriStoreWrite<'_>,
) -> WriteReport {
    let mut report = WriteReport::default();
    let content_uuid = input.record.content_uuid;
    let folder = input.record.source_type.vault_folder();
    let title = &input.record.title;

    // 1. Render and write the note.
    let note_path = vault.get_path_for_update(input.record.vault_path.as_deref(), &folder, title);
    let rendered = renderer.render_content_note(input.record, input.run);
    let file_path = match vault.write_note(&note_path, &rendered).await {
        Ok(()) => {
            report.note_written = true;
            vault.relative_path(&note_path).map(|p| p.to_string_lossy().to_string())
        }
        Err(err) => {
            warn!(%content_uuid, error = %err, "tri-store: failed to write content note");
            None
        }
    };

    // 2. Persist the ProcessingRun.
    match content_store.save_processing_run(content_uuid, input.run, input.concepts) {
        Ok(()) => report.run_persisted = true,
        Err(err) => warn!(%content_uuid, error = %err, "tri-store: failed to persist processing run"),
    }

    // 3. Concept notes, ConceptNode upserts, CONTAINS + concept-concept edges.
    for concept in input.concepts {
        let concept_path = vault.get_unique_path("concepts", &concept.name);
        let rendered_concept = renderer.render_concept_note(concept);
        let concept_file_path = match vault.write_note(&concept_path, &rendered_concept).await {
            Ok(()) => vault.relative_path(&concept_path).map(|p| p.to_string_lossy().to_string()),
            Err(err) => {
                warn!(%content_uuid, concept = %concept.name, error = %err, "tri-store: failed to write concept note");
                None
            }
        };

        match graph.create_concept_node(concept, concept.embedding.clone(), concept_file_path.as_deref()) {
            Ok(concept_node_id) => {
                report.concepts_written += 1;
                if let Err(err) = graph.create_relationship(
                    &NodeId::from(content_uuid),
                    &concept_node_id,
                    "CONTAINS",
                    std::iter::once(("importance".to_string(), serde_json::json!(concept.importance))).collect(),
                ) {
                    warn!(%content_uuid, error = %err, "tri-store: failed to link content to concept");
                }
                for related in &concept.related_concepts {
                    if let Err(err) = graph.link_concept_to_concept(&concept.canonical_name, &related.target_name, &related.relationship_type) {
                        warn!(%content_uuid, error = %err, "tri-store: failed to link concept to concept");
                    }
                }
            }
            Err(err) => warn!(%content_uuid, error = %err, "tri-store: failed to upsert concept node"),
        }
    }

    // 4. Upsert the ContentNode with the summary embedding and note path.
    let metadata: serde_json::Map<String, serde_json::Value> = input.record.metadata.clone().into_iter().collect();
    match graph.create_content_node(
        content_uuid,
        title,
        input.record.source_type.as_str(),
        input.run.summaries.get("standard").map(String::as_str),
        input.summary_embedding.clone(),
        &input.record.tags.iter().cloned().collect::<Vec<_>>(),
        input.record.source_url.as_deref(),
        file_path.as_deref(),
        metadata,
    ) {
        Ok(_) => report.content_node_upserted = true,
        Err(err) => warn!(%content_uuid, error = %err, "tri-store: failed to upsert content node"),
    }

    // 5. Typed Connections between ContentNodes.
    for connection in input.connections {
        let source = NodeId::from(connection.source_content);
        let target = NodeId::from(connection.target_content);
        let props = [
            ("strength".to_string(), serde_json::json!(connection.strength)),
            ("explanation".to_string(), serde_json::json!(connection.explanation)),
        ]
        .into_iter()
        .collect();
        match graph.create_relationship(&source, &target, &connection.relationship_type.to_string(), props) {
            Ok(()) => report.connections_written += 1,
            Err(err) => warn!(%content_uuid, error = %err, "tri-store: failed to write connection"),
        }
    }

    // 6. REPRESENTS edge between the ContentNode and its NoteNode.
    if let Some(path) = file_path.as_deref() {
        match graph.link_content_to_note_by_path(path) {
            Ok(linked) => report.represents_edge_linked = linked,
            Err(err) => warn!(%content_uuid, error = %err, "tri-store: failed to link content to note by path"),
        }
    }

    report
}

pub fn mark_run_complete(run: &mut ProcessingRun) {
    run.completed_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ProcessingStatus, SourceType};

    struct StubRenderer;
    impl NoteTemplateRenderer for StubRenderer {
        fn render_content_note(&self, record: &ContentRecord, _run: &ProcessingRun) -> String {
            format!("# {}\n\n{}", record.title, record.full_text.clone().unwrap_or_default())
        }
        fn render_concept_note(&self, concept: &Concept) -> String {
            format!("# {}", concept.name)
        }
    }

    fn sample_record() -> ContentRecord {
        let mut record = ContentRecord::new(SourceType::Idea, "Test Idea");
        record.full_text = Some("body text".into());
        record.processing_status = ProcessingStatus::Processing;
        record
    }

    #[tokio::test]
    async fn write_is_best_effort_and_reports_step_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(dir.path(), vec!["idea".to_string()]);
        vault.ensure_structure().await.unwrap();
        let content_store = ContentStore::open_in_memory().unwrap();
        let graph = GraphStore::open_in_memory().unwrap();
        let renderer = StubRenderer;

        let record = sample_record();
        content_store.save(&record).unwrap();
        let run = ProcessingRun::new(record.content_uuid);

        let report = write(
            &vault,
            &content_store,
            &graph,
            &renderer,
            TriStoreWrite { record: &record, run: &run, summary_embedding: None, concepts: &[], connections: &[] },
        )
        .await;

        assert!(report.note_written);
        assert!(report.run_persisted);
        assert!(report.content_node_upserted);
    }
}
