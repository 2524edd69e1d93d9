//! Processing Orchestrator (C7): runs the staged enrichment pipeline for one
//! content record, coordinating cleanup on reprocess and the tri-store write
//! at the end. Stages run strictly sequentially within a `ProcessingRun`.

mod collaborators;

pub use collaborators::{
    CollaboratorError, ConnectionJudgment, ContentAnalysis, EmbeddingCollaborator,
    EnrichmentCollaborator, ExtractionResult, FollowUps, ProposedTags,
};

use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::content::{Connection, ContentRecord, ProcessingRun, ProcessingStatus, RunStatus, TaxonomyCache};
use crate::cost::{CostLedger, CostRecord};
use crate::generators;
use crate::graph::{GraphStore, NodeKind};
use crate::store::{ContentStore, StorageError};
use crate::tristore::{self, NoteTemplateRenderer, TriStoreWrite};
use crate::vault::VaultManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Data,
    Fatal,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    #[error("content {0} not found")]
    ContentNotFound(Uuid),
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: &'static str, class: FailureClass, message: String },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),
    #[error("vault error: {0}")]
    Vault(#[from] crate::vault::VaultError),
}

impl OrchestratorError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Stage { class, .. } => *class,
            Self::ContentNotFound(_) => FailureClass::Fatal,
            Self::Storage(_) | Self::Graph(_) | Self::Vault(_) => FailureClass::Retryable,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Tunables governing the orchestrator's staged run. Defaults match the
/// figures named in spec.md §4.7/§5.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Candidate cap for connection discovery's `vector_search`.
    pub connection_top_k: usize,
    /// Minimum cosine similarity for a connection candidate.
    pub connection_threshold: f32,
    /// Whether reprocessing deletes prior cards (default false: preserve
    /// review history).
    pub delete_cards_on_reprocess: bool,
    /// Max retry attempts per stage before it is recorded as a `data` failure.
    pub retry_cap: u32,
    pub model_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connection_top_k: 5,
            connection_threshold: 0.75,
            delete_cards_on_reprocess: false,
            retry_cap: 3,
            model_name: "default".to_string(),
        }
    }
}

/// Runs the C7 staged enrichment pipeline against the other C1-C15 modules.
pub struct Orchestrator<'a> {
    pub content_store: &'a ContentStore,
    pub graph: &'a GraphStore,
    pub vault: &'a VaultManager,
    pub cost_ledger: &'a CostLedger,
    pub taxonomy: &'a TaxonomyCache,
    pub renderer: &'a dyn NoteTemplateRenderer,
    pub enrichment: &'a dyn EnrichmentCollaborator,
    pub embedder: &'a dyn EmbeddingCollaborator,
    pub card_generation_llm: Option<&'a dyn generators::LlmCollaborator>,
    pub config: OrchestratorConfig,
}

impl<'a> Orchestrator<'a> {
    #[tracing::instrument(skip(self), fields(content_uuid = %content_uuid))]
    pub async fn process(&self, content_uuid: Uuid) -> Result<ProcessingRun> {
        self.cleanup_before_reprocessing(content_uuid).await?;

        let record = self
            .content_store
            .load(content_uuid)
            .map_err(|e| match e {
                StorageError::NotFound(_) => OrchestratorError::ContentNotFound(content_uuid),
                other => OrchestratorError::Storage(other),
            })?;

        let mut run = ProcessingRun::new(content_uuid);
        run.status = RunStatus::Running;
        run.model = Some(self.config.model_name.clone());
        let mut costs = Vec::new();

        let result = self.run_stages(&record, &mut run, &mut costs).await;

        match result {
            Ok(()) => {
                run.complete();
                self.content_store.update_status(content_uuid, ProcessingStatus::Processed)?;
            }
            Err(err) => {
                run.fail(err.to_string());
                self.content_store.update_status(content_uuid, ProcessingStatus::Failed)?;
                if let Err(cost_err) = self.cost_ledger.record_many(&costs) {
                    tracing::warn!(content_uuid = %content_uuid, error = %cost_err, "failed to record orchestrator stage costs");
                }
                return Err(err);
            }
        }

        if let Err(cost_err) = self.cost_ledger.record_many(&costs) {
            tracing::warn!(content_uuid = %content_uuid, error = %cost_err, "failed to record orchestrator stage costs");
        }
        Ok(run)
    }

    async fn run_stages(&self, record: &ContentRecord, run: &mut ProcessingRun, costs: &mut Vec<CostRecord>) -> Result<()> {
        let full_text = record.full_text.clone().unwrap_or_default();

        // Stage 2: content analysis.
        let analysis = self.timed_stage("content_analysis", costs, || self.enrichment.analyze_content(&full_text)).await?;
        run.analysis = Some(format!("{analysis:?}"));

        // Stage 3: summarization.
        let summaries = self.timed_stage("summarization", costs, || self.enrichment.summarize(&full_text, &analysis)).await?;
        run.summaries = summaries.clone();

        // Stage 4: extraction.
        let extraction = self.timed_stage("extraction", costs, || self.enrichment.extract(&full_text, &analysis)).await?;
        run.extraction = Some(format!(
            "{} concepts, {} findings, {} methodologies, {} tools, {} people",
            extraction.concepts.len(),
            extraction.key_findings.len(),
            extraction.methodologies.len(),
            extraction.tools.len(),
            extraction.people.len(),
        ));

        // Stage 5: tag classification against the taxonomy.
        let taxonomy = self.taxonomy.get().map_err(|e| OrchestratorError::Stage {
            stage: "tag_classification",
            class: FailureClass::Fatal,
            message: e.to_string(),
        })?;
        let proposed = self.timed_stage("tag_classification", costs, || self.enrichment.propose_tags(&analysis, &extraction)).await?;
        let candidate_tags: Vec<String> = analysis.key_topics.iter().take(10).cloned().chain(proposed.tags.iter().cloned()).collect();
        let (valid_tags, suggested_new_tags) = taxonomy.partition(candidate_tags.iter().map(String::as_str));
        if !suggested_new_tags.is_empty() {
            tracing::info!(content_uuid = %record.content_uuid, tags = ?suggested_new_tags, "tags outside taxonomy suggested, not persisted");
        }
        run.tags = valid_tags.iter().cloned().collect();

        // Stage 6: connection discovery.
        let standard_summary = run.summaries.get("standard").cloned().unwrap_or_default();
        let summary_embedding = if standard_summary.trim().is_empty() {
            None
        } else {
            Some(
                self.timed_stage("embed_summary", costs, || self.embedder.embed(&standard_summary))
                    .await?,
            )
        };

        let mut connections = Vec::new();
        if let Some(embedding) = &summary_embedding {
            let hits = self.graph.vector_search(embedding, NodeKind::Content, self.config.connection_top_k, self.config.connection_threshold)?;
            for hit in hits {
                let Ok(target_uuid) = Uuid::parse_str(hit.id.as_str()) else { continue };
                if target_uuid == record.content_uuid {
                    continue;
                }
                let judgment = self
                    .timed_stage("connection_confirmation", costs, || {
                        self.enrichment.confirm_connection(&standard_summary, &hit.title, hit.summary.as_deref().unwrap_or_default())
                    })
                    .await?;
                let mut connection = Connection::new(record.content_uuid, target_uuid, judgment.relationship_type, judgment.strength);
                connection.explanation = Some(judgment.explanation);
                self.content_store.save_connection(&connection)?;
                connections.push(connection);
            }
        }

        // Stage 7: follow-ups and mastery questions.
        let follow_ups = self.timed_stage("follow_ups", costs, || self.enrichment.generate_follow_ups(&standard_summary, &extraction)).await?;
        if !follow_ups.follow_ups.is_empty() || !follow_ups.mastery_questions.is_empty() {
            run.extraction = Some(format!(
                "{} (follow-ups: {}, mastery questions: {})",
                run.extraction.clone().unwrap_or_default(),
                follow_ups.follow_ups.len(),
                follow_ups.mastery_questions.len(),
            ));
        }

        // Stage 8: card generation from extracted concepts.
        let content_tags: Vec<String> = run.tags.iter().cloned().collect();
        for concept in &extraction.concepts {
            let examples = extraction.examples_by_concept.get(&concept.canonical_name).cloned().unwrap_or_default();
            let misconceptions = extraction.misconceptions_by_concept.get(&concept.canonical_name).cloned().unwrap_or_default();
            let cards = generators::cards_from_concept(concept, &content_tags, &examples, &misconceptions);
            for mut card in cards {
                card.source_content_uuid = Some(record.content_uuid);
                self.content_store.save_card(&card)?;
            }
        }

        // Optional: one exercise for the most central concept, using whatever
        // mastery history already exists for it. Exercise generation is a
        // best-effort enrichment, not a stage the run fails on.
        if let (Some(llm), Some(concept)) = (self.card_generation_llm, extraction.concepts.first()) {
            let mastery_score = self
                .content_store
                .latest_mastery_snapshot(&concept.canonical_name)?
                .map(|s| s.mastery_score)
                .unwrap_or(0.0);
            let difficulty = generators::parse_difficulty_keyword(&analysis.complexity);
            match generators::generate_exercise(
                llm,
                &concept.canonical_name,
                &standard_summary,
                generators::MasteryLevel::from_score(mastery_score),
                difficulty,
                None,
            )
            .await
            {
                Ok(exercise) => self.content_store.save_exercise(&exercise, Some(record.content_uuid))?,
                Err(err) => tracing::warn!(content_uuid = %record.content_uuid, error = %err, "optional exercise generation failed, skipping"),
            }
        }

        // Stage 9: persistence via the tri-store writer.
        tristore::write(
            self.vault,
            self.content_store,
            self.graph,
            self.renderer,
            TriStoreWrite {
                record,
                run,
                summary_embedding,
                concepts: &extraction.concepts,
                connections: &connections,
            },
        )
        .await;

        Ok(())
    }

    async fn timed_stage<T, Fut>(&self, stage: &'static str, costs: &mut Vec<CostRecord>, mut attempt: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = collaborators::Result<T>>,
    {
        let start = Instant::now();
        let mut last_err = None;
        for attempt_num in 0..=self.config.retry_cap {
            match attempt().await {
                Ok(value) => {
                    costs.push(self.stage_cost_record(stage, start.elapsed(), true));
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(stage, attempt = attempt_num, error = %err, "orchestrator stage attempt failed");
                    last_err = Some(err);
                    if attempt_num < self.config.retry_cap {
                        let backoff = Duration::from_secs(2u64.saturating_pow(attempt_num).min(30));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        costs.push(self.stage_cost_record(stage, start.elapsed(), false));
        Err(OrchestratorError::Stage {
            stage,
            class: FailureClass::Data,
            message: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    fn stage_cost_record(&self, stage: &'static str, elapsed: Duration, success: bool) -> CostRecord {
        let mut record = CostRecord::new(self.config.model_name.clone(), "orchestrator", stage);
        record.latency_ms = elapsed.as_millis() as u64;
        record.success = success;
        record
    }

    /// Reprocess cleanup: delete prior ProcessingRun rows (cascades to
    /// concepts/connections), delete outgoing graph relationships from the
    /// content node (preserving the node), optionally delete prior cards,
    /// and clean duplicate concept-note files from the vault. Safe to call
    /// even when no prior run exists.
    async fn cleanup_before_reprocessing(&self, content_uuid: Uuid) -> Result<()> {
        self.content_store.delete_processing_runs(content_uuid)?;
        self.graph.delete_content_relationships(content_uuid)?;
        if self.config.delete_cards_on_reprocess {
            self.content_store.delete_cards_for_content(content_uuid)?;
        }
        self.cleanup_duplicate_concept_notes().await?;
        Ok(())
    }

    async fn cleanup_duplicate_concept_notes(&self) -> Result<()> {
        let files = self.vault.walk_markdown_files().await?;
        let mut groups: std::collections::BTreeMap<(std::path::PathBuf, String), Vec<(Option<u32>, std::path::PathBuf)>> = std::collections::BTreeMap::new();

        for path in files {
            let Some(rel) = self.vault.relative_path(&path) else { continue };
            if !rel.starts_with("concepts") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let (base, suffix) = split_duplicate_suffix(stem);
            let parent = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            groups.entry((parent, base)).or_default().push((suffix, path));
        }

        for ((parent, base), mut entries) in groups {
            if entries.len() <= 1 {
                continue;
            }
            entries.sort_by_key(|(suffix, _)| suffix.map(|n| n + 1).unwrap_or(0));
            let (keep_suffix, keep_path) = entries.remove(0);
            if keep_suffix.is_some() {
                let target = parent.join(format!("{base}.md"));
                if let Err(err) = tokio::fs::rename(&keep_path, &target).await {
                    tracing::warn!(path = %keep_path.display(), error = %err, "failed to rename duplicate concept note to base name");
                }
            }
            for (_, extra) in entries {
                if let Err(err) = tokio::fs::remove_file(&extra).await {
                    tracing::warn!(path = %extra.display(), error = %err, "failed to remove duplicate concept note");
                }
            }
        }
        Ok(())
    }
}

fn split_duplicate_suffix(stem: &str) -> (String, Option<u32>) {
    if let Some(pos) = stem.rfind('_') {
        if let Ok(n) = stem[pos + 1..].parse::<u32>() {
            return (stem[..pos].to_string(), Some(n));
        }
    }
    (stem.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Concept, Importance, RelationshipType, SourceType};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct StubEnrichment {
        concept: Concept,
    }

    #[async_trait]
    impl EnrichmentCollaborator for StubEnrichment {
        async fn analyze_content(&self, _full_text: &str) -> collaborators::Result<ContentAnalysis> {
            Ok(ContentAnalysis {
                content_type: "article".into(),
                domain: "ml".into(),
                complexity: "intermediate".into(),
                estimated_length: "short".into(),
                has_code: false,
                has_math: false,
                has_diagrams: false,
                key_topics: vec!["ml/rl".into()],
                language: "en".into(),
            })
        }

        async fn summarize(&self, _full_text: &str, _analysis: &ContentAnalysis) -> collaborators::Result<BTreeMap<String, String>> {
            Ok(BTreeMap::from([
                ("brief".to_string(), "brief summary".to_string()),
                ("standard".to_string(), "standard summary".to_string()),
                ("detailed".to_string(), "detailed summary".to_string()),
            ]))
        }

        async fn extract(&self, _full_text: &str, _analysis: &ContentAnalysis) -> collaborators::Result<ExtractionResult> {
            Ok(ExtractionResult {
                concepts: vec![self.concept.clone()],
                key_findings: vec!["finding".into()],
                methodologies: vec![],
                tools: vec![],
                people: vec![],
                examples_by_concept: BTreeMap::new(),
                misconceptions_by_concept: BTreeMap::new(),
            })
        }

        async fn propose_tags(&self, _analysis: &ContentAnalysis, _extraction: &ExtractionResult) -> collaborators::Result<ProposedTags> {
            Ok(ProposedTags { tags: vec!["ml/rl".into(), "bogus/not-real".into()] })
        }

        async fn confirm_connection(&self, _source_summary: &str, _candidate_title: &str, _candidate_summary: &str) -> collaborators::Result<ConnectionJudgment> {
            Ok(ConnectionJudgment { relationship_type: RelationshipType::RelatesTo, strength: 0.8, explanation: "both about RL".into() })
        }

        async fn generate_follow_ups(&self, _standard_summary: &str, _extraction: &ExtractionResult) -> collaborators::Result<FollowUps> {
            Ok(FollowUps { follow_ups: vec!["read more".into()], mastery_questions: vec!["what is RL?".into()] })
        }
    }

    struct StubEmbedder;
    #[async_trait]
    impl EmbeddingCollaborator for StubEmbedder {
        async fn embed(&self, _text: &str) -> collaborators::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    struct StubRenderer;
    impl NoteTemplateRenderer for StubRenderer {
        fn render_content_note(&self, record: &ContentRecord, _run: &ProcessingRun) -> String {
            format!("# {}", record.title)
        }
        fn render_concept_note(&self, concept: &Concept) -> String {
            format!("# {}", concept.name)
        }
    }

    fn concept() -> Concept {
        Concept {
            id: Uuid::new_v4(),
            name: "Reinforcement Learning".into(),
            canonical_name: "reinforcement learning".into(),
            aliases: Default::default(),
            definition: Some("Learning via reward signals.".into()),
            importance: Importance::Core,
            embedding: None,
            related_concepts: vec![],
        }
    }

    fn taxonomy_cache(dir: &std::path::Path) -> TaxonomyCache {
        let path = dir.join("taxonomy.yaml");
        std::fs::write(&path, "domains:\n  ml:\n    - rl\nstatus: []\nquality: []\n").unwrap();
        TaxonomyCache::new(path, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn process_runs_all_stages_and_persists_cards_and_connections() {
        let content_store = ContentStore::open_in_memory().unwrap();
        let graph = GraphStore::open_in_memory().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec!["article".to_string()]);
        vault.ensure_structure().await.unwrap();
        let cost_ledger = CostLedger::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let taxonomy = taxonomy_cache(tmp.path());
        let renderer = StubRenderer;
        let enrichment = StubEnrichment { concept: concept() };
        let embedder = StubEmbedder;

        let mut record = ContentRecord::new(SourceType::Article, "RL Basics");
        record.full_text = Some("Reinforcement learning is about reward signals.".into());
        content_store.save(&record).unwrap();

        let orchestrator = Orchestrator {
            content_store: &content_store,
            graph: &graph,
            vault: &vault,
            cost_ledger: &cost_ledger,
            taxonomy: &taxonomy,
            renderer: &renderer,
            enrichment: &enrichment,
            embedder: &embedder,
            card_generation_llm: None,
            config: OrchestratorConfig::default(),
        };

        let run = orchestrator.process(record.content_uuid).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.tags.contains("ml/rl"));
        assert!(!run.tags.contains("bogus/not-real"));

        let cards = content_store.get_cards_for_content(record.content_uuid).unwrap();
        assert!(!cards.is_empty());
        assert!(cards.iter().any(|c| c.card_type == crate::content::CardType::Definition));

        let reloaded = content_store.load(record.content_uuid).unwrap();
        assert_eq!(reloaded.processing_status, crate::content::ProcessingStatus::Processed);
    }

    #[tokio::test]
    async fn reprocess_cleanup_is_safe_with_no_prior_run() {
        let content_store = ContentStore::open_in_memory().unwrap();
        let graph = GraphStore::open_in_memory().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec![]);
        vault.ensure_structure().await.unwrap();
        let cost_ledger = CostLedger::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let taxonomy = taxonomy_cache(tmp.path());
        let renderer = StubRenderer;
        let enrichment = StubEnrichment { concept: concept() };
        let embedder = StubEmbedder;

        let record = ContentRecord::new(SourceType::Article, "Existing, unprocessed content");
        content_store.save(&record).unwrap();

        let orchestrator = Orchestrator {
            content_store: &content_store,
            graph: &graph,
            vault: &vault,
            cost_ledger: &cost_ledger,
            taxonomy: &taxonomy,
            renderer: &renderer,
            enrichment: &enrichment,
            embedder: &embedder,
            card_generation_llm: None,
            config: OrchestratorConfig::default(),
        };

        assert!(orchestrator.cleanup_before_reprocessing(record.content_uuid).await.is_ok());
        assert!(orchestrator.cleanup_before_reprocessing(record.content_uuid).await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_merges_duplicate_concept_notes_to_base_name() {
        let content_store = ContentStore::open_in_memory().unwrap();
        let graph = GraphStore::open_in_memory().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec![]);
        vault.ensure_structure().await.unwrap();
        std::fs::create_dir_all(tmp.path().join("concepts")).unwrap();
        std::fs::write(tmp.path().join("concepts/Behavior Cloning_1.md"), "a").unwrap();
        std::fs::write(tmp.path().join("concepts/Behavior Cloning_2.md"), "b").unwrap();

        let cost_ledger = CostLedger::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let taxonomy = taxonomy_cache(tmp.path());
        let renderer = StubRenderer;
        let enrichment = StubEnrichment { concept: concept() };
        let embedder = StubEmbedder;

        let orchestrator = Orchestrator {
            content_store: &content_store,
            graph: &graph,
            vault: &vault,
            cost_ledger: &cost_ledger,
            taxonomy: &taxonomy,
            renderer: &renderer,
            enrichment: &enrichment,
            embedder: &embedder,
            card_generation_llm: None,
            config: OrchestratorConfig::default(),
        };

        orchestrator.cleanup_duplicate_concept_notes().await.unwrap();
        assert!(tmp.path().join("concepts/Behavior Cloning.md").is_file());
        assert!(!tmp.path().join("concepts/Behavior Cloning_1.md").exists());
        assert!(!tmp.path().join("concepts/Behavior Cloning_2.md").exists());
    }

    #[test]
    fn split_suffix_recognizes_numeric_trailing_underscore() {
        assert_eq!(split_duplicate_suffix("Concept_2"), ("Concept".to_string(), Some(2)));
        assert_eq!(split_duplicate_suffix("Concept"), ("Concept".to_string(), None));
        assert_eq!(split_duplicate_suffix("multi_word_title"), ("multi_word_title".to_string(), None));
    }
}
