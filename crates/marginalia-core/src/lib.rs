//! # Marginalia Core
//!
//! Ingestion, enrichment, tri-store reconciliation, and spaced-repetition
//! engine for a personal knowledge platform. A single piece of captured
//! content (an idea, article, PDF, voice memo, or source repository) is
//! normalized, enriched by an LLM-backed pipeline, deduplicated against
//! existing concepts, and written across three stores kept in sync: a
//! relational store (content, runs, cards), a property graph (concepts and
//! their relationships), and an Obsidian-style Markdown vault.
//!
//! ## Components
//!
//! - **Cost Ledger** ([`cost`]) — per-call LLM spend accounting and budget checks.
//! - **Content Store** ([`store`]) — the relational store for content, runs, cards.
//! - **Vault Manager** ([`vault`]) — the Markdown-note filesystem tree.
//! - **Graph Store** ([`graph`]) — concepts, notes, and their relationships.
//! - **Pipelines** ([`pipeline`]) — normalize raw input into a `ContentRecord`.
//! - **Processing Orchestrator** ([`orchestrator`]) — runs the staged enrichment pipeline.
//! - **Concept Deduplicator** ([`dedup`]) — canonical names, alias matching, merge plans.
//! - **Tri-Store Writer** ([`tristore`]) — writes one processed record across all three stores.
//! - **Vault Reconciler** ([`reconcile`]) — keeps the graph's note mirror in sync with the vault.
//! - **FSRS Scheduler** ([`fsrs`]) — spaced-repetition scheduling math.
//! - **Card & Exercise Generators** ([`generators`]) — turns concepts into review material.
//! - **Session Composer** ([`session`]) — time-budgeted practice session composition.
//! - **Mastery Service** ([`mastery`]) — per-topic mastery scoring and trends.
//! - **Task Runner** ([`tasks`]) — priority queues with retry/backoff for background work.
//! - **Config** ([`config`]) — environment-driven configuration, no hardcoded paths.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marginalia_core::config::Config;
//! use marginalia_core::store::ContentStore;
//! use marginalia_core::vault::VaultManager;
//!
//! let config = Config::from_env()?;
//! let store = ContentStore::open(config.paths.store_db_path())?;
//! let vault = VaultManager::new(&config.paths.vault_path, vec!["idea".to_string()]);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod content;
pub mod cost;
pub mod dedup;
pub mod fsrs;
pub mod generators;
pub mod graph;
pub mod mastery;
pub mod orchestrator;
pub mod pipeline;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod tasks;
pub mod tristore;
pub mod vault;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{load_last_sync_time, save_last_sync_time, Config, ConfigError, Limits, ModelConfig, Paths};

pub use content::{
    Annotation, AnnotationType, CardState, CardType, Concept, Connection, ContentRecord,
    DedupKey, Difficulty, Exercise, ExerciseAttempt, ExerciseDifficulty, ExerciseType, Importance,
    MasterySnapshot, MasteryTrend, PracticeSession, ProcessingRun, ProcessingStatus,
    RelatedConcept, RelationshipType, RunStatus, SessionType, SourceType, SpacedRepCard,
    TagTaxonomy, TaxonomyCache, TaxonomyError,
};

pub use cost::{summarize, BudgetCheck, BudgetState, CostBreakdown, CostError, CostLedger, CostRecord, RequestType};

pub use dedup::{canonical_name, extract_aliases, plan_merge, redirect_edges, MergeOutcome};

pub use fsrs::{
    initial_difficulty, initial_stability, next_interval, retrievability,
    retrievability_with_decay, FSRSParameters, FSRSScheduler, FSRSState, LearningState,
    PreviewResults, Rating, ReviewResult,
};

pub use generators::{
    cards_from_concept, parse_difficulty_keyword, GeneratedCard, GeneratedExercise, GeneratorError,
    LlmCollaborator, MasteryLevel,
};

pub use graph::{sanitize_rel_type, Edge, EdgeId, GraphError, GraphStore, Node, NodeId, NodeKind, VectorSearchHit};

pub use mastery::{
    build_snapshot, classify_trend, group_attempts_by_topic, learning_curve_forecast,
    mastery_score, overview, weak_spots, LearningCurvePoint, MasteryOverview, TopicPractice,
    WeakSpot, MIN_ATTEMPTS_FOR_MASTERY,
};

pub use orchestrator::{
    CollaboratorError as OrchestratorCollaboratorError, ConnectionJudgment, ContentAnalysis,
    EmbeddingCollaborator, EnrichmentCollaborator, ExtractionResult, FailureClass, FollowUps,
    Orchestrator, OrchestratorConfig, OrchestratorError, ProposedTags,
};

pub use pipeline::{
    hash_bytes, hash_file, validate_file_size, BookBatchPipeline, BoundingBox, CollaboratorError as PipelineCollaboratorError,
    FetchedArticle, HttpFetchCollaborator, Input, OcrCollaborator, OcrImage, OcrPage, PdfPipeline,
    Pipeline, PipelineError, PipelineOutput, PipelineRegistry, RepoSummarizer, RepoSummary,
    SourceRepoPipeline, TextIdeaPipeline, TranscriptionCollaborator, VoiceMemoPipeline,
    MAX_FILE_SIZE_BYTES,
};

pub use reconcile::{
    extract_inline_tags, extract_wikilinks, sync_note, sync_one, Reconciler, ReconcileError,
    SyncReport, SyncStatusSnapshot, SyncType, VaultWatcher, WatcherConfig,
};

pub use session::{
    compose_session, end_session, ComposedSession, SessionError, SessionItem, SessionTimeBudget,
    DEFAULT_EXERCISE_RATIO, MIN_TIME_FOR_CARD, MIN_TIME_FOR_EXERCISE,
};

pub use store::{normalize_source_url, ContentStore, SaveOutcome, StorageError};

pub use tasks::{backoff_delay, Priority, Task, TaskQueue, TaskStatus, TimeLimits};

pub use tristore::{mark_run_complete, write as tristore_write, NoteTemplateRenderer, TriStoreWrite, WriteReport};

pub use vault::{merge_tags, VaultError, VaultManager};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// FSRS algorithm version in use (FSRS-5 weight set; see [`fsrs`] module docs).
pub const FSRS_VERSION: u8 = 5;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Concept, ContentRecord, ContentStore, FSRSScheduler, FSRSState, GraphStore, Orchestrator,
        OrchestratorConfig, Rating, Reconciler, SpacedRepCard, StorageError, VaultManager,
    };

    pub use crate::config::Config;
    pub use crate::cost::CostLedger;
    pub use crate::session::compose_session;
    pub use crate::tasks::TaskQueue;
}
