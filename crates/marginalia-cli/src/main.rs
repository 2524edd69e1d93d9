//! `marginalia` — a thin CLI front end over `marginalia-core`.
//!
//! Exposes ingestion, processing, reconciliation, and review-session
//! operations as subcommands, for local/manual use and as an integration
//! point for an out-of-scope HTTP façade. Not the façade itself.

mod collaborators;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use uuid::Uuid;

use marginalia_core::config::Config;
use marginalia_core::content::{SessionType, SourceType, TaxonomyCache};
use marginalia_core::cost::CostLedger;
use marginalia_core::fsrs::{FSRSParameters, FSRSScheduler, FSRSState, Rating};
use marginalia_core::graph::GraphStore;
use marginalia_core::orchestrator::{Orchestrator, OrchestratorConfig};
use marginalia_core::pipeline::{BookBatchPipeline, Input, PdfPipeline, Pipeline, PipelineRegistry, SourceRepoPipeline, TextIdeaPipeline, VoiceMemoPipeline, WebArticlePipeline};
use marginalia_core::reconcile::Reconciler;
use marginalia_core::session::compose_session;
use marginalia_core::store::ContentStore;
use marginalia_core::vault::VaultManager;

use collaborators::{PlainNoteRenderer, Unconfigured};

#[derive(Parser)]
#[command(
    name = "marginalia",
    author,
    version,
    about = "Personal knowledge management and spaced-repetition CLI",
    long_about = "Capture, enrich, and review a personal knowledge vault: ingest raw content, \
                   run the staged enrichment pipeline, reconcile the Markdown vault with the \
                   knowledge graph, and compose spaced-repetition review sessions."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a raw capture into a ContentRecord and save it.
    Ingest {
        /// Raw text for a text-idea capture, or a URL for article/code captures.
        #[arg(long)]
        text: Option<String>,
        /// Path to a PDF or voice-memo file.
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long, default_value = "idea")]
        content_type: String,
        #[arg(long)]
        tags: Option<String>,
    },
    /// Run the staged enrichment pipeline for a previously ingested record.
    Process { content_uuid: Uuid },
    /// Reconcile the Markdown vault with the knowledge graph.
    Reconcile {
        /// Run a full sync instead of an incremental one since the last watermark.
        #[arg(long)]
        full: bool,
    },
    /// Compose and print a time-budgeted review session of due cards.
    Review {
        #[arg(long, default_value_t = 20.0)]
        minutes: f64,
        #[arg(long)]
        topic: Option<String>,
    },
    /// Print basic counts: pending content, due cards, concepts.
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Ingest { text, path, content_type, tags } => runtime.block_on(run_ingest(&config, text, path, content_type, tags)),
        Commands::Process { content_uuid } => runtime.block_on(run_process(&config, content_uuid)),
        Commands::Reconcile { full } => runtime.block_on(run_reconcile(&config, full)),
        Commands::Review { minutes, topic } => run_review(&config, minutes, topic),
        Commands::Stats => run_stats(&config),
    }
}

fn open_store(config: &Config) -> anyhow::Result<ContentStore> {
    Ok(ContentStore::open(config.paths.store_db_path())?)
}

fn open_graph(config: &Config) -> anyhow::Result<GraphStore> {
    Ok(GraphStore::open(config.paths.graph_db_path())?)
}

fn open_vault(config: &Config) -> VaultManager {
    let folders = [
        SourceType::Paper, SourceType::Article, SourceType::Book, SourceType::Code,
        SourceType::Idea, SourceType::VoiceMemo, SourceType::Concept, SourceType::Daily,
        SourceType::Exercise, SourceType::Career, SourceType::Personal, SourceType::Project,
        SourceType::Reflection, SourceType::NonTech,
    ]
    .iter()
    .map(|t| t.vault_folder())
    .collect();
    VaultManager::new(config.paths.vault_path.clone(), folders)
}

fn open_cost_ledger(config: &Config) -> anyhow::Result<CostLedger> {
    let conn = rusqlite::Connection::open(config.paths.data_dir.join("cost_ledger.db"))?;
    Ok(CostLedger::new(conn)?)
}

fn build_registry(config: &Config) -> PipelineRegistry {
    let mut registry = PipelineRegistry::new();
    registry.register(Box::new(TextIdeaPipeline));
    registry.register(Box::new(PdfPipeline::new(Arc::new(Unconfigured))));
    registry.register(Box::new(BookBatchPipeline::new(Arc::new(Unconfigured), config.limits.ocr_concurrency)));
    registry.register(Box::new(VoiceMemoPipeline::new(Arc::new(Unconfigured))));
    registry.register(Box::new(WebArticlePipeline::new(Arc::new(Unconfigured))));
    registry.register(Box::new(SourceRepoPipeline::new(Arc::new(Unconfigured), Arc::new(Unconfigured))));
    registry
}

fn content_type_to_input(content_type: &str, text: Option<String>, path: Option<PathBuf>) -> anyhow::Result<Input> {
    match content_type {
        "idea" => Ok(Input::TextIdea { text: text.ok_or_else(|| anyhow::anyhow!("--text is required for content-type idea"))? }),
        "pdf" => Ok(Input::Pdf { path: path.ok_or_else(|| anyhow::anyhow!("--path is required for content-type pdf"))? }),
        "voice_memo" => Ok(Input::VoiceMemo { path: path.ok_or_else(|| anyhow::anyhow!("--path is required for content-type voice_memo"))? }),
        "article" => Ok(Input::Article { url: text.ok_or_else(|| anyhow::anyhow!("--text must carry the URL for content-type article"))? }),
        "code" => Ok(Input::Code { url: text.ok_or_else(|| anyhow::anyhow!("--text must carry the URL for content-type code"))? }),
        other => Err(anyhow::anyhow!("unsupported content-type: {other}")),
    }
}

async fn run_ingest(config: &Config, text: Option<String>, path: Option<PathBuf>, content_type: String, tags: Option<String>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let registry = build_registry(config);
    let input = content_type_to_input(&content_type, text, path)?;

    let pipeline = registry.get_pipeline(&input).ok_or_else(|| anyhow::anyhow!("no pipeline registered for this content type"))?;
    let mut output = pipeline.process(input).await?;

    if let Some(tags) = tags {
        output.record.tags.extend(tags.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
    }

    match store.save(&output.record)? {
        marginalia_core::store::SaveOutcome::Inserted(uuid) => println!("{} {}", "ingested".green().bold(), uuid),
        marginalia_core::store::SaveOutcome::Deduplicated(uuid) => println!("{} {}", "already present (deduplicated)".yellow().bold(), uuid),
    }
    Ok(())
}

async fn run_process(config: &Config, content_uuid: Uuid) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let graph = open_graph(config)?;
    let vault = open_vault(config);
    vault.ensure_structure().await?;
    let cost_ledger = open_cost_ledger(config)?;
    let taxonomy = TaxonomyCache::new(config.paths.tag_taxonomy_path.clone(), std::time::Duration::from_secs(60));
    let renderer = PlainNoteRenderer;
    let collaborator = Unconfigured;

    let orchestrator = Orchestrator {
        content_store: &store,
        graph: &graph,
        vault: &vault,
        cost_ledger: &cost_ledger,
        taxonomy: &taxonomy,
        renderer: &renderer,
        enrichment: &collaborator,
        embedder: &collaborator,
        card_generation_llm: None,
        config: OrchestratorConfig { model_name: config.models.text_default.clone(), ..Default::default() },
    };

    let run = orchestrator.process(content_uuid).await?;
    println!("{} run {} status {:?}", "processed".green().bold(), run.id, run.status);
    Ok(())
}

async fn run_reconcile(config: &Config, full: bool) -> anyhow::Result<()> {
    let graph = open_graph(config)?;
    let vault = open_vault(config);
    vault.ensure_structure().await?;
    let reconciler = Reconciler::new();

    let (watermark, report) = if full {
        reconciler.full_sync(&vault, &graph).await?
    } else {
        let last_sync = marginalia_core::config::load_last_sync_time(&config.paths.sync_state_path())?;
        reconciler.reconcile_since(&vault, &graph, last_sync).await?
    };

    marginalia_core::config::save_last_sync_time(&config.paths.sync_state_path(), watermark)?;

    println!(
        "{} processed={} synced={} failed={}",
        "reconciled".green().bold(),
        report.processed,
        report.synced,
        report.failed,
    );
    Ok(())
}

fn run_review(config: &Config, minutes: f64, topic: Option<String>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let now = Utc::now();
    let due_cards = store.get_due_cards(now)?;
    let due_cards = match &topic {
        Some(t) => due_cards.into_iter().filter(|c| c.tags.iter().any(|tag| tag.contains(t.as_str()))).collect(),
        None => due_cards,
    };

    let composed = compose_session(minutes, SessionType::CardsOnly, None, topic, due_cards, Vec::new())?;

    println!("{}", format!("=== Review session ({:.0} min) ===", minutes).cyan().bold());
    for item in &composed.items {
        if let marginalia_core::session::SessionItem::Card(card) = item {
            println!("- {} ({:?})", card.front, card.card_type);
        }
    }
    println!("{}: {} items", "total".white().bold(), composed.items.len());
    Ok(())
}

fn run_stats(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let now = Utc::now();
    let due_cards = store.get_due_cards(now)?;
    let concepts = store.all_concepts()?;
    let pending = store.get_pending()?;

    println!("{}", "=== Marginalia Statistics ===".cyan().bold());
    println!("{}: {}", "Pending content".white().bold(), pending.len());
    println!("{}: {}", "Due cards".white().bold(), due_cards.len());
    println!("{}: {}", "Concepts".white().bold(), concepts.len());
    Ok(())
}

/// Applies one FSRS review to a card; not yet wired into `Review` (which
/// only lists due items today), kept here for the interactive-review
/// follow-up.
#[allow(dead_code)]
fn answer_card(mut card: marginalia_core::content::SpacedRepCard, rating: Rating, now: chrono::DateTime<Utc>) -> marginalia_core::content::SpacedRepCard {
    let scheduler = FSRSScheduler::new(FSRSParameters::default());
    let state = FSRSState {
        state: card.state,
        difficulty: card.difficulty,
        stability: card.stability,
        due: card.due_date,
        last_review: card.last_reviewed,
        reps: card.repetitions,
        lapses: card.lapses,
        scheduled_days: card.scheduled_days,
    };
    let (new_state, _result) = scheduler.review(&state, rating, now);
    card.state = new_state.state;
    card.difficulty = new_state.difficulty;
    card.stability = new_state.stability;
    card.due_date = new_state.due;
    card.last_reviewed = new_state.last_review;
    card.repetitions = new_state.reps;
    card.lapses = new_state.lapses;
    card.scheduled_days = new_state.scheduled_days;
    card.total_reviews += 1;
    if matches!(rating, Rating::Good | Rating::Easy) {
        card.correct_reviews += 1;
    }
    card
}
