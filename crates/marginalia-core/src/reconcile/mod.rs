//! Vault Reconciler (C10): keeps the graph store's `NoteNode` mirror of the
//! vault in sync with the files on disk, across three sync modes:
//!
//! - real-time, per-file, invoked by [`VaultWatcher`] on create/modify and
//!   debounced by coalescing events over a short window;
//! - startup reconciliation ([`Reconciler::reconcile_since`]), which filters
//!   to files modified since a persisted watermark (all files on first run);
//! - full sync ([`Reconciler::full_sync`]), an explicit superset of
//!   reconciliation.
//!
//! Startup reconciliation and full sync share a [`Reconciler`]'s status and
//! concurrency lock; real-time single-note sync bypasses both.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::graph::{GraphError, GraphStore, NodeId};
use crate::vault::{merge_tags, VaultError, VaultManager};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("frontmatter parse error: {0}")]
    FrontmatterParse(#[from] serde_yaml::Error),
    #[error("a full or reconciliation sync is already in progress")]
    AlreadyInProgress,
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

// ---------------------------------------------------------------------
// Reconciler status tracking
// ---------------------------------------------------------------------

/// Which of the two lock-holding sync modes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    Full,
    Reconciliation,
}

/// Outcome counts for a completed reconciliation or full sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub total_notes: usize,
    pub processed: usize,
    pub synced: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
struct SyncStatus {
    is_running: bool,
    sync_type: Option<SyncType>,
    started_at: Option<DateTime<Utc>>,
    processed: usize,
    synced: usize,
    failed: usize,
    last_result: Option<SyncReport>,
}

/// A point-in-time read of a [`Reconciler`]'s sync status, for polling by
/// the CLI or an API layer.
#[derive(Debug, Clone)]
pub struct SyncStatusSnapshot {
    pub is_running: bool,
    pub sync_type: Option<SyncType>,
    pub started_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub synced: usize,
    pub failed: usize,
    pub last_result: Option<SyncReport>,
}

/// Owns the concurrency lock and progress counters shared by [`reconcile_since`]
/// and [`full_sync`]. One instance per running process, held in the caller's
/// "system" bundle (the CLI's `App`) rather than as module state, so tests and
/// multiple vaults in the same process don't share a sync lock.
#[derive(Debug, Default)]
pub struct Reconciler {
    status: Mutex<SyncStatus>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SyncStatusSnapshot {
        let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        SyncStatusSnapshot {
            is_running: status.is_running,
            sync_type: status.sync_type,
            started_at: status.started_at,
            processed: status.processed,
            synced: status.synced,
            failed: status.failed,
            last_result: status.last_result,
        }
    }

    fn begin_run(&self, sync_type: SyncType) -> Result<()> {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if status.is_running {
            return Err(ReconcileError::AlreadyInProgress);
        }
        status.is_running = true;
        status.sync_type = Some(sync_type);
        status.started_at = Some(Utc::now());
        status.processed = 0;
        status.synced = 0;
        status.failed = 0;
        Ok(())
    }

    fn record_progress(&self, synced: bool) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.processed += 1;
        if synced {
            status.synced += 1;
        } else {
            status.failed += 1;
        }
    }

    fn end_run(&self, report: SyncReport) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.is_running = false;
        status.sync_type = None;
        status.last_result = Some(report);
    }

    /// Scan all `*.md` files under the vault root and sync those modified
    /// since `last_sync_time` (every file on a `None` first-run watermark),
    /// returning the new watermark and a report. Rejects a concurrent
    /// full/reconciliation run; does not touch real-time single-note sync.
    pub async fn reconcile_since(&self, vault: &VaultManager, graph: &GraphStore, last_sync_time: Option<DateTime<Utc>>) -> Result<(DateTime<Utc>, SyncReport)> {
        self.run_scan(vault, graph, SyncType::Reconciliation, last_sync_time).await
    }

    /// Explicit full sync: a superset of [`Reconciler::reconcile_since`] that
    /// resyncs every note regardless of mtime.
    pub async fn full_sync(&self, vault: &VaultManager, graph: &GraphStore) -> Result<(DateTime<Utc>, SyncReport)> {
        self.run_scan(vault, graph, SyncType::Full, None).await
    }

    async fn run_scan(&self, vault: &VaultManager, graph: &GraphStore, sync_type: SyncType, last_sync_time: Option<DateTime<Utc>>) -> Result<(DateTime<Utc>, SyncReport)> {
        self.begin_run(sync_type)?;

        let outcome = self.scan_and_sync(vault, graph, sync_type, last_sync_time).await;
        let now = Utc::now();
        match outcome {
            Ok(report) => {
                self.end_run(report);
                Ok((now, report))
            }
            Err(err) => {
                self.end_run(SyncReport::default());
                Err(err)
            }
        }
    }

    async fn scan_and_sync(&self, vault: &VaultManager, graph: &GraphStore, sync_type: SyncType, last_sync_time: Option<DateTime<Utc>>) -> Result<SyncReport> {
        let all_notes = vault.walk_markdown_files().await?;
        let mut to_sync = Vec::new();
        for path in &all_notes {
            let include = match sync_type {
                SyncType::Full => true,
                SyncType::Reconciliation => match last_sync_time {
                    None => true,
                    Some(watermark) => match std::fs::metadata(path).and_then(|m| m.modified()) {
                        Ok(mtime) => DateTime::<Utc>::from(mtime) > watermark,
                        Err(err) => {
                            warn!(path = %path.display(), error = %err, "reconcile: could not stat note, syncing it defensively");
                            true
                        }
                    },
                },
            };
            if include {
                to_sync.push(path.clone());
            }
        }

        let mut report = SyncReport { total_notes: all_notes.len(), ..Default::default() };
        for path in &to_sync {
            let synced = match sync_note(vault, graph, path).await {
                Ok(_) => true,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "reconcile: failed to sync note");
                    false
                }
            };
            report.processed += 1;
            if synced {
                report.synced += 1;
            } else {
                report.failed += 1;
            }
            self.record_progress(synced);
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------
// Frontmatter parsing and node-id resolution
// ---------------------------------------------------------------------

/// Split a note's raw contents into its YAML frontmatter (without the
/// delimiting `---` lines) and the body that follows. Notes with no
/// frontmatter block return `None` and the full contents as body.
fn split_frontmatter(contents: &str) -> (Option<&str>, &str) {
    let Some(rest) = contents.strip_prefix("---\n") else {
        return (None, contents);
    };
    match rest.find("\n---\n") {
        Some(idx) => (Some(&rest[..idx]), &rest[idx + 5..]),
        None => (None, contents),
    }
}

fn render_note(frontmatter: &serde_yaml::Value, body: &str) -> String {
    let yaml = serde_yaml::to_string(frontmatter).unwrap_or_default();
    format!("---\n{yaml}---\n{body}")
}

fn frontmatter_str(frontmatter: &serde_yaml::Value, key: &str) -> Option<String> {
    frontmatter.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn frontmatter_tags(frontmatter: &serde_yaml::Value) -> BTreeSet<String> {
    match frontmatter.get("tags") {
        Some(serde_yaml::Value::Sequence(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Some(serde_yaml::Value::String(s)) => std::iter::once(s.clone()).collect(),
        _ => BTreeSet::new(),
    }
}

/// Resolve a note's graph node id: the frontmatter `id` if present,
/// otherwise a deterministic UUID5 of the absolute path, persisted back to
/// frontmatter so subsequent syncs see a stable id. Returns the id and
/// whether frontmatter was modified (and so needs to be rewritten to disk).
fn resolve_node_id(frontmatter: &mut serde_yaml::Value, absolute_path: &Path) -> (NodeId, bool) {
    if let Some(id) = frontmatter_str(frontmatter, "id") {
        return (NodeId::from_string(id), false);
    }
    let generated = Uuid::new_v5(&Uuid::NAMESPACE_URL, absolute_path.to_string_lossy().as_bytes());
    if frontmatter.as_mapping().is_none() {
        *frontmatter = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    frontmatter
        .as_mapping_mut()
        .expect("just ensured this is a mapping")
        .insert(serde_yaml::Value::String("id".to_string()), serde_yaml::Value::String(generated.to_string()));
    (NodeId::from_string(generated.to_string()), true)
}

// ---------------------------------------------------------------------
// Wikilink and inline-tag extraction
// ---------------------------------------------------------------------

/// Extract `[[target]]` wikilinks from a note body (`[[target|alias]]`,
/// `[[target#header]]`, `[[target#^block]]`, and `![[target]]` embeds all
/// resolve to just `target`), in first-appearance order with duplicates
/// removed.
pub fn extract_wikilinks(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    let mut cursor = 0;
    while let Some(rel_start) = body[cursor..].find("[[") {
        let open = cursor + rel_start + 2;
        let Some(rel_end) = body[open..].find("]]") else { break };
        let inner = &body[open..open + rel_end];
        let target_end = inner.find(['|', '#']).unwrap_or(inner.len());
        let target = inner[..target_end].trim();
        if !target.is_empty() && seen.insert(target.to_string()) {
            out.push(target.to_string());
        }
        cursor = open + rel_end + 2;
    }
    out
}

/// Mask out `[[...]]` spans (replacing with spaces, preserving byte offsets)
/// so hashtag extraction doesn't pick up header/block refs inside links.
fn mask_wikilinks(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i..].starts_with("[[") {
            if let Some(rel_end) = body[i..].find("]]") {
                let span_len = rel_end + 2;
                out.extend(std::iter::repeat(' ').take(span_len));
                i += span_len;
                continue;
            }
        }
        let ch = body[i..].chars().next().expect("i < body.len()");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Length of a line's leading run of `#` characters if that run is a
/// markdown header marker (followed by a space or end of line), else 0.
fn leading_heading_span(line: &str) -> usize {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 {
        return 0;
    }
    match line.as_bytes().get(hashes) {
        None | Some(b' ') => hashes,
        _ => 0,
    }
}

/// Extract inline `#tags` from a note body (hierarchical via `/`), excluding
/// markdown header markers and anything inside `[[...]]` links.
pub fn extract_inline_tags(body: &str) -> BTreeSet<String> {
    let masked = mask_wikilinks(body);
    let mut tags = BTreeSet::new();
    for line in masked.lines() {
        let heading_span = leading_heading_span(line);
        for (idx, _) in line.match_indices('#') {
            if idx < heading_span {
                continue;
            }
            let rest = &line[idx + 1..];
            let mut chars = rest.chars();
            let Some(first) = chars.next() else { continue };
            if !first.is_alphabetic() {
                continue;
            }
            let tag_len = 1 + chars.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/')).count();
            tags.insert(rest[..tag_len].to_string());
        }
    }
    tags
}

// ---------------------------------------------------------------------
// Single-note sync
// ---------------------------------------------------------------------

/// Parse, extract, and upsert one note into the graph: frontmatter + body
/// parsing, `node_id` resolution, wikilink/tag extraction, then
/// `merge_note_node` and `sync_note_links`. Used by both the real-time
/// watcher and the batch scans below.
pub async fn sync_note(vault: &VaultManager, graph: &GraphStore, path: &Path) -> Result<NodeId> {
    let contents = vault.read_note(path).await?;
    let (frontmatter_src, body) = split_frontmatter(&contents);
    let mut frontmatter: serde_yaml::Value = match frontmatter_src {
        Some(src) if !src.trim().is_empty() => serde_yaml::from_str(src)?,
        _ => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
    };
    if frontmatter.as_mapping().is_none() {
        frontmatter = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }

    let absolute_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let (node_id, id_written) = resolve_node_id(&mut frontmatter, &absolute_path);
    if id_written {
        let rewritten = render_note(&frontmatter, body);
        vault.write_note(path, &rewritten).await?;
    }

    let default_title = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Untitled").to_string();
    let title = frontmatter_str(&frontmatter, "title").unwrap_or(default_title);
    let note_type = frontmatter_str(&frontmatter, "type").unwrap_or_else(|| "note".to_string());
    let source_url = frontmatter_str(&frontmatter, "source_url");
    let tags: Vec<String> = merge_tags(&frontmatter_tags(&frontmatter), &extract_inline_tags(body)).into_iter().collect();

    let relative_path = vault.relative_path(path).unwrap_or_else(|| path.to_path_buf());
    let file_path = relative_path.to_string_lossy().to_string();

    graph.merge_note_node(&node_id, &title, &note_type, &tags, &file_path, source_url.as_deref())?;

    let targets: Vec<NodeId> = extract_wikilinks(body).into_iter().map(NodeId::from_string).collect();
    graph.sync_note_links(&node_id, &targets)?;

    Ok(node_id)
}

/// Real-time single-note sync, invoked by [`VaultWatcher`] (or directly) on
/// create/modify. Deliberately bypasses the full/reconciliation run lock.
pub async fn sync_one(vault: &VaultManager, graph: &GraphStore, path: &Path) -> Result<NodeId> {
    sync_note(vault, graph, path).await
}

// ---------------------------------------------------------------------
// Real-time watcher
// ---------------------------------------------------------------------

/// Real-time watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How long to keep collecting events for the same batch before
    /// flushing it to `sync_one`, coalescing rapid successive edits.
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(500) }
    }
}

/// Watches the vault root for create/modify events on `*.md` files,
/// debouncing by collecting events for a short window before syncing each
/// distinct path once, the way the codebase watcher coalesces rapid file
/// changes into a single maintenance pass.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    /// Start watching `vault.root()`. Runs until the watcher's event
    /// channel disconnects, blocking the calling thread; callers should run
    /// this on a dedicated thread or `tokio::task::spawn_blocking`.
    pub fn run_blocking(vault: &VaultManager, graph: &GraphStore, config: WatcherConfig, rt: tokio::runtime::Handle) -> Result<()> {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(vault.root(), RecursiveMode::Recursive)?;
        let _guard = VaultWatcher { _watcher: watcher };

        loop {
            let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
            match rx.recv() {
                Ok(event) => collect_markdown_paths(&event, &mut pending),
                Err(_) => return Ok(()),
            }

            let deadline = SystemTime::now() + config.debounce;
            while let Ok(remaining) = deadline.duration_since(SystemTime::now()) {
                match rx.recv_timeout(remaining) {
                    Ok(event) => collect_markdown_paths(&event, &mut pending),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return Ok(()),
                }
            }

            for path in &pending {
                if let Err(err) = rt.block_on(sync_one(vault, graph, path)) {
                    warn!(path = %path.display(), error = %err, "vault watcher: real-time sync failed");
                }
            }
        }
    }
}

fn collect_markdown_paths(event: &Event, out: &mut BTreeSet<PathBuf>) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            out.insert(path.clone());
        }
    }
}
