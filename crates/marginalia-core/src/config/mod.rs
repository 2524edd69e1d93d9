//! Environment-driven configuration: store/vault/upload paths, per-operation
//! model identifiers, file-size and concurrency caps, and the tag-taxonomy
//! path. No path is hardcoded; every field has a sensible default rooted at
//! the platform data directory, overridable by an environment variable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("could not determine a platform data directory; set MARGINALIA_DATA_DIR")]
    NoDataDir,
    #[error("io error reading/writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state file {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Model identifiers per LLM operation, matching the provider-agnostic
/// `complete(operation, …)`/`embed(…)`/`complete_with_vision(…)` interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub text_default: String,
    pub vision_default: String,
    pub embeddings_default: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text_default: "gpt-4o-mini".to_string(),
            vision_default: "gpt-4o".to_string(),
            embeddings_default: "text-embedding-3-small".to_string(),
        }
    }
}

/// File-size and concurrency limits enforced by the pipelines and task runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Caps upload validation (`validate_file_size`); default matches
    /// `pipeline::MAX_FILE_SIZE_BYTES`.
    pub max_file_size_bytes: u64,
    /// Concurrent OCR sub-tasks within one book-batch worker.
    pub ocr_concurrency: usize,
    /// Tasks a single task-runner worker process runs at once.
    pub task_worker_concurrency: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: crate::pipeline::MAX_FILE_SIZE_BYTES,
            ocr_concurrency: 5,
            task_worker_concurrency: 1,
        }
    }
}

/// Filesystem locations. `data_dir` anchors the relational store, graph
/// store, and the vault watermark state file when no overrides are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub vault_path: PathBuf,
    pub upload_dir: PathBuf,
    pub tag_taxonomy_path: PathBuf,
}

impl Paths {
    fn from_data_dir(data_dir: PathBuf) -> Self {
        Self {
            vault_path: data_dir.join("vault"),
            upload_dir: data_dir.join("uploads"),
            tag_taxonomy_path: data_dir.join("tag_taxonomy.yaml"),
            data_dir,
        }
    }

    pub fn store_db_path(&self) -> PathBuf {
        self.data_dir.join("marginalia.db")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join("marginalia-graph.db")
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.data_dir.join("sync_state.json")
    }
}

/// The complete, process-wide configuration, assembled once in the "system"
/// bundle at startup ([`Config::from_env`]) and passed down to whatever
/// constructs stores, pipelines, and the reconciler — no module reaches back
/// into `std::env` on its own past this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub paths: Paths,
    pub models: ModelConfig,
    pub limits: Limits,
    /// Monthly LLM spend cap in USD, checked by the cost ledger's
    /// `budget_check`. `None` disables budget warnings.
    pub llm_budget_usd: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: Paths::from_data_dir(PathBuf::from("./data")),
            models: ModelConfig::default(),
            limits: Limits::default(),
            llm_budget_usd: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to a platform
    /// data directory (`directories::ProjectDirs`) for any path not
    /// overridden. Mirrors the teacher's `Storage::new(db_path: Option<_>)` +
    /// `ProjectDirs::from("com", "vestige", "core")` fallback, generalized to
    /// every configurable path instead of just the store file.
    pub fn from_env() -> Result<Self> {
        let default_data_dir = match std::env::var_os("MARGINALIA_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let proj_dirs = ProjectDirs::from("com", "marginalia", "core").ok_or(ConfigError::NoDataDir)?;
                proj_dirs.data_dir().to_path_buf()
            }
        };
        std::fs::create_dir_all(&default_data_dir).map_err(|source| ConfigError::Io { path: default_data_dir.clone(), source })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&default_data_dir) {
                let mut perms = meta.permissions();
                perms.set_mode(0o700);
                let _ = std::fs::set_permissions(&default_data_dir, perms);
            }
        }

        let mut paths = Paths::from_data_dir(default_data_dir);
        if let Some(v) = env_path("OBSIDIAN_VAULT_PATH") {
            paths.vault_path = v;
        }
        if let Some(v) = env_path("UPLOAD_DIR") {
            paths.upload_dir = v;
        }
        if let Some(v) = env_path("MARGINALIA_TAG_TAXONOMY_PATH") {
            paths.tag_taxonomy_path = v;
        }

        let mut models = ModelConfig::default();
        if let Ok(v) = std::env::var("MARGINALIA_MODEL_TEXT_DEFAULT") {
            models.text_default = v;
        }
        if let Ok(v) = std::env::var("MARGINALIA_MODEL_VISION_DEFAULT") {
            models.vision_default = v;
        }
        if let Ok(v) = std::env::var("MARGINALIA_MODEL_EMBEDDINGS_DEFAULT") {
            models.embeddings_default = v;
        }

        let mut limits = Limits::default();
        if let Some(v) = env_parsed::<u64>("MARGINALIA_MAX_FILE_SIZE_BYTES")? {
            limits.max_file_size_bytes = v;
        }
        if let Some(v) = env_parsed::<usize>("MARGINALIA_OCR_CONCURRENCY")? {
            limits.ocr_concurrency = v.max(1);
        }
        if let Some(v) = env_parsed::<usize>("MARGINALIA_TASK_WORKER_CONCURRENCY")? {
            limits.task_worker_concurrency = v.max(1);
        }

        let llm_budget_usd = env_parsed::<u64>("MARGINALIA_LLM_BUDGET_USD")?;

        Ok(Self { paths, models, limits, llm_budget_usd })
    }
}

fn env_path(var: &'static str) -> Option<PathBuf> {
    std::env::var_os(var).map(PathBuf::from)
}

fn env_parsed<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>> {
    match std::env::var(var) {
        Ok(value) => value.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(None),
    }
}

// ---------------------------------------------------------------------
// Vault reconciler watermark persistence
// ---------------------------------------------------------------------

/// The reconciler itself takes/returns `last_sync_time` as a plain parameter
/// rather than owning storage (see `reconcile` module docs); this is the
/// small JSON sidecar a caller uses to persist that watermark across process
/// restarts, keyed by absolute vault path so multiple vaults never collide.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SyncState {
    last_sync_time: Option<DateTime<Utc>>,
}

pub fn load_last_sync_time(state_path: &Path) -> Result<Option<DateTime<Utc>>> {
    match std::fs::read_to_string(state_path) {
        Ok(contents) => {
            let state: SyncState = serde_json::from_str(&contents).map_err(|source| ConfigError::State { path: state_path.to_path_buf(), source })?;
            Ok(state.last_sync_time)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io { path: state_path.to_path_buf(), source }),
    }
}

pub fn save_last_sync_time(state_path: &Path, last_sync_time: DateTime<Utc>) -> Result<()> {
    let state = SyncState { last_sync_time: Some(last_sync_time) };
    let json = serde_json::to_string_pretty(&state).expect("SyncState serializes infallibly");
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io { path: parent.to_path_buf(), source })?;
    }
    std::fs::write(state_path, json).map_err(|source| ConfigError::Io { path: state_path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `from_env` tests mutate process-wide environment variables; serialize
    // them so they don't clobber each other under parallel test execution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_paths_are_relative_to_data_dir() {
        let paths = Paths::from_data_dir(PathBuf::from("/tmp/marginalia-test"));
        assert_eq!(paths.vault_path, PathBuf::from("/tmp/marginalia-test/vault"));
        assert_eq!(paths.store_db_path(), PathBuf::from("/tmp/marginalia-test/marginalia.db"));
        assert_eq!(paths.graph_db_path(), PathBuf::from("/tmp/marginalia-test/marginalia-graph.db"));
    }

    #[test]
    fn sync_state_round_trips_through_json_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let state_path = tmp.path().join("sync_state.json");

        assert_eq!(load_last_sync_time(&state_path).unwrap(), None);

        let now = Utc::now();
        save_last_sync_time(&state_path, now).unwrap();
        let loaded = load_last_sync_time(&state_path).unwrap();
        assert_eq!(loaded, Some(now));
    }

    #[test]
    fn from_env_honors_data_dir_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("MARGINALIA_DATA_DIR", tmp.path());
        std::env::remove_var("OBSIDIAN_VAULT_PATH");
        let config = Config::from_env().unwrap();
        std::env::remove_var("MARGINALIA_DATA_DIR");

        assert_eq!(config.paths.data_dir, tmp.path());
        assert_eq!(config.paths.vault_path, tmp.path().join("vault"));
        assert_eq!(config.limits.max_file_size_bytes, crate::pipeline::MAX_FILE_SIZE_BYTES);
    }

    #[test]
    fn from_env_rejects_unparseable_numeric_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("MARGINALIA_DATA_DIR", tmp.path());
        std::env::set_var("MARGINALIA_OCR_CONCURRENCY", "not-a-number");
        let err = Config::from_env().unwrap_err();
        std::env::remove_var("MARGINALIA_DATA_DIR");
        std::env::remove_var("MARGINALIA_OCR_CONCURRENCY");

        assert!(matches!(err, ConfigError::InvalidValue { var: "MARGINALIA_OCR_CONCURRENCY", .. }));
    }
}
