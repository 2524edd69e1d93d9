//! Tag Taxonomy: the process-wide controlled vocabulary of domain and meta
//! tags, loaded from a YAML file and cached with a TTL.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaxonomyError {
    #[error("reading tag taxonomy file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing tag taxonomy YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

/// Raw on-disk shape: a nested `domains` tree plus flat `status`/`quality`
/// lists.
#[derive(Debug, Clone, Deserialize, Default)]
struct RawTaxonomy {
    #[serde(default)]
    domains: serde_yaml::Mapping,
    #[serde(default)]
    status: Vec<String>,
    #[serde(default)]
    quality: Vec<String>,
}

/// The flattened, queryable controlled vocabulary: every valid
/// `domain/path/segment` tag plus the flat `status/*` and `quality/*` meta
/// tags.
#[derive(Debug, Clone, Default)]
pub struct TagTaxonomy {
    domain_tags: BTreeSet<String>,
    meta_tags: BTreeSet<String>,
}

impl TagTaxonomy {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawTaxonomy = serde_yaml::from_str(yaml)?;
        let mut domain_tags = BTreeSet::new();
        flatten_domains(&raw.domains, "", &mut domain_tags);

        let mut meta_tags = BTreeSet::new();
        for s in &raw.status {
            meta_tags.insert(format!("status/{s}"));
        }
        for q in &raw.quality {
            meta_tags.insert(format!("quality/{q}"));
        }

        Ok(Self { domain_tags, meta_tags })
    }

    pub fn is_valid(&self, tag: &str) -> bool {
        self.domain_tags.contains(tag) || self.meta_tags.contains(tag)
    }

    /// Splits `tags` into the ones present in the taxonomy and the ones that
    /// are not (callers route the latter to `suggested_new_tags` rather than
    /// persisting them).
    pub fn partition<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> (Vec<String>, Vec<String>) {
        let mut valid = Vec::new();
        let mut rejected = Vec::new();
        for tag in tags {
            if self.is_valid(tag) {
                valid.push(tag.to_string());
            } else {
                rejected.push(tag.to_string());
            }
        }
        (valid, rejected)
    }

    pub fn domain_tags(&self) -> &BTreeSet<String> {
        &self.domain_tags
    }

    pub fn meta_tags(&self) -> &BTreeSet<String> {
        &self.meta_tags
    }
}

fn flatten_domains(mapping: &serde_yaml::Mapping, prefix: &str, out: &mut BTreeSet<String>) {
    for (key, value) in mapping {
        let Some(key) = key.as_str() else { continue };
        let path = if prefix.is_empty() { key.to_string() } else { format!("{prefix}/{key}") };
        match value {
            serde_yaml::Value::Mapping(nested) => {
                out.insert(path.clone());
                flatten_domains(nested, &path, out);
            }
            serde_yaml::Value::Sequence(items) => {
                out.insert(path.clone());
                for item in items {
                    if let Some(leaf) = item.as_str() {
                        out.insert(format!("{path}/{leaf}"));
                    }
                }
            }
            serde_yaml::Value::Null => {
                out.insert(path);
            }
            _ => {
                out.insert(path);
            }
        }
    }
}

/// Lazily loads `TagTaxonomy` from a YAML file, caching it in memory and
/// reloading when the TTL expires or the file's mtime advances.
pub struct TaxonomyCache {
    path: PathBuf,
    ttl: Duration,
    cached: std::sync::Mutex<Option<CachedEntry>>,
}

struct CachedEntry {
    taxonomy: TagTaxonomy,
    loaded_at: Instant,
    source_mtime: Option<SystemTime>,
}

impl TaxonomyCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { path: path.into(), ttl, cached: std::sync::Mutex::new(None) }
    }

    /// Returns the cached taxonomy, reloading from disk if the TTL has
    /// expired or the file's mtime has advanced since the last load.
    pub fn get(&self) -> Result<TagTaxonomy> {
        let current_mtime = file_mtime(&self.path);
        let mut guard = self.cached.lock().expect("taxonomy cache mutex poisoned");

        let needs_reload = match guard.as_ref() {
            None => true,
            Some(entry) => entry.loaded_at.elapsed() >= self.ttl || entry.source_mtime != current_mtime,
        };

        if needs_reload {
            let taxonomy = load_from_file(&self.path)?;
            *guard = Some(CachedEntry { taxonomy: taxonomy.clone(), loaded_at: Instant::now(), source_mtime: current_mtime });
            return Ok(taxonomy);
        }

        Ok(guard.as_ref().expect("checked above").taxonomy.clone())
    }

    /// Forces the next `get()` to reload regardless of TTL or mtime.
    pub fn invalidate(&self) {
        *self.cached.lock().expect("taxonomy cache mutex poisoned") = None;
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn load_from_file(path: &Path) -> Result<TagTaxonomy> {
    let contents = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io { path: path.to_path_buf(), source })?;
    TagTaxonomy::from_yaml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
domains:
  ml:
    architecture:
      - transformers
      - cnn
    training: {}
  systems:
    - networking
status:
  - in_progress
  - archived
quality:
  - reference
"#;

    #[test]
    fn flattens_nested_domain_tree_and_meta_sections() {
        let tax = TagTaxonomy::from_yaml_str(SAMPLE).unwrap();
        assert!(tax.is_valid("ml/architecture/transformers"));
        assert!(tax.is_valid("ml/architecture/cnn"));
        assert!(tax.is_valid("ml/training"));
        assert!(tax.is_valid("systems/networking"));
        assert!(tax.is_valid("status/in_progress"));
        assert!(tax.is_valid("quality/reference"));
        assert!(!tax.is_valid("nonexistent/tag"));
    }

    #[test]
    fn partition_splits_valid_from_unknown_tags() {
        let tax = TagTaxonomy::from_yaml_str(SAMPLE).unwrap();
        let (valid, rejected) = tax.partition(["ml/architecture/transformers", "status/archived", "bogus"]);
        assert_eq!(valid.len(), 2);
        assert_eq!(rejected, vec!["bogus".to_string()]);
    }

    #[test]
    fn cache_reloads_when_file_mtime_advances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cache = TaxonomyCache::new(&path, Duration::from_secs(3600));
        let first = cache.get().unwrap();
        assert!(first.is_valid("ml/architecture/transformers"));

        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(&path, "domains:\n  new:\n    - topic\n").unwrap();

        let second = cache.get().unwrap();
        assert!(second.is_valid("new/topic"));
        assert!(!second.is_valid("ml/architecture/transformers"));
    }
}
