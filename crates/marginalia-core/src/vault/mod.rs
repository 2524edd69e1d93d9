//! Vault Manager (C3): the filesystem tree that mirrors processed content as
//! plain-text notes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VaultError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// System folders created regardless of the content-type registry.
const SYSTEM_FOLDERS: &[&str] = &[
    "templates",
    "meta",
    "assets/images",
    "concepts",
    "daily",
    "topics",
    "exercises/worked",
    "exercises/practice",
    "reviews/due",
    "reviews/archive",
];

const MAX_FILENAME_CHARS: usize = 100;
const FILENAME_STRIP_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// A filesystem tree rooted at a configured path, holding one note per
/// `ContentRecord` plus system folders (templates, meta, assets, reviews).
#[derive(Debug, Clone)]
pub struct VaultManager {
    root: PathBuf,
    content_type_folders: Vec<String>,
}

impl VaultManager {
    pub fn new(root: impl Into<PathBuf>, content_type_folders: Vec<String>) -> Self {
        Self {
            root: root.into(),
            content_type_folders,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create any missing required directories. Idempotent: existing
    /// directories are never touched.
    pub async fn ensure_structure(&self) -> Result<()> {
        for folder in SYSTEM_FOLDERS {
            self.ensure_dir(&self.root.join(folder)).await?;
        }
        for folder in &self.content_type_folders {
            self.ensure_dir(&self.root.join(folder)).await?;
        }
        Ok(())
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| VaultError::Io { path: path.to_path_buf(), source })
    }

    /// Derive a filesystem-safe filename from a title: strip the reserved
    /// character set, collapse whitespace, truncate to at most 100 chars at
    /// the last word boundary, and default to `Untitled`.
    pub fn sanitize_filename(title: &str) -> String {
        let stripped: String = title.chars().filter(|c| !FILENAME_STRIP_CHARS.contains(c)).collect();
        let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim();

        if trimmed.is_empty() {
            return "Untitled".to_string();
        }

        if trimmed.chars().count() <= MAX_FILENAME_CHARS {
            return trimmed.to_string();
        }

        let mut truncated = String::new();
        for word in trimmed.split(' ') {
            let candidate = if truncated.is_empty() {
                word.to_string()
            } else {
                format!("{truncated} {word}")
            };
            if candidate.chars().count() > MAX_FILENAME_CHARS {
                break;
            }
            truncated = candidate;
        }

        if truncated.is_empty() {
            trimmed.chars().take(MAX_FILENAME_CHARS).collect()
        } else {
            truncated
        }
    }

    /// A path under `folder` for `title`, suffixing `_N` on filename
    /// collision with an existing file.
    pub fn get_unique_path(&self, folder: &str, title: &str) -> PathBuf {
        let base_name = Self::sanitize_filename(title);
        let dir = self.root.join(folder);
        let mut candidate = dir.join(format!("{base_name}.md"));
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{base_name}_{n}.md"));
            n += 1;
        }
        candidate
    }

    /// For reprocessing in place: prefer a known existing path, falling back
    /// to a freshly derived unique path.
    pub fn get_path_for_update(&self, existing_path: Option<&str>, folder: &str, title: &str) -> PathBuf {
        match existing_path {
            Some(p) => self.root.join(p),
            None => self.get_unique_path(folder, title),
        }
    }

    /// Write a note's contents, creating parent directories and overwriting
    /// any existing file. Not internally serialized against concurrent
    /// writers to the same path — callers coordinate via debouncing.
    pub async fn write_note(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent).await?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| VaultError::Io { path: path.to_path_buf(), source })
    }

    pub async fn read_note(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| VaultError::Io { path: path.to_path_buf(), source })
    }

    /// Relative path of `path` against the vault root, if `path` is inside it.
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    /// All `*.md` files under the vault root, excluding `.obsidian/`.
    pub async fn walk_markdown_files(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|source| VaultError::Io { path: dir.clone(), source })?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|source| VaultError::Io { path: dir.clone(), source })?
            {
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().and_then(|n| n.to_str()) == Some(".obsidian") {
                        continue;
                    }
                    stack.push(path);
                } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                    out.push(path);
                }
            }
        }
        Ok(out)
    }
}

/// Union of frontmatter tags and inline hashtags into a single ordered set.
pub fn merge_tags(frontmatter: &BTreeSet<String>, inline: &BTreeSet<String>) -> BTreeSet<String> {
    frontmatter.union(inline).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(VaultManager::sanitize_filename("A/B: C?"), "AB C");
    }

    #[test]
    fn sanitize_defaults_to_untitled() {
        assert_eq!(VaultManager::sanitize_filename("???"), "Untitled");
    }

    #[test]
    fn sanitize_truncates_at_word_boundary() {
        let long_title = "word ".repeat(40);
        let sanitized = VaultManager::sanitize_filename(&long_title);
        assert!(sanitized.chars().count() <= MAX_FILENAME_CHARS);
        assert!(!sanitized.ends_with(' '));
    }

    #[tokio::test]
    async fn ensure_structure_creates_system_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec!["papers".into()]);
        vault.ensure_structure().await.unwrap();
        assert!(tmp.path().join("reviews/due").is_dir());
        assert!(tmp.path().join("papers").is_dir());
    }

    #[tokio::test]
    async fn ensure_structure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec![]);
        vault.ensure_structure().await.unwrap();
        vault.ensure_structure().await.unwrap();
        assert!(tmp.path().join("meta").is_dir());
    }

    #[test]
    fn get_unique_path_suffixes_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec![]);
        std::fs::create_dir_all(tmp.path().join("papers")).unwrap();
        std::fs::write(tmp.path().join("papers/My Paper.md"), "x").unwrap();

        let path = vault.get_unique_path("papers", "My Paper");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "My Paper_1.md");
    }

    #[test]
    fn get_path_for_update_prefers_existing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec![]);
        let path = vault.get_path_for_update(Some("papers/Existing.md"), "papers", "New Title");
        assert_eq!(path, tmp.path().join("papers/Existing.md"));
    }

    #[tokio::test]
    async fn walk_markdown_files_excludes_obsidian_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = VaultManager::new(tmp.path(), vec![]);
        std::fs::create_dir_all(tmp.path().join(".obsidian")).unwrap();
        std::fs::write(tmp.path().join(".obsidian/workspace.md"), "x").unwrap();
        std::fs::write(tmp.path().join("note.md"), "x").unwrap();

        let files = vault.walk_markdown_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name().unwrap().to_str().unwrap(), "note.md");
    }
}
