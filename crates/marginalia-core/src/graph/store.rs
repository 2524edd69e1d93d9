use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::content::{Concept, Importance};

use super::edge::{sanitize_rel_type, Edge};
use super::node::{Node, NodeId, NodeKind};

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// A vector-search hit: node id, title, summary, and cosine similarity score.
#[derive(Debug, Clone)]
pub struct VectorSearchHit {
    pub id: NodeId,
    pub title: String,
    pub summary: Option<String>,
    pub score: f32,
}

/// Embedded property-graph store backing `ContentNode`, `ConceptNode`, and
/// `NoteNode`. All write operations are idempotent (MERGE semantics): saving
/// the same logical entity twice updates it in place rather than duplicating.
pub struct GraphStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore").finish_non_exhaustive()
    }
}

impl GraphStore {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                embedding BLOB
             );
             CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
             CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                target TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                rel_type TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                UNIQUE(source, target, rel_type)
             );
             CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
             CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);",
        )?;
        Ok(())
    }

    fn upsert_node(&self, node: &Node) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO nodes (id, kind, properties, embedding) VALUES (?1,?2,?3,?4)
             ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, properties = excluded.properties,
                embedding = COALESCE(excluded.embedding, nodes.embedding)",
            params![
                node.id.as_str(),
                node.kind.as_str(),
                serde_json::to_string(&node.properties)?,
                node.embedding.as_ref().map(|v| embedding_to_blob(v)),
            ],
        )?;
        Ok(())
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT kind, properties, embedding FROM nodes WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((kind_str, properties_str, embedding_blob)) = row else {
            return Ok(None);
        };
        Ok(Some(Node {
            id: id.clone(),
            kind: parse_kind(&kind_str),
            properties: serde_json::from_str(&properties_str)?,
            embedding: embedding_blob.map(|b| embedding_from_blob(&b)),
        }))
    }

    /// MERGE by uuid: overwrite properties, update embedding.
    pub fn create_content_node(
        &self,
        uuid: Uuid,
        title: &str,
        content_type: &str,
        summary: Option<&str>,
        embedding: Option<Vec<f32>>,
        tags: &[String],
        url: Option<&str>,
        file_path: Option<&str>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<NodeId> {
        let id = NodeId::from(uuid);
        let mut node = Node::new(id.clone(), NodeKind::Content).with_property("title", title).with_property("content_type", content_type);
        if let Some(s) = summary {
            node = node.with_property("summary", s);
        }
        if let Some(u) = url {
            node = node.with_property("url", u);
        }
        if let Some(fp) = file_path {
            node = node.with_property("file_path", fp);
        }
        node = node.with_property("tags", serde_json::Value::Array(tags.iter().cloned().map(Into::into).collect()));
        for (k, v) in metadata {
            node.properties.entry(k).or_insert(v);
        }
        node.embedding = embedding;
        self.upsert_node(&node)?;
        Ok(id)
    }

    /// MERGE by `canonical_name`: keep the longer definition, union aliases,
    /// prefer the display name carrying full alias annotation.
    pub fn create_concept_node(&self, concept: &Concept, embedding: Option<Vec<f32>>, file_path: Option<&str>) -> Result<NodeId> {
        let id = NodeId::from_string(concept.canonical_name.clone());
        let existing = self.get_node(&id)?;

        let (name, definition, mut aliases) = match &existing {
            Some(existing) => {
                let existing_def = existing.property_str("definition").map(str::to_string);
                let winner_def = match (&existing_def, &concept.definition) {
                    (Some(a), Some(b)) if b.len() > a.len() => Some(b.clone()),
                    (Some(a), _) => Some(a.clone()),
                    (None, b) => b.clone(),
                };
                let existing_name_has_aliases = existing
                    .property_str("name")
                    .map(|n| n.contains('('))
                    .unwrap_or(false);
                let name = if existing_name_has_aliases {
                    existing.property_str("name").unwrap_or(&concept.name).to_string()
                } else {
                    concept.name.clone()
                };
                let mut aliases: std::collections::BTreeSet<String> = existing
                    .properties
                    .get("aliases")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                aliases.extend(concept.aliases.iter().cloned());
                (name, winner_def, aliases)
            }
            None => (concept.name.clone(), concept.definition.clone(), concept.aliases.clone()),
        };

        let mut node = Node::new(id.clone(), NodeKind::Concept)
            .with_property("name", name)
            .with_property("canonical_name", concept.canonical_name.clone())
            .with_property("importance", importance_str(concept.importance));
        if let Some(def) = definition {
            node = node.with_property("definition", def);
        }
        if let Some(fp) = file_path {
            node = node.with_property("file_path", fp);
        }
        node = node.with_property(
            "aliases",
            serde_json::Value::Array(aliases.into_iter().map(Into::into).collect()),
        );
        if embedding.is_some() {
            node.embedding = embedding;
        } else if let Some(existing) = existing {
            node.embedding = existing.embedding;
        }
        self.upsert_node(&node)?;
        Ok(id)
    }

    /// MERGE an edge of the given type between two existing nodes.
    pub fn create_relationship(
        &self,
        source_id: &NodeId,
        target_id: &NodeId,
        rel_type: &str,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let edge = Edge::new(source_id.clone(), target_id.clone(), rel_type);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO edges (id, source, target, rel_type, properties) VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(source, target, rel_type) DO UPDATE SET properties = excluded.properties",
            params![
                edge.id.as_str(),
                edge.source.as_str(),
                edge.target.as_str(),
                edge.rel_type,
                serde_json::to_string(&properties)?,
            ],
        )?;
        Ok(())
    }

    /// Look up two concepts by canonical name and link them, if both exist.
    /// Returns whether the edge was created.
    pub fn link_concept_to_concept(&self, source_name: &str, target_name: &str, rel_type: &str) -> Result<bool> {
        let source_id = NodeId::from_string(crate::dedup::canonical_name(source_name));
        let target_id = NodeId::from_string(crate::dedup::canonical_name(target_name));
        if self.get_node(&source_id)?.is_none() || self.get_node(&target_id)?.is_none() {
            return Ok(false);
        }
        self.create_relationship(&source_id, &target_id, rel_type, serde_json::Map::new())?;
        Ok(true)
    }

    /// Delete all outgoing edges of the content node (used on reprocess).
    pub fn delete_content_relationships(&self, content_uuid: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM edges WHERE source = ?1",
            params![content_uuid.to_string()],
        )?;
        Ok(())
    }

    /// Every edge with `node_id` as source or target, in either direction.
    pub fn edges_touching(&self, node_id: &NodeId) -> Result<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source, target, rel_type, properties FROM edges WHERE source = ?1 OR target = ?1",
        )?;
        let edges = stmt
            .query_map(params![node_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .filter_map(|row| row.ok())
            .filter_map(|(id, source, target, rel_type, properties_str)| {
                let properties = serde_json::from_str(&properties_str).ok()?;
                Some(Edge {
                    id: super::edge::EdgeId::from_string(id),
                    source: NodeId::from_string(source),
                    target: NodeId::from_string(target),
                    rel_type,
                    properties,
                })
            })
            .collect();
        Ok(edges)
    }

    /// Delete a node and every edge touching it (the `edges` table cascades
    /// on `source`/`target` via `ON DELETE CASCADE`).
    pub fn delete_node(&self, node_id: &NodeId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![node_id.as_str()])?;
        Ok(())
    }

    /// Cosine-similarity search among nodes of `node_type`, returning hits
    /// with score >= `threshold`, highest first, capped at `top_k`.
    pub fn vector_search(&self, embedding: &[f32], node_type: NodeKind, top_k: usize, threshold: f32) -> Result<Vec<VectorSearchHit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, properties, embedding FROM nodes WHERE kind = ?1 AND embedding IS NOT NULL")?;
        let mut hits: Vec<VectorSearchHit> = stmt
            .query_map(params![node_type.as_str()], |row| {
                let id: String = row.get(0)?;
                let properties_str: String = row.get(1)?;
                let embedding_blob: Vec<u8> = row.get(2)?;
                Ok((id, properties_str, embedding_blob))
            })?
            .filter_map(|row| row.ok())
            .filter_map(|(id, properties_str, blob)| {
                let properties: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&properties_str).ok()?;
                let candidate = embedding_from_blob(&blob);
                let score = cosine_similarity(embedding, &candidate);
                if score < threshold {
                    return None;
                }
                Some(VectorSearchHit {
                    id: NodeId::from_string(id),
                    title: properties.get("title").or_else(|| properties.get("name")).and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    summary: properties.get("summary").and_then(|v| v.as_str()).map(str::to_string),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// MERGE a `NoteNode` by id; used by the Vault Reconciler.
    pub fn merge_note_node(&self, id: &NodeId, title: &str, note_type: &str, tags: &[String], file_path: &str, url: Option<&str>) -> Result<()> {
        let mut node = Node::new(id.clone(), NodeKind::Note)
            .with_property("title", title)
            .with_property("note_type", note_type)
            .with_property("file_path", file_path)
            .with_property("tags", serde_json::Value::Array(tags.iter().cloned().map(Into::into).collect()));
        if let Some(u) = url {
            node = node.with_property("url", u);
        }
        self.upsert_node(&node)
    }

    /// Delete existing outgoing `LINKS_TO` from `source_id`, then recreate
    /// against `target_ids`, creating placeholder NoteNodes for any target
    /// that doesn't yet exist.
    pub fn sync_note_links(&self, source_id: &NodeId, target_ids: &[NodeId]) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "DELETE FROM edges WHERE source = ?1 AND rel_type = 'LINKS_TO'",
                params![source_id.as_str()],
            )?;
        }
        for target in target_ids {
            if self.get_node(target)?.is_none() {
                let placeholder = Node::new(target.clone(), NodeKind::Note).with_property("placeholder", true);
                self.upsert_node(&placeholder)?;
            }
            self.create_relationship(source_id, target, "LINKS_TO", serde_json::Map::new())?;
        }
        Ok(())
    }

    /// MERGE a `REPRESENTS` edge between a ContentNode and a NoteNode that
    /// share the same `file_path` property.
    pub fn link_content_to_note_by_path(&self, file_path: &str) -> Result<bool> {
        let content_id = self.find_node_by_property(NodeKind::Content, "file_path", file_path)?;
        let note_id = self.find_node_by_property(NodeKind::Note, "file_path", file_path)?;
        match (content_id, note_id) {
            (Some(content_id), Some(note_id)) => {
                self.create_relationship(&content_id, &note_id, "REPRESENTS", serde_json::Map::new())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn find_node_by_property(&self, kind: NodeKind, key: &str, value: &str) -> Result<Option<NodeId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, properties FROM nodes WHERE kind = ?1")?;
        let rows = stmt
            .query_map(params![kind.as_str()], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .filter_map(|r| r.ok());
        for (id, properties_str) in rows {
            if let Ok(properties) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&properties_str) {
                if properties.get(key).and_then(|v| v.as_str()) == Some(value) {
                    return Ok(Some(NodeId::from_string(id)));
                }
            }
        }
        Ok(None)
    }
}

fn parse_kind(s: &str) -> NodeKind {
    match s {
        "concept" => NodeKind::Concept,
        "note" => NodeKind::Note,
        _ => NodeKind::Content,
    }
}

fn importance_str(i: Importance) -> &'static str {
    match i {
        Importance::Core => "core",
        Importance::Supporting => "supporting",
        Importance::Tangential => "tangential",
    }
}

fn embedding_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn embedding_from_blob(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Concept;
    use std::collections::BTreeSet;

    fn concept(name: &str, canonical: &str, definition: &str) -> Concept {
        Concept {
            id: Uuid::new_v4(),
            name: name.to_string(),
            canonical_name: canonical.to_string(),
            aliases: BTreeSet::new(),
            definition: Some(definition.to_string()),
            importance: Importance::Core,
            embedding: None,
            related_concepts: Vec::new(),
        }
    }

    #[test]
    fn create_content_node_is_idempotent() {
        let store = GraphStore::open_in_memory().unwrap();
        let uuid = Uuid::new_v4();
        store.create_content_node(uuid, "Title", "article", None, None, &[], None, None, serde_json::Map::new()).unwrap();
        store.create_content_node(uuid, "Updated Title", "article", None, None, &[], None, None, serde_json::Map::new()).unwrap();

        let node = store.get_node(&NodeId::from(uuid)).unwrap().unwrap();
        assert_eq!(node.property_str("title"), Some("Updated Title"));
    }

    #[test]
    fn create_concept_node_merges_by_canonical_name_and_keeps_longer_definition() {
        let store = GraphStore::open_in_memory().unwrap();
        store.create_concept_node(&concept("BC", "behavior cloning", "short def"), None, None).unwrap();
        store
            .create_concept_node(&concept("Behavior Cloning", "behavior cloning", "a much longer and more complete definition"), None, None)
            .unwrap();

        let node = store.get_node(&NodeId::from_string("behavior cloning")).unwrap().unwrap();
        assert_eq!(
            node.property_str("definition"),
            Some("a much longer and more complete definition")
        );
    }

    #[test]
    fn create_relationship_is_idempotent() {
        let store = GraphStore::open_in_memory().unwrap();
        let a = NodeId::from_string("a");
        let b = NodeId::from_string("b");
        store.create_content_node(Uuid::new_v4(), "A", "t", None, None, &[], None, None, serde_json::Map::new()).ok();
        store.upsert_node(&Node::new(a.clone(), NodeKind::Content)).unwrap();
        store.upsert_node(&Node::new(b.clone(), NodeKind::Content)).unwrap();

        store.create_relationship(&a, &b, "relates-to", serde_json::Map::new()).unwrap();
        store.create_relationship(&a, &b, "relates-to", serde_json::Map::new()).unwrap();

        let conn = store.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn link_concept_to_concept_fails_when_either_side_missing() {
        let store = GraphStore::open_in_memory().unwrap();
        store.create_concept_node(&concept("A", "a", "def"), None, None).unwrap();
        let linked = store.link_concept_to_concept("a", "nonexistent", "RELATES_TO").unwrap();
        assert!(!linked);
    }

    #[test]
    fn vector_search_filters_by_threshold() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .create_content_node(Uuid::new_v4(), "Close", "t", None, Some(vec![1.0, 0.0]), &[], None, None, serde_json::Map::new())
            .unwrap();
        store
            .create_content_node(Uuid::new_v4(), "Far", "t", None, Some(vec![0.0, 1.0]), &[], None, None, serde_json::Map::new())
            .unwrap();

        let hits = store.vector_search(&[1.0, 0.0], NodeKind::Content, 10, 0.9).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Close");
    }

    #[test]
    fn sync_note_links_creates_placeholders_for_unresolved_targets() {
        let store = GraphStore::open_in_memory().unwrap();
        let source = NodeId::from_string("note-a");
        store.merge_note_node(&source, "Note A", "daily", &[], "a.md", None).unwrap();

        let target = NodeId::from_string("note-b");
        store.sync_note_links(&source, &[target.clone()]).unwrap();

        let node = store.get_node(&target).unwrap().unwrap();
        assert_eq!(node.properties.get("placeholder").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn link_content_to_note_by_shared_file_path() {
        let store = GraphStore::open_in_memory().unwrap();
        let uuid = Uuid::new_v4();
        store
            .create_content_node(uuid, "Title", "article", None, None, &[], None, Some("notes/title.md"), serde_json::Map::new())
            .unwrap();
        store.merge_note_node(&NodeId::from_string("note-1"), "Title", "article", &[], "notes/title.md", None).unwrap();

        let linked = store.link_content_to_note_by_path("notes/title.md").unwrap();
        assert!(linked);
    }
}
