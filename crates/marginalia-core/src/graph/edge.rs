//! Edge representation in the property graph.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed, directed relationship between two nodes. `rel_type` is always
/// sanitized to upper snake case (`-`/space become `_`) before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, rel_type: impl AsRef<str>) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            rel_type: sanitize_rel_type(rel_type.as_ref()),
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Uppercase a relationship-type label and replace `-`/space with `_`, e.g.
/// `"relates to"` -> `"RELATES_TO"`.
pub fn sanitize_rel_type(rel_type: &str) -> String {
    rel_type
        .to_uppercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rel_type_normalizes_separators_and_case() {
        assert_eq!(sanitize_rel_type("relates-to"), "RELATES_TO");
        assert_eq!(sanitize_rel_type("extends"), "EXTENDS");
        assert_eq!(sanitize_rel_type("prerequisite for"), "PREREQUISITE_FOR");
    }
}
