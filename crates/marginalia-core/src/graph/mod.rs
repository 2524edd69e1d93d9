//! Graph Store Adapter (C4): an embedded property graph backing
//! `ContentNode`, `ConceptNode`, and `NoteNode`, with MERGE-idempotent
//! writes and in-process cosine-similarity vector search.

mod edge;
mod node;
mod store;

pub use edge::{sanitize_rel_type, Edge, EdgeId};
pub use node::{Node, NodeId, NodeKind};
pub use store::{GraphError, GraphStore, Result, VectorSearchHit};
