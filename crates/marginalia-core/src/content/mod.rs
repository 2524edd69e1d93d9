//! Core data model: the entities persisted across the relational store, the
//! graph store, and the vault, plus the types that flow between pipelines.

mod content_record;
mod learning;
mod processing;
mod taxonomy;

pub use content_record::{Annotation, AnnotationType, ContentRecord, DedupKey, ProcessingStatus, SourceType};
pub use learning::{
    CardState, CardType, Difficulty, Exercise, ExerciseAttempt, ExerciseDifficulty, ExerciseType,
    MasterySnapshot, MasteryTrend, PracticeSession, SessionType, SpacedRepCard,
};
pub use processing::{Concept, Connection, Importance, ProcessingRun, RelatedConcept, RelationshipType, RunStatus};
pub use taxonomy::{TagTaxonomy, TaxonomyCache, TaxonomyError};
