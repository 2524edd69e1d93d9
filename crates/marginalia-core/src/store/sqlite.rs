use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::content::{
    Annotation, AnnotationType, CardState, CardType, Concept, Connection as ContentConnection,
    ContentRecord, Difficulty, Exercise, ExerciseAttempt, ExerciseType, Importance,
    MasterySnapshot, MasteryTrend, ProcessingRun, ProcessingStatus, RelatedConcept, RunStatus,
    SourceType, SpacedRepCard,
};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid enum value in row: {0}")]
    InvalidValue(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Outcome of `ContentStore::save`: either a fresh record was inserted, or an
/// existing one was found via the dedup policy and returned untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted(Uuid),
    Deduplicated(Uuid),
}

/// Normalize a source URL for dedup comparison: strip fragment, strip a
/// trailing slash, lower-case the whole thing.
pub fn normalize_source_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let trimmed = without_fragment.strip_suffix('/').unwrap_or(without_fragment);
    trimmed.to_lowercase()
}

/// Relational store of record for `ContentRecord`, its annotations, and
/// processing runs. Uses separate reader/writer connections so long-running
/// reads never block an in-flight write, matching the embedded-SQLite
/// concurrency model used throughout this crate.
pub struct ContentStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore").finish_non_exhaustive()
    }
}

impl ContentStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        super::migrations::apply_migrations(&writer)?;

        let reader = Connection::open(&path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        Self::configure_connection(&writer)?;
        super::migrations::apply_migrations(&writer)?;
        let reader = Connection::open_in_memory()?;
        Self::configure_connection(&reader)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Insert a new `ContentRecord`, applying the dedup policy: if an
    /// existing non-failed record shares a `raw_file_hash` or normalized
    /// `source_url`, return its uuid instead of inserting. Dedup lookup
    /// failures are logged and fall through to a plain insert.
    pub fn save(&self, record: &ContentRecord) -> Result<SaveOutcome> {
        match self.find_existing_for_dedup(record) {
            Ok(Some(existing_uuid)) => return Ok(SaveOutcome::Deduplicated(existing_uuid)),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "dedup lookup failed, falling through to insert");
            }
        }

        let conn = self.writer.lock().unwrap();
        let normalized_url = record.source_url.as_deref().map(normalize_source_url);
        conn.execute(
            "INSERT INTO content_records (
                content_uuid, source_type, title, authors, source_url, source_url_normalized,
                source_file_path, full_text, raw_file_hash, processing_status, vault_path,
                tags, metadata, created_at, ingested_at, processed_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                record.content_uuid.to_string(),
                record.source_type.as_str(),
                record.title,
                serde_json::to_string(&record.authors)?,
                record.source_url,
                normalized_url,
                record.source_file_path,
                record.full_text,
                record.raw_file_hash,
                record.processing_status.as_str(),
                record.vault_path,
                serde_json::to_string(&record.tags)?,
                serde_json::to_string(&record.metadata)?,
                record.created_at.to_rfc3339(),
                record.ingested_at.to_rfc3339(),
                record.processed_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        let db_id = conn.last_insert_rowid();
        self.insert_annotations(&conn, db_id, &record.annotations)?;

        Ok(SaveOutcome::Inserted(record.content_uuid))
    }

    fn find_existing_for_dedup(&self, record: &ContentRecord) -> Result<Option<Uuid>> {
        let conn = self.reader.lock().unwrap();
        if let Some(hash) = &record.raw_file_hash {
            let found: Option<String> = conn
                .query_row(
                    "SELECT content_uuid FROM content_records
                     WHERE raw_file_hash = ?1 AND processing_status != 'failed'",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(uuid_str) = found {
                return Ok(Some(Uuid::parse_str(&uuid_str).map_err(|e| {
                    StorageError::InvalidValue(format!("bad content_uuid: {e}"))
                })?));
            }
        }
        if let Some(url) = &record.source_url {
            let normalized = normalize_source_url(url);
            let found: Option<String> = conn
                .query_row(
                    "SELECT content_uuid FROM content_records
                     WHERE source_url_normalized = ?1 AND processing_status != 'failed'",
                    params![normalized],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(uuid_str) = found {
                return Ok(Some(Uuid::parse_str(&uuid_str).map_err(|e| {
                    StorageError::InvalidValue(format!("bad content_uuid: {e}"))
                })?));
            }
        }
        Ok(None)
    }

    fn insert_annotations(&self, conn: &Connection, content_db_id: i64, annotations: &[Annotation]) -> Result<()> {
        for annotation in annotations {
            conn.execute(
                "INSERT INTO annotations (
                    content_db_id, annotation_type, content, page_number, position, context, confidence
                ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    content_db_id,
                    annotation_type_str(annotation.annotation_type),
                    annotation.content,
                    annotation.page_number,
                    serde_json::to_string(&annotation.position)?,
                    annotation.context,
                    annotation.confidence,
                ],
            )?;
        }
        Ok(())
    }

    /// Load a `ContentRecord` by its external uuid, eagerly fetching
    /// annotations.
    pub fn load(&self, content_uuid: Uuid) -> Result<ContentRecord> {
        let conn = self.reader.lock().unwrap();
        let db_id: i64 = conn
            .query_row(
                "SELECT db_id FROM content_records WHERE content_uuid = ?1",
                params![content_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(content_uuid.to_string()))?;

        let mut record = conn.query_row(
            "SELECT db_id, content_uuid, source_type, title, authors, source_url,
                    source_file_path, full_text, raw_file_hash, processing_status, vault_path,
                    tags, metadata, created_at, ingested_at, processed_at
             FROM content_records WHERE db_id = ?1",
            params![db_id],
            row_to_content_record,
        )?;

        record.annotations = self.load_annotations(&conn, db_id)?;
        Ok(record)
    }

    fn load_annotations(&self, conn: &Connection, content_db_id: i64) -> Result<Vec<Annotation>> {
        let mut stmt = conn.prepare(
            "SELECT annotation_type, content, page_number, position, context, confidence
             FROM annotations WHERE content_db_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![content_db_id], |row| {
                let type_str: String = row.get(0)?;
                let position_str: String = row.get(3)?;
                Ok((type_str, row.get::<_, String>(1)?, row.get::<_, Option<u32>>(2)?, position_str, row.get::<_, Option<String>>(4)?, row.get::<_, Option<f64>>(5)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(type_str, content, page_number, position_str, context, confidence)| {
                Ok(Annotation {
                    annotation_type: parse_annotation_type(&type_str)?,
                    content,
                    page_number,
                    position: serde_json::from_str(&position_str)?,
                    context,
                    confidence,
                })
            })
            .collect()
    }

    pub fn update_status(&self, content_uuid: Uuid, status: ProcessingStatus) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let processed_at = matches!(status, ProcessingStatus::Processed).then(|| Utc::now().to_rfc3339());
        conn.execute(
            "UPDATE content_records SET processing_status = ?1, processed_at = COALESCE(?2, processed_at)
             WHERE content_uuid = ?3",
            params![status.as_str(), processed_at, content_uuid.to_string()],
        )?;
        Ok(())
    }

    /// Update the mutable fields an orchestrator owns: full text, tags,
    /// vault path, and metadata. Annotations are replaced wholesale.
    pub fn update_content(&self, record: &ContentRecord) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "UPDATE content_records SET
                title = ?1, full_text = ?2, tags = ?3, metadata = ?4, vault_path = ?5,
                processing_status = ?6, processed_at = ?7
             WHERE content_uuid = ?8",
            params![
                record.title,
                record.full_text,
                serde_json::to_string(&record.tags)?,
                serde_json::to_string(&record.metadata)?,
                record.vault_path,
                record.processing_status.as_str(),
                record.processed_at.map(|t| t.to_rfc3339()),
                record.content_uuid.to_string(),
            ],
        )?;

        let db_id: i64 = conn.query_row(
            "SELECT db_id FROM content_records WHERE content_uuid = ?1",
            params![record.content_uuid.to_string()],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM annotations WHERE content_db_id = ?1", params![db_id])?;
        self.insert_annotations(&conn, db_id, &record.annotations)?;
        Ok(())
    }

    /// All records with `processing_status = 'pending'`, oldest first.
    pub fn get_pending(&self) -> Result<Vec<ContentRecord>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT db_id, content_uuid, source_type, title, authors, source_url,
                    source_file_path, full_text, raw_file_hash, processing_status, vault_path,
                    tags, metadata, created_at, ingested_at, processed_at
             FROM content_records WHERE processing_status = 'pending' ORDER BY created_at ASC",
        )?;
        let records = stmt
            .query_map([], row_to_content_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_db_id_by_uuid(&self, content_uuid: Uuid) -> Result<i64> {
        let conn = self.reader.lock().unwrap();
        conn.query_row(
            "SELECT db_id FROM content_records WHERE content_uuid = ?1",
            params![content_uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(content_uuid.to_string()))
    }

    /// Delete a content record. Cascades to annotations and processing runs
    /// (and their owned concepts/connections) via `ON DELETE CASCADE`.
    pub fn delete(&self, content_uuid: Uuid) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "DELETE FROM content_records WHERE content_uuid = ?1",
            params![content_uuid.to_string()],
        )?;
        Ok(())
    }

    /// Insert a processing run along with its concepts.
    pub fn save_processing_run(&self, content_uuid: Uuid, run: &ProcessingRun, concepts: &[Concept]) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let db_id: i64 = conn.query_row(
            "SELECT db_id FROM content_records WHERE content_uuid = ?1",
            params![content_uuid.to_string()],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO processing_runs (
                id, content_db_id, status, analysis, summaries, extraction, tags, model,
                total_cost_usd, total_latency_ms, started_at, completed_at, error
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                run.id.to_string(),
                db_id,
                run_status_str(run.status),
                run.analysis,
                serde_json::to_string(&run.summaries)?,
                run.extraction,
                serde_json::to_string(&run.tags)?,
                run.model,
                run.total_cost_usd,
                run.total_latency_ms,
                run.started_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.error,
            ],
        )?;

        for concept in concepts {
            conn.execute(
                "INSERT INTO concepts (id, run_id, name, canonical_name, aliases, definition,
                    importance, embedding, related_concepts)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    concept.id.to_string(),
                    run.id.to_string(),
                    concept.name,
                    concept.canonical_name,
                    serde_json::to_string(&concept.aliases)?,
                    concept.definition,
                    importance_str(concept.importance),
                    concept.embedding.as_ref().map(|v| embedding_to_blob(v)),
                    serde_json::to_string(&concept.related_concepts)?,
                ],
            )?;
        }
        Ok(())
    }

    /// Reprocessing deletes prior runs (and their owned concepts) wholesale.
    pub fn delete_processing_runs(&self, content_uuid: Uuid) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let db_id: i64 = conn.query_row(
            "SELECT db_id FROM content_records WHERE content_uuid = ?1",
            params![content_uuid.to_string()],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM processing_runs WHERE content_db_id = ?1", params![db_id])?;
        Ok(())
    }

    pub fn save_connection(&self, connection: &ContentConnection) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO connections (source_content, target_content, relationship_type, strength,
                explanation, verified_by_user) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                connection.source_content.to_string(),
                connection.target_content.to_string(),
                connection.relationship_type.to_string(),
                connection.strength,
                connection.explanation,
                connection.verified_by_user,
            ],
        )?;
        Ok(())
    }

    /// All concepts recorded across every processing run, most recent first.
    pub fn all_concepts(&self) -> Result<Vec<Concept>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, canonical_name, aliases, definition, importance, embedding, related_concepts
             FROM concepts ORDER BY rowid DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_concept)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a freshly generated card.
    pub fn save_card(&self, card: &SpacedRepCard) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO spaced_rep_cards (
                id, card_type, front, back, hints, tags, source_content_uuid, source_concept,
                state, stability, difficulty, due_date, last_reviewed, scheduled_days,
                repetitions, lapses, total_reviews, correct_reviews
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                card.id.to_string(),
                card_type_str(card.card_type),
                card.front,
                card.back,
                serde_json::to_string(&card.hints)?,
                serde_json::to_string(&card.tags)?,
                card.source_content_uuid.map(|u| u.to_string()),
                card.source_concept,
                card_state_str(card.state),
                card.stability,
                card.difficulty,
                card.due_date.to_rfc3339(),
                card.last_reviewed.map(|t| t.to_rfc3339()),
                card.scheduled_days,
                card.repetitions,
                card.lapses,
                card.total_reviews,
                card.correct_reviews,
            ],
        )?;
        Ok(())
    }

    /// Persist a card's FSRS state after a review.
    pub fn update_card(&self, card: &SpacedRepCard) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "UPDATE spaced_rep_cards SET
                state = ?1, stability = ?2, difficulty = ?3, due_date = ?4, last_reviewed = ?5,
                scheduled_days = ?6, repetitions = ?7, lapses = ?8, total_reviews = ?9,
                correct_reviews = ?10
             WHERE id = ?11",
            params![
                card_state_str(card.state),
                card.stability,
                card.difficulty,
                card.due_date.to_rfc3339(),
                card.last_reviewed.map(|t| t.to_rfc3339()),
                card.scheduled_days,
                card.repetitions,
                card.lapses,
                card.total_reviews,
                card.correct_reviews,
                card.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// All cards due at or before `now`, earliest first.
    pub fn get_due_cards(&self, now: DateTime<Utc>) -> Result<Vec<SpacedRepCard>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, card_type, front, back, hints, tags, source_content_uuid, source_concept,
                    state, stability, difficulty, due_date, last_reviewed, scheduled_days,
                    repetitions, lapses, total_reviews, correct_reviews
             FROM spaced_rep_cards WHERE due_date <= ?1 ORDER BY due_date ASC",
        )?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], row_to_card)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Cards generated from a given piece of content, insertion order.
    pub fn get_cards_for_content(&self, content_uuid: Uuid) -> Result<Vec<SpacedRepCard>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, card_type, front, back, hints, tags, source_content_uuid, source_concept,
                    state, stability, difficulty, due_date, last_reviewed, scheduled_days,
                    repetitions, lapses, total_reviews, correct_reviews
             FROM spaced_rep_cards WHERE source_content_uuid = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![content_uuid.to_string()], row_to_card)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop every card generated from a piece of content; used by the
    /// reprocess cleanup step when the policy opts into it (default: off,
    /// to preserve review history).
    pub fn delete_cards_for_content(&self, content_uuid: Uuid) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "DELETE FROM spaced_rep_cards WHERE source_content_uuid = ?1",
            params![content_uuid.to_string()],
        )?;
        Ok(())
    }

    /// Insert a generated exercise and link it to the content it was
    /// generated from.
    pub fn save_exercise(&self, exercise: &Exercise, content_uuid: Option<Uuid>) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO exercises (
                id, exercise_type, topic, difficulty, prompt, hints, expected_key_points,
                worked_example, follow_up_problem, language, starter_code, solution_code,
                test_cases, buggy_code, estimated_time_minutes
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                exercise.id.to_string(),
                exercise_type_str(exercise.exercise_type),
                exercise.topic,
                difficulty_str(exercise.difficulty),
                exercise.prompt,
                serde_json::to_string(&exercise.hints)?,
                serde_json::to_string(&exercise.expected_key_points)?,
                exercise.worked_example,
                exercise.follow_up_problem,
                exercise.language,
                exercise.starter_code,
                exercise.solution_code,
                serde_json::to_string(&exercise.test_cases)?,
                exercise.buggy_code,
                exercise.estimated_time_minutes,
            ],
        )?;
        if let Some(content_uuid) = content_uuid {
            conn.execute(
                "INSERT OR IGNORE INTO exercise_content_links (exercise_id, content_uuid) VALUES (?1,?2)",
                params![exercise.id.to_string(), content_uuid.to_string()],
            )?;
        }
        Ok(())
    }

    /// Persist a learner's attempt at an exercise.
    pub fn save_attempt(&self, attempt: &ExerciseAttempt) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO exercise_attempts (
                id, exercise_id, response, response_code, score, is_correct, feedback,
                covered_points, missing_points, misconceptions, tests_passed, tests_total,
                confidence_before, confidence_after, time_spent_seconds, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                attempt.id.to_string(),
                attempt.exercise_id.to_string(),
                attempt.response,
                attempt.response_code,
                attempt.score,
                attempt.is_correct,
                attempt.feedback,
                serde_json::to_string(&attempt.covered_points)?,
                serde_json::to_string(&attempt.missing_points)?,
                serde_json::to_string(&attempt.misconceptions)?,
                attempt.tests_passed,
                attempt.tests_total,
                attempt.confidence_before,
                attempt.confidence_after,
                attempt.time_spent_seconds,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All attempts at a given exercise, oldest first.
    pub fn get_attempts_for_exercise(&self, exercise_id: Uuid) -> Result<Vec<ExerciseAttempt>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, exercise_id, response, response_code, score, is_correct, feedback,
                    covered_points, missing_points, misconceptions, tests_passed, tests_total,
                    confidence_before, confidence_after, time_spent_seconds
             FROM exercise_attempts WHERE exercise_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![exercise_id.to_string()], row_to_attempt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record one point-in-time mastery snapshot for a topic.
    pub fn save_mastery_snapshot(&self, snapshot: &MasterySnapshot) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO mastery_snapshots (
                snapshot_date, topic_path, practice_count, success_rate, mastery_score, trend,
                retention_estimate, last_practiced, days_since_review
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                snapshot.snapshot_date.to_rfc3339(),
                snapshot.topic_path,
                snapshot.practice_count,
                snapshot.success_rate,
                snapshot.mastery_score,
                mastery_trend_str(snapshot.trend),
                snapshot.retention_estimate,
                snapshot.last_practiced.map(|t| t.to_rfc3339()),
                snapshot.days_since_review,
            ],
        )?;
        Ok(())
    }

    /// Snapshot history for a topic, oldest first — used for the learning
    /// curve forecast.
    pub fn mastery_history(&self, topic_path: &str) -> Result<Vec<MasterySnapshot>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT snapshot_date, topic_path, practice_count, success_rate, mastery_score, trend,
                    retention_estimate, last_practiced, days_since_review
             FROM mastery_snapshots WHERE topic_path = ?1 ORDER BY snapshot_date ASC",
        )?;
        let rows = stmt
            .query_map(params![topic_path], row_to_snapshot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recent snapshot for a topic, if any.
    pub fn latest_mastery_snapshot(&self, topic_path: &str) -> Result<Option<MasterySnapshot>> {
        Ok(self.mastery_history(topic_path)?.into_iter().last())
    }
}

fn annotation_type_str(t: AnnotationType) -> &'static str {
    match t {
        AnnotationType::DigitalHighlight => "digital_highlight",
        AnnotationType::HandwrittenNote => "handwritten_note",
        AnnotationType::TypedComment => "typed_comment",
        AnnotationType::Diagram => "diagram",
        AnnotationType::Underline => "underline",
    }
}

fn parse_annotation_type(s: &str) -> Result<AnnotationType> {
    Ok(match s {
        "digital_highlight" => AnnotationType::DigitalHighlight,
        "handwritten_note" => AnnotationType::HandwrittenNote,
        "typed_comment" => AnnotationType::TypedComment,
        "diagram" => AnnotationType::Diagram,
        "underline" => AnnotationType::Underline,
        other => return Err(StorageError::InvalidValue(format!("annotation_type: {other}"))),
    })
}

fn run_status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

fn importance_str(i: Importance) -> &'static str {
    match i {
        Importance::Core => "core",
        Importance::Supporting => "supporting",
        Importance::Tangential => "tangential",
    }
}

fn parse_importance(s: &str) -> Importance {
    match s {
        "core" => Importance::Core,
        "tangential" => Importance::Tangential,
        _ => Importance::Supporting,
    }
}

fn card_type_str(t: CardType) -> &'static str {
    match t {
        CardType::Definition => "definition",
        CardType::Application => "application",
        CardType::Example => "example",
        CardType::Misconception => "misconception",
        CardType::Comparison => "comparison",
        CardType::Properties => "properties",
    }
}

fn parse_card_type(s: &str) -> Result<CardType> {
    Ok(match s {
        "definition" => CardType::Definition,
        "application" => CardType::Application,
        "example" => CardType::Example,
        "misconception" => CardType::Misconception,
        "comparison" => CardType::Comparison,
        "properties" => CardType::Properties,
        other => return Err(StorageError::InvalidValue(format!("card_type: {other}"))),
    })
}

fn card_state_str(s: CardState) -> &'static str {
    match s {
        CardState::New => "new",
        CardState::Learning => "learning",
        CardState::Review => "review",
        CardState::Relearning => "relearning",
    }
}

fn parse_card_state(s: &str) -> Result<CardState> {
    Ok(match s {
        "new" => CardState::New,
        "learning" => CardState::Learning,
        "review" => CardState::Review,
        "relearning" => CardState::Relearning,
        other => return Err(StorageError::InvalidValue(format!("card_state: {other}"))),
    })
}

fn exercise_type_str(t: ExerciseType) -> &'static str {
    match t {
        ExerciseType::WorkedExample => "worked_example",
        ExerciseType::Recall => "recall",
        ExerciseType::CodeImplement => "code_implement",
        ExerciseType::CodeComplete => "code_complete",
        ExerciseType::CodeDebug => "code_debug",
        ExerciseType::CodeRefactor => "code_refactor",
        ExerciseType::CodeExplain => "code_explain",
    }
}

fn parse_exercise_type(s: &str) -> Result<ExerciseType> {
    Ok(match s {
        "worked_example" => ExerciseType::WorkedExample,
        "recall" => ExerciseType::Recall,
        "code_implement" => ExerciseType::CodeImplement,
        "code_complete" => ExerciseType::CodeComplete,
        "code_debug" => ExerciseType::CodeDebug,
        "code_refactor" => ExerciseType::CodeRefactor,
        "code_explain" => ExerciseType::CodeExplain,
        other => return Err(StorageError::InvalidValue(format!("exercise_type: {other}"))),
    })
}

fn difficulty_str(d: Difficulty) -> &'static str {
    match d {
        Difficulty::Foundational => "foundational",
        Difficulty::Intermediate => "intermediate",
        Difficulty::Advanced => "advanced",
    }
}

fn parse_difficulty(s: &str) -> Result<Difficulty> {
    Ok(match s {
        "foundational" => Difficulty::Foundational,
        "intermediate" => Difficulty::Intermediate,
        "advanced" => Difficulty::Advanced,
        other => return Err(StorageError::InvalidValue(format!("difficulty: {other}"))),
    })
}

fn mastery_trend_str(t: MasteryTrend) -> &'static str {
    match t {
        MasteryTrend::Improving => "improving",
        MasteryTrend::Stable => "stable",
        MasteryTrend::Declining => "declining",
    }
}

fn parse_mastery_trend(s: &str) -> MasteryTrend {
    match s {
        "improving" => MasteryTrend::Improving,
        "declining" => MasteryTrend::Declining,
        _ => MasteryTrend::Stable,
    }
}

fn row_to_card(row: &Row) -> rusqlite::Result<SpacedRepCard> {
    let card_type_str: String = row.get(1)?;
    let hints_str: String = row.get(4)?;
    let tags_str: String = row.get(5)?;
    let source_content_uuid_str: Option<String> = row.get(6)?;
    let state_str: String = row.get(8)?;
    let due_date_str: String = row.get(11)?;
    let last_reviewed_str: Option<String> = row.get(12)?;

    Ok(SpacedRepCard {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        card_type: parse_card_type(&card_type_str).map_err(storage_to_sqlite_err)?,
        front: row.get(2)?,
        back: row.get(3)?,
        hints: serde_json::from_str(&hints_str).unwrap_or_default(),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        source_content_uuid: source_content_uuid_str.map(|s| parse_uuid(&s)).transpose()?,
        source_concept: row.get(7)?,
        state: parse_card_state(&state_str).map_err(storage_to_sqlite_err)?,
        stability: row.get(9)?,
        difficulty: row.get(10)?,
        due_date: parse_rfc3339(&due_date_str)?,
        last_reviewed: last_reviewed_str.map(|s| parse_rfc3339(&s)).transpose()?,
        scheduled_days: row.get(13)?,
        repetitions: row.get(14)?,
        lapses: row.get(15)?,
        total_reviews: row.get(16)?,
        correct_reviews: row.get(17)?,
    })
}

fn row_to_attempt(row: &Row) -> rusqlite::Result<ExerciseAttempt> {
    let covered_str: String = row.get(7)?;
    let missing_str: String = row.get(8)?;
    let misconceptions_str: String = row.get(9)?;

    Ok(ExerciseAttempt {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        exercise_id: parse_uuid(&row.get::<_, String>(1)?)?,
        response: row.get(2)?,
        response_code: row.get(3)?,
        score: row.get(4)?,
        is_correct: row.get(5)?,
        feedback: row.get(6)?,
        covered_points: serde_json::from_str(&covered_str).unwrap_or_default(),
        missing_points: serde_json::from_str(&missing_str).unwrap_or_default(),
        misconceptions: serde_json::from_str(&misconceptions_str).unwrap_or_default(),
        tests_passed: row.get(10)?,
        tests_total: row.get(11)?,
        confidence_before: row.get(12)?,
        confidence_after: row.get(13)?,
        time_spent_seconds: row.get(14)?,
    })
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<MasterySnapshot> {
    let snapshot_date_str: String = row.get(0)?;
    let trend_str: String = row.get(5)?;
    let last_practiced_str: Option<String> = row.get(7)?;

    Ok(MasterySnapshot {
        snapshot_date: parse_rfc3339(&snapshot_date_str)?,
        topic_path: row.get(1)?,
        practice_count: row.get(2)?,
        success_rate: row.get(3)?,
        mastery_score: row.get(4)?,
        trend: parse_mastery_trend(&trend_str),
        retention_estimate: row.get(6)?,
        last_practiced: last_practiced_str.map(|s| parse_rfc3339(&s)).transpose()?,
        days_since_review: row.get(8)?,
    })
}

fn storage_to_sqlite_err(e: StorageError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn embedding_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn embedding_from_blob(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_content_record(row: &Row) -> rusqlite::Result<ContentRecord> {
    let source_type_str: String = row.get(2)?;
    let authors_str: String = row.get(4)?;
    let processing_status_str: String = row.get(9)?;
    let tags_str: String = row.get(11)?;
    let metadata_str: String = row.get(12)?;
    let created_at_str: String = row.get(13)?;
    let ingested_at_str: String = row.get(14)?;
    let processed_at_str: Option<String> = row.get(15)?;

    Ok(ContentRecord {
        db_id: Some(row.get(0)?),
        content_uuid: parse_uuid(&row.get::<_, String>(1)?)?,
        source_type: source_type_str.parse().unwrap_or(SourceType::Idea),
        title: row.get(3)?,
        authors: serde_json::from_str(&authors_str).unwrap_or_default(),
        source_url: row.get(5)?,
        source_file_path: row.get(6)?,
        full_text: row.get(7)?,
        raw_file_hash: row.get(8)?,
        processing_status: parse_processing_status(&processing_status_str),
        vault_path: row.get(10)?,
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        annotations: Vec::new(),
        created_at: parse_rfc3339(&created_at_str)?,
        ingested_at: parse_rfc3339(&ingested_at_str)?,
        processed_at: processed_at_str.map(|s| parse_rfc3339(&s)).transpose()?,
    })
}

fn row_to_concept(row: &Row) -> rusqlite::Result<Concept> {
    let id_str: String = row.get(0)?;
    let aliases_str: String = row.get(3)?;
    let importance_str: String = row.get(5)?;
    let embedding_blob: Option<Vec<u8>> = row.get(6)?;
    let related_str: String = row.get(7)?;

    Ok(Concept {
        id: parse_uuid(&id_str)?,
        name: row.get(1)?,
        canonical_name: row.get(2)?,
        aliases: serde_json::from_str(&aliases_str).unwrap_or_default(),
        definition: row.get(4)?,
        importance: parse_importance(&importance_str),
        embedding: embedding_blob.map(|b| embedding_from_blob(&b)),
        related_concepts: serde_json::from_str::<Vec<RelatedConcept>>(&related_str).unwrap_or_default(),
    })
}

fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_rfc3339(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_processing_status(s: &str) -> ProcessingStatus {
    match s {
        "processing" => ProcessingStatus::Processing,
        "processed" => ProcessingStatus::Processed,
        "failed" => ProcessingStatus::Failed,
        _ => ProcessingStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::SourceType;

    fn store() -> ContentStore {
        ContentStore::open_in_memory().unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = store();
        let mut record = ContentRecord::new(SourceType::Article, "Test Article");
        record.source_url = Some("https://Example.com/Post/#section".into());
        let outcome = store.save(&record).unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted(record.content_uuid));

        let loaded = store.load(record.content_uuid).unwrap();
        assert_eq!(loaded.title, "Test Article");
        assert_eq!(loaded.content_uuid, record.content_uuid);
    }

    #[test]
    fn save_deduplicates_by_raw_file_hash() {
        let store = store();
        let mut a = ContentRecord::new(SourceType::Paper, "Paper A");
        a.raw_file_hash = Some("deadbeef".into());
        store.save(&a).unwrap();

        let mut b = ContentRecord::new(SourceType::Paper, "Paper B (duplicate upload)");
        b.raw_file_hash = Some("deadbeef".into());
        let outcome = store.save(&b).unwrap();
        assert_eq!(outcome, SaveOutcome::Deduplicated(a.content_uuid));
    }

    #[test]
    fn save_deduplicates_by_normalized_source_url() {
        let store = store();
        let mut a = ContentRecord::new(SourceType::Article, "Article A");
        a.source_url = Some("https://example.com/post/".into());
        store.save(&a).unwrap();

        let mut b = ContentRecord::new(SourceType::Article, "Article A again");
        b.source_url = Some("HTTPS://EXAMPLE.COM/post#frag".into());
        let outcome = store.save(&b).unwrap();
        assert_eq!(outcome, SaveOutcome::Deduplicated(a.content_uuid));
    }

    #[test]
    fn failed_records_do_not_block_dedup() {
        let store = store();
        let mut a = ContentRecord::new(SourceType::Paper, "Paper A");
        a.raw_file_hash = Some("deadbeef".into());
        a.mark_failed();
        store.save(&a).unwrap();

        let mut b = ContentRecord::new(SourceType::Paper, "Paper B");
        b.raw_file_hash = Some("deadbeef".into());
        let outcome = store.save(&b).unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted(b.content_uuid));
    }

    #[test]
    fn update_status_sets_processed_at() {
        let store = store();
        let record = ContentRecord::new(SourceType::Idea, "Idea");
        store.save(&record).unwrap();
        store.update_status(record.content_uuid, ProcessingStatus::Processed).unwrap();
        let loaded = store.load(record.content_uuid).unwrap();
        assert_eq!(loaded.processing_status, ProcessingStatus::Processed);
        assert!(loaded.processed_at.is_some());
    }

    #[test]
    fn get_pending_excludes_processed() {
        let store = store();
        let pending = ContentRecord::new(SourceType::Idea, "Pending");
        let mut processed = ContentRecord::new(SourceType::Idea, "Processed");
        processed.mark_processed();
        store.save(&pending).unwrap();
        store.save(&processed).unwrap();

        let pending_list = store.get_pending().unwrap();
        assert_eq!(pending_list.len(), 1);
        assert_eq!(pending_list[0].content_uuid, pending.content_uuid);
    }

    #[test]
    fn annotations_round_trip_with_content() {
        let store = store();
        let mut record = ContentRecord::new(SourceType::Paper, "Annotated Paper");
        record.annotations.push(Annotation {
            annotation_type: AnnotationType::DigitalHighlight,
            content: "key insight".into(),
            page_number: Some(3),
            position: Default::default(),
            context: Some("surrounding text".into()),
            confidence: Some(0.95),
        });
        store.save(&record).unwrap();

        let loaded = store.load(record.content_uuid).unwrap();
        assert_eq!(loaded.annotations.len(), 1);
        assert_eq!(loaded.annotations[0].content, "key insight");
    }

    #[test]
    fn delete_cascades_to_processing_runs() {
        let store = store();
        let record = ContentRecord::new(SourceType::Paper, "To delete");
        store.save(&record).unwrap();
        let run = ProcessingRun::new(record.content_uuid);
        store.save_processing_run(record.content_uuid, &run, &[]).unwrap();

        store.delete(record.content_uuid).unwrap();
        assert!(store.load(record.content_uuid).is_err());
    }

    #[test]
    fn card_save_and_due_query_round_trips() {
        let store = store();
        let mut due_card = SpacedRepCard::new(CardType::Definition, "Q1", "A1");
        due_card.due_date = Utc::now() - chrono::Duration::days(1);
        let mut future_card = SpacedRepCard::new(CardType::Application, "Q2", "A2");
        future_card.due_date = Utc::now() + chrono::Duration::days(30);

        store.save_card(&due_card).unwrap();
        store.save_card(&future_card).unwrap();

        let due = store.get_due_cards(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_card.id);
        assert_eq!(due[0].front, "Q1");
    }

    #[test]
    fn card_update_persists_fsrs_state() {
        let store = store();
        let mut card = SpacedRepCard::new(CardType::Definition, "Q", "A");
        store.save_card(&card).unwrap();

        card.state = CardState::Review;
        card.stability = Some(4.2);
        card.repetitions = 3;
        store.update_card(&card).unwrap();

        let due = store.get_due_cards(card.due_date + chrono::Duration::seconds(1)).unwrap();
        let reloaded = due.into_iter().find(|c| c.id == card.id).unwrap();
        assert_eq!(reloaded.state, CardState::Review);
        assert_eq!(reloaded.stability, Some(4.2));
        assert_eq!(reloaded.repetitions, 3);
    }

    #[test]
    fn cards_for_content_filters_by_source() {
        let store = store();
        let content_uuid = Uuid::new_v4();
        let mut card = SpacedRepCard::new(CardType::Example, "Q", "A");
        card.source_content_uuid = Some(content_uuid);
        store.save_card(&card).unwrap();
        store.save_card(&SpacedRepCard::new(CardType::Example, "Other", "Other")).unwrap();

        let linked = store.get_cards_for_content(content_uuid).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, card.id);

        store.delete_cards_for_content(content_uuid).unwrap();
        assert!(store.get_cards_for_content(content_uuid).unwrap().is_empty());
    }

    fn sample_exercise() -> Exercise {
        Exercise {
            id: Uuid::new_v4(),
            exercise_type: ExerciseType::CodeImplement,
            topic: "recursion".into(),
            difficulty: Difficulty::Intermediate,
            prompt: "implement factorial".into(),
            hints: vec!["think base case".into()],
            expected_key_points: vec!["base case".into()],
            worked_example: None,
            follow_up_problem: None,
            language: Some("rust".into()),
            starter_code: None,
            solution_code: Some("fn f() {}".into()),
            test_cases: vec!["f(0) == 1".into()],
            buggy_code: None,
            estimated_time_minutes: 15,
        }
    }

    #[test]
    fn exercise_and_attempt_round_trip() {
        let store = store();
        let exercise = sample_exercise();
        let content_uuid = Uuid::new_v4();
        store.save_exercise(&exercise, Some(content_uuid)).unwrap();

        let attempt = build_test_attempt(&exercise);
        store.save_attempt(&attempt).unwrap();

        let attempts = store.get_attempts_for_exercise(exercise.id).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].score, attempt.score);
        assert_eq!(attempts[0].tests_passed, Some(3));
    }

    fn build_test_attempt(exercise: &Exercise) -> ExerciseAttempt {
        ExerciseAttempt {
            id: Uuid::new_v4(),
            exercise_id: exercise.id,
            response: Some("my answer".into()),
            response_code: Some("fn f() { 1 }".into()),
            score: 0.82,
            is_correct: true,
            feedback: Some("good".into()),
            covered_points: vec!["base case".into()],
            missing_points: vec![],
            misconceptions: vec![],
            tests_passed: Some(3),
            tests_total: Some(3),
            confidence_before: Some(2),
            confidence_after: Some(4),
            time_spent_seconds: 300,
        }
    }

    #[test]
    fn mastery_snapshot_history_orders_by_date() {
        let store = store();
        let topic = "rust::ownership";
        let older = MasterySnapshot {
            snapshot_date: Utc::now() - chrono::Duration::days(7),
            topic_path: topic.into(),
            practice_count: 3,
            success_rate: Some(0.5),
            mastery_score: 0.4,
            trend: MasteryTrend::Stable,
            retention_estimate: Some(0.6),
            last_practiced: Some(Utc::now() - chrono::Duration::days(7)),
            days_since_review: Some(7),
        };
        let newer = MasterySnapshot {
            snapshot_date: Utc::now(),
            topic_path: topic.into(),
            practice_count: 5,
            success_rate: Some(0.8),
            mastery_score: 0.7,
            trend: MasteryTrend::Improving,
            retention_estimate: Some(0.9),
            last_practiced: Some(Utc::now()),
            days_since_review: Some(0),
        };
        store.save_mastery_snapshot(&older).unwrap();
        store.save_mastery_snapshot(&newer).unwrap();

        let history = store.mastery_history(topic).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].mastery_score, 0.4);
        assert_eq!(history[1].mastery_score, 0.7);

        let latest = store.latest_mastery_snapshot(topic).unwrap().unwrap();
        assert_eq!(latest.trend, MasteryTrend::Improving);

        assert!(store.latest_mastery_snapshot("unknown::topic").unwrap().is_none());
    }
}
