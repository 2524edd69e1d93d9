//! Schema migrations for the content store.

/// Ordered schema migrations. Applied in order, tracked in `schema_version`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial content, annotation, and processing-run tables",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Concept, connection, and card/exercise tables",
        up: MIGRATION_V2_UP,
    },
];

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));

CREATE TABLE IF NOT EXISTS content_records (
    db_id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_uuid TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]',
    source_url TEXT,
    source_url_normalized TEXT,
    source_file_path TEXT,
    full_text TEXT,
    raw_file_hash TEXT,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    vault_path TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    ingested_at TEXT NOT NULL,
    processed_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_content_raw_file_hash
    ON content_records(raw_file_hash) WHERE raw_file_hash IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_content_source_url_normalized
    ON content_records(source_url_normalized) WHERE source_url_normalized IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_content_status ON content_records(processing_status);
CREATE INDEX IF NOT EXISTS idx_content_source_type ON content_records(source_type);

CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_db_id INTEGER NOT NULL REFERENCES content_records(db_id) ON DELETE CASCADE,
    annotation_type TEXT NOT NULL,
    content TEXT NOT NULL,
    page_number INTEGER,
    position TEXT NOT NULL DEFAULT '{}',
    context TEXT,
    confidence REAL
);

CREATE INDEX IF NOT EXISTS idx_annotations_content ON annotations(content_db_id);

CREATE TABLE IF NOT EXISTS processing_runs (
    id TEXT PRIMARY KEY,
    content_db_id INTEGER NOT NULL REFERENCES content_records(db_id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending',
    analysis TEXT,
    summaries TEXT NOT NULL DEFAULT '{}',
    extraction TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    model TEXT,
    total_cost_usd REAL NOT NULL DEFAULT 0.0,
    total_latency_ms INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_content ON processing_runs(content_db_id);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS concepts (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES processing_runs(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    canonical_name TEXT NOT NULL,
    aliases TEXT NOT NULL DEFAULT '[]',
    definition TEXT,
    importance TEXT NOT NULL DEFAULT 'supporting',
    embedding BLOB,
    related_concepts TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_concepts_run ON concepts(run_id);
CREATE INDEX IF NOT EXISTS idx_concepts_canonical_name ON concepts(canonical_name);

CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_content TEXT NOT NULL,
    target_content TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.5,
    explanation TEXT,
    verified_by_user INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_connections_source ON connections(source_content);
CREATE INDEX IF NOT EXISTS idx_connections_target ON connections(target_content);

CREATE TABLE IF NOT EXISTS spaced_rep_cards (
    id TEXT PRIMARY KEY,
    card_type TEXT NOT NULL,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    hints TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    source_content_uuid TEXT,
    source_concept TEXT,
    state TEXT NOT NULL DEFAULT 'new',
    stability REAL,
    difficulty REAL,
    due_date TEXT NOT NULL,
    last_reviewed TEXT,
    scheduled_days INTEGER NOT NULL DEFAULT 0,
    repetitions INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,
    total_reviews INTEGER NOT NULL DEFAULT 0,
    correct_reviews INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_cards_due_date ON spaced_rep_cards(due_date);
CREATE INDEX IF NOT EXISTS idx_cards_source_content ON spaced_rep_cards(source_content_uuid);

CREATE TABLE IF NOT EXISTS exercises (
    id TEXT PRIMARY KEY,
    exercise_type TEXT NOT NULL,
    topic TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    prompt TEXT NOT NULL,
    hints TEXT NOT NULL DEFAULT '[]',
    expected_key_points TEXT NOT NULL DEFAULT '[]',
    worked_example TEXT,
    follow_up_problem TEXT,
    language TEXT,
    starter_code TEXT,
    solution_code TEXT,
    test_cases TEXT NOT NULL DEFAULT '[]',
    buggy_code TEXT,
    estimated_time_minutes INTEGER NOT NULL DEFAULT 10
);

CREATE TABLE IF NOT EXISTS exercise_content_links (
    exercise_id TEXT NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
    content_uuid TEXT NOT NULL,
    PRIMARY KEY (exercise_id, content_uuid)
);

CREATE TABLE IF NOT EXISTS exercise_attempts (
    id TEXT PRIMARY KEY,
    exercise_id TEXT NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
    response TEXT,
    response_code TEXT,
    score REAL NOT NULL DEFAULT 0.0,
    is_correct INTEGER NOT NULL DEFAULT 0,
    feedback TEXT,
    covered_points TEXT NOT NULL DEFAULT '[]',
    missing_points TEXT NOT NULL DEFAULT '[]',
    misconceptions TEXT NOT NULL DEFAULT '[]',
    tests_passed INTEGER,
    tests_total INTEGER,
    confidence_before INTEGER,
    confidence_after INTEGER,
    time_spent_seconds INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attempts_exercise ON exercise_attempts(exercise_id);

CREATE TABLE IF NOT EXISTS mastery_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_date TEXT NOT NULL,
    topic_path TEXT NOT NULL,
    practice_count INTEGER NOT NULL DEFAULT 0,
    success_rate REAL,
    mastery_score REAL NOT NULL DEFAULT 0.0,
    trend TEXT NOT NULL DEFAULT 'stable',
    retention_estimate REAL,
    last_practiced TEXT,
    days_since_review INTEGER
);

CREATE INDEX IF NOT EXISTS idx_mastery_topic ON mastery_snapshots(topic_path);
CREATE INDEX IF NOT EXISTS idx_mastery_date ON mastery_snapshots(snapshot_date);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply any migrations newer than the database's current schema version.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying content store migration"
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
