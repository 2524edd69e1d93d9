//! Cost Ledger (C1): append-only record of LLM usage, with rollup
//! aggregation and budget checks.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CostError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, CostError>;

/// The kind of LLM call a `CostRecord` accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Text,
    Vision,
    Embedding,
}

impl RequestType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Embedding => "embedding",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "vision" => Self::Vision,
            "embedding" => Self::Embedding,
            _ => Self::Text,
        }
    }
}

/// A single priced LLM call, attributed to a pipeline/content/operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: Uuid,
    pub model: String,
    pub provider: String,
    pub request_type: RequestType,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub pipeline: Option<String>,
    pub content_id: Option<Uuid>,
    pub operation: String,
    pub latency_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CostRecord {
    pub fn new(model: impl Into<String>, provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            provider: provider.into(),
            request_type: RequestType::Text,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            input_cost_usd: 0.0,
            output_cost_usd: 0.0,
            pipeline: None,
            content_id: None,
            operation: operation.into(),
            latency_ms: 0,
            success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate spend for a rollup key (day, month, model, pipeline, or content).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub key: String,
    pub total_cost_usd: f64,
    pub call_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Budget status relative to a configured period limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    Under,
    Warning,
    Over,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetCheck {
    pub state: BudgetState,
    pub spend_usd: f64,
    pub limit_usd: f64,
    pub fraction: f64,
}

const BUDGET_WARNING_FRACTION: f64 = 0.8;

/// Append-only ledger of LLM spend, backed by a dedicated SQLite table.
pub struct CostLedger {
    conn: std::sync::Mutex<Connection>,
}

impl CostLedger {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cost_records (
                id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                provider TEXT NOT NULL,
                request_type TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                input_cost_usd REAL NOT NULL,
                output_cost_usd REAL NOT NULL,
                pipeline TEXT,
                content_id TEXT,
                operation TEXT NOT NULL,
                latency_ms INTEGER NOT NULL,
                success INTEGER NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cost_created_at ON cost_records(created_at);
            CREATE INDEX IF NOT EXISTS idx_cost_model ON cost_records(model);
            CREATE INDEX IF NOT EXISTS idx_cost_pipeline ON cost_records(pipeline);",
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    /// Record a single usage. Callers must not let a recording failure abort
    /// the calling operation — log and continue instead of propagating.
    pub fn record(&self, record: &CostRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert(&conn, record)
    }

    pub fn record_many(&self, records: &[CostRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for record in records {
            Self::insert(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert(conn: &Connection, record: &CostRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO cost_records (
                id, model, provider, request_type, input_tokens, output_tokens,
                cost_usd, input_cost_usd, output_cost_usd, pipeline, content_id,
                operation, latency_ms, success, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.id.to_string(),
                record.model,
                record.provider,
                record.request_type.as_str(),
                record.input_tokens,
                record.output_tokens,
                record.cost_usd,
                record.input_cost_usd,
                record.output_cost_usd,
                record.pipeline,
                record.content_id.map(|u| u.to_string()),
                record.operation,
                record.latency_ms,
                record.success,
                record.error_message,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Roll up spend by day (`YYYY-MM-DD`) across a window.
    pub fn breakdown_by_day(&self, since: DateTime<Utc>) -> Result<Vec<CostBreakdown>> {
        self.breakdown_by("substr(created_at, 1, 10)", since)
    }

    /// Roll up spend by month (`YYYY-MM`) across a window.
    pub fn breakdown_by_month(&self, since: DateTime<Utc>) -> Result<Vec<CostBreakdown>> {
        self.breakdown_by("substr(created_at, 1, 7)", since)
    }

    pub fn breakdown_by_model(&self, since: DateTime<Utc>) -> Result<Vec<CostBreakdown>> {
        self.breakdown_by("model", since)
    }

    pub fn breakdown_by_pipeline(&self, since: DateTime<Utc>) -> Result<Vec<CostBreakdown>> {
        self.breakdown_by("COALESCE(pipeline, 'unknown')", since)
    }

    pub fn breakdown_by_content(&self, since: DateTime<Utc>) -> Result<Vec<CostBreakdown>> {
        self.breakdown_by("COALESCE(content_id, 'unknown')", since)
    }

    fn breakdown_by(&self, key_expr: &str, since: DateTime<Utc>) -> Result<Vec<CostBreakdown>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {key_expr} AS k, SUM(cost_usd), COUNT(*), SUM(input_tokens), SUM(output_tokens)
             FROM cost_records WHERE created_at >= ?1 GROUP BY k ORDER BY SUM(cost_usd) DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                Ok(CostBreakdown {
                    key: row.get(0)?,
                    total_cost_usd: row.get(1)?,
                    call_count: row.get(2)?,
                    input_tokens: row.get(3)?,
                    output_tokens: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total spend since `since`.
    pub fn total_spend(&self, since: DateTime<Utc>) -> Result<f64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<f64> = conn
            .query_row(
                "SELECT SUM(cost_usd) FROM cost_records WHERE created_at >= ?1",
                params![since.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(total.unwrap_or(0.0))
    }

    /// Current-month spend against `limit_usd`, classified into under/warning/over.
    pub fn budget_check(&self, limit_usd: f64, now: DateTime<Utc>) -> Result<BudgetCheck> {
        let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let spend = self.total_spend(month_start)?;
        let fraction = if limit_usd > 0.0 { spend / limit_usd } else { 0.0 };
        let state = if spend > limit_usd {
            BudgetState::Over
        } else if fraction >= BUDGET_WARNING_FRACTION {
            BudgetState::Warning
        } else {
            BudgetState::Under
        };
        Ok(BudgetCheck {
            state,
            spend_usd: spend,
            limit_usd,
            fraction,
        })
    }
}

impl std::fmt::Debug for CostLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostLedger").finish_non_exhaustive()
    }
}

/// In-memory fallback summary, used by callers that accumulate breakdowns
/// before persisting.
pub fn summarize(records: &[CostRecord]) -> BTreeMap<String, CostBreakdown> {
    let mut out: BTreeMap<String, CostBreakdown> = BTreeMap::new();
    for record in records {
        let entry = out.entry(record.model.clone()).or_insert_with(|| CostBreakdown {
            key: record.model.clone(),
            ..Default::default()
        });
        entry.total_cost_usd += record.cost_usd;
        entry.call_count += 1;
        entry.input_tokens += record.input_tokens;
        entry.output_tokens += record.output_tokens;
    }
    out
}
