use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{
    Invocation, Partner, PrescreeningRecord, Session, Storage, StoredQuestionSet,
};
use crate::assessment::{AlignmentResult, AnswerRecord, PrescreeningAnswers, Question};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database (single connection)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize {}: {}", what, e),
    })
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str, what: &str) -> StorageResult<T> {
    serde_json::from_str(text).map_err(|e| StorageError::Query {
        message: format!("Corrupt {} payload: {}", what, e),
    })
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_partner(raw: i64) -> StorageResult<Partner> {
    u8::try_from(raw)
        .ok()
        .and_then(|p| Partner::try_from(p).ok())
        .ok_or_else(|| StorageError::Query {
            message: format!("Invalid partner column value: {}", raw),
        })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, partner1_name, partner2_name, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.partner1_name)
        .bind(&session.partner2_name)
        .bind(session.status.to_string())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, partner1_name, partner2_name, status, created_at, updated_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_session(&self, session: &Session) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET partner1_name = ?, partner2_name = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&session.partner1_name)
        .bind(&session.partner2_name)
        .bind(session.status.to_string())
        .bind(session.updated_at.to_rfc3339())
        .bind(&session.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }

        Ok(())
    }

    async fn delete_session(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_prescreening(&self, record: &PrescreeningRecord) -> StorageResult<()> {
        let answers = to_json(&record.answers, "prescreening answers")?;

        sqlx::query(
            r#"
            INSERT INTO prescreening (session_id, partner, answers, submitted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (session_id, partner)
            DO UPDATE SET answers = excluded.answers, submitted_at = excluded.submitted_at
            "#,
        )
        .bind(&record.session_id)
        .bind(i64::from(record.partner.number()))
        .bind(&answers)
        .bind(record.submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_prescreening(&self, session_id: &str) -> StorageResult<Vec<PrescreeningRecord>> {
        let rows: Vec<PrescreeningRow> = sqlx::query_as(
            r#"
            SELECT session_id, partner, answers, submitted_at
            FROM prescreening
            WHERE session_id = ?
            ORDER BY partner ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PrescreeningRecord::try_from).collect()
    }

    async fn save_question_set(&self, set: &StoredQuestionSet) -> StorageResult<()> {
        let questions = to_json(&set.questions, "question set")?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO question_sets (session_id, questions, used_fallback, supplemented, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&set.session_id)
        .bind(&questions)
        .bind(set.used_fallback)
        .bind(set.supplemented)
        .bind(set.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::QuestionSetExists {
                session_id: set.session_id.clone(),
            });
        }

        Ok(())
    }

    async fn get_question_set(&self, session_id: &str) -> StorageResult<Option<StoredQuestionSet>> {
        let row: Option<QuestionSetRow> = sqlx::query_as(
            r#"
            SELECT session_id, questions, used_fallback, supplemented, created_at
            FROM question_sets
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredQuestionSet::try_from).transpose()
    }

    async fn save_answers(
        &self,
        session_id: &str,
        partner: Partner,
        answers: &[AnswerRecord],
    ) -> StorageResult<()> {
        let submitted_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for answer in answers {
            sqlx::query(
                r#"
                INSERT INTO answers (session_id, partner, question_id, value, submitted_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (session_id, partner, question_id)
                DO UPDATE SET value = excluded.value, submitted_at = excluded.submitted_at
                "#,
            )
            .bind(session_id)
            .bind(i64::from(partner.number()))
            .bind(&answer.question_id)
            .bind(&answer.value)
            .bind(&submitted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_answers(&self, session_id: &str, partner: Partner) -> StorageResult<Vec<AnswerRecord>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT question_id, value
            FROM answers
            WHERE session_id = ? AND partner = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(session_id)
        .bind(i64::from(partner.number()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(question_id, value)| AnswerRecord { question_id, value })
            .collect())
    }

    async fn save_result(&self, result: &AlignmentResult) -> StorageResult<()> {
        let payload = to_json(result, "alignment result")?;

        sqlx::query(
            r#"
            INSERT INTO results (id, session_id, alignment_score, narrative_source, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(&result.session_id)
        .bind(i64::from(result.alignment_score))
        .bind(result.narrative_source.as_str())
        .bind(&payload)
        .bind(result.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_latest_result(&self, session_id: &str) -> StorageResult<Option<AlignmentResult>> {
        let payload: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM results
            WHERE session_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        payload
            .map(|(text,)| from_json(&text, "alignment result"))
            .transpose()
    }

    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()> {
        let input = serde_json::to_string(&invocation.input).unwrap_or_default();
        let output = invocation
            .output
            .as_ref()
            .map(|o| serde_json::to_string(o).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO invocations (id, session_id, tool_name, input, output, pipe_name, latency_ms, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.id)
        .bind(&invocation.session_id)
        .bind(&invocation.tool_name)
        .bind(&input)
        .bind(&output)
        .bind(&invocation.pipe_name)
        .bind(invocation.latency_ms)
        .bind(invocation.success)
        .bind(&invocation.error)
        .bind(invocation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>> {
        let rows: Vec<InvocationRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, tool_name, input, output, pipe_name, latency_ms, success, error, created_at
            FROM invocations
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    partner1_name: String,
    partner2_name: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            partner1_name: row.partner1_name,
            partner2_name: row.partner2_name,
            status: row.status.parse().unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PrescreeningRow {
    session_id: String,
    partner: i64,
    answers: String,
    submitted_at: String,
}

impl TryFrom<PrescreeningRow> for PrescreeningRecord {
    type Error = StorageError;

    fn try_from(row: PrescreeningRow) -> StorageResult<Self> {
        let answers: PrescreeningAnswers = from_json(&row.answers, "prescreening")?;
        Ok(Self {
            session_id: row.session_id,
            partner: parse_partner(row.partner)?,
            answers,
            submitted_at: parse_timestamp(&row.submitted_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuestionSetRow {
    session_id: String,
    questions: String,
    used_fallback: bool,
    supplemented: bool,
    created_at: String,
}

impl TryFrom<QuestionSetRow> for StoredQuestionSet {
    type Error = StorageError;

    fn try_from(row: QuestionSetRow) -> StorageResult<Self> {
        let questions: Vec<Question> = from_json(&row.questions, "question set")?;
        Ok(Self {
            session_id: row.session_id,
            questions,
            used_fallback: row.used_fallback,
            supplemented: row.supplemented,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvocationRow {
    id: String,
    session_id: Option<String>,
    tool_name: String,
    input: String,
    output: Option<String>,
    pipe_name: Option<String>,
    latency_ms: Option<i64>,
    success: bool,
    error: Option<String>,
    created_at: String,
}

impl From<InvocationRow> for Invocation {
    fn from(row: InvocationRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            tool_name: row.tool_name,
            input: serde_json::from_str(&row.input).unwrap_or_default(),
            output: row.output.and_then(|s| serde_json::from_str(&s).ok()),
            pipe_name: row.pipe_name,
            latency_ms: row.latency_ms,
            success: row.success,
            error: row.error,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
