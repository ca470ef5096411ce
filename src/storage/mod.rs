//! Storage layer for assessment session persistence.
//!
//! This module provides SQLite-based storage for sessions, prescreening
//! answers, question sets, partner answers, alignment results and
//! invocation logs.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::{
    AlignmentResult, AnswerRecord, PartnerNames, Prescreening, PrescreeningAnswers, Question,
};
use crate::error::{AssessmentError, StorageResult};

/// One couple's assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Display name of the first partner.
    pub partner1_name: String,
    /// Display name of the second partner.
    pub partner2_name: String,
    /// Workflow stage.
    pub status: SessionStatus,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Workflow stage of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Collecting prescreening answers.
    #[default]
    Prescreening,
    /// Question set generated, collecting answers.
    QuestionsReady,
    /// At least one result has been produced.
    Completed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Prescreening => write!(f, "prescreening"),
            SessionStatus::QuestionsReady => write!(f, "questions_ready"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prescreening" => Ok(SessionStatus::Prescreening),
            "questions_ready" => Ok(SessionStatus::QuestionsReady),
            "completed" => Ok(SessionStatus::Completed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Which partner a submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Partner {
    First,
    Second,
}

impl Partner {
    pub fn number(&self) -> u8 {
        match self {
            Partner::First => 1,
            Partner::Second => 2,
        }
    }
}

impl TryFrom<u8> for Partner {
    type Error = AssessmentError;

    fn try_from(partner: u8) -> Result<Self, Self::Error> {
        match partner {
            1 => Ok(Partner::First),
            2 => Ok(Partner::Second),
            _ => Err(AssessmentError::InvalidPartner { partner }),
        }
    }
}

impl From<Partner> for u8 {
    fn from(partner: Partner) -> Self {
        partner.number()
    }
}

/// A partner's prescreening submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescreeningRecord {
    /// Parent session ID.
    pub session_id: String,
    /// Submitting partner.
    pub partner: Partner,
    /// Raw answers, keyed by prescreening question id.
    pub answers: PrescreeningAnswers,
    /// When the answers were submitted.
    pub submitted_at: DateTime<Utc>,
}

/// The question set generated for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuestionSet {
    /// Parent session ID.
    pub session_id: String,
    /// Ordered questions.
    pub questions: Vec<Question>,
    /// Whether the deterministic pools were the sole source.
    pub used_fallback: bool,
    /// Whether AI questions were topped up from the pools.
    pub supplemented: bool,
    /// When the set was generated.
    pub created_at: DateTime<Utc>,
}

/// Invocation log entry for debugging and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Optional parent session ID.
    pub session_id: Option<String>,
    /// Name of the MCP tool invoked.
    pub tool_name: String,
    /// Input parameters as JSON.
    pub input: serde_json::Value,
    /// Output result as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Name of the Langbase pipe called.
    pub pipe_name: Option<String>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the invocation occurred.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session for two partners
    pub fn new(partner1_name: impl Into<String>, partner2_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            partner1_name: partner1_name.into(),
            partner2_name: partner2_name.into(),
            status: SessionStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Partner display names
    pub fn names(&self) -> PartnerNames {
        PartnerNames::new(&self.partner1_name, &self.partner2_name)
    }

    /// Move to a new stage, bumping `updated_at`
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }
}

impl PrescreeningRecord {
    pub fn new(session_id: impl Into<String>, partner: Partner, answers: PrescreeningAnswers) -> Self {
        Self {
            session_id: session_id.into(),
            partner,
            answers,
            submitted_at: Utc::now(),
        }
    }

    /// Combine both partners' records; partner 1 is authoritative
    pub fn combine(records: &[PrescreeningRecord]) -> Prescreening {
        let find = |p: Partner| {
            records
                .iter()
                .find(|r| r.partner == p)
                .map(|r| r.answers.clone())
        };

        let prescreening = Prescreening::single(find(Partner::First).unwrap_or_default());
        match find(Partner::Second) {
            Some(second) => prescreening.with_partner2(second),
            None => prescreening,
        }
    }
}

impl StoredQuestionSet {
    pub fn new(session_id: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            session_id: session_id.into(),
            questions,
            used_fallback: false,
            supplemented: false,
            created_at: Utc::now(),
        }
    }

    /// Record how the set was produced
    pub fn with_provenance(mut self, used_fallback: bool, supplemented: bool) -> Self {
        self.used_fallback = used_fallback;
        self.supplemented = supplemented;
        self
    }
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            tool_name: tool_name.into(),
            input,
            output: None,
            pipe_name: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the pipe name
    pub fn with_pipe(mut self, pipe_name: impl Into<String>) -> Self {
        self.pipe_name = Some(pipe_name.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Storage trait for assessment persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Create a new session.
    async fn create_session(&self, session: &Session) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;
    /// Update an existing session.
    async fn update_session(&self, session: &Session) -> StorageResult<()>;
    /// Delete a session and everything stored under it.
    async fn delete_session(&self, id: &str) -> StorageResult<()>;

    // Prescreening operations

    /// Save a partner's prescreening, replacing any earlier submission.
    async fn save_prescreening(&self, record: &PrescreeningRecord) -> StorageResult<()>;
    /// Get every prescreening submission for a session.
    async fn get_prescreening(&self, session_id: &str) -> StorageResult<Vec<PrescreeningRecord>>;

    // Question set operations

    /// Store a session's question set; fails if one already exists.
    async fn save_question_set(&self, set: &StoredQuestionSet) -> StorageResult<()>;
    /// Get a session's question set.
    async fn get_question_set(&self, session_id: &str) -> StorageResult<Option<StoredQuestionSet>>;

    // Answer operations

    /// Save a partner's answers; the latest answer per question wins.
    async fn save_answers(
        &self,
        session_id: &str,
        partner: Partner,
        answers: &[AnswerRecord],
    ) -> StorageResult<()>;
    /// Get a partner's answers.
    async fn get_answers(&self, session_id: &str, partner: Partner) -> StorageResult<Vec<AnswerRecord>>;

    // Result operations

    /// Store a new alignment result.
    async fn save_result(&self, result: &AlignmentResult) -> StorageResult<()>;
    /// Get the most recent alignment result for a session.
    async fn get_latest_result(&self, session_id: &str) -> StorageResult<Option<AlignmentResult>>;

    // Invocation logging

    /// Log a tool invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    /// Get invocations for a session, oldest first.
    async fn get_session_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>>;
}
