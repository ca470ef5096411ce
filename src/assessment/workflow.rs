//! Session workflow: prescreening, question generation, answers, analysis.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::context::{derive_context, NormalizedContext, Prescreening, PrescreeningAnswers};
use super::narrative::NarrativeSource;
use super::question::Question;
use super::scorer::{AlignmentResult, AlignmentScorer, AnswerRecord, PartnerAnswers};
use super::selector::{GeneratedQuestions, PartnerNames, QuestionSelector};
use super::serialize_for_log;
use crate::config::Config;
use crate::error::{AppResult, AssessmentError, StorageError};
use crate::langbase::PipeRunner;
use crate::storage::{
    Invocation, Partner, PrescreeningRecord, Session, SessionStatus, SqliteStorage, Storage,
    StoredQuestionSet,
};

/// Prescreening accepted for a partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescreeningAccepted {
    pub session_id: String,
    pub partner: Partner,
    /// Context derived from everything submitted so far
    pub context: NormalizedContext,
}

/// A session's question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSetView {
    pub session_id: String,
    pub questions: Vec<Question>,
    pub used_fallback: bool,
    pub supplemented: bool,
    /// The set was already stored and has not been regenerated
    pub reused: bool,
}

/// Answers accepted for a partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswersAccepted {
    pub session_id: String,
    pub partner: Partner,
    pub accepted: usize,
    /// Questions this partner has answered in total
    pub answered: usize,
    pub total_questions: usize,
}

/// Assessment workflow handler
pub struct AssessmentMode {
    storage: SqliteStorage,
    selector: QuestionSelector,
    scorer: AlignmentScorer,
    questions_pipe: String,
    analysis_pipe: String,
}

impl AssessmentMode {
    /// Create a new assessment workflow handler
    pub fn new(storage: SqliteStorage, runner: Arc<dyn PipeRunner>, config: &Config) -> Self {
        Self {
            storage,
            selector: QuestionSelector::from_config(Arc::clone(&runner), config),
            scorer: AlignmentScorer::from_config(runner, config),
            questions_pipe: config.pipes.questions.clone(),
            analysis_pipe: config.pipes.analysis.clone(),
        }
    }

    /// Get a reference to the storage backend.
    #[inline]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Start a new assessment for two partners
    pub async fn create_session(&self, partner1_name: &str, partner2_name: &str) -> AppResult<Session> {
        let partner1_name = required_name("partner1_name", partner1_name)?;
        let partner2_name = required_name("partner2_name", partner2_name)?;

        let session = Session::new(partner1_name, partner2_name);
        self.storage.create_session(&session).await?;

        info!(session_id = %session.id, "Assessment session created");
        Ok(session)
    }

    /// Record a partner's prescreening answers
    pub async fn submit_prescreening(
        &self,
        session_id: &str,
        partner: Partner,
        answers: PrescreeningAnswers,
    ) -> AppResult<PrescreeningAccepted> {
        let session = self.require_session(session_id).await?;

        if self.storage.get_question_set(&session.id).await?.is_some() {
            return Err(AssessmentError::Validation {
                field: "session_id".to_string(),
                reason: "Questions were already generated for this session".to_string(),
            }
            .into());
        }

        let record = PrescreeningRecord::new(&session.id, partner, answers);
        self.storage.save_prescreening(&record).await?;

        let prescreening = self.load_prescreening(&session.id).await?;
        let context = derive_context(&prescreening);

        debug!(
            session_id = %session.id,
            partner = partner.number(),
            priority = %context.current_priority,
            "Prescreening saved"
        );

        Ok(PrescreeningAccepted {
            session_id: session.id,
            partner,
            context,
        })
    }

    /// Produce the session's question set, or return the stored one
    pub async fn generate_questions(&self, session_id: &str) -> AppResult<QuestionSetView> {
        let session = self.require_session(session_id).await?;

        if let Some(stored) = self.storage.get_question_set(&session.id).await? {
            debug!(session_id = %session.id, "Returning stored question set");
            return Ok(view(stored, true));
        }

        let start = Instant::now();
        let prescreening = self.load_prescreening(&session.id).await?;

        let invocation = Invocation::new(
            "assessment_generate_questions",
            serialize_for_log(&prescreening, "assessment_generate_questions input"),
        )
        .with_session(&session.id)
        .with_pipe(&self.questions_pipe);

        let generated = self
            .selector
            .generate_questions(&prescreening, &session.names())
            .await;

        let set = StoredQuestionSet::new(&session.id, generated.questions.clone())
            .with_provenance(generated.used_fallback, generated.supplemented);

        match self.storage.save_question_set(&set).await {
            Ok(()) => {}
            Err(StorageError::QuestionSetExists { .. }) => {
                // Lost a race with a concurrent generation; the first set stands
                warn!(session_id = %session.id, "Question set stored concurrently, keeping the first");
                return match self.storage.get_question_set(&session.id).await? {
                    Some(stored) => Ok(view(stored, true)),
                    None => Err(AssessmentError::MissingQuestionSet {
                        session_id: session.id,
                    }
                    .into()),
                };
            }
            Err(e) => return Err(e.into()),
        }

        self.storage
            .update_session(&session.clone().with_status(SessionStatus::QuestionsReady))
            .await?;

        let latency = start.elapsed().as_millis() as i64;
        self.storage
            .log_invocation(&invocation.success(generation_summary(&generated), latency))
            .await?;

        info!(
            session_id = %session.id,
            count = set.questions.len(),
            used_fallback = set.used_fallback,
            latency_ms = latency,
            "Question set generated"
        );

        Ok(view(set, false))
    }

    /// Record a partner's answers; every id and value must match the question set
    pub async fn submit_answers(
        &self,
        session_id: &str,
        partner: Partner,
        answers: Vec<AnswerRecord>,
    ) -> AppResult<AnswersAccepted> {
        let session = self.require_session(session_id).await?;
        let set = self.require_question_set(&session.id).await?;

        validate_answers(&set.questions, &answers)?;

        self.storage.save_answers(&session.id, partner, &answers).await?;
        let answered = self.storage.get_answers(&session.id, partner).await?.len();

        debug!(
            session_id = %session.id,
            partner = partner.number(),
            accepted = answers.len(),
            answered,
            "Answers saved"
        );

        Ok(AnswersAccepted {
            session_id: session.id,
            partner,
            accepted: answers.len(),
            answered,
            total_questions: set.questions.len(),
        })
    }

    /// Score the session and store a fresh result
    pub async fn analyze(&self, session_id: &str) -> AppResult<AlignmentResult> {
        let start = Instant::now();
        let session = self.require_session(session_id).await?;

        let invocation = Invocation::new(
            "assessment_analyze",
            serde_json::json!({ "session_id": session.id }),
        )
        .with_session(&session.id)
        .with_pipe(&self.analysis_pipe);

        let set = match self.storage.get_question_set(&session.id).await? {
            Some(set) => set,
            None => {
                let err = AssessmentError::MissingQuestionSet {
                    session_id: session.id.clone(),
                };
                let latency = start.elapsed().as_millis() as i64;
                self.storage
                    .log_invocation(&invocation.failure(err.to_string(), latency))
                    .await?;
                return Err(err.into());
            }
        };

        let prescreening = self.load_prescreening(&session.id).await?;
        let answers = PartnerAnswers {
            partner1: self.storage.get_answers(&session.id, Partner::First).await?,
            partner2: self.storage.get_answers(&session.id, Partner::Second).await?,
        };

        let result = match self
            .scorer
            .analyze_results(&session, &prescreening, &set.questions, &answers)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let latency = start.elapsed().as_millis() as i64;
                self.storage
                    .log_invocation(&invocation.failure(e.to_string(), latency))
                    .await?;
                return Err(e);
            }
        };

        self.storage.save_result(&result).await?;
        self.storage
            .update_session(&session.clone().with_status(SessionStatus::Completed))
            .await?;

        let latency = start.elapsed().as_millis() as i64;
        self.storage
            .log_invocation(&invocation.success(
                serde_json::json!({
                    "result_id": result.id,
                    "alignment_score": result.alignment_score,
                    "questions_asked": result.questions_asked,
                    "narrative_source": result.narrative_source,
                    "used_fallback": result.narrative_source == NarrativeSource::Fallback,
                }),
                latency,
            ))
            .await?;

        info!(
            session_id = %session.id,
            result_id = %result.id,
            alignment_score = result.alignment_score,
            latency_ms = latency,
            "Assessment analyzed"
        );

        Ok(result)
    }

    /// Most recent result for a session, if it has been analyzed
    pub async fn latest_result(&self, session_id: &str) -> AppResult<Option<AlignmentResult>> {
        let session = self.require_session(session_id).await?;
        Ok(self.storage.get_latest_result(&session.id).await?)
    }

    /// Run the selector without a session
    pub async fn preview_questions(&self, prescreening: &Prescreening) -> AppResult<GeneratedQuestions> {
        let start = Instant::now();
        let invocation = Invocation::new(
            "assessment_preview_questions",
            serialize_for_log(prescreening, "assessment_preview_questions input"),
        )
        .with_pipe(&self.questions_pipe);

        let generated = self
            .selector
            .generate_questions(prescreening, &PartnerNames::default())
            .await;

        let latency = start.elapsed().as_millis() as i64;
        self.storage
            .log_invocation(&invocation.success(generation_summary(&generated), latency))
            .await?;

        Ok(generated)
    }

    async fn require_session(&self, session_id: &str) -> AppResult<Session> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| {
                StorageError::SessionNotFound {
                    session_id: session_id.to_string(),
                }
                .into()
            })
    }

    async fn require_question_set(&self, session_id: &str) -> AppResult<StoredQuestionSet> {
        self.storage
            .get_question_set(session_id)
            .await?
            .ok_or_else(|| {
                AssessmentError::MissingQuestionSet {
                    session_id: session_id.to_string(),
                }
                .into()
            })
    }

    async fn load_prescreening(&self, session_id: &str) -> AppResult<Prescreening> {
        let records = self.storage.get_prescreening(session_id).await?;
        Ok(PrescreeningRecord::combine(&records))
    }
}

fn required_name(field: &str, name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AssessmentError::Validation {
            field: field.to_string(),
            reason: "Name cannot be empty".to_string(),
        }
        .into());
    }
    Ok(trimmed.to_string())
}

fn view(set: StoredQuestionSet, reused: bool) -> QuestionSetView {
    QuestionSetView {
        session_id: set.session_id,
        questions: set.questions,
        used_fallback: set.used_fallback,
        supplemented: set.supplemented,
        reused,
    }
}

fn generation_summary(generated: &GeneratedQuestions) -> serde_json::Value {
    serde_json::json!({
        "count": generated.questions.len(),
        "used_fallback": generated.used_fallback,
        "supplemented": generated.supplemented,
        "ai_error": generated.ai_error,
    })
}

/// Reject empty submissions, unknown question ids and values outside the options.
fn validate_answers(questions: &[Question], answers: &[AnswerRecord]) -> AppResult<()> {
    if answers.is_empty() {
        return Err(AssessmentError::Validation {
            field: "answers".to_string(),
            reason: "At least one answer is required".to_string(),
        }
        .into());
    }

    for answer in answers {
        let question = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .ok_or_else(|| AssessmentError::Validation {
                field: "answers".to_string(),
                reason: format!("Unknown question id: {}", answer.question_id),
            })?;

        if question.option(&answer.value).is_none() {
            return Err(AssessmentError::Validation {
                field: "answers".to_string(),
                reason: format!(
                    "Invalid value '{}' for question {}",
                    answer.value, answer.question_id
                ),
            }
            .into());
        }
    }

    Ok(())
}
