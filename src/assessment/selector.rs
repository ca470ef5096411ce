//! Adaptive question selection.
//!
//! The AI pipe is asked first; anything it gets wrong degrades to the
//! deterministic pools. Generation never fails.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::context::{derive_context, NormalizedContext, Prescreening};
use super::pools::{fallback_questions, QuestionCatalog, FOUNDATIONAL_POOLS};
use super::question::{parse_ai_questions, Question};
use super::run_pipe_with_timeout;
use crate::config::Config;
use crate::langbase::{Message, PipeRequest, PipeRunner};
use crate::prompts::QUESTION_GENERATION_PROMPT;

/// Display names used in prompts and narratives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerNames {
    pub partner1: String,
    pub partner2: String,
}

impl PartnerNames {
    pub fn new(partner1: impl Into<String>, partner2: impl Into<String>) -> Self {
        Self {
            partner1: partner1.into(),
            partner2: partner2.into(),
        }
    }
}

impl Default for PartnerNames {
    fn default() -> Self {
        Self::new("Partner 1", "Partner 2")
    }
}

/// Outcome of a question generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestions {
    pub questions: Vec<Question>,
    /// Pools were the sole source
    pub used_fallback: bool,
    /// AI questions were topped up from the pools
    pub supplemented: bool,
    /// Why the AI path was not used as-is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_error: Option<String>,
}

impl GeneratedQuestions {
    fn fallback(questions: Vec<Question>, reason: impl Into<String>) -> Self {
        Self {
            questions,
            used_fallback: true,
            supplemented: false,
            ai_error: Some(reason.into()),
        }
    }
}

/// Question selector: AI pipe with deterministic pool fallback.
pub struct QuestionSelector {
    runner: Arc<dyn PipeRunner>,
    pipe_name: String,
    ai_enabled: bool,
    timeout_ms: u64,
    catalog: &'static QuestionCatalog,
}

impl QuestionSelector {
    /// Create a selector over the built-in pools
    pub fn new(
        runner: Arc<dyn PipeRunner>,
        pipe_name: impl Into<String>,
        ai_enabled: bool,
        timeout_ms: u64,
    ) -> Self {
        Self {
            runner,
            pipe_name: pipe_name.into(),
            ai_enabled,
            timeout_ms,
            catalog: QuestionCatalog::builtin(),
        }
    }

    /// Create a selector from application config
    pub fn from_config(runner: Arc<dyn PipeRunner>, config: &Config) -> Self {
        Self::new(
            runner,
            &config.pipes.questions,
            config.assessment.ai_enabled,
            config.assessment.ai_timeout_ms,
        )
    }

    /// Produce the question set for a couple.
    pub async fn generate_questions(
        &self,
        prescreening: &Prescreening,
        names: &PartnerNames,
    ) -> GeneratedQuestions {
        let start = Instant::now();
        let ctx = derive_context(prescreening);
        let (min, max) = ctx.question_range();

        let generated = if !self.ai_enabled {
            debug!("AI generation disabled, using question pools");
            GeneratedQuestions::fallback(
                fallback_questions(&ctx, self.catalog),
                "AI generation disabled",
            )
        } else {
            match self.request_ai_questions(&ctx, names).await {
                Ok(questions) if questions.len() >= min => GeneratedQuestions {
                    questions: questions.into_iter().take(max).collect(),
                    used_fallback: false,
                    supplemented: false,
                    ai_error: None,
                },
                Ok(questions) if !questions.is_empty() => {
                    let ai_count = questions.len();
                    let merged =
                        supplement(questions, fallback_questions(&ctx, self.catalog), max);
                    info!(
                        ai_count,
                        total = merged.len(),
                        min,
                        "AI returned too few questions, supplemented from pools"
                    );
                    GeneratedQuestions {
                        questions: merged,
                        used_fallback: false,
                        supplemented: true,
                        ai_error: Some(format!(
                            "AI returned {} valid questions (minimum {})",
                            ai_count, min
                        )),
                    }
                }
                Ok(_) => {
                    warn!(pipe = %self.pipe_name, "AI response held no valid questions, using pools");
                    GeneratedQuestions::fallback(
                        fallback_questions(&ctx, self.catalog),
                        "No valid questions in AI response",
                    )
                }
                Err(e) => {
                    warn!(pipe = %self.pipe_name, error = %e, "AI question generation failed, using pools");
                    GeneratedQuestions::fallback(fallback_questions(&ctx, self.catalog), e)
                }
            }
        };

        if generated.questions.len() < min {
            warn!(
                count = generated.questions.len(),
                min,
                "Question set is below the minimum for the requested depth"
            );
        }

        info!(
            count = generated.questions.len(),
            used_fallback = generated.used_fallback,
            supplemented = generated.supplemented,
            depth = ctx.assessment_depth.as_str(),
            latency_ms = start.elapsed().as_millis() as i64,
            "Question generation completed"
        );

        generated
    }

    /// Deterministic pool selection for a prescreening, without the AI pipe
    pub fn preview(&self, prescreening: &Prescreening) -> Vec<Question> {
        fallback_questions(&derive_context(prescreening), self.catalog)
    }

    async fn request_ai_questions(
        &self,
        ctx: &NormalizedContext,
        names: &PartnerNames,
    ) -> Result<Vec<Question>, String> {
        let (min, max) = ctx.question_range();
        let request = PipeRequest::new(&self.pipe_name, build_messages(ctx, names))
            .with_variable("depth", ctx.assessment_depth.as_str())
            .with_variable("priority", ctx.current_priority.as_str())
            .with_variable("min_questions", min.to_string())
            .with_variable("max_questions", max.to_string());
        let completion = run_pipe_with_timeout(self.runner.as_ref(), request, self.timeout_ms).await?;
        let questions = parse_ai_questions(&completion)?;
        debug!(count = questions.len(), "Parsed AI questions");
        Ok(questions)
    }
}

/// Build the messages for the question pipe.
pub fn build_messages(ctx: &NormalizedContext, names: &PartnerNames) -> Vec<Message> {
    let (min, max) = ctx.question_range();

    let context_lines: Vec<String> = ctx.summary_lines().iter().map(|l| format!("- {}", l)).collect();
    let guidance_lines: Vec<String> = ctx.guidance().iter().map(|g| format!("- {}", g)).collect();

    let mut prompt = format!(
        "Couple: {} and {}\n\nContext:\n{}\n",
        names.partner1,
        names.partner2,
        context_lines.join("\n")
    );

    if !guidance_lines.is_empty() {
        prompt.push_str(&format!("\nGuidance:\n{}\n", guidance_lines.join("\n")));
    }

    prompt.push_str(&format!(
        "\nGenerate between {} and {} questions.\n\
         Distribution: about 50% on the priority ({}), about 30% on the focus areas ({}), \
         and about 20% on foundational topics ({}).\n\
         Respond with the JSON array only.",
        min,
        max,
        ctx.current_priority.describe(),
        ctx.focus_areas.join(", "),
        FOUNDATIONAL_POOLS.join(", "),
    ));

    vec![
        Message::system(QUESTION_GENERATION_PROMPT),
        Message::user(prompt),
    ]
}

/// Top up AI questions with pool questions whose text and id are unused.
pub fn supplement(ai: Vec<Question>, fallback: Vec<Question>, max: usize) -> Vec<Question> {
    let mut texts: HashSet<String> = ai.iter().map(|q| q.question_text.clone()).collect();
    let mut ids: HashSet<String> = ai.iter().map(|q| q.id.clone()).collect();
    let mut merged = ai;

    for question in fallback {
        if merged.len() >= max {
            break;
        }
        if texts.contains(&question.question_text) || ids.contains(&question.id) {
            continue;
        }
        texts.insert(question.question_text.clone());
        ids.insert(question.id.clone());
        merged.push(question);
    }

    merged.truncate(max);
    merged
}
