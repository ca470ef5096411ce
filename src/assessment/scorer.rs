//! Importance-weighted alignment scoring.
//!
//! Numeric scoring is pure and never depends on the AI pipe; only the
//! narrative prose does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::{derive_context, NormalizedContext, Prescreening};
use super::narrative::{parse_ai_narrative, InsightCatalog, Narrative, NarrativeInput, NarrativeSource};
use super::question::{AnswerOption, Question};
use super::run_pipe_with_timeout;
use super::selector::PartnerNames;
use crate::config::Config;
use crate::error::{AppResult, AssessmentError};
use crate::langbase::{Message, PipeRequest, PipeRunner};
use crate::prompts::RESULTS_ANALYSIS_PROMPT;
use crate::storage::Session;

/// Entries kept in the strong alignment and misalignment lists.
pub const MAX_HIGHLIGHTS: usize = 5;

/// Largest possible distance between two option weights.
const MAX_WEIGHT_DIFF: f64 = 3.0;

/// One partner's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(alias = "question_id")]
    pub question_id: String,
    pub value: String,
}

impl AnswerRecord {
    pub fn new(question_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            value: value.into(),
        }
    }
}

/// Both partners' answers for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartnerAnswers {
    pub partner1: Vec<AnswerRecord>,
    pub partner2: Vec<AnswerRecord>,
}

/// A question both partners answered the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrongAlignment {
    pub question_id: String,
    pub question_text: String,
    pub category: String,
    pub shared_label: String,
    pub importance_weight: f64,
    pub is_high_priority: bool,
    pub insight: String,
}

/// A question the partners answered differently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Misalignment {
    pub question_id: String,
    pub question_text: String,
    pub category: String,
    pub partner1_label: String,
    pub partner2_label: String,
    /// Distance between the two answers on the 1..=4 scale
    pub weight_diff: u8,
    pub importance_weight: f64,
    pub is_high_priority: bool,
    pub discussion_prompt: String,
}

/// Scored outcome of an assessment. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    pub id: String,
    pub session_id: String,
    pub alignment_score: u8,
    pub category_scores: BTreeMap<String, u8>,
    pub strong_alignments: Vec<StrongAlignment>,
    pub misalignments: Vec<Misalignment>,
    pub narrative: String,
    pub discussion_prompts: Vec<String>,
    pub recommended_goals: Vec<String>,
    pub questions_asked: usize,
    pub narrative_source: NarrativeSource,
    pub created_at: DateTime<Utc>,
}

/// A question with both partners' valid answers.
#[derive(Debug, Clone, Copy)]
pub struct ScoredQuestion<'a> {
    pub question: &'a Question,
    pub partner1: &'a AnswerOption,
    pub partner2: &'a AnswerOption,
    pub aligned: bool,
    pub weight_diff: u8,
    pub is_high_priority: bool,
}

impl ScoredQuestion<'_> {
    /// Numerator contribution: full weight when aligned, scaled by distance otherwise
    pub fn credit(&self) -> f64 {
        let weight = self.question.importance_weight;
        if self.aligned {
            weight
        } else {
            (weight * (1.0 - f64::from(self.weight_diff) / MAX_WEIGHT_DIFF)).max(0.0)
        }
    }
}

/// Pair each question with both partners' answers.
///
/// Questions missing either answer, or with a value outside the option
/// list, are excluded. The last record for a question wins.
pub fn score_questions<'a>(
    ctx: &NormalizedContext,
    questions: &'a [Question],
    answers: &PartnerAnswers,
) -> Vec<ScoredQuestion<'a>> {
    let index = |records: &[AnswerRecord]| -> HashMap<String, String> {
        records
            .iter()
            .map(|r| (r.question_id.clone(), r.value.clone()))
            .collect()
    };
    let first = index(&answers.partner1);
    let second = index(&answers.partner2);

    questions
        .iter()
        .filter_map(|question| {
            let p1 = question.option(first.get(&question.id)?)?;
            let p2 = question.option(second.get(&question.id)?)?;
            Some(ScoredQuestion {
                question,
                partner1: p1,
                partner2: p2,
                aligned: p1.value == p2.value,
                weight_diff: p1.weight.abs_diff(p2.weight),
                is_high_priority: ctx.is_high_priority(&question.category),
            })
        })
        .collect()
}

/// Importance-weighted agreement, 0..=100. Zero when nothing was scored.
pub fn weighted_score<'a, 'q: 'a, I>(scored: I) -> u8
where
    I: IntoIterator<Item = &'a ScoredQuestion<'q>>,
{
    let (credit, total) = scored.into_iter().fold((0.0, 0.0), |(c, t), s| {
        (c + s.credit(), t + s.question.importance_weight)
    });

    if total <= 0.0 {
        return 0;
    }
    (100.0 * credit / total).round().clamp(0.0, 100.0) as u8
}

/// Per-category scores; categories without scored questions are absent.
pub fn category_scores(scored: &[ScoredQuestion<'_>]) -> BTreeMap<String, u8> {
    let mut grouped: BTreeMap<&str, Vec<&ScoredQuestion<'_>>> = BTreeMap::new();
    for s in scored {
        grouped.entry(s.question.category.as_str()).or_default().push(s);
    }

    grouped
        .into_iter()
        .map(|(category, items)| (category.to_string(), weighted_score(items)))
        .collect()
}

/// Aligned questions by importance then priority relevance, top five.
pub fn strong_alignments(
    scored: &[ScoredQuestion<'_>],
    category_scores: &BTreeMap<String, u8>,
    insights: &InsightCatalog,
) -> Vec<StrongAlignment> {
    let mut aligned: Vec<&ScoredQuestion<'_>> = scored.iter().filter(|s| s.aligned).collect();
    aligned.sort_by(|a, b| {
        b.question
            .importance_weight
            .total_cmp(&a.question.importance_weight)
            .then(b.is_high_priority.cmp(&a.is_high_priority))
    });

    aligned
        .into_iter()
        .take(MAX_HIGHLIGHTS)
        .map(|s| {
            let category = &s.question.category;
            let score = category_scores.get(category).copied().unwrap_or(0);
            StrongAlignment {
                question_id: s.question.id.clone(),
                question_text: s.question.question_text.clone(),
                category: category.clone(),
                shared_label: s.partner1.label.clone(),
                importance_weight: s.question.importance_weight,
                is_high_priority: s.is_high_priority,
                insight: insights.insight(category, score).to_string(),
            }
        })
        .collect()
}

/// Differing answers by distance then priority relevance, top five.
pub fn misalignments(
    scored: &[ScoredQuestion<'_>],
    names: &PartnerNames,
    insights: &InsightCatalog,
) -> Vec<Misalignment> {
    let mut differing: Vec<&ScoredQuestion<'_>> = scored.iter().filter(|s| !s.aligned).collect();
    differing.sort_by(|a, b| {
        b.weight_diff
            .cmp(&a.weight_diff)
            .then(b.is_high_priority.cmp(&a.is_high_priority))
    });

    differing
        .into_iter()
        .take(MAX_HIGHLIGHTS)
        .map(|s| Misalignment {
            question_id: s.question.id.clone(),
            question_text: s.question.question_text.clone(),
            category: s.question.category.clone(),
            partner1_label: s.partner1.label.clone(),
            partner2_label: s.partner2.label.clone(),
            weight_diff: s.weight_diff,
            importance_weight: s.question.importance_weight,
            is_high_priority: s.is_high_priority,
            discussion_prompt: insights.discussion_prompt(
                &s.question.category,
                &s.question.question_text,
                names,
                &s.partner1.label,
                &s.partner2.label,
            ),
        })
        .collect()
}

/// Alignment scorer with AI narrative and template fallback.
pub struct AlignmentScorer {
    runner: Arc<dyn PipeRunner>,
    pipe_name: String,
    ai_enabled: bool,
    timeout_ms: u64,
    insights: &'static InsightCatalog,
}

impl AlignmentScorer {
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
            insights: InsightCatalog::builtin(),
        }
    }

    pub fn from_config(runner: Arc<dyn PipeRunner>, config: &Config) -> Self {
        Self::new(
            runner,
            &config.pipes.analysis,
            config.assessment.ai_enabled,
            config.assessment.ai_timeout_ms,
        )
    }

    /// Score a completed assessment.
    ///
    /// Fails only when there is no question set to score.
    pub async fn analyze_results(
        &self,
        session: &Session,
        prescreening: &Prescreening,
        questions: &[Question],
        answers: &PartnerAnswers,
    ) -> AppResult<AlignmentResult> {
        if questions.is_empty() {
            return Err(AssessmentError::MissingQuestionSet {
                session_id: session.id.clone(),
            }
            .into());
        }

        let start = Instant::now();
        let ctx = derive_context(prescreening);
        let names = session.names();

        let scored = score_questions(&ctx, questions, answers);
        let alignment_score = weighted_score(&scored);
        let categories = category_scores(&scored);
        let strong = strong_alignments(&scored, &categories, self.insights);
        let differing = misalignments(&scored, &names, self.insights);

        debug!(
            session_id = %session.id,
            scored = scored.len(),
            total = questions.len(),
            alignment_score,
            "Scored assessment answers"
        );

        let input = NarrativeInput {
            names: &names,
            priority: ctx.current_priority,
            alignment_score,
            category_scores: &categories,
            misalignments: &differing,
        };
        let fallback = self.insights.fallback_narrative(&input);

        let narrative = if !self.ai_enabled || scored.is_empty() {
            fallback
        } else {
            match self.request_narrative(&ctx, &input, &strong, scored.len()).await {
                Ok(ai) => merge_narrative(ai, fallback),
                Err(e) => {
                    warn!(
                        session_id = %session.id,
                        pipe = %self.pipe_name,
                        error = %e,
                        "AI narrative failed, using template narrative"
                    );
                    fallback
                }
            }
        };

        let result = AlignmentResult {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            alignment_score,
            category_scores: categories,
            strong_alignments: strong,
            misalignments: differing,
            narrative: narrative.narrative,
            discussion_prompts: narrative.discussion_prompts,
            recommended_goals: narrative.recommended_goals,
            questions_asked: scored.len(),
            narrative_source: narrative.source,
            created_at: Utc::now(),
        };

        info!(
            session_id = %session.id,
            alignment_score = result.alignment_score,
            questions_asked = result.questions_asked,
            narrative_source = result.narrative_source.as_str(),
            latency_ms = start.elapsed().as_millis() as i64,
            "Alignment analysis completed"
        );

        Ok(result)
    }

    async fn request_narrative(
        &self,
        ctx: &NormalizedContext,
        input: &NarrativeInput<'_>,
        strong: &[StrongAlignment],
        questions_asked: usize,
    ) -> Result<Narrative, String> {
        let messages = build_messages(ctx, input, strong, questions_asked);
        let request = PipeRequest::new(&self.pipe_name, messages);
        let completion =
            run_pipe_with_timeout(self.runner.as_ref(), request, self.timeout_ms).await?;
        parse_ai_narrative(&completion)
    }
}

/// Fill empty AI lists from the template narrative.
fn merge_narrative(mut ai: Narrative, fallback: Narrative) -> Narrative {
    if ai.discussion_prompts.is_empty() {
        ai.discussion_prompts = fallback.discussion_prompts;
    }
    if ai.recommended_goals.is_empty() {
        ai.recommended_goals = fallback.recommended_goals;
    }
    ai
}

fn build_messages(
    ctx: &NormalizedContext,
    input: &NarrativeInput<'_>,
    strong: &[StrongAlignment],
    questions_asked: usize,
) -> Vec<Message> {
    let summary = serde_json::json!({
        "partners": [input.names.partner1, input.names.partner2],
        "priority": ctx.current_priority.describe(),
        "focusAreas": ctx.focus_areas,
        "relationship": ctx.summary_lines(),
        "alignmentScore": input.alignment_score,
        "categoryScores": input.category_scores,
        "questionsAsked": questions_asked,
        "strongAlignments": strong.iter().map(|s| serde_json::json!({
            "question": s.question_text,
            "sharedAnswer": s.shared_label,
            "category": s.category,
        })).collect::<Vec<_>>(),
        "misalignments": input.misalignments.iter().map(|m| serde_json::json!({
            "question": m.question_text,
            "partner1Answer": m.partner1_label,
            "partner2Answer": m.partner2_label,
            "weightDiff": m.weight_diff,
            "highPriority": m.is_high_priority,
        })).collect::<Vec<_>>(),
    });

    vec![
        Message::system(RESULTS_ANALYSIS_PROMPT),
        Message::user(format!(
            "Assessment results for {} and {}:\n{}",
            input.names.partner1,
            input.names.partner2,
            serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
        )),
    ]
}
