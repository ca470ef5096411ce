//! Unit tests for alignment scoring.
//!
//! Covers the weighted formula, exclusion rules, highlight ordering and the
//! AI/template narrative switch.

use super::*;
use crate::error::{AppError, AssessmentError, LangbaseError};
use crate::langbase::{MockPipeRunner, PipeResponse};
use crate::storage::Session;
use pretty_assertions::assert_eq;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn four_point(id: &str, category: &str, importance: Importance) -> Question {
    Question::new(
        id,
        category,
        importance,
        format!("Question {}?", id),
        vec![
            AnswerOption::new("a", "Option A", 1),
            AnswerOption::new("b", "Option B", 2),
            AnswerOption::new("c", "Option C", 3),
            AnswerOption::new("d", "Option D", 4),
        ],
    )
}

fn answers(p1: &[(&str, &str)], p2: &[(&str, &str)]) -> PartnerAnswers {
    let records = |list: &[(&str, &str)]| {
        list.iter()
            .map(|(q, v)| AnswerRecord::new(*q, *v))
            .collect::<Vec<_>>()
    };
    PartnerAnswers {
        partner1: records(p1),
        partner2: records(p2),
    }
}

fn identical(questions: &[Question], value: &str) -> PartnerAnswers {
    let list: Vec<(&str, &str)> = questions.iter().map(|q| (q.id.as_str(), value)).collect();
    answers(&list, &list)
}

fn ctx() -> NormalizedContext {
    NormalizedContext::default()
}

fn insights() -> &'static InsightCatalog {
    InsightCatalog::builtin()
}

fn scorer(runner: MockPipeRunner, ai_enabled: bool) -> AlignmentScorer {
    AlignmentScorer::new(Arc::new(runner), "assessment-analysis-v1", ai_enabled, 1000)
}

// ============================================================================
// Pure scoring
// ============================================================================

#[test]
fn test_identical_answers_score_100() {
    let questions = vec![
        four_point("q1", "finances", Importance::Critical),
        four_point("q2", "travel", Importance::NiceToHave),
        four_point("q3", "values", Importance::Normal),
    ];
    let scored = score_questions(&ctx(), &questions, &identical(&questions, "b"));

    assert_eq!(scored.len(), 3);
    assert_eq!(weighted_score(&scored), 100);
    assert!(category_scores(&scored).values().all(|&s| s == 100));
}

#[test]
fn test_maximal_difference_on_critical_question_scores_zero() {
    let questions = vec![
        four_point("q1", "finances", Importance::Critical),
        four_point("q2", "travel", Importance::Normal),
    ];
    let given = answers(&[("q1", "a"), ("q2", "c")], &[("q1", "d"), ("q2", "c")]);
    let scored = score_questions(&ctx(), &questions, &given);
    let categories = category_scores(&scored);

    assert_eq!(categories["finances"], 0);
    assert_eq!(categories["travel"], 100);
    // 1.0 of 2.5 total weight
    assert_eq!(weighted_score(&scored), 40);
}

#[test]
fn test_one_step_apart_earns_partial_credit() {
    let questions = vec![four_point("q1", "values", Importance::Normal)];
    let given = answers(&[("q1", "a")], &[("q1", "b")]);
    let scored = score_questions(&ctx(), &questions, &given);

    assert!(!scored[0].aligned);
    assert_eq!(scored[0].weight_diff, 1);
    assert_eq!(weighted_score(&scored), 67);
}

#[test]
fn test_different_values_with_equal_weights_are_not_aligned() {
    let question = Question::new(
        "q1",
        "values",
        Importance::Normal,
        "Q?",
        vec![
            AnswerOption::new("x", "X", 2),
            AnswerOption::new("y", "Y", 2),
        ],
    );
    let questions = vec![question];
    let scored = score_questions(&ctx(), &questions, &answers(&[("q1", "x")], &[("q1", "y")]));

    assert!(!scored[0].aligned);
    assert_eq!(scored[0].weight_diff, 0);
    assert_eq!(weighted_score(&scored), 100);
}

#[test]
fn test_missing_or_invalid_answers_excluded() {
    let questions = vec![
        four_point("q1", "finances", Importance::Normal),
        four_point("q2", "travel", Importance::Normal),
        four_point("q3", "home", Importance::Normal),
    ];
    let given = answers(
        &[("q1", "a"), ("q2", "a"), ("q3", "zzz")],
        &[("q1", "a"), ("q3", "a")],
    );
    let scored = score_questions(&ctx(), &questions, &given);

    assert_eq!(scored.len(), 1);
    assert_eq!(scored[0].question.id, "q1");

    let categories = category_scores(&scored);
    assert_eq!(categories.len(), 1);
    assert!(!categories.contains_key("travel"));
    assert!(!categories.contains_key("home"));
}

#[test]
fn test_nothing_scored_gives_zero() {
    let questions = vec![four_point("q1", "finances", Importance::Normal)];
    let scored = score_questions(&ctx(), &questions, &PartnerAnswers::default());

    assert!(scored.is_empty());
    assert_eq!(weighted_score(&scored), 0);
    assert!(category_scores(&scored).is_empty());
}

#[test]
fn test_latest_answer_wins() {
    let questions = vec![four_point("q1", "values", Importance::Normal)];
    let given = answers(&[("q1", "d"), ("q1", "a")], &[("q1", "a")]);
    let scored = score_questions(&ctx(), &questions, &given);

    assert!(scored[0].aligned);
}

#[test]
fn test_high_priority_flag_uses_priority_and_focus() {
    let c = NormalizedContext {
        current_priority: Priority::BuyHome,
        focus_areas: vec!["travel".to_string()],
        ..ctx()
    };
    let questions = vec![
        four_point("q1", "home", Importance::Normal),
        four_point("q2", "travel", Importance::Normal),
        four_point("q3", "career", Importance::Normal),
    ];
    let scored = score_questions(&c, &questions, &identical(&questions, "a"));

    let flags: Vec<bool> = scored.iter().map(|s| s.is_high_priority).collect();
    assert_eq!(flags, vec![true, true, false]);
}

// ============================================================================
// Highlights
// ============================================================================

#[test]
fn test_strong_alignments_sorted_and_capped() {
    let c = NormalizedContext {
        focus_areas: vec!["values".to_string()],
        ..ctx()
    };
    let questions = vec![
        four_point("n1", "travel", Importance::Normal),
        four_point("c1", "travel", Importance::Critical),
        four_point("i1", "travel", Importance::Important),
        four_point("c2", "values", Importance::Critical),
        four_point("l1", "travel", Importance::NiceToHave),
        four_point("n2", "values", Importance::Normal),
        four_point("i2", "travel", Importance::Important),
    ];
    let scored = score_questions(&c, &questions, &identical(&questions, "c"));
    let categories = category_scores(&scored);
    let strong = strong_alignments(&scored, &categories, insights());

    let ids: Vec<&str> = strong.iter().map(|s| s.question_id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1", "i1", "i2", "n2"]);
    assert_eq!(strong[0].shared_label, "Option C");
    assert_eq!(strong[0].insight, insights().insight("values", 100));
}

#[test]
fn test_misalignments_sorted_by_distance_then_priority() {
    let c = NormalizedContext {
        focus_areas: vec!["family".to_string()],
        ..ctx()
    };
    let questions = vec![
        four_point("small", "travel", Importance::Critical),
        four_point("wide_low", "travel", Importance::Normal),
        four_point("wide_high", "family", Importance::Normal),
        four_point("mid", "travel", Importance::Normal),
        four_point("mid2", "travel", Importance::Normal),
        four_point("mid3", "travel", Importance::Normal),
        four_point("same", "travel", Importance::Normal),
    ];
    let given = answers(
        &[
            ("small", "a"),
            ("wide_low", "a"),
            ("wide_high", "a"),
            ("mid", "a"),
            ("mid2", "b"),
            ("mid3", "b"),
            ("same", "a"),
        ],
        &[
            ("small", "b"),
            ("wide_low", "d"),
            ("wide_high", "d"),
            ("mid", "c"),
            ("mid2", "d"),
            ("mid3", "d"),
            ("same", "a"),
        ],
    );
    let scored = score_questions(&c, &questions, &given);
    let names = PartnerNames::new("Alex", "Sam");
    let differing = misalignments(&scored, &names, insights());

    let ids: Vec<&str> = differing.iter().map(|m| m.question_id.as_str()).collect();
    assert_eq!(ids, vec!["wide_high", "wide_low", "mid", "mid2", "mid3"]);
    assert!(differing.len() <= MAX_HIGHLIGHTS);
    assert!(differing.windows(2).all(|w| w[0].weight_diff >= w[1].weight_diff));

    let top = &differing[0];
    assert!(top.is_high_priority);
    assert_eq!(top.weight_diff, 3);
    assert_eq!(top.partner1_label, "Option A");
    assert_eq!(top.partner2_label, "Option D");
    assert!(top.discussion_prompt.contains("Alex chose \"Option A\""));
}

// ============================================================================
// analyze_results
// ============================================================================

#[tokio::test]
async fn test_analyze_identical_answers_end_to_end() {
    let questions: Vec<Question> = (0..8)
        .map(|i| four_point(&format!("q{}", i), "values", Importance::Important))
        .collect();
    let session = Session::new("Alex", "Sam");

    let mut runner = MockPipeRunner::new();
    runner.expect_run_pipe().times(0);

    let result = scorer(runner, false)
        .analyze_results(
            &session,
            &Prescreening::default(),
            &questions,
            &identical(&questions, "a"),
        )
        .await
        .unwrap();

    assert_eq!(result.alignment_score, 100);
    assert!(result.misalignments.is_empty());
    assert_eq!(result.strong_alignments.len(), 5);
    assert_eq!(result.questions_asked, 8);
    assert_eq!(result.session_id, session.id);
    assert_eq!(result.narrative_source, NarrativeSource::Fallback);
    assert!(result.narrative.contains("Alex and Sam"));
    assert!(!result.discussion_prompts.is_empty());
    assert!(!result.recommended_goals.is_empty());
}

#[tokio::test]
async fn test_analyze_without_questions_is_an_error() {
    let session = Session::new("A", "B");
    let result = scorer(MockPipeRunner::new(), false)
        .analyze_results(&session, &Prescreening::default(), &[], &PartnerAnswers::default())
        .await;

    match result {
        Err(AppError::Assessment(AssessmentError::MissingQuestionSet { session_id })) => {
            assert_eq!(session_id, session.id)
        }
        other => panic!("expected MissingQuestionSet, got {:?}", other),
    }
}

#[tokio::test]
async fn test_analyze_uses_ai_narrative() {
    let questions = vec![four_point("q1", "finances", Importance::Critical)];
    let mut runner = MockPipeRunner::new();
    runner
        .expect_run_pipe()
        .times(1)
        .withf(|req| req.name == "assessment-analysis-v1")
        .returning(|_| {
            Ok(PipeResponse::from_completion(
                r#"{"narrative": "You are a great match.", "discussionPrompts": ["Talk"], "recommendedGoals": []}"#,
            ))
        });

    let result = scorer(runner, true)
        .analyze_results(
            &Session::new("A", "B"),
            &Prescreening::default(),
            &questions,
            &identical(&questions, "a"),
        )
        .await
        .unwrap();

    assert_eq!(result.narrative_source, NarrativeSource::Ai);
    assert_eq!(result.narrative, "You are a great match.");
    assert_eq!(result.discussion_prompts, vec!["Talk".to_string()]);
    // Empty AI goals are filled from the templates
    assert!(!result.recommended_goals.is_empty());
}

#[tokio::test]
async fn test_analyze_ai_failure_keeps_numeric_scoring() {
    let questions = vec![
        four_point("q1", "finances", Importance::Critical),
        four_point("q2", "finances", Importance::Normal),
    ];
    let mut runner = MockPipeRunner::new();
    runner.expect_run_pipe().returning(|_| {
        Err(LangbaseError::Unavailable {
            message: "down".into(),
            retries: 1,
        })
    });

    let result = scorer(runner, true)
        .analyze_results(
            &Session::new("A", "B"),
            &Prescreening::default(),
            &questions,
            &answers(&[("q1", "a"), ("q2", "a")], &[("q1", "a"), ("q2", "d")]),
        )
        .await
        .unwrap();

    assert_eq!(result.narrative_source, NarrativeSource::Fallback);
    // 1.5 of 2.5
    assert_eq!(result.alignment_score, 60);
    assert_eq!(result.misalignments.len(), 1);
    assert_eq!(
        result.discussion_prompts,
        vec![result.misalignments[0].discussion_prompt.clone()]
    );
}

#[tokio::test]
async fn test_analyze_malformed_ai_output_falls_back() {
    let questions = vec![four_point("q1", "values", Importance::Normal)];
    let mut runner = MockPipeRunner::new();
    runner
        .expect_run_pipe()
        .returning(|_| Ok(PipeResponse::from_completion("Great couple!")));

    let result = scorer(runner, true)
        .analyze_results(
            &Session::new("A", "B"),
            &Prescreening::default(),
            &questions,
            &identical(&questions, "b"),
        )
        .await
        .unwrap();

    assert_eq!(result.narrative_source, NarrativeSource::Fallback);
}

#[tokio::test]
async fn test_analyze_nothing_answered_skips_ai() {
    let questions = vec![four_point("q1", "values", Importance::Normal)];
    let mut runner = MockPipeRunner::new();
    runner.expect_run_pipe().times(0);

    let result = scorer(runner, true)
        .analyze_results(
            &Session::new("A", "B"),
            &Prescreening::default(),
            &questions,
            &PartnerAnswers::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.alignment_score, 0);
    assert_eq!(result.questions_asked, 0);
    assert!(result.category_scores.is_empty());
    assert!(result.strong_alignments.is_empty());
}

#[test]
fn test_alignment_result_serializes_camel_case() {
    let result = AlignmentResult {
        id: "r".into(),
        session_id: "s".into(),
        alignment_score: 88,
        category_scores: [("values".to_string(), 88)].into_iter().collect(),
        strong_alignments: vec![],
        misalignments: vec![],
        narrative: "n".into(),
        discussion_prompts: vec![],
        recommended_goals: vec![],
        questions_asked: 3,
        narrative_source: NarrativeSource::Ai,
        created_at: chrono::Utc::now(),
    };
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["alignmentScore"], 88);
    assert_eq!(json["categoryScores"]["values"], 88);
    assert_eq!(json["narrativeSource"], "ai");
    assert_eq!(json["questionsAsked"], 3);
}
