//! End-to-end assessment tests
//!
//! Drives the full workflow (prescreening, question generation, answers,
//! analysis) through a real Langbase client pointed at a wiremock server.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use mcp_compatibility_assessment::assessment::{
    AnswerRecord, AssessmentMode, NarrativeSource, PrescreeningAnswers, Question,
};
use mcp_compatibility_assessment::config::{
    AssessmentConfig, Config, DatabaseConfig, LangbaseConfig, LogFormat, LoggingConfig,
    PipeConfig, RequestConfig,
};
use mcp_compatibility_assessment::langbase::LangbaseClient;
use mcp_compatibility_assessment::storage::{Partner, SqliteStorage, Storage};

fn test_config(base_url: &str) -> Config {
    Config {
        langbase: LangbaseConfig {
            api_key: "test-api-key".to_string(),
            base_url: base_url.to_string(),
        },
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig {
            timeout_ms: 2000,
            max_retries: 0,
            retry_delay_ms: 10,
        },
        pipes: PipeConfig::default(),
        assessment: AssessmentConfig {
            ai_enabled: true,
            ai_timeout_ms: 3000,
        },
    }
}

async fn create_mode(mock_server: &MockServer) -> AssessmentMode {
    let config = test_config(&mock_server.uri());
    let client = LangbaseClient::new(&config.langbase, config.request.clone()).unwrap();
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    AssessmentMode::new(storage, Arc::new(client), &config)
}

async fn mount_pipe(mock_server: &MockServer, pipe: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .and(body_partial_json(json!({ "name": pipe })))
        .respond_with(response)
        .mount(mock_server)
        .await;
}

fn completion(text: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "completion": text.into()
    }))
}

fn moving_prescreening() -> PrescreeningAnswers {
    PrescreeningAnswers::new()
        .with("relationship_length", "1_3_years")
        .with("is_married", false)
        .with("living_situation", "separate")
        .with("currentPriority", "moving")
        .with("focusAreas", json!(["finances"]))
        .with("assessment_depth", "quick")
}

fn ai_questions(count: usize) -> Value {
    let questions: Vec<Value> = (1..=count)
        .map(|i| {
            json!({
                "id": format!("ai_{}", i),
                "category": if i % 2 == 0 { "finances" } else { "moving" },
                "importance": if i <= 3 { "critical" } else { "important" },
                "question": format!("AI question number {}?", i),
                "options": [
                    {"value": "a", "label": "Strongly agree", "weight": 4},
                    {"value": "b", "label": "Agree", "weight": 3},
                    {"value": "c", "label": "Disagree", "weight": 2},
                    {"value": "d", "label": "Strongly disagree", "weight": 1}
                ]
            })
        })
        .collect();
    Value::Array(questions)
}

fn answers_with(questions: &[Question], pick: impl Fn(&Question) -> usize) -> Vec<AnswerRecord> {
    questions
        .iter()
        .map(|q| AnswerRecord::new(&q.id, &q.options[pick(q)].value))
        .collect()
}

#[tokio::test]
async fn test_end_to_end_with_ai_unavailable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    let mode = create_mode(&mock_server).await;
    let session = mode.create_session("Alex", "Sam").await.unwrap();
    mode.submit_prescreening(&session.id, Partner::First, moving_prescreening())
        .await
        .unwrap();

    let set = mode.generate_questions(&session.id).await.unwrap();
    assert!(set.used_fallback);
    assert!(!set.supplemented);
    assert!((10..=15).contains(&set.questions.len()));

    let ids: Vec<&str> = set.questions.iter().map(|q| q.id.as_str()).collect();
    assert!(ids.iter().any(|id| id.starts_with("moving_")), "{:?}", ids);
    assert!(ids.iter().any(|id| id.starts_with("fin_")), "{:?}", ids);
    assert!(ids.contains(&"context_marriage_timeline"), "{:?}", ids);

    let identical = answers_with(&set.questions, |_| 0);
    mode.submit_answers(&session.id, Partner::First, identical.clone())
        .await
        .unwrap();
    mode.submit_answers(&session.id, Partner::Second, identical)
        .await
        .unwrap();

    let result = mode.analyze(&session.id).await.unwrap();
    assert_eq!(result.alignment_score, 100);
    assert!(result.misalignments.is_empty());
    assert_eq!(result.strong_alignments.len(), result.questions_asked.min(5));
    assert_eq!(result.questions_asked, set.questions.len());
    assert_eq!(result.narrative_source, NarrativeSource::Fallback);
    assert!(!result.narrative.is_empty());
    assert!(!result.discussion_prompts.is_empty());
    assert!(!result.recommended_goals.is_empty());
    assert!(result.category_scores.values().all(|s| *s == 100));

    let invocations = mode
        .storage()
        .get_session_invocations(&session.id)
        .await
        .unwrap();
    assert_eq!(invocations.len(), 2);
    assert!(invocations.iter().all(|i| i.success));
}

#[tokio::test]
async fn test_end_to_end_with_ai() {
    let mock_server = MockServer::start().await;
    let questions_text = format!(
        "Here are your questions:\n{}\nGood luck!",
        serde_json::to_string(&ai_questions(12)).unwrap()
    );
    mount_pipe(&mock_server, "assessment-questions-v1", completion(questions_text)).await;
    mount_pipe(
        &mock_server,
        "assessment-analysis-v1",
        completion(
            json!({
                "narrative": "You two share a practical outlook on the move.",
                "discussionPrompts": ["Which neighborhood feels like home?"],
                "recommendedGoals": []
            })
            .to_string(),
        ),
    )
    .await;

    let mode = create_mode(&mock_server).await;
    let session = mode.create_session("Alex", "Sam").await.unwrap();
    mode.submit_prescreening(&session.id, Partner::First, moving_prescreening())
        .await
        .unwrap();

    let set = mode.generate_questions(&session.id).await.unwrap();
    assert!(!set.used_fallback);
    assert_eq!(set.questions.len(), 12);
    assert_eq!(set.questions[0].id, "ai_1");

    // Partner 2 differs on the first question only, by the full weight range
    mode.submit_answers(
        &session.id,
        Partner::First,
        answers_with(&set.questions, |_| 0),
    )
    .await
    .unwrap();
    mode.submit_answers(
        &session.id,
        Partner::Second,
        answers_with(&set.questions, |q| if q.id == "ai_1" { 3 } else { 0 }),
    )
    .await
    .unwrap();

    let result = mode.analyze(&session.id).await.unwrap();
    assert_eq!(result.narrative_source, NarrativeSource::Ai);
    assert_eq!(
        result.narrative,
        "You two share a practical outlook on the move."
    );
    assert_eq!(
        result.discussion_prompts,
        vec!["Which neighborhood feels like home?".to_string()]
    );
    assert!(!result.recommended_goals.is_empty(), "empty AI goals are filled from templates");

    assert_eq!(result.misalignments.len(), 1);
    assert_eq!(result.misalignments[0].question_id, "ai_1");
    assert_eq!(result.misalignments[0].weight_diff, 3);
    assert!(result.alignment_score < 100);
}

#[tokio::test]
async fn test_ai_underfill_is_supplemented() {
    let mock_server = MockServer::start().await;
    mount_pipe(
        &mock_server,
        "assessment-questions-v1",
        completion(serde_json::to_string(&ai_questions(4)).unwrap()),
    )
    .await;

    let mode = create_mode(&mock_server).await;
    let session = mode.create_session("Alex", "Sam").await.unwrap();
    mode.submit_prescreening(&session.id, Partner::First, moving_prescreening())
        .await
        .unwrap();

    let set = mode.generate_questions(&session.id).await.unwrap();
    assert!(set.supplemented);
    assert!(!set.used_fallback);
    assert!((10..=15).contains(&set.questions.len()));
    assert_eq!(set.questions[0].id, "ai_1");

    let ids: HashSet<&str> = set.questions.iter().map(|q| q.id.as_str()).collect();
    let texts: HashSet<&str> = set.questions.iter().map(|q| q.question_text.as_str()).collect();
    assert_eq!(ids.len(), set.questions.len());
    assert_eq!(texts.len(), set.questions.len());
}

#[tokio::test]
async fn test_malformed_ai_output_falls_back() {
    let mock_server = MockServer::start().await;
    mount_pipe(
        &mock_server,
        "assessment-questions-v1",
        completion("I'm sorry, I can't produce questions right now."),
    )
    .await;
    mount_pipe(
        &mock_server,
        "assessment-analysis-v1",
        completion("{\"narrative\": \"\"}"),
    )
    .await;

    let mode = create_mode(&mock_server).await;
    let session = mode.create_session("Alex", "Sam").await.unwrap();

    let set = mode.generate_questions(&session.id).await.unwrap();
    assert!(set.used_fallback);
    // No prescreening: standard depth
    assert!((18..=25).contains(&set.questions.len()));

    mode.submit_answers(&session.id, Partner::First, answers_with(&set.questions, |_| 0))
        .await
        .unwrap();
    mode.submit_answers(&session.id, Partner::Second, answers_with(&set.questions, |_| 1))
        .await
        .unwrap();

    let result = mode.analyze(&session.id).await.unwrap();
    assert_eq!(result.narrative_source, NarrativeSource::Fallback);
    assert!(!result.narrative.is_empty());
}

#[tokio::test]
async fn test_regenerate_returns_stored_set_without_calling_ai_again() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(completion(serde_json::to_string(&ai_questions(12)).unwrap()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mode = create_mode(&mock_server).await;
    let session = mode.create_session("Alex", "Sam").await.unwrap();
    mode.submit_prescreening(&session.id, Partner::First, moving_prescreening())
        .await
        .unwrap();

    let first = mode.generate_questions(&session.id).await.unwrap();
    let second = mode.generate_questions(&session.id).await.unwrap();
    assert!(second.reused);
    assert_eq!(first.questions, second.questions);
}
