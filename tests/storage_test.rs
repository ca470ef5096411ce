//! Integration tests for SQLite storage layer
//!
//! Tests database operations against in-memory and on-disk SQLite databases.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;

use mcp_compatibility_assessment::assessment::{
    AlignmentResult, AnswerOption, AnswerRecord, Importance, NarrativeSource,
    PrescreeningAnswers, Question,
};
use mcp_compatibility_assessment::config::DatabaseConfig;
use mcp_compatibility_assessment::error::StorageError;
use mcp_compatibility_assessment::storage::{
    Invocation, Partner, PrescreeningRecord, Session, SessionStatus, SqliteStorage, Storage,
    StoredQuestionSet,
};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

async fn create_session(storage: &SqliteStorage) -> Session {
    let session = Session::new("Alex", "Sam");
    storage.create_session(&session).await.unwrap();
    session
}

fn sample_question(id: &str) -> Question {
    Question::new(
        id,
        "finances",
        Importance::Important,
        "How should we split shared expenses?",
        vec![
            AnswerOption::new("equal", "Split evenly", 1),
            AnswerOption::new("income", "Proportional to income", 2),
            AnswerOption::new("pooled", "Everything pooled", 4),
        ],
    )
}

fn sample_result(session_id: &str, score: u8) -> AlignmentResult {
    let mut category_scores = BTreeMap::new();
    category_scores.insert("finances".to_string(), score);

    AlignmentResult {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        alignment_score: score,
        category_scores,
        strong_alignments: vec![],
        misalignments: vec![],
        narrative: "You are well aligned.".to_string(),
        discussion_prompts: vec!["Talk about money.".to_string()],
        recommended_goals: vec!["Set a budget.".to_string()],
        questions_asked: 1,
        narrative_source: NarrativeSource::Fallback,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, session.id);
        assert_eq!(retrieved.partner1_name, "Alex");
        assert_eq!(retrieved.partner2_name, "Sam");
        assert_eq!(retrieved.status, SessionStatus::Prescreening);
    }

    #[tokio::test]
    async fn test_get_nonexistent_session() {
        let storage = create_test_storage().await;
        assert!(storage.get_session("nonexistent-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_session_status() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        storage
            .update_session(&session.clone().with_status(SessionStatus::Completed))
            .await
            .unwrap();

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_missing_session_fails() {
        let storage = create_test_storage().await;
        let err = storage
            .update_session(&Session::new("A", "B"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        storage
            .save_prescreening(&PrescreeningRecord::new(
                &session.id,
                Partner::First,
                PrescreeningAnswers::new().with("is_married", true),
            ))
            .await
            .unwrap();
        storage
            .save_question_set(&StoredQuestionSet::new(&session.id, vec![sample_question("q1")]))
            .await
            .unwrap();
        storage
            .save_answers(&session.id, Partner::First, &[AnswerRecord::new("q1", "equal")])
            .await
            .unwrap();
        storage
            .save_result(&sample_result(&session.id, 80))
            .await
            .unwrap();

        storage.delete_session(&session.id).await.unwrap();

        assert!(storage.get_session(&session.id).await.unwrap().is_none());
        assert!(storage.get_prescreening(&session.id).await.unwrap().is_empty());
        assert!(storage.get_question_set(&session.id).await.unwrap().is_none());
        assert!(storage
            .get_answers(&session.id, Partner::First)
            .await
            .unwrap()
            .is_empty());
        assert!(storage.get_latest_result(&session.id).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod prescreening_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_prescreening_resubmission_replaces() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        for priority in ["wedding", "baby"] {
            storage
                .save_prescreening(&PrescreeningRecord::new(
                    &session.id,
                    Partner::First,
                    PrescreeningAnswers::new().with("currentPriority", priority),
                ))
                .await
                .unwrap();
        }

        let records = storage.get_prescreening(&session.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].answers.get_any(&["currentPriority"]),
            Some(&json!("baby"))
        );
    }

    #[tokio::test]
    async fn test_prescreening_ordered_by_partner() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        for partner in [Partner::Second, Partner::First] {
            storage
                .save_prescreening(&PrescreeningRecord::new(
                    &session.id,
                    partner,
                    PrescreeningAnswers::new(),
                ))
                .await
                .unwrap();
        }

        let partners: Vec<Partner> = storage
            .get_prescreening(&session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.partner)
            .collect();
        assert_eq!(partners, vec![Partner::First, Partner::Second]);
    }

    #[tokio::test]
    async fn test_prescreening_requires_session() {
        let storage = create_test_storage().await;
        let result = storage
            .save_prescreening(&PrescreeningRecord::new(
                "missing",
                Partner::First,
                PrescreeningAnswers::new(),
            ))
            .await;
        assert!(result.is_err(), "Foreign key should reject unknown session");
    }
}

#[cfg(test)]
mod question_set_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_question_set_roundtrip_keeps_order_and_provenance() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        let set = StoredQuestionSet::new(
            &session.id,
            vec![sample_question("b"), sample_question("a")],
        )
        .with_provenance(false, true);
        storage.save_question_set(&set).await.unwrap();

        let stored = storage.get_question_set(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.questions, set.questions);
        assert!(!stored.used_fallback);
        assert!(stored.supplemented);
    }

    #[tokio::test]
    async fn test_question_set_is_never_overwritten() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        storage
            .save_question_set(&StoredQuestionSet::new(&session.id, vec![sample_question("first")]))
            .await
            .unwrap();

        let err = storage
            .save_question_set(&StoredQuestionSet::new(&session.id, vec![sample_question("second")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::QuestionSetExists { .. }));

        let stored = storage.get_question_set(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.questions[0].id, "first");
    }
}

#[cfg(test)]
mod answer_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_answers_are_per_partner() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        storage
            .save_answers(&session.id, Partner::First, &[AnswerRecord::new("q1", "equal")])
            .await
            .unwrap();
        storage
            .save_answers(&session.id, Partner::Second, &[AnswerRecord::new("q1", "pooled")])
            .await
            .unwrap();

        let first = storage.get_answers(&session.id, Partner::First).await.unwrap();
        let second = storage.get_answers(&session.id, Partner::Second).await.unwrap();
        assert_eq!(first, vec![AnswerRecord::new("q1", "equal")]);
        assert_eq!(second, vec![AnswerRecord::new("q1", "pooled")]);
    }

    #[tokio::test]
    async fn test_latest_answer_wins() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        storage
            .save_answers(
                &session.id,
                Partner::First,
                &[AnswerRecord::new("q1", "equal"), AnswerRecord::new("q2", "x")],
            )
            .await
            .unwrap();
        storage
            .save_answers(&session.id, Partner::First, &[AnswerRecord::new("q1", "income")])
            .await
            .unwrap();

        let answers = storage.get_answers(&session.id, Partner::First).await.unwrap();
        assert_eq!(
            answers,
            vec![AnswerRecord::new("q1", "income"), AnswerRecord::new("q2", "x")]
        );
    }
}

#[cfg(test)]
mod result_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_latest_result_by_created_at() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        let mut older = sample_result(&session.id, 40);
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = sample_result(&session.id, 90);

        storage.save_result(&newer).await.unwrap();
        storage.save_result(&older).await.unwrap();

        let latest = storage.get_latest_result(&session.id).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.alignment_score, 90);
        assert_eq!(latest.narrative_source, NarrativeSource::Fallback);
    }

    #[tokio::test]
    async fn test_no_result_yet() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;
        assert!(storage.get_latest_result(&session.id).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod invocation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_log_and_list_invocations() {
        let storage = create_test_storage().await;
        let session = create_session(&storage).await;

        let ok = Invocation::new("assessment_generate_questions", json!({"depth": "quick"}))
            .with_session(&session.id)
            .with_pipe("assessment-questions-v1")
            .success(json!({"used_fallback": true}), 12);
        let failed = Invocation::new("assessment_analyze", json!({}))
            .with_session(&session.id)
            .failure("No question set", 3);
        let unrelated = Invocation::new("assessment_preview_questions", json!({}));

        storage.log_invocation(&ok).await.unwrap();
        storage.log_invocation(&failed).await.unwrap();
        storage.log_invocation(&unrelated).await.unwrap();

        let logged = storage.get_session_invocations(&session.id).await.unwrap();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].tool_name, "assessment_generate_questions");
        assert_eq!(logged[0].output, Some(json!({"used_fallback": true})));
        assert_eq!(logged[0].pipe_name.as_deref(), Some("assessment-questions-v1"));
        assert!(!logged[1].success);
        assert_eq!(logged[1].error.as_deref(), Some("No question set"));
    }
}

#[cfg(test)]
mod file_database_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("assessment.db"),
            max_connections: 2,
        };

        let session = {
            let storage = SqliteStorage::new(&config).await.unwrap();
            let session = create_session(&storage).await;
            storage.pool().close().await;
            session
        };

        let reopened = SqliteStorage::new(&config).await.unwrap();
        let retrieved = reopened.get_session(&session.id).await.unwrap();
        assert!(retrieved.is_some());
        assert!(config.path.exists());
    }
}
