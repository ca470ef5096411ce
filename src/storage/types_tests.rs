//! Unit tests for storage types and builder patterns.
//!
//! Tests builders, status parsing, partner conversion and serialization
//! for Session, PrescreeningRecord, StoredQuestionSet and Invocation.

use super::*;
use serde_json::json;

// ============================================================================
// Session tests
// ============================================================================

#[test]
fn test_session_new() {
    let session = Session::new("Alex", "Sam");
    assert!(!session.id.is_empty());
    assert_eq!(session.partner1_name, "Alex");
    assert_eq!(session.partner2_name, "Sam");
    assert_eq!(session.status, SessionStatus::Prescreening);
    assert_eq!(session.created_at, session.updated_at);
}

#[test]
fn test_session_names() {
    let names = Session::new("Alex", "Sam").names();
    assert_eq!(names, PartnerNames::new("Alex", "Sam"));
}

#[test]
fn test_session_with_status_bumps_updated_at() {
    let session = Session::new("A", "B");
    let created = session.created_at;
    let session = session.with_status(SessionStatus::QuestionsReady);
    assert_eq!(session.status, SessionStatus::QuestionsReady);
    assert!(session.updated_at >= created);
}

#[test]
fn test_session_ids_unique() {
    assert_ne!(Session::new("A", "B").id, Session::new("A", "B").id);
}

// ============================================================================
// SessionStatus tests
// ============================================================================

#[test]
fn test_session_status_display_roundtrip() {
    for status in [
        SessionStatus::Prescreening,
        SessionStatus::QuestionsReady,
        SessionStatus::Completed,
    ] {
        let parsed: SessionStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
}

#[test]
fn test_session_status_parse_case_insensitive() {
    assert_eq!(
        "COMPLETED".parse::<SessionStatus>().unwrap(),
        SessionStatus::Completed
    );
    assert!("archived".parse::<SessionStatus>().is_err());
}

#[test]
fn test_session_status_serde() {
    assert_eq!(
        serde_json::to_value(SessionStatus::QuestionsReady).unwrap(),
        json!("questions_ready")
    );
}

// ============================================================================
// Partner tests
// ============================================================================

#[test]
fn test_partner_try_from() {
    assert_eq!(Partner::try_from(1u8).unwrap(), Partner::First);
    assert_eq!(Partner::try_from(2u8).unwrap(), Partner::Second);
    let err = Partner::try_from(3u8).unwrap_err();
    assert_eq!(err.to_string(), "Invalid partner number: 3 (expected 1 or 2)");
}

#[test]
fn test_partner_serde_as_number() {
    assert_eq!(serde_json::to_value(Partner::Second).unwrap(), json!(2));
    let partner: Partner = serde_json::from_value(json!(1)).unwrap();
    assert_eq!(partner, Partner::First);
    assert!(serde_json::from_value::<Partner>(json!(0)).is_err());
}

// ============================================================================
// PrescreeningRecord tests
// ============================================================================

#[test]
fn test_combine_prefers_partner1() {
    let records = vec![
        PrescreeningRecord::new(
            "s",
            Partner::Second,
            PrescreeningAnswers::new().with("currentPriority", "wedding"),
        ),
        PrescreeningRecord::new(
            "s",
            Partner::First,
            PrescreeningAnswers::new().with("currentPriority", "moving"),
        ),
    ];

    let combined = PrescreeningRecord::combine(&records);
    assert_eq!(
        combined.partner1.get_any(&["currentPriority"]),
        Some(&json!("moving"))
    );
    assert!(combined.partner2.is_some());
}

#[test]
fn test_combine_without_records() {
    let combined = PrescreeningRecord::combine(&[]);
    assert!(combined.partner1.is_empty());
    assert!(combined.partner2.is_none());
}

// ============================================================================
// StoredQuestionSet tests
// ============================================================================

#[test]
fn test_question_set_provenance() {
    let set = StoredQuestionSet::new("s", vec![]);
    assert!(!set.used_fallback);
    assert!(!set.supplemented);

    let set = set.with_provenance(true, false);
    assert!(set.used_fallback);
    assert!(!set.supplemented);
}

// ============================================================================
// Invocation tests
// ============================================================================

#[test]
fn test_invocation_new() {
    let inv = Invocation::new("assessment_analyze", json!({"session_id": "s"}));
    assert!(!inv.id.is_empty());
    assert_eq!(inv.tool_name, "assessment_analyze");
    assert!(inv.success);
    assert!(inv.session_id.is_none());
    assert!(inv.pipe_name.is_none());
}

#[test]
fn test_invocation_success() {
    let inv = Invocation::new("assessment_generate_questions", json!({}))
        .with_session("s")
        .with_pipe("assessment-questions-v1")
        .success(json!({"used_fallback": true}), 42);

    assert!(inv.success);
    assert_eq!(inv.session_id.as_deref(), Some("s"));
    assert_eq!(inv.pipe_name.as_deref(), Some("assessment-questions-v1"));
    assert_eq!(inv.latency_ms, Some(42));
    assert_eq!(inv.output, Some(json!({"used_fallback": true})));
}

#[test]
fn test_invocation_failure() {
    let inv = Invocation::new("assessment_analyze", json!({})).failure("boom", 7);
    assert!(!inv.success);
    assert_eq!(inv.error.as_deref(), Some("boom"));
    assert_eq!(inv.latency_ms, Some(7));
    assert!(inv.output.is_none());
}
