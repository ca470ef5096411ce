//! Couple compatibility assessment engine.
//!
//! - [`context`]: prescreening normalization shared by both components
//! - [`QuestionSelector`]: AI question generation with deterministic pool fallback
//! - [`AlignmentScorer`]: importance-weighted alignment scoring and narrative
//! - [`AssessmentMode`]: session workflow binding storage and the AI pipes

pub mod context;
mod narrative;
mod pools;
mod question;
mod scorer;
mod selector;
mod workflow;

#[cfg(test)]
#[path = "scorer_tests.rs"]
mod scorer_tests;

pub use context::{
    derive_context, AssessmentDepth, LivingSituation, NormalizedContext, Prescreening,
    PrescreeningAnswers, Priority, RelationshipLength, WantsChildren,
};
pub use narrative::{InsightCatalog, NarrativeSource};
pub use pools::{fallback_questions, PoolQuestion, QuestionCatalog, QuestionCondition};
pub use question::{parse_ai_questions, AnswerOption, Importance, Question};
pub use scorer::*;
pub use selector::*;
pub use workflow::*;

use std::time::Duration;
use tracing::warn;

use crate::error::LangbaseError;
use crate::langbase::{PipeRequest, PipeRunner};

// ============================================================================
// Shared Utilities
// ============================================================================

/// Serialize a value to JSON for invocation logging, with warning on failure.
pub(crate) fn serialize_for_log<T: serde::Serialize>(
    value: &T,
    context: &str,
) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(
            error = %e,
            context = %context,
            "Failed to serialize value for invocation log"
        );
        serde_json::json!({
            "serialization_error": e.to_string(),
            "context": context
        })
    })
}

/// Run a pipe bounded by `timeout_ms`, returning the completion text.
///
/// Timeouts and runner errors both come back as the error message.
pub(crate) async fn run_pipe_with_timeout(
    runner: &dyn PipeRunner,
    request: PipeRequest,
    timeout_ms: u64,
) -> Result<String, String> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), runner.run_pipe(request)).await
    {
        Ok(Ok(response)) => Ok(response.completion),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(LangbaseError::Timeout { timeout_ms }.to_string()),
    }
}

/// Locate the JSON array in a completion: first `[` through last `]`.
///
/// Prose and code fences around the array are tolerated.
pub(crate) fn extract_json_array(completion: &str) -> Result<&str, String> {
    extract_between(completion, '[', ']').ok_or_else(|| {
        format!(
            "No JSON array found in response. First 100 chars: '{}'",
            completion.chars().take(100).collect::<String>()
        )
    })
}

/// Locate the JSON object in a completion: first `{` through last `}`.
pub(crate) fn extract_json_object(completion: &str) -> Result<&str, String> {
    extract_between(completion, '{', '}').ok_or_else(|| {
        format!(
            "No JSON object found in response. First 100 chars: '{}'",
            completion.chars().take(100).collect::<String>()
        )
    })
}

fn extract_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_array_raw() {
        assert_eq!(extract_json_array("[1, 2, 3]").unwrap(), "[1, 2, 3]");
    }

    #[test]
    fn test_extract_json_array_from_code_block() {
        let input = "Here you go:\n```json\n[{\"a\": [1]}]\n```\nDone.";
        assert_eq!(extract_json_array(input).unwrap(), "[{\"a\": [1]}]");
    }

    #[test]
    fn test_extract_json_array_missing() {
        let err = extract_json_array("no brackets here").unwrap_err();
        assert!(err.contains("No JSON array found"));
    }

    #[test]
    fn test_extract_json_array_reversed_brackets() {
        assert!(extract_json_array("] then [").is_err());
    }

    #[test]
    fn test_extract_json_array_truncates_long_error_message() {
        let input = "a".repeat(200);
        let err = extract_json_array(&input).unwrap_err();
        assert!(err.contains("First 100 chars"));
        assert!(err.len() < 200);
    }

    #[test]
    fn test_extract_json_object() {
        let input = "Result: {\"narrative\": \"ok\", \"goals\": []} -- end";
        assert_eq!(
            extract_json_object(input).unwrap(),
            "{\"narrative\": \"ok\", \"goals\": []}"
        );
        assert!(extract_json_object("nothing").is_err());
    }

    #[test]
    fn test_serialize_for_log_success() {
        let value = serde_json::json!({"session": "s-1", "count": 12});
        let result = serialize_for_log(&value, "test_context");
        assert_eq!(result["session"], "s-1");
        assert_eq!(result["count"], 12);
    }
}
