use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::assessment::{AnswerRecord, Prescreening, PrescreeningAnswers};
use crate::error::{McpError, McpResult};
use crate::storage::Partner;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "assessment_create_session" => handle_create_session(state, arguments).await,
        "assessment_submit_prescreening" => handle_submit_prescreening(state, arguments).await,
        "assessment_generate_questions" => handle_generate_questions(state, arguments).await,
        "assessment_submit_answers" => handle_submit_answers(state, arguments).await,
        "assessment_analyze" => handle_analyze(state, arguments).await,
        "assessment_get_result" => handle_get_result(state, arguments).await,
        "assessment_preview_questions" => handle_preview_questions(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Tool parameters
// ============================================================================

/// Parameters for assessment_create_session.
#[derive(Debug, Deserialize)]
pub struct CreateSessionParams {
    /// Display name of the first partner.
    pub partner1_name: String,
    /// Display name of the second partner.
    pub partner2_name: String,
}

/// Parameters for tools that only address a session.
#[derive(Debug, Deserialize)]
pub struct SessionParams {
    /// Target session.
    pub session_id: String,
}

/// Parameters for assessment_submit_prescreening.
#[derive(Debug, Deserialize)]
pub struct SubmitPrescreeningParams {
    /// Target session.
    pub session_id: String,
    /// Submitting partner (1 or 2).
    pub partner: Partner,
    /// Raw prescreening answers.
    pub answers: PrescreeningAnswers,
}

/// Parameters for assessment_submit_answers.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswersParams {
    /// Target session.
    pub session_id: String,
    /// Submitting partner (1 or 2).
    pub partner: Partner,
    /// Chosen option per question.
    pub answers: Vec<AnswerRecord>,
}

/// Parameters for assessment_preview_questions.
#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    /// Partner 1 prescreening.
    pub prescreening: PrescreeningAnswers,
    /// Partner 2 prescreening, if any.
    #[serde(default)]
    pub partner2_prescreening: Option<PrescreeningAnswers>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_create_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "assessment_create_session",
        arguments,
        |params: CreateSessionParams| async move {
            state
                .assessment
                .create_session(&params.partner1_name, &params.partner2_name)
                .await
        },
    )
    .await
}

async fn handle_submit_prescreening(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "assessment_submit_prescreening",
        arguments,
        |params: SubmitPrescreeningParams| async move {
            state
                .assessment
                .submit_prescreening(&params.session_id, params.partner, params.answers)
                .await
        },
    )
    .await
}

async fn handle_generate_questions(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "assessment_generate_questions",
        arguments,
        |params: SessionParams| async move {
            state.assessment.generate_questions(&params.session_id).await
        },
    )
    .await
}

async fn handle_submit_answers(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "assessment_submit_answers",
        arguments,
        |params: SubmitAnswersParams| async move {
            state
                .assessment
                .submit_answers(&params.session_id, params.partner, params.answers)
                .await
        },
    )
    .await
}

async fn handle_analyze(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "assessment_analyze",
        arguments,
        |params: SessionParams| async move { state.assessment.analyze(&params.session_id).await },
    )
    .await
}

async fn handle_get_result(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "assessment_get_result",
        arguments,
        |params: SessionParams| async move {
            state.assessment.latest_result(&params.session_id).await
        },
    )
    .await
}

async fn handle_preview_questions(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "assessment_preview_questions",
        arguments,
        |params: PreviewParams| async move {
            let prescreening = match params.partner2_prescreening {
                Some(p2) => Prescreening::single(params.prescreening).with_partner2(p2),
                None => Prescreening::single(params.prescreening),
            };
            state.assessment.preview_questions(&prescreening).await
        },
    )
    .await
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed arguments, run the operation, and serialize its result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}
