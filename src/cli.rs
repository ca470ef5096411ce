//! Command-line subcommands.
//!
//! `serve` runs the MCP server; `preview` prints the deterministic question
//! set for a prescreening file without touching the database or the network.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde_json::Value;

use crate::assessment::{
    derive_context, fallback_questions, Prescreening, PrescreeningAnswers, QuestionCatalog,
};

/// Server subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the MCP server over stdio (default)
    Serve,

    /// Print the fallback question set for a prescreening file
    Preview {
        /// JSON file holding one partner's answers, or `{"partner1": {...}, "partner2": {...}}`
        file: PathBuf,

        /// Print question ids and text only
        #[arg(long)]
        compact: bool,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Run `preview` against a prescreening file.
pub fn execute_preview(file: &Path, compact: bool) -> CliResult {
    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) => return CliResult::error(format!("Failed to read {}: {}", file.display(), e)),
    };

    let prescreening = match parse_prescreening(&raw) {
        Ok(p) => p,
        Err(e) => return CliResult::error(format!("Invalid prescreening JSON: {}", e)),
    };

    let ctx = derive_context(&prescreening);
    let questions = fallback_questions(&ctx, QuestionCatalog::builtin());

    if compact {
        let lines: Vec<String> = questions
            .iter()
            .map(|q| format!("{:<32} [{}] {}", q.id, q.category, q.question_text))
            .collect();
        return CliResult::success(lines.join("\n"));
    }

    let (min, max) = ctx.question_range();
    let output = serde_json::json!({
        "context": ctx,
        "range": { "min": min, "max": max },
        "count": questions.len(),
        "questions": questions,
    });

    match serde_json::to_string_pretty(&output) {
        Ok(text) => CliResult::success(text),
        Err(e) => CliResult::error(format!("Failed to serialize preview: {}", e)),
    }
}

/// Accept a bare answer map or an explicit two-partner document.
pub fn parse_prescreening(raw: &str) -> Result<Prescreening, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    let two_partner = value.get("partner1").is_some_and(Value::is_object);

    if two_partner {
        serde_json::from_value(value)
    } else {
        let answers: PrescreeningAnswers = serde_json::from_value(value)?;
        Ok(Prescreening::single(answers))
    }
}
