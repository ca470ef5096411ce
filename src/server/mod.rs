//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::assessment::AssessmentMode;
use crate::config::Config;
use crate::langbase::PipeRunner;
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// LLM pipe runner (Langbase client, or disabled).
    pub runner: Arc<dyn PipeRunner>,
    /// Assessment workflow handler.
    pub assessment: AssessmentMode,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, storage: SqliteStorage, runner: Arc<dyn PipeRunner>) -> Self {
        tracing::info!(
            questions_pipe = %config.pipes.questions,
            analysis_pipe = %config.pipes.analysis,
            ai_enabled = config.assessment.ai_enabled,
            "AppState initializing with pipe configuration"
        );

        let assessment = AssessmentMode::new(storage.clone(), Arc::clone(&runner), &config);

        Self {
            config,
            storage,
            runner,
            assessment,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
