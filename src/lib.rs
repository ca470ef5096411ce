//! # MCP Compatibility Assessment Server
//!
//! A Model Context Protocol (MCP) server that runs couple compatibility
//! assessments: it tailors a question set to the couple's situation, scores
//! both partners' answers, and explains the result. Langbase Pipes supply
//! the AI-written questions and narrative; curated question pools and
//! insight templates take over whenever the AI is unavailable.
//!
//! ## Features
//!
//! - **Prescreening normalization**: lenient input, fully defaulted context
//! - **Question selection**: AI generation with deterministic pool fallback
//! - **Alignment scoring**: importance-weighted partial credit per question
//! - **Narratives**: AI coaching text with template fallback
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → Langbase Pipes (HTTP, optional)
//!                    ↓
//!              SQLite (State)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_compatibility_assessment::{Config, AppState, McpServer};
//! use mcp_compatibility_assessment::langbase::DisabledRunner;
//! use mcp_compatibility_assessment::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let state = Arc::new(AppState::new(config, storage, Arc::new(DisabledRunner)));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Prescreening, question selection, scoring and the session workflow.
pub mod assessment;
/// Command-line subcommands.
pub mod cli;
/// Configuration management for the MCP server.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and the pipe-runner seam.
pub mod langbase;
/// System prompts for Langbase pipes.
pub mod prompts;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
