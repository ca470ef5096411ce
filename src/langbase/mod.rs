//! Langbase pipe client and the [`PipeRunner`] seam the assessment core calls through.
//!
//! The core treats the LLM as an untrusted text source: a runner either
//! returns a completion string or an error, and the caller decides how to
//! degrade.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::{LangbaseError, LangbaseResult};

/// Something that can run a Langbase pipe and hand back its completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipeRunner: Send + Sync {
    /// Run a pipe with the given request.
    async fn run_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse>;
}

#[async_trait]
impl PipeRunner for LangbaseClient {
    async fn run_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        self.call_pipe(request).await
    }
}

/// Runner used when no API key is configured; every call is unavailable.
#[derive(Debug, Clone, Default)]
pub struct DisabledRunner;

#[async_trait]
impl PipeRunner for DisabledRunner {
    async fn run_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        Err(LangbaseError::Unavailable {
            message: format!("AI generation disabled (pipe: {})", request.name),
            retries: 0,
        })
    }
}
