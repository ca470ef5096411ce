use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub assessment: AssessmentConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    /// API key; empty when AI generation is not configured
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub questions: String,
    pub analysis: String,
}

/// Assessment engine configuration
#[derive(Debug, Clone)]
pub struct AssessmentConfig {
    /// Whether the AI path is attempted at all
    pub ai_enabled: bool,
    /// Upper bound on a single AI call before falling back
    pub ai_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").unwrap_or_default(),
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        if langbase.base_url.trim().is_empty() {
            return Err(AppError::Config {
                message: "LANGBASE_BASE_URL cannot be empty".to_string(),
            });
        }

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/assessment.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: parse_env("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", defaults.retry_delay_ms),
        };

        let pipe_defaults = PipeConfig::default();
        let pipes = PipeConfig {
            questions: env::var("PIPE_QUESTIONS").unwrap_or(pipe_defaults.questions),
            analysis: env::var("PIPE_ANALYSIS").unwrap_or(pipe_defaults.analysis),
        };

        let has_key = !langbase.api_key.trim().is_empty();
        let assessment = AssessmentConfig {
            ai_enabled: has_key && parse_bool_env("ASSESSMENT_AI_ENABLED", true),
            ai_timeout_ms: parse_env(
                "ASSESSMENT_AI_TIMEOUT_MS",
                AssessmentConfig::default().ai_timeout_ms,
            ),
        };

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            assessment,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15000,
            max_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            questions: "assessment-questions-v1".to_string(),
            analysis: "assessment-analysis-v1".to_string(),
        }
    }
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            ai_enabled: true,
            ai_timeout_ms: 15000,
        }
    }
}
