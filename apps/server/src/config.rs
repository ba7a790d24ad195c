//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// HTTP header carrying the opaque chat session token.
pub const SESSION_HEADER: &str = "X-Session-Id";

/// Cookie carrying the opaque chat session token for browser clients.
pub const SESSION_COOKIE: &str = "tara_session";

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = "sqlite://data/tara.db?mode=rwc";
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const DEV_DATA_DIR: &str = "./data";
    pub const DEV_DB_MAX_CONNECTIONS: u32 = 10;
    pub const DEV_MAX_UPLOAD_SIZE: usize = 16 * 1024 * 1024; // 16MB per diagram
    pub const DEV_CHAT_HISTORY_LIMIT: u64 = 50;
    pub const DEV_TEST_TIMEOUT_SECS: u64 = 30;
    pub const DEV_PYTHON_BIN: &str = "python3";
    pub const DEV_PYTEST_BIN: &str = "pytest";

    // LLM call must finish before the hosting platform's 10s request limit
    pub const DEV_LLM_TIMEOUT_SECS: u64 = 8;
    pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
    pub const OPENROUTER_MODEL: &str = "meta-llama/llama-4-maverick:free";
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    pub const OPENAI_MODEL: &str = "gpt-4o";
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Upstream chat-completion API flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-style chat completions.
    OpenAi,
    /// OpenRouter-compatible chat completions (adds attribution headers).
    OpenRouter,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => defaults::OPENAI_BASE_URL,
            Self::OpenRouter => defaults::OPENROUTER_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => defaults::OPENAI_MODEL,
            Self::OpenRouter => defaults::OPENROUTER_MODEL,
        }
    }

    /// Provider-specific environment variable holding the API key.
    fn key_env_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    /// Per-call timeout, kept below the platform request timeout
    pub timeout: Duration,
    /// OpenRouter `HTTP-Referer` attribution
    pub site_url: Option<String>,
    /// OpenRouter `X-Title` attribution
    pub site_name: Option<String>,
}

impl LlmSettings {
    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }
}

/// Test execution configuration.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub python_bin: String,
    pub pytest_bin: String,
    pub timeout: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL (PostgreSQL or SQLite connection string)
    pub database_url: String,
    /// Maximum database connections in the pool
    pub db_max_connections: u32,
    /// Directory for the SQLite file and other local state
    pub data_dir: PathBuf,
    /// Maximum diagram upload size in bytes (default: 16MB)
    pub max_upload_size: usize,
    /// Most recent chat messages forwarded to the model (None = full history)
    pub chat_history_limit: Option<u64>,
    /// LLM provider configuration
    pub llm: LlmSettings,
    /// Test runner configuration
    pub runner: RunnerSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development) every variable has a default
    /// and a missing LLM key only produces a warning at startup.
    ///
    /// In production mode (RUST_ENV=production):
    /// - DATABASE_URL must not be the development default
    /// - an LLM API key is required
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `TARA_HOST`, `TARA_PORT`: Bind address (default: 127.0.0.1:8080)
    /// - `DATABASE_URL`: Database connection string
    /// - `TARA_DB_MAX_CONNECTIONS`: Pool size (default: 10)
    /// - `TARA_DATA_DIR`: Local data directory (default: ./data)
    /// - `TARA_MAX_UPLOAD_SIZE`: Max diagram size in bytes (default: 16MB)
    /// - `TARA_CHAT_HISTORY_LIMIT`: Chat context cap, 0 = unlimited (default: 50)
    /// - `LLM_PROVIDER`: `openrouter` or `openai` (default: openrouter)
    /// - `LLM_BASE_URL`, `LLM_MODEL`: Provider endpoint and model
    /// - `LLM_API_KEY`: API key (falls back to OPENROUTER_API_KEY / OPENAI_API_KEY)
    /// - `LLM_TIMEOUT_SECS`: Per-call timeout (default: 8)
    /// - `LLM_SITE_URL`, `LLM_SITE_NAME`: OpenRouter attribution headers
    /// - `TARA_TEST_TIMEOUT_SECS`: Test execution timeout (default: 30)
    /// - `TARA_PYTHON_BIN`, `TARA_PYTEST_BIN`: Interpreter and runner binaries
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let host = env::var("TARA_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("TARA_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("TARA_PORT must be a valid port number"))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string());

        let db_max_connections = env::var("TARA_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| defaults::DEV_DB_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("TARA_DB_MAX_CONNECTIONS must be a valid number")
            })?;

        let data_dir = PathBuf::from(
            env::var("TARA_DATA_DIR").unwrap_or_else(|_| defaults::DEV_DATA_DIR.to_string()),
        );

        let max_upload_size = env::var("TARA_MAX_UPLOAD_SIZE")
            .unwrap_or_else(|_| defaults::DEV_MAX_UPLOAD_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue("TARA_MAX_UPLOAD_SIZE must be a valid number"))?;

        let chat_history_limit = env::var("TARA_CHAT_HISTORY_LIMIT")
            .unwrap_or_else(|_| defaults::DEV_CHAT_HISTORY_LIMIT.to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("TARA_CHAT_HISTORY_LIMIT must be a valid number")
            })?;
        let chat_history_limit = (chat_history_limit > 0).then_some(chat_history_limit);

        let llm = Self::llm_from_env()?;

        let test_timeout_secs = env::var("TARA_TEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| defaults::DEV_TEST_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("TARA_TEST_TIMEOUT_SECS must be a valid number")
            })?;

        let runner = RunnerSettings {
            python_bin: env::var("TARA_PYTHON_BIN")
                .unwrap_or_else(|_| defaults::DEV_PYTHON_BIN.to_string()),
            pytest_bin: env::var("TARA_PYTEST_BIN")
                .unwrap_or_else(|_| defaults::DEV_PYTEST_BIN.to_string()),
            timeout: Duration::from_secs(test_timeout_secs),
        };

        let config = Config {
            environment,
            host,
            port,
            database_url,
            db_max_connections,
            data_dir,
            max_upload_size,
            chat_history_limit,
            llm,
            runner,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    fn llm_from_env() -> Result<LlmSettings, ConfigError> {
        let provider = match env::var("LLM_PROVIDER") {
            Ok(value) => LlmProvider::parse(&value).ok_or(ConfigError::InvalidValue(
                "LLM_PROVIDER must be 'openrouter' or 'openai'",
            ))?,
            Err(_) => LlmProvider::OpenRouter,
        };

        let base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let api_key = env::var("LLM_API_KEY")
            .or_else(|_| env::var(provider.key_env_var()))
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let model =
            env::var("LLM_MODEL").unwrap_or_else(|_| provider.default_model().to_string());

        let timeout_secs = env::var("LLM_TIMEOUT_SECS")
            .unwrap_or_else(|_| defaults::DEV_LLM_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("LLM_TIMEOUT_SECS must be a valid number"))?;

        Ok(LlmSettings {
            provider,
            base_url,
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
            site_url: env::var("LLM_SITE_URL").ok(),
            site_name: env::var("LLM_SITE_NAME").ok(),
        })
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.database_url == defaults::DEV_DATABASE_URL {
            errors.push(format!(
                "DATABASE_URL is using development default '{}'. Set a production database URL.",
                defaults::DEV_DATABASE_URL
            ));
        }

        if !self.llm.has_api_key() {
            errors.push(
                "No LLM API key configured. Set LLM_API_KEY (or the provider-specific key)."
                    .to_string(),
            );
        }

        if self.llm.timeout.is_zero() {
            errors.push("LLM_TIMEOUT_SECS must be greater than zero.".to_string());
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
