//! CourseOutline configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::outline::CompletenessPolicy;
use crate::prompts::Stage;

/// Main CourseOutline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reasoning service configuration
    pub llm: LlmConfig,

    /// LMS connection configuration
    pub lms: LmsConfig,

    /// Outline pipeline configuration
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the reasoning service API key is available. Call this early
    /// in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.llm.api_key()?;
        Ok(())
    }

    /// Resolve the LMS bearer token
    ///
    /// An explicit token (e.g. from the command line) wins over the
    /// environment variable named by `lms.token-env`.
    pub fn lms_token(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(token) = explicit.filter(|t| !t.trim().is_empty()) {
            return Ok(token.to_string());
        }
        match std::env::var(&self.lms.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(eyre::eyre!(
                "LMS token not set. Pass --token or set the {} environment variable.",
                self.lms.token_env
            )),
        }
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .courseoutline.yml
        let local_config = PathBuf::from(".courseoutline.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/courseoutline/courseoutline.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("courseoutline").join("courseoutline.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Reasoning service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Default model identifier, used by any stage without its own model
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            )
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// LMS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LmsConfig {
    /// API root
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Page size for collection endpoints
    #[serde(rename = "per-page")]
    pub per_page: u32,

    /// Pages followed per collection before the fetch fails
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// HTTP request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LmsConfig {
    fn default() -> Self {
        Self {
            base_url: lmsclient::DEFAULT_BASE_URL.to_string(),
            token_env: "CANVAS_TOKEN".to_string(),
            per_page: lmsclient::DEFAULT_PER_PAGE,
            max_pages: lmsclient::DEFAULT_MAX_PAGES,
            timeout_ms: 30_000,
        }
    }
}

impl LmsConfig {
    /// Build client parameters around an explicit token
    pub fn client_config(&self, token: String) -> lmsclient::LmsClientConfig {
        lmsclient::LmsClientConfig {
            base_url: self.base_url.clone(),
            token,
            timeout: Duration::from_millis(self.timeout_ms),
            per_page: self.per_page,
            max_pages: self.max_pages,
        }
    }
}

/// Outline pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model for the Analysis stage (falls back to `llm.model`)
    #[serde(rename = "analysis-model")]
    pub analysis_model: Option<String>,

    /// Model for the Planning stage (falls back to `llm.model`)
    #[serde(rename = "planning-model")]
    pub planning_model: Option<String>,

    /// Model for the Organization stage (falls back to `llm.model`)
    #[serde(rename = "organization-model")]
    pub organization_model: Option<String>,

    /// Deadline for a single generation stage in milliseconds
    #[serde(rename = "stage-timeout-ms")]
    pub stage_timeout_ms: u64,

    /// Deadline for the whole LMS fetch in milliseconds
    #[serde(rename = "fetch-timeout-ms")]
    pub fetch_timeout_ms: u64,

    /// Response token cap per stage
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// What to do when the final outline drops resources
    pub completeness: CompletenessPolicy,

    /// Directory holding prompt template overrides
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_model: None,
            planning_model: None,
            organization_model: None,
            stage_timeout_ms: 600_000,
            fetch_timeout_ms: 120_000,
            max_tokens: 16384,
            completeness: CompletenessPolicy::default(),
            prompts_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Model configured for a stage, if any
    pub fn model_for(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Analysis => self.analysis_model.as_deref(),
            Stage::Planning => self.planning_model.as_deref(),
            Stage::Organization => self.organization_model.as_deref(),
        }
    }

    /// Fill every unset stage model from the default model
    pub fn with_default_model(mut self, model: &str) -> Self {
        for slot in [
            &mut self.analysis_model,
            &mut self.planning_model,
            &mut self.organization_model,
        ] {
            if slot.is_none() {
                *slot = Some(model.to_string());
            }
        }
        self
    }
}
