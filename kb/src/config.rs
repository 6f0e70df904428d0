//! KataBuilder configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main KataBuilder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Plan size, fan-out and timeouts
    pub generation: GenerationConfig,

    /// Session store and output locations
    pub storage: StorageConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,

    /// Log level used when none is given on the command line
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before any model call
    ///
    /// Checks bounds and that the API key environment variable is set, so
    /// commands fail fast with a clear message instead of mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;

        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local: .katabuilder.yml
        let local_config = PathBuf::from(".katabuilder.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User: ~/.config/katabuilder/katabuilder.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("katabuilder").join("katabuilder.yml");
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

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
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
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} is not set", self.api_key_env))
    }
}

/// Plan size, fan-out and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Number of units every plan must contain
    #[serde(rename = "task-count")]
    pub task_count: usize,

    /// Maximum units generated at once
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Timeout for each model call made while generating a unit
    #[serde(rename = "unit-timeout-ms")]
    pub unit_timeout_ms: u64,

    /// Optional wall-clock limit for a whole build; expiry cancels it
    #[serde(rename = "build-timeout-ms")]
    pub build_timeout_ms: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            task_count: 5,
            max_concurrent: 5,
            unit_timeout_ms: 300_000,
            build_timeout_ms: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_count == 0 {
            return Err(eyre::eyre!("generation.task-count must be at least 1"));
        }
        if self.max_concurrent == 0 {
            return Err(eyre::eyre!("generation.max-concurrent must be at least 1"));
        }
        if self.unit_timeout_ms == 0 {
            return Err(eyre::eyre!("generation.unit-timeout-ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_ms.map(Duration::from_millis)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File holding every session record
    #[serde(rename = "sessions-file")]
    pub sessions_file: PathBuf,

    /// Root under which each session gets its own output directory
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/katabuilder on Linux)
        let sessions_file = dirs::data_dir()
            .map(|d| d.join("katabuilder"))
            .unwrap_or_else(|| PathBuf::from(".katabuilder"))
            .join("sessions.json");
        Self {
            sessions_file,
            output_dir: PathBuf::from("downloads"),
        }
    }
}

/// Prompt template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory whose `.pmt` files override the built-in templates
    pub dir: Option<PathBuf>,
}
