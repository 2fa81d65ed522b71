//! Configuration management for Care Companion.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (.care/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric; prompt overrides and the config file
//! live under `.care/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Providers the generator factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 3] = ["claude", "anthropic", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .care/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider ("claude", "ollama")
    pub provider: String,

    /// Model used for answers and rewrites shown to the user
    pub model: String,

    /// Cheaper model for query rewriting, judging and tool decisions.
    /// Falls back to `model` when unset.
    pub fast_model: Option<String>,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Orchestration knobs
    pub rag: RagConfig,

    /// Similarity index settings
    pub index: IndexConfig,

    /// Directory lookup service settings
    pub directory: DirectoryConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Claude {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        #[serde(rename = "fastModel")]
        fast_model: Option<String>,
        endpoint: Option<String>,
        #[serde(rename = "apiVersion")]
        api_version: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "fastModel")]
        fast_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Endpoint override, if the provider config carries one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::Claude { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Knobs for retrieval, memory, verification and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagConfig {
    /// Maximum evidence items kept after fusion
    #[serde(default = "default_max_context")]
    pub max_context: usize,

    /// Memory window, in exchanges (user + assistant)
    #[serde(default = "default_max_memory")]
    pub max_memory: usize,

    /// Generation + judge cycles allowed per turn
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for a whole non-streaming generation call, and for opening a stream
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Longest silence tolerated between two streamed fragments
    #[serde(default = "default_fragment_timeout")]
    pub fragment_timeout_secs: u64,

    /// Timeout for one directory lookup (login included)
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

fn default_max_context() -> usize {
    4
}

fn default_max_memory() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_fragment_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    20
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_context: default_max_context(),
            max_memory: default_max_memory(),
            max_attempts: default_max_attempts(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            generation_timeout_secs: default_generation_timeout(),
            fragment_timeout_secs: default_fragment_timeout(),
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

impl RagConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn fragment_timeout(&self) -> Duration {
        Duration::from_secs(self.fragment_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Similarity index (Qdrant) and retrieval strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    #[serde(default = "default_index_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Ollama endpoint serving the embedding model
    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Payload field holding the passage text
    #[serde(default = "default_text_key")]
    pub text_key: String,

    /// Payload field holding the passage metadata object (contains `url`)
    #[serde(default = "default_metadata_key")]
    pub metadata_key: String,

    /// Results per strategy
    #[serde(default = "default_k")]
    pub k: usize,

    /// Candidates fetched before MMR selection
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// MMR trade-off: 1.0 is pure relevance, 0.0 is pure diversity
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
}

fn default_index_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "AlzheimersCareNoWebMD".to_string()
}

fn default_embedding_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_text_key() -> String {
    "page_content".to_string()
}

fn default_metadata_key() -> String {
    "metadata".to_string()
}

fn default_k() -> usize {
    10
}

fn default_fetch_k() -> usize {
    20
}

fn default_lambda_mult() -> f32 {
    0.1
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            collection: default_collection(),
            embedding_endpoint: default_embedding_endpoint(),
            embedding_model: default_embedding_model(),
            text_key: default_text_key(),
            metadata_key: default_metadata_key(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
        }
    }
}

/// Eldercare directory service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_directory_endpoint")]
    pub endpoint: String,

    /// SOAP namespace of the service operations
    #[serde(default = "default_directory_namespace")]
    pub namespace: String,

    #[serde(default = "default_username_env")]
    pub username_env: String,

    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_true() -> bool {
    true
}

fn default_directory_endpoint() -> String {
    "https://eldercare.acl.gov/WebServices/EldercareData/ec_search.asmx".to_string()
}

fn default_directory_namespace() -> String {
    "https://eldercare.acl.gov/WebServices/EldercareData/".to_string()
}

fn default_username_env() -> String {
    "ELDERCARE_API_USERNAME".to_string()
}

fn default_password_env() -> String {
    "ELDERCARE_API_PASSWORD".to_string()
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_directory_endpoint(),
            namespace: default_directory_namespace(),
            username_env: default_username_env(),
            password_env: default_password_env(),
        }
    }
}

impl DirectoryConfig {
    /// Read the service credentials from the configured environment variables.
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = std::env::var(&self.username_env).ok()?;
        let password = std::env::var(&self.password_env).ok()?;
        Some((username, password))
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    rag: Option<RagConfig>,
    index: Option<IndexConfig>,
    directory: Option<DirectoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "claude".to_string(),
            model: "claude-3-5-sonnet-20240620".to_string(),
            fast_model: Some("claude-3-haiku-20240307".to_string()),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            rag: RagConfig::default(),
            index: IndexConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML config file and the environment.
    ///
    /// Environment variables:
    /// - `CARE_WORKSPACE`: Override workspace path
    /// - `CARE_CONFIG`: Path to config file
    /// - `CARE_PROVIDER`: LLM provider
    /// - `CARE_MODEL`: Answer model identifier
    /// - `CARE_FAST_MODEL`: Model for rewrite/judge/tool calls
    /// - `CARE_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use care_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("CARE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("CARE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.care_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("CARE_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("CARE_MODEL") {
            config.model = model;
        }

        if let Ok(fast_model) = std::env::var("CARE_FAST_MODEL") {
            config.fast_model = Some(fast_model);
        }

        config.api_key = std::env::var("CARE_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                let (model, fast_model) = match provider_config {
                    ProviderConfig::Claude {
                        model, fast_model, ..
                    } => (model, fast_model),
                    ProviderConfig::Ollama {
                        model, fast_model, ..
                    } => (model, fast_model),
                };
                result.model = model.clone();
                result.fast_model = fast_model.clone();
            }

            result.llm = Some(llm);
        }

        if let Some(rag) = config_file.rag {
            result.rag = rag;
        }

        if let Some(index) = config_file.index {
            result.index = index;
        }

        if let Some(directory) = config_file.directory {
            result.directory = directory;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and the
    /// config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .care directory.
    pub fn care_dir(&self) -> PathBuf {
        self.workspace.join(".care")
    }

    /// Model for the cheap calls (rewrite, judge, tool decision).
    pub fn fast_model(&self) -> &str {
        self.fast_model.as_deref().unwrap_or(&self.model)
    }

    /// Get the configuration block for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref()?.providers.get(provider)
    }

    /// Endpoint override for the active provider.
    pub fn resolve_endpoint(&self) -> Option<String> {
        self.get_provider_config(&self.provider)
            .and_then(|pc| pc.endpoint())
            .map(str::to_string)
    }

    /// Resolve API key from `CARE_API_KEY` or the provider's `apiKeyEnv`.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::Claude { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            Some(ProviderConfig::Ollama { .. }) => None,
            None if is_claude(provider) => std::env::var("ANTHROPIC_API_KEY").ok(),
            None => None,
        }
    }

    /// Validate configuration for the active provider and the orchestration knobs.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.to_lowercase();

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if is_claude(&provider) && self.resolve_api_key(&self.provider).is_none() {
            return Err(AppError::Config(
                "Claude provider requires an API key (CARE_API_KEY, apiKeyEnv or ANTHROPIC_API_KEY)"
                    .to_string(),
            ));
        }

        if self.rag.max_context == 0 {
            return Err(AppError::Config("rag.maxContext must be at least 1".to_string()));
        }

        if self.rag.max_memory == 0 {
            return Err(AppError::Config("rag.maxMemory must be at least 1".to_string()));
        }

        if self.rag.max_attempts == 0 {
            return Err(AppError::Config(
                "rag.maxAttempts must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.index.lambda_mult) {
            return Err(AppError::Config(format!(
                "index.lambdaMult must be within 0.0..=1.0, got {}",
                self.index.lambda_mult
            )));
        }

        Ok(())
    }
}

fn is_claude(provider: &str) -> bool {
    matches!(provider.to_lowercase().as_str(), "claude" | "anthropic")
}
