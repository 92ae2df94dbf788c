//! TOML-based configuration for switchboard
//!
//! One file (`switchboard.toml`) declares the base model, the router adapter,
//! every agent, the worker pool, the queue backend, safety rules and external
//! providers. It is read once at start-up. Relative paths inside it resolve
//! against the directory that contains the file.

use crate::queue::MAX_RESULT_TTL;
use crate::tools::ToolRegistry;
use crate::types::AppError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure loaded from switchboard.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    /// Identifier of the shared base model every agent adapts
    pub base_model: String,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub router: RouterConfig,

    /// Agents keyed by the name the router answers with
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,

    #[serde(default)]
    pub subagent: SubagentConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    /// External providers keyed by the id used in `provider:model` selections
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,
}

// ============= Engine Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// OpenAI-compatible inference server with runtime LoRA support
    #[serde(default = "default_engine_url")]
    pub base_url: String,

    /// Environment variable holding the server's API key, if it needs one
    pub api_key_env: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_engine_url(),
            api_key_env: None,
            request_timeout_secs: default_request_timeout(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

fn default_engine_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_new_tokens() -> u32 {
    1024
}

// ============= Router Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Adapter directory for the routing adapter
    #[serde(default = "default_router_path")]
    pub model_path: PathBuf,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            model_path: default_router_path(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

fn default_router_path() -> PathBuf {
    PathBuf::from("models/router_agent")
}

// ============= Agent Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub description: String,

    /// Persona prompt file
    pub prompt_file: PathBuf,

    /// Adapter directory
    pub model_path: PathBuf,

    #[serde(default)]
    pub tools_whitelist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,

    /// Reject a second call to a tool within one loop instead of only asking
    /// the model not to make it
    #[serde(default)]
    pub forbid_repeat_tool_calls: bool,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            forbid_repeat_tool_calls: false,
        }
    }
}

fn default_max_loops() -> usize {
    10
}

// ============= Dispatcher Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Sleep between idle poll iterations
    #[serde(default = "default_dispatch_poll_ms")]
    pub poll_interval_ms: u64,

    /// How long an unread result is kept
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_dispatch_poll_ms(),
            result_ttl_secs: default_result_ttl(),
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Result lifetime, capped at [`MAX_RESULT_TTL`]
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs).min(MAX_RESULT_TTL)
    }
}

fn default_workers() -> usize {
    1
}

fn default_dispatch_poll_ms() -> u64 {
    100
}

fn default_result_ttl() -> u64 {
    300
}

// ============= Queue Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process only; dispatcher and callers must share one process
    Memory,
    /// libsql file shared between processes
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_backend")]
    pub backend: QueueBackend,

    #[serde(default = "default_queue_path")]
    pub path: PathBuf,

    /// Submissions are rejected once this many jobs are waiting
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,

    /// Caller-side result polling interval
    #[serde(default = "default_result_poll_ms")]
    pub poll_interval_ms: u64,

    /// How long a caller waits for its result
    #[serde(default = "default_result_timeout")]
    pub timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            path: default_queue_path(),
            max_queue_length: default_max_queue_length(),
            poll_interval_ms: default_result_poll_ms(),
            timeout_secs: default_result_timeout(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_queue_backend() -> QueueBackend {
    QueueBackend::Sqlite
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/switchboard.db")
}

fn default_max_queue_length() -> usize {
    10
}

fn default_result_poll_ms() -> u64 {
    1000
}

fn default_result_timeout() -> u64 {
    60
}

// ============= Safety Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub force_local_on_pii: PiiConfig,

    #[serde(default)]
    pub block_on_dangerous_content: DangerousContentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiiConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub patterns: Vec<PiiPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiPattern {
    #[serde(default)]
    pub name: String,
    pub regex: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DangerousContentConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Matched case-insensitively as substrings
    #[serde(default)]
    pub keywords: Vec<String>,
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    pub display_name: Option<String>,

    /// Override of the provider's public endpoint
    pub api_base: Option<String>,

    /// Environment variable containing the API key
    pub api_key_env: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub models: Vec<ProviderModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    pub display_name: Option<String>,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn model_display_name<'a>(&'a self, model: &'a str) -> &'a str {
        self.models
            .iter()
            .find(|m| m.id == model)
            .and_then(|m| m.display_name.as_deref())
            .unwrap_or(model)
    }
}

// ============= Tools & Logging =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Plain-text file searched by `query_knowledge_base`
    pub knowledge_base: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============= Errors =============

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Tool '{0}' referenced by agent '{1}' does not exist")]
    MissingTool(String, String),

    #[error("Provider '{0}' is not configured")]
    MissingProvider(String),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl SwitchboardConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse(&content, root)
    }

    /// Parse and validate configuration text, resolving paths against `root`
    pub fn parse(content: &str, root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config: SwitchboardConfig = toml::from_str(content)?;
        config.root = root.into();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "base_model must not be empty".to_string(),
            ));
        }
        if self.dispatcher.workers == 0 {
            return Err(ConfigError::ValidationError(
                "dispatcher.workers must be at least 1".to_string(),
            ));
        }
        if self.subagent.max_loops == 0 {
            return Err(ConfigError::ValidationError(
                "subagent.max_loops must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.result_ttl_secs == 0
            || self.dispatcher.result_ttl_secs > MAX_RESULT_TTL.as_secs()
        {
            return Err(ConfigError::ValidationError(format!(
                "dispatcher.result_ttl_secs must be between 1 and {}",
                MAX_RESULT_TTL.as_secs()
            )));
        }
        if self.queue.max_queue_length == 0 {
            return Err(ConfigError::ValidationError(
                "queue.max_queue_length must be at least 1".to_string(),
            ));
        }

        if self.engine.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (id, provider) in &self.providers {
            if provider.request_timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{}.request_timeout_secs must be at least 1",
                    id
                )));
            }
        }

        let registry = ToolRegistry::from_config(&self.tools);
        for (name, agent) in &self.agents {
            for tool in &agent.tools_whitelist {
                if !registry.has_tool(tool) {
                    return Err(ConfigError::MissingTool(tool.clone(), name.clone()));
                }
            }
        }

        for pattern in &self.safety.force_local_on_pii.patterns {
            Regex::new(&pattern.regex).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "invalid PII pattern '{}': {}",
                    pattern.name, e
                ))
            })?;
        }

        Ok(())
    }

    /// Resolve a configured path against the configuration directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn provider(&self, id: &str) -> Result<&ProviderConfig, ConfigError> {
        self.providers
            .get(id)
            .ok_or_else(|| ConfigError::MissingProvider(id.to_string()))
    }

    /// Tool registry with paths resolved against the configuration directory
    pub fn tool_registry(&self) -> ToolRegistry {
        let tools = ToolsConfig {
            knowledge_base: self.tools.knowledge_base.as_deref().map(|p| self.resolve(p)),
        };
        ToolRegistry::from_config(&tools)
    }
}
