//! Shared data model for jobs, results and errors.
//!
//! A [`Job`] is created by a caller, serialized onto the shared queue, and consumed
//! exactly once by a dispatcher worker, which answers it with a single [`JobResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display label used whenever a safety gate replaces the response.
pub const GUARDRAIL_AGENT_NAME: &str = "System Guardrail";

/// Display label used when the router finds no matching agent.
pub const FALLBACK_AGENT_NAME: &str = "Assistant";

/// Response returned when the pre-generation gate blocks a query.
pub const GUARDRAIL_INPUT_MESSAGE: &str =
    "This request has been blocked as it violates the content safety policy.";

/// Response returned when the post-generation gate blocks an answer.
pub const GUARDRAIL_OUTPUT_MESSAGE: &str =
    "The generated response was blocked as it was found to contain potentially harmful content.";

// ============= Conversation =============

/// Role of a single conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Agent,
    Log,
    System,
}

/// A single conversation turn supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============= Model Selection =============

/// Where a job should be answered.
///
/// Serialized as `local_system` or `provider:model`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelSelection {
    /// The local router + adapter agents
    #[default]
    Local,
    /// An external provider such as `openai:gpt-4o-mini`
    Provider { provider: String, model: String },
}

impl ModelSelection {
    pub const LOCAL: &'static str = "local_system";

    pub fn is_local(&self) -> bool {
        matches!(self, ModelSelection::Local)
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSelection::Local => f.write_str(Self::LOCAL),
            ModelSelection::Provider { provider, model } => write!(f, "{}:{}", provider, model),
        }
    }
}

impl FromStr for ModelSelection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == Self::LOCAL {
            return Ok(ModelSelection::Local);
        }
        match s.split_once(':') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(ModelSelection::Provider {
                    provider: provider.to_string(),
                    model: model.to_string(),
                })
            }
            _ => Err(AppError::InvalidInput(format!(
                "model selection must be '{}' or 'provider:model', got '{}'",
                Self::LOCAL,
                s
            ))),
        }
    }
}

impl TryFrom<String> for ModelSelection {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelSelection> for String {
    fn from(value: ModelSelection) -> Self {
        value.to_string()
    }
}

// ============= Job =============

/// Sampling settings chosen by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub model_selection: ModelSelection,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for ExpertSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            model_selection: ModelSelection::Local,
        }
    }
}

/// Per-user safety switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub pii_force_local: bool,
    #[serde(default)]
    pub block_dangerous_content: bool,
}

/// Everything a caller supplies for one turn, before a job id is assigned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub user_query: String,
    #[serde(default)]
    pub chat_history_for_local: String,
    #[serde(default)]
    pub chat_history_for_providers: Vec<ChatMessage>,
    #[serde(default)]
    pub expert_settings: ExpertSettings,
    #[serde(default)]
    pub user_feature_flags: FeatureFlags,
    #[serde(default)]
    pub enabled_local_agents: Vec<String>,
    /// Empty means "use `enabled_local_agents`"
    #[serde(default)]
    pub user_available_agents: Vec<String>,
}

impl JobRequest {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Default::default()
        }
    }

    /// Agents the router may choose from for this request.
    pub fn candidate_agents(&self) -> &[String] {
        if self.user_available_agents.is_empty() {
            &self.enabled_local_agents
        } else {
            &self.user_available_agents
        }
    }

    pub fn into_job(self, job_id: impl Into<String>) -> Job {
        Job {
            job_id: job_id.into(),
            request: self,
        }
    }
}

/// One unit of work, immutable once enqueued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(flatten)]
    pub request: JobRequest,
}

// ============= Result =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Complete,
    Error,
}

/// The single, once-readable outcome of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl JobResult {
    pub fn complete(response: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Complete,
            response: response.into(),
            agent_name: Some(agent_name.into()),
        }
    }

    pub fn error(response: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            response: response.into(),
            agent_name: None,
        }
    }

    pub fn guardrail(message: &str) -> Self {
        Self::complete(message, GUARDRAIL_AGENT_NAME)
    }

    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Complete
    }
}

// ============= Errors =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Overloaded(String),

    #[error("{0}")]
    Timeout(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
