//! External chat providers
//!
//! Used when a job's model selection names `provider:model` instead of the
//! local system. Each provider is reached over its public HTTP API.

pub mod google;
pub mod openai;

pub use google::GoogleClient;
pub use openai::OpenAIClient;

use crate::types::{AppError, ChatMessage, Result, Role};
use crate::utils::toml_config::{ConfigError, ProviderConfig, ProviderKind, SwitchboardConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// System message sent ahead of every provider conversation
pub const PROVIDER_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Answer `prompt` given the prior conversation
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String>;
}

/// Sampling settings a client is built with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderSettings {
    pub temperature: f32,
    pub top_p: f32,
}

/// Conversation turns a provider accepts: user turns and assistant/agent turns
pub(crate) fn conversation(history: &[ChatMessage]) -> impl Iterator<Item = (Role, &str)> {
    history.iter().filter_map(|m| match m.role {
        Role::User => Some((Role::User, m.content.as_str())),
        Role::Assistant | Role::Agent => Some((Role::Assistant, m.content.as_str())),
        Role::Log | Role::System => None,
    })
}

pub(crate) fn send_error(err: reqwest::Error, timeout: Duration) -> AppError {
    if err.is_timeout() {
        AppError::Provider(format!(
            "Provider request timed out after {}s",
            timeout.as_secs_f32()
        ))
    } else {
        AppError::Provider(format!("HTTP request failed: {}", err))
    }
}

/// Builds provider clients from configuration
pub trait ProviderFactory: Send + Sync {
    fn get_client(
        &self,
        provider: &str,
        model: &str,
        settings: ProviderSettings,
    ) -> Result<Arc<dyn ProviderClient>>;

    /// `"{provider}: {model}"` using configured display names when present
    fn display_name(&self, provider: &str, model: &str) -> String;
}

/// Provider clients built from the `[providers]` table
///
/// Every client shares one connection pool. Each provider's
/// `request_timeout_secs` bounds its requests.
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
    http_client: reqwest::Client,
}

impl ProviderRegistry {
    pub fn from_config(config: &SwitchboardConfig) -> Result<Self> {
        Self::new(config.providers.clone())
    }

    pub fn new(providers: HashMap<String, ProviderConfig>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            providers,
            http_client,
        })
    }

    fn api_key(config: &ProviderConfig) -> Result<String> {
        std::env::var(&config.api_key_env).map_err(|_| {
            AppError::Configuration(format!(
                "Environment variable '{}' is not set",
                config.api_key_env
            ))
        })
    }
}

impl ProviderFactory for ProviderRegistry {
    fn get_client(
        &self,
        provider: &str,
        model: &str,
        settings: ProviderSettings,
    ) -> Result<Arc<dyn ProviderClient>> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| ConfigError::MissingProvider(provider.to_string()))?;
        let api_key = Self::api_key(config)?;

        let client: Arc<dyn ProviderClient> = match config.kind {
            ProviderKind::OpenAI => Arc::new(
                OpenAIClient::new(
                    self.http_client.clone(),
                    api_key,
                    config.api_base.clone(),
                    model.to_string(),
                    settings,
                )
                .with_timeout(config.timeout()),
            ),
            ProviderKind::Google => Arc::new(
                GoogleClient::new(
                    self.http_client.clone(),
                    api_key,
                    config.api_base.clone(),
                    model.to_string(),
                    settings,
                )
                .with_timeout(config.timeout()),
            ),
        };
        Ok(client)
    }

    fn display_name(&self, provider: &str, model: &str) -> String {
        match self.providers.get(provider) {
            Some(config) => format!(
                "{}: {}",
                config
                    .display_name
                    .clone()
                    .unwrap_or_else(|| crate::agents::capitalize(provider)),
                config.model_display_name(model)
            ),
            None => format!("{}: {}", crate::agents::capitalize(provider), model),
        }
    }
}
