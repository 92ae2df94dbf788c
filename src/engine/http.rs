//! Engine backed by an OpenAI-compatible inference server with runtime LoRA
//! loading (`/load_lora_adapter`, `/unload_lora_adapter`), as exposed by vLLM.
//!
//! Adapter names are suffixed with a per-instance tag so that several workers
//! pointed at the same server never see each other's adapters.

use super::{EngineFactory, GenerationEngine, GenerationOptions, GenerationRequest};
use crate::types::{AppError, Result};
use crate::utils::toml_config::EngineConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

pub struct OpenAiCompatibleEngine {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    instance_tag: String,
}

impl OpenAiCompatibleEngine {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        instance_tag: impl Into<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::LLM(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            instance_tag: instance_tag.into(),
        })
    }

    /// Name the adapter is registered under on the server
    pub fn served_name(&self, name: &str) -> String {
        format!("{}--{}", name, self.instance_tag)
    }

    fn messages(request: &GenerationRequest) -> Vec<Value> {
        let mut system = request.system.clone().unwrap_or_default();
        if !request.history.trim().is_empty() {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str("Conversation so far:\n");
            system.push_str(request.history.trim());
        }

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));
        messages
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut builder = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLM(format!(
                "{} request failed ({}): {}",
                endpoint, status, text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationEngine for OpenAiCompatibleEngine {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &mut self,
        request: &GenerationRequest,
        adapter: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String> {
        let model = match adapter {
            Some(name) => self.served_name(name),
            None => self.model.clone(),
        };
        let body = json!({
            "model": model,
            "messages": Self::messages(request),
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_new_tokens,
        });

        let response: Value = self
            .post("chat/completions", &body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse response: {}", e)))?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| AppError::LLM("Completion response had no message content".to_string()))
    }

    async fn load_adapter(&mut self, name: &str, path: &Path) -> Result<()> {
        let body = json!({
            "lora_name": self.served_name(name),
            "lora_path": path.to_string_lossy(),
        });
        self.post("load_lora_adapter", &body).await?;
        Ok(())
    }

    async fn unload_adapter(&mut self, name: &str) -> Result<()> {
        let body = json!({ "lora_name": self.served_name(name) });
        self.post("unload_lora_adapter", &body).await?;
        Ok(())
    }
}

/// Creates one [`OpenAiCompatibleEngine`] per worker
pub struct OpenAiCompatibleEngineFactory {
    config: EngineConfig,
    base_model: String,
}

impl OpenAiCompatibleEngineFactory {
    pub fn new(config: EngineConfig, base_model: impl Into<String>) -> Self {
        Self {
            config,
            base_model: base_model.into(),
        }
    }
}

#[async_trait]
impl EngineFactory for OpenAiCompatibleEngineFactory {
    async fn create(&self, worker_id: usize) -> Result<Box<dyn GenerationEngine>> {
        let api_key = match &self.config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                AppError::Configuration(format!("Environment variable '{}' is not set", var))
            })?),
            None => None,
        };
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let engine = OpenAiCompatibleEngine::new(
            &self.config.base_url,
            &self.base_model,
            api_key,
            Duration::from_secs(self.config.request_timeout_secs),
            format!("w{}-{}", worker_id, &tag[..8]),
        )?;
        tracing::info!(worker = worker_id, model = %self.base_model, "Generation engine initialized");
        Ok(Box::new(engine))
    }
}
