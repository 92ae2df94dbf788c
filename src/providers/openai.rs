use super::{
    conversation, send_error, ProviderClient, ProviderSettings, DEFAULT_PROVIDER_TIMEOUT,
    PROVIDER_SYSTEM_PROMPT,
};
use crate::types::{AppError, ChatMessage, Result, Role};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI chat completions client (also works with compatible endpoints)
pub struct OpenAIClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    settings: ProviderSettings,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(
        http_client: reqwest::Client,
        api_key: String,
        api_base: Option<String>,
        model: String,
        settings: ProviderSettings,
    ) -> Self {
        Self {
            http_client,
            api_key,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            settings,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Limit on one request, connect through last byte of the body
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn messages(prompt: &str, history: &[ChatMessage]) -> Vec<Value> {
        let mut messages = vec![json!({ "role": "system", "content": PROVIDER_SYSTEM_PROMPT })];
        messages.extend(conversation(history).map(|(role, content)| {
            let role = if role == Role::User { "user" } else { "assistant" };
            json!({ "role": role, "content": content })
        }));
        messages.push(json!({ "role": "user", "content": prompt }));
        messages
    }
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": Self::messages(prompt, history),
            "temperature": self.settings.temperature,
            "top_p": self.settings.top_p,
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "OpenAI request failed ({}): {}",
                status, text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse response: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Provider("OpenAI response had no content".to_string()))
    }
}
