use super::{
    conversation, send_error, ProviderClient, ProviderSettings, DEFAULT_PROVIDER_TIMEOUT,
    PROVIDER_SYSTEM_PROMPT,
};
use crate::types::{AppError, ChatMessage, Result, Role};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` client
pub struct GoogleClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    settings: ProviderSettings,
    timeout: Duration,
}

impl GoogleClient {
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

    fn contents(prompt: &str, history: &[ChatMessage]) -> Vec<Value> {
        let mut contents: Vec<Value> = conversation(history)
            .map(|(role, text)| {
                let role = if role == Role::User { "user" } else { "model" };
                json!({ "role": role, "parts": [{ "text": text }] })
            })
            .collect();
        contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));
        contents
    }
}

#[async_trait]
impl ProviderClient for GoogleClient {
    async fn invoke(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": PROVIDER_SYSTEM_PROMPT }] },
            "contents": Self::contents(prompt, history),
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topP": self.settings.top_p,
            },
        });

        let response = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.api_base, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Google request failed ({}): {}",
                status, text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse response: {}", e)))?;

        let parts = json["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| AppError::Provider("Google response had no content".to_string()))?;

        Ok(parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_invoke_maps_roles_and_joins_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "hi" }] },
                    { "role": "model", "parts": [{ "text": "hello" }] },
                    { "role": "user", "parts": [{ "text": "tell me more" }] }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Sure, " }, { "text": "here." }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GoogleClient::new(
            reqwest::Client::new(),
            "g-key".to_string(),
            Some(server.uri()),
            "gemini-2.0-flash".to_string(),
            ProviderSettings {
                temperature: 0.7,
                top_p: 0.9,
            },
        );
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let answer = client.invoke("tell me more", &history).await.unwrap();
        assert_eq!(answer, "Sure, here.");
    }
}
