use std::time::Duration;

use prodviz_contracts::chat::ApiMessage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::ChatBackend;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::http::{client, response_json_or_error, transport_error};

/// OpenAI-compatible `/chat/completions` endpoint (OpenRouter by default).
pub struct OpenRouterChat {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: HttpClient,
}

impl OpenRouterChat {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            http: client(timeout),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.chat_api_base.clone(),
            config.chat_api_key.clone(),
            config.chat_model.clone(),
            config.request_timeout,
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    pub fn request_body(&self, messages: &[ApiMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
        })
    }
}

impl ChatBackend for OpenRouterChat {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn complete(&self, messages: &[ApiMessage]) -> Result<Value> {
        let endpoint = self.endpoint();
        let mut request = self.http.post(&endpoint).json(&self.request_body(messages));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .map_err(|err| transport_error("Chat completion", &endpoint, err))?;
        response_json_or_error("Chat completion", response)
    }
}
