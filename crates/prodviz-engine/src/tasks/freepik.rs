use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use super::{TaskBackend, TaskRequest};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::http::{client, response_json_or_error, transport_error};

const API_KEY_HEADER: &str = "x-freepik-api-key";

/// Job endpoint speaking the Freepik task protocol: POST to create, GET
/// `<endpoint>/<task_id>` for status.
pub struct FreepikTaskBackend {
    endpoint: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl FreepikTaskBackend {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            http: client(timeout),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.task_endpoint.clone(),
            config.task_api_key.clone(),
            config.request_timeout,
        )
    }

    pub fn status_url(&self, task_id: &str) -> String {
        format!("{}/{}", self.endpoint, task_id)
    }

    fn authorize(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

impl TaskBackend for FreepikTaskBackend {
    fn name(&self) -> &str {
        "freepik"
    }

    fn create_task(&self, request: &TaskRequest) -> Result<Value> {
        let response = self
            .authorize(self.http.post(&self.endpoint))
            .json(&request.body())
            .send()
            .map_err(|err| transport_error("Task creation", &self.endpoint, err))?;
        response_json_or_error("Task creation", response)
    }

    fn task_status(&self, task_id: &str) -> Result<Value> {
        let url = self.status_url(task_id);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .map_err(|err| transport_error("Task status", &url, err))?;
        response_json_or_error("Task status", response)
    }
}
