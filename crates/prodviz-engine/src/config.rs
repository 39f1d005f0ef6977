use std::env;
use std::time::Duration;

use crate::tasks::PollPolicy;

pub const DEFAULT_TASK_ENDPOINT: &str =
    "https://api.freepik.com/v1/ai/gemini-2-5-flash-image-preview";
pub const DEFAULT_CHAT_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_CHAT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_SPEECH_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_SPEECH_MODEL: &str = "gpt-4o-mini-tts";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub task_endpoint: String,
    pub task_api_key: Option<String>,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    pub chat_api_base: String,
    pub chat_api_key: Option<String>,
    pub chat_model: String,
    pub speech_api_base: String,
    pub speech_api_key: Option<String>,
    pub speech_model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves every setting through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let seconds = |key: &str, default: f64, min: f64, max: f64| {
            get(key)
                .and_then(|raw| raw.parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(default)
                .clamp(min, max)
        };

        let poll = PollPolicy {
            interval: Duration::from_secs_f64(seconds("PRODVIZ_POLL_INTERVAL", 2.0, 0.05, 30.0)),
            timeout: Some(Duration::from_secs_f64(seconds(
                "PRODVIZ_POLL_TIMEOUT",
                300.0,
                5.0,
                3600.0,
            ))),
            max_attempts: get("PRODVIZ_POLL_MAX_ATTEMPTS")
                .and_then(|raw| raw.parse::<u32>().ok())
                .filter(|value| *value > 0),
        };

        Self {
            task_endpoint: base_url(get("PRODVIZ_TASK_ENDPOINT"), DEFAULT_TASK_ENDPOINT),
            task_api_key: get("FREEPIK_API_KEY"),
            poll,
            request_timeout: Duration::from_secs_f64(seconds(
                "PRODVIZ_REQUEST_TIMEOUT",
                60.0,
                1.0,
                600.0,
            )),
            chat_api_base: base_url(get("OPENROUTER_API_BASE"), DEFAULT_CHAT_BASE),
            chat_api_key: get("OPENROUTER_API_KEY"),
            chat_model: get("PRODVIZ_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            speech_api_base: base_url(get("OPENAI_API_BASE"), DEFAULT_SPEECH_BASE),
            speech_api_key: get("OPENAI_API_KEY"),
            speech_model: get("PRODVIZ_TTS_MODEL")
                .unwrap_or_else(|| DEFAULT_SPEECH_MODEL.to_string()),
        }
    }
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
