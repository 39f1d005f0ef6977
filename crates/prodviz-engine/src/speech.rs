//! Text-to-speech through an OpenAI-compatible `/audio/speech` endpoint.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use prodviz_contracts::events::EventWriter;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::emit_event;
use crate::error::{EngineError, Result};
use crate::http::{client, transport_error, truncate_text};

pub const VOICES: [&str; 10] = [
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];
pub const DEFAULT_VOICE: &str = "alloy";

const DELIVERY_INSTRUCTIONS: &str = "Keep the delivery clear and friendly.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SpeechClip {
    pub fn mp3(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "audio/mpeg".to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("speech-{}.mp3", Utc::now().timestamp_millis())
    }

    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;
    fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip>;
}

pub struct OpenAiSpeech {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: HttpClient,
}

impl OpenAiSpeech {
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
            config.speech_api_base.clone(),
            config.speech_api_key.clone(),
            config.speech_model.clone(),
            config.request_timeout,
        )
    }

    pub fn request_body(&self, request: &SpeechRequest) -> Value {
        json!({
            "model": self.model,
            "input": request.text,
            "voice": request.voice,
            "response_format": "mp3",
            "instructions": DELIVERY_INSTRUCTIONS,
        })
    }
}

impl SpeechBackend for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechClip> {
        let endpoint = format!("{}/audio/speech", self.api_base);
        let mut builder = self.http.post(&endpoint).json(&self.request_body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .map_err(|err| transport_error("Speech", &endpoint, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EngineError::Network(format!(
                "Speech request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| EngineError::Network(format!("Speech body read failed: {err}")))?
            .to_vec();
        if bytes.is_empty() {
            return Err(EngineError::InvalidResponse(
                "speech endpoint returned no audio".to_string(),
            ));
        }
        let mut clip = SpeechClip::mp3(bytes);
        if let Some(mime_type) = mime_type {
            clip.mime_type = mime_type;
        }
        Ok(clip)
    }
}

/// Validates speech requests before they reach the backend.
pub struct Narrator<B> {
    backend: B,
    events: EventWriter,
}

impl<B: SpeechBackend> Narrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            events: EventWriter::disabled("speech"),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn speak(&self, text: &str, voice: &str) -> Result<SpeechClip> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::Precondition("nothing to speak"));
        }
        let voice = voice.trim().to_ascii_lowercase();
        if !VOICES.contains(&voice.as_str()) {
            return Err(EngineError::Precondition("unknown voice"));
        }
        let clip = self.backend.synthesize(&SpeechRequest {
            text: text.to_string(),
            voice: voice.clone(),
        })?;
        emit_event(
            &self.events,
            "speech_synthesized",
            json!({ "voice": voice, "chars": text.chars().count(), "bytes": clip.bytes.len() }),
        );
        Ok(clip)
    }
}
