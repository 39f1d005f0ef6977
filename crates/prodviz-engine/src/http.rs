use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::error::{EngineError, Result};

pub(crate) fn client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

pub(crate) fn transport_error(service: &str, url: &str, err: reqwest::Error) -> EngineError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    EngineError::Network(format!("{service} {kind} ({url}): {err}"))
}

/// Non-2xx statuses are transport failures; a 2xx body that is not JSON is an
/// invalid response.
pub(crate) fn response_json_or_error(service: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        EngineError::Network(format!("{service} response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(EngineError::Network(format!(
            "{service} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body).map_err(|_| {
        EngineError::InvalidResponse(format!(
            "{service} returned invalid JSON payload: {}",
            truncate_text(&body, 200)
        ))
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::truncate_text;

    #[test]
    fn truncate_text_counts_chars_not_bytes() {
        assert_eq!(truncate_text("héllo", 10), "héllo");
        assert_eq!(truncate_text("héllo wörld", 5), "héllo…");
    }
}
