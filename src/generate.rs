//! Text-generation backends.
//!
//! A backend takes a prompt and a sampling temperature and returns the
//! generated text, or a [`GenerationError`] classified so the caller can tell
//! the user what went wrong. Nothing here retries.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Error bodies are cut to this many characters in messages.
const MAX_ERROR_DETAIL_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("authentication with the generation service failed: {detail}")]
    Authentication { detail: String },

    #[error("generation service rate limit or quota exceeded: {detail}")]
    RateLimited { detail: String },

    #[error("transient failure reaching the generation service: {detail}")]
    Transient { detail: String },

    #[error("generation service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("generation service response could not be parsed: {detail}")]
    MalformedResponse { detail: String },

    #[error("generation service returned no text")]
    EmptyResponse,

    #[error("generation command exited with code {exit_code:?}: {stderr}")]
    Command {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Anything that can turn a prompt into generated text.
pub trait GenerationBackend {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// What produces the text behind this backend: a model name, or the
    /// command line for local programs. Part of the response cache key.
    fn model(&self) -> &str;

    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError>;
}

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Debug)]
pub struct GeminiBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transient {
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let url = self.endpoint();
        debug!(url = %url, prompt_len = prompt.len(), temperature, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, temperature))
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        debug!(status = status.as_u16(), body_len = body.len(), "generateContent response");

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }
        response_text(&body)
    }
}

/// JSON body for `generateContent`.
pub fn request_body(prompt: &str, temperature: f32) -> serde_json::Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": { "temperature": temperature },
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Concatenate the text parts of the first candidate.
pub fn response_text(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::MalformedResponse {
            detail: e.to_string(),
        })?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

/// Map a non-success HTTP status and its body onto the error taxonomy.
pub fn classify_status(status: u16, body: &str) -> GenerationError {
    let detail = error_detail(body);
    match status {
        401 | 403 => GenerationError::Authentication { detail },
        429 => GenerationError::RateLimited { detail },
        500..=599 => GenerationError::Transient {
            detail: format!("HTTP {status}: {detail}"),
        },
        _ if detail.contains("API_KEY_INVALID") || detail.contains("API key not valid") => {
            GenerationError::Authentication { detail }
        }
        _ => GenerationError::Api {
            status,
            message: detail,
        },
    }
}

/// The `error.message` (and `error.status`) of a Google API error body, or
/// the raw body when it is not one.
fn error_detail(body: &str) -> String {
    let detail = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match (env.error.status, env.error.message) {
            (Some(status), Some(message)) => format!("{status}: {message}"),
            (None, Some(message)) => message,
            (Some(status), None) => status,
            (None, None) => body.trim().to_owned(),
        },
        Err(_) => body.trim().to_owned(),
    };
    detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    GenerationError::Transient {
        detail: format!("{kind}: {e}"),
    }
}
