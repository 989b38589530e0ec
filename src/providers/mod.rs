//! Completion provider abstraction layer.
//!
//! Defines the [`CompletionProvider`] trait and the shared request/response
//! types used by provider implementations. The counselor pipeline treats the
//! model as a black-box text-in/text-out collaborator: no tool calling, no
//! streaming — one prompt, one raw completion, occasionally malformed.
//!
//! One provider is implemented: [`openai::OpenAiProvider`] — any
//! OpenAI-compatible `/v1/chat/completions` endpoint.

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

pub mod openai;

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A request for a single completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (the rendered counselor template).
    pub system: Option<String>,
    /// The user-visible input for this call.
    pub input: String,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
}

/// The raw result of a completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Raw completion text, no guaranteed structure.
    pub text: String,
    /// The model identifier that served this response.
    pub model: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by completion providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP transport failure, including request timeouts.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected wire schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream provider responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized raw response body.
        body: String,
    },
    /// Provider cannot satisfy the request with current configuration.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure,
/// `ProviderError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [r"sk-[A-Za-z0-9]{32,}", r"sk-proj-[A-Za-z0-9_\-]{10,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core completion provider interface.
///
/// Implementations must be `Send + Sync`: one client instance is shared
/// across all sessions and is stateless per call.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Request a completion for a formatted prompt.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API, network, timeout, or parse failure.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// The model identifier string this provider is instantiated for.
    fn model_id(&self) -> &str;
}
