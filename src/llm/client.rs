//! Inference client: one POST to the chat-completions endpoint.
//!
//! Single attempt, no retry. Failures are classified into the four
//! `InferenceError` kinds; callers never see raw reqwest errors.

use super::curl;
use super::types::{InferenceRequest, InferenceResponse};
use crate::settings::{RequestLogging, Settings};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use thiserror::Error;

/// Bytes of an error body kept for logs and error messages.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Network failure or timeout before a status arrived.
    #[error("transport error: {0}")]
    Transport(String),
    /// Credential missing or rejected (401/403).
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },
    /// 2xx with a body that is empty or not a completion.
    #[error("empty or unparseable response body: {0}")]
    EmptyBody(String),
    /// Any other non-2xx status.
    #[error("endpoint returned {status}: {message}")]
    Protocol { status: u16, message: String },
}

/// Anything that can answer an `InferenceRequest`.
///
/// The session holds one of these; tests substitute a scripted backend.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn send(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError>;
}

/// reqwest-backed client for an OpenAI-compatible endpoint.
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    request_logging: RequestLogging,
}

impl InferenceClient {
    pub fn new(settings: &Settings) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| InferenceError::Transport(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            endpoint: settings.endpoint(),
            api_key: settings.api_key.clone(),
            request_logging: settings.request_logging,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    async fn send(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        if self.request_logging != RequestLogging::Off {
            log::debug!(
                "[LLM] Request:\n{}",
                curl::to_curl(
                    self.endpoint.as_str(),
                    request,
                    self.request_logging == RequestLogging::Full
                )
            );
        }

        log::info!("[LLM] Model: {}", request.model);
        let start = std::time::Instant::now();

        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log::error!("[LLM] HTTP request failed: {}", e);
                InferenceError::Transport(e.to_string())
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            log::error!("[LLM] Failed to read response body: {}", e);
            InferenceError::Transport(e.to_string())
        })?;
        log::info!(
            "[LLM] {} in {}ms ({} bytes)",
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        let response = classify_response(status, &body)?;
        log::info!(
            "[LLM] Tokens: prompt={} completion={} total={}",
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            response.usage.total_tokens
        );
        Ok(response)
    }
}

/// Map a status + body to a completion or an error kind.
pub fn classify_response(status: StatusCode, body: &str) -> Result<InferenceResponse, InferenceError> {
    let preview = || body[..floor_char_boundary(body, ERROR_BODY_PREVIEW)].to_string();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        log::error!("[LLM] Credential rejected: {}", status);
        return Err(InferenceError::Auth {
            status: status.as_u16(),
            message: preview(),
        });
    }
    if !status.is_success() {
        log::error!("[LLM] API returned {}: {}", status, preview());
        return Err(InferenceError::Protocol {
            status: status.as_u16(),
            message: preview(),
        });
    }
    if body.trim().is_empty() {
        return Err(InferenceError::EmptyBody("no body".to_string()));
    }
    serde_json::from_str::<InferenceResponse>(body).map_err(|e| {
        log::warn!("[LLM] Unparseable completion: {} — raw: {}", e, preview());
        InferenceError::EmptyBody(e.to_string())
    })
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_and_forbidden_are_auth() {
        for code in [401, 403] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(matches!(
                classify_response(status, r#"{"error":"bad key"}"#),
                Err(InferenceError::Auth { status, .. }) if status == code
            ));
        }
    }

    #[test]
    fn other_failures_are_protocol() {
        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, "slow down").unwrap_err();
        assert_eq!(
            err,
            InferenceError::Protocol {
                status: 429,
                message: "slow down".to_string()
            }
        );
        assert!(matches!(
            classify_response(StatusCode::INTERNAL_SERVER_ERROR, ""),
            Err(InferenceError::Protocol { status: 500, .. })
        ));
    }

    #[test]
    fn empty_or_garbage_success_is_empty_body() {
        assert!(matches!(
            classify_response(StatusCode::OK, "  \n"),
            Err(InferenceError::EmptyBody(_))
        ));
        assert!(matches!(
            classify_response(StatusCode::OK, "<html>proxy</html>"),
            Err(InferenceError::EmptyBody(_))
        ));
    }

    #[test]
    fn success_body_parses() {
        let resp = classify_response(
            StatusCode::OK,
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"a,b,c,1,d"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.choices[0].message.text(), "a,b,c,1,d");
    }

    #[test]
    fn error_preview_respects_char_boundaries() {
        let body = "戦".repeat(100);
        let err = classify_response(StatusCode::BAD_GATEWAY, &body).unwrap_err();
        match err {
            InferenceError::Protocol { message, .. } => {
                assert!(message.len() <= ERROR_BODY_PREVIEW);
                assert!(message.chars().all(|c| c == '戦'));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
