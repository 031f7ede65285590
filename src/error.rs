// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Error types for the gateway
//!
//! Defines the failure taxonomy surfaced to the UI and the classifier that
//! maps raw transport/HTTP failures into it. Every user-visible message
//! embeds the offending endpoint for diagnosability.

use thiserror::Error;

use crate::gateway::request::Provider;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Required credential/endpoint/model absent for the selected mode
    #[error("Provider {provider} is not configured for direct calls: missing {missing}. Add the missing settings or switch to backend mode.")]
    ProviderMisconfigured { provider: Provider, missing: String },

    /// Secure page attempting to reach an insecure endpoint
    #[error("Cannot call insecure endpoint {endpoint} from a secure origin: the browser blocks mixed content. Upgrade the endpoint to HTTPS or switch to backend mode.")]
    SecureOriginBlocked { endpoint: String },

    /// Connectivity/CORS/DNS-class failure
    #[error("Could not reach {endpoint}: {detail}. Check your network connection and CORS settings.")]
    TransportFailure { endpoint: String, detail: String },

    /// Non-2xx from the proxy or provider
    #[error("Request to {endpoint} failed with status {status}: {detail}")]
    UpstreamFailure {
        endpoint: String,
        status: u16,
        detail: String,
    },

    /// A structured response could not be recovered by the parser
    #[error("Model response was not valid JSON")]
    MalformedResponse {
        /// Untouched original text, preserved for display
        raw: String,
    },

    /// Roaming phase-1 retrieval call failed
    #[error("Knowledge base retrieval failed: {detail}")]
    RetrievalFailed { detail: String },

    /// Roaming phase-1 returned zero snippets; a legitimate empty result
    #[error("Not enough relevant content was found in the knowledge base")]
    NoRelevantContent,

    /// Streaming error after the first byte
    #[error("Streaming error: {0}")]
    Stream(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Body shape the proxy uses for error responses, when it sends JSON at all
#[derive(serde::Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// True when the endpoint is plain HTTP and not a loopback address
fn endpoint_is_insecure(endpoint: &str) -> bool {
    let Some(rest) = endpoint.strip_prefix("http://") else {
        return false;
    };
    let host = rest.split(['/', ':']).next().unwrap_or("");
    !matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

/// Classify a failure raised while sending a request, before any response.
///
/// Evaluation order is significant: a secure origin calling an insecure
/// endpoint is reported first (retrying cannot help), generic transport
/// failure second, and anything else falls back to an upstream failure with
/// status 0.
pub fn classify_send_error(
    endpoint: &str,
    secure_context: bool,
    err: reqwest::Error,
) -> GatewayError {
    if secure_context && endpoint_is_insecure(endpoint) {
        return GatewayError::SecureOriginBlocked {
            endpoint: endpoint.to_string(),
        };
    }

    if err.is_connect() || err.is_timeout() || err.is_request() {
        return GatewayError::TransportFailure {
            endpoint: endpoint.to_string(),
            detail: err.to_string(),
        };
    }

    GatewayError::UpstreamFailure {
        endpoint: endpoint.to_string(),
        status: 0,
        detail: err.to_string(),
    }
}

/// Classify a non-2xx response from the proxy or a provider.
///
/// The body is decoded as a JSON `{error}` envelope when possible; 5xx adds
/// the remediation note that the backend could not reach the upstream
/// service.
pub fn classify_status(endpoint: &str, status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| body.trim().to_string());

    let detail = if (500..600).contains(&status) {
        if message.is_empty() {
            "the backend could not reach the upstream AI service".to_string()
        } else {
            format!("{message} (the backend could not reach the upstream AI service)")
        }
    } else if message.is_empty() {
        "no error detail provided".to_string()
    } else {
        message
    };

    GatewayError::UpstreamFailure {
        endpoint: endpoint.to_string(),
        status,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_is_insecure_http() {
        assert!(endpoint_is_insecure("http://model-host.internal/v1"));
        assert!(endpoint_is_insecure("http://10.0.0.5:8000/v1"));
    }

    #[test]
    fn test_endpoint_is_insecure_exempts_loopback() {
        assert!(!endpoint_is_insecure("http://localhost:8787/api"));
        assert!(!endpoint_is_insecure("http://127.0.0.1/api"));
    }

    #[test]
    fn test_endpoint_is_insecure_https() {
        assert!(!endpoint_is_insecure("https://api.openai.com/v1"));
    }

    #[test]
    fn test_classify_status_5xx_mentions_upstream() {
        let err = classify_status("https://proxy.example/api/generate", 502, "");
        let text = err.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("https://proxy.example/api/generate"));
        assert!(text.contains("could not reach the upstream AI service"));
    }

    #[test]
    fn test_classify_status_json_error_body() {
        let err = classify_status(
            "https://proxy.example/api/generate",
            400,
            r#"{"error":"prompt too long"}"#,
        );
        assert!(err.to_string().contains("prompt too long"));
    }

    #[test]
    fn test_classify_status_plain_body() {
        let err = classify_status("https://proxy.example/api/generate", 404, "not found");
        assert!(err.to_string().contains("not found"));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_misconfigured_message_embeds_provider() {
        let err = GatewayError::ProviderMisconfigured {
            provider: Provider::Doubao,
            missing: "api key, model".to_string(),
        };
        assert!(err.to_string().contains("doubao"));
        assert!(err.to_string().contains("api key, model"));
    }

    #[test]
    fn test_secure_origin_message_embeds_endpoint() {
        let err = GatewayError::SecureOriginBlocked {
            endpoint: "http://ocr.lan/v1".to_string(),
        };
        assert!(err.to_string().contains("http://ocr.lan/v1"));
        assert!(err.to_string().contains("HTTPS"));
    }

    #[test]
    fn test_malformed_response_preserves_raw() {
        let err = GatewayError::MalformedResponse {
            raw: "sorry, I can't".to_string(),
        };
        if let GatewayError::MalformedResponse { raw } = err {
            assert_eq!(raw, "sorry, I can't");
        } else {
            panic!("Expected MalformedResponse");
        }
    }

    #[test]
    fn test_no_relevant_content_is_worded_as_empty_result() {
        let err = GatewayError::NoRelevantContent;
        assert!(err.to_string().contains("Not enough relevant content"));
    }
}
