// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Direct provider client for frontend-mode calls
//!
//! Issues one network call straight to the provider with locally held
//! credentials: Gemini's native `generateContent` protocol, or the OpenAI
//! `chat/completions` protocol for everything else. Attachments are inlined
//! into the single user turn. No retry is applied on this path.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ProviderConfigTable;
use crate::error::{classify_send_error, classify_status, GatewayError, Result};
use crate::gateway::request::{InvocationRequest, Provider, TurnRole, WireShape};
use crate::gateway::stream::{ChunkStream, EventLineDecoder, StreamChunk, StreamEvent};

/// Client for direct provider calls
#[derive(Debug, Clone)]
pub struct FrontendClient {
    client: Client,
    configs: Arc<ProviderConfigTable>,
    secure_context: bool,
}

impl FrontendClient {
    pub fn new(client: Client, configs: Arc<ProviderConfigTable>, secure_context: bool) -> Self {
        Self {
            client,
            configs,
            secure_context,
        }
    }

    /// Credential, endpoint base, and model for a provider, or the
    /// misconfiguration error naming what is missing.
    fn resolved(&self, provider: Provider) -> Result<(String, String, String)> {
        let config = self.configs.get(provider);
        let endpoint = config
            .endpoint
            .or_else(|| provider.capabilities().default_endpoint.map(str::to_string));

        match (config.api_key, endpoint, config.model) {
            (Some(key), Some(endpoint), Some(model)) => {
                Ok((key, endpoint.trim_end_matches('/').to_string(), model))
            }
            _ => Err(GatewayError::ProviderMisconfigured {
                provider,
                missing: self
                    .configs
                    .frontend_missing(provider)
                    .unwrap_or_else(|| "configuration".to_string()),
            }),
        }
    }

    pub async fn generate(&self, request: &InvocationRequest) -> Result<String> {
        match request.provider.capabilities().wire {
            WireShape::NativeGemini => self.gemini_generate(request).await,
            WireShape::OpenAiCompatible => self.openai_generate(request).await,
        }
    }

    pub async fn generate_stream(&self, request: &InvocationRequest) -> Result<ChunkStream> {
        match request.provider.capabilities().wire {
            WireShape::NativeGemini => self.gemini_generate_stream(request).await,
            WireShape::OpenAiCompatible => self.openai_generate_stream(request).await,
        }
    }

    // ----- Gemini native wire shape -----

    fn gemini_body(request: &InvocationRequest) -> Value {
        let mut contents: Vec<Value> = request
            .history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": turn.text}]})
            })
            .collect();

        let mut parts = vec![json!({"text": request.user_prompt})];
        for image in &request.images {
            parts.push(json!({
                "inline_data": {"mime_type": image.media_type, "data": image.data}
            }));
        }
        contents.push(json!({"role": "user", "parts": parts}));

        let mut body = json!({"contents": contents});
        if let Some(system) = &request.system_instruction {
            body["system_instruction"] = json!({"parts": [{"text": system}]});
        }
        if request.want_json {
            body["generation_config"] = json!({"response_mime_type": "application/json"});
        }
        body
    }

    /// Concatenate the text parts of the first candidate.
    fn gemini_text(value: &Value) -> Result<String> {
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| GatewayError::MalformedResponse {
                raw: value.to_string(),
            })?;

        Ok(parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn gemini_generate(&self, request: &InvocationRequest) -> Result<String> {
        let (key, base, model) = self.resolved(request.provider)?;
        let endpoint = format!("{base}/models/{model}:generateContent");

        debug!(endpoint = %endpoint, "frontend gemini generate");
        let response = self
            .client
            .post(&endpoint)
            .query(&[("key", key.as_str())])
            .json(&Self::gemini_body(request))
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        let value: Value = response.json().await?;
        Self::gemini_text(&value)
    }

    async fn gemini_generate_stream(&self, request: &InvocationRequest) -> Result<ChunkStream> {
        let (key, base, model) = self.resolved(request.provider)?;
        let endpoint = format!("{base}/models/{model}:streamGenerateContent");

        debug!(endpoint = %endpoint, "frontend gemini stream");
        let response = self
            .client
            .post(&endpoint)
            .query(&[("alt", "sse"), ("key", key.as_str())])
            .json(&Self::gemini_body(request))
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        Ok(sse_chunk_stream(response))
    }

    // ----- OpenAI-compatible wire shape -----

    fn openai_messages(request: &InvocationRequest) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_instruction {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in &request.history {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": turn.text}));
        }

        if request.images.is_empty() {
            messages.push(json!({"role": "user", "content": request.user_prompt}));
        } else {
            let mut parts = vec![json!({"type": "text", "text": request.user_prompt})];
            for image in &request.images {
                let url = format!("data:{};base64,{}", image.media_type, image.data);
                parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
            }
            messages.push(json!({"role": "user", "content": parts}));
        }
        messages
    }

    fn openai_body(request: &InvocationRequest, model: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": Self::openai_messages(request),
        });
        if request.want_json {
            body["response_format"] = json!({"type": "json_object"});
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn openai_generate(&self, request: &InvocationRequest) -> Result<String> {
        let (key, base, model) = self.resolved(request.provider)?;
        let endpoint = format!("{base}/chat/completions");

        debug!(endpoint = %endpoint, provider = %request.provider, "frontend openai-compatible generate");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&key)
            .json(&Self::openai_body(request, &model, false))
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        let value: Value = response.json().await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::MalformedResponse {
                raw: value.to_string(),
            })
    }

    async fn openai_generate_stream(&self, request: &InvocationRequest) -> Result<ChunkStream> {
        let (key, base, model) = self.resolved(request.provider)?;
        let endpoint = format!("{base}/chat/completions");

        debug!(endpoint = %endpoint, provider = %request.provider, "frontend openai-compatible stream");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&key)
            .json(&Self::openai_body(request, &model, true))
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        Ok(sse_chunk_stream(response))
    }
}

/// Decode a provider SSE response into a chunk stream, ending at the
/// `[DONE]` sentinel or stream close.
fn sse_chunk_stream(response: reqwest::Response) -> ChunkStream {
    let mut bytes = response.bytes_stream();
    Box::pin(try_stream! {
        let mut decoder = EventLineDecoder::new();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| GatewayError::Stream(e.to_string()))?;
            for event in decoder.push(&chunk) {
                match event {
                    StreamEvent::Delta(text) => yield StreamChunk::new(text),
                    StreamEvent::Done => break 'read,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawProviderSettings;
    use crate::gateway::request::{ExecutionMode, ImageAttachment};

    fn client_with(provider: Provider, settings: RawProviderSettings) -> FrontendClient {
        FrontendClient::new(
            Client::new(),
            Arc::new(ProviderConfigTable::resolve([(provider, settings)])),
            false,
        )
    }

    #[test]
    fn test_resolved_misconfigured_names_missing_fields() {
        let client = client_with(Provider::OpenAi, RawProviderSettings::default());
        let err = client.resolved(Provider::OpenAi).unwrap_err();
        match err {
            GatewayError::ProviderMisconfigured { provider, missing } => {
                assert_eq!(provider, Provider::OpenAi);
                assert!(missing.contains("api key"));
                assert!(missing.contains("model"));
            }
            other => panic!("expected ProviderMisconfigured, got {other:?}"),
        }
    }

    #[test]
    fn test_resolved_uses_default_endpoint() {
        let client = client_with(
            Provider::DeepSeek,
            RawProviderSettings {
                api_key: Some("sk".to_string()),
                model: Some("deepseek-chat".to_string()),
                ..Default::default()
            },
        );
        let (_, endpoint, model) = client.resolved(Provider::DeepSeek).unwrap();
        assert_eq!(endpoint, "https://api.deepseek.com/v1");
        assert_eq!(model, "deepseek-chat");
    }

    #[test]
    fn test_gemini_body_inlines_images_into_user_turn() {
        let request = InvocationRequest::new(Provider::Gemini, ExecutionMode::Frontend, "read this")
            .with_images(vec![ImageAttachment {
                media_type: "image/png".to_string(),
                data: "aGVsbG8=".to_string(),
            }]);
        let body = FrontendClient::gemini_body(&request);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "read this");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn test_gemini_body_json_mode_sets_mime_type() {
        let request =
            InvocationRequest::new(Provider::Gemini, ExecutionMode::Frontend, "q").expecting_json();
        let body = FrontendClient::gemini_body(&request);
        assert_eq!(
            body["generation_config"]["response_mime_type"],
            "application/json"
        );
    }

    #[test]
    fn test_gemini_text_joins_parts() {
        let value = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}]
        });
        assert_eq!(FrontendClient::gemini_text(&value).unwrap(), "Hello world");
    }

    #[test]
    fn test_gemini_text_malformed_preserves_body() {
        let value = serde_json::json!({"error": {"message": "quota"}});
        let err = FrontendClient::gemini_text(&value).unwrap_err();
        match err {
            GatewayError::MalformedResponse { raw } => assert!(raw.contains("quota")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_openai_messages_order_and_roles() {
        let request = InvocationRequest::new(Provider::OpenAi, ExecutionMode::Frontend, "now")
            .with_system("sys")
            .with_history(vec![
                crate::gateway::request::Turn::user("before"),
                crate::gateway::request::Turn::assistant("answer"),
            ]);
        let messages = FrontendClient::openai_messages(&request);

        let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[3]["content"], "now");
    }

    #[test]
    fn test_openai_body_stream_and_json_flags() {
        let request =
            InvocationRequest::new(Provider::Ali, ExecutionMode::Frontend, "q").expecting_json();
        let body = FrontendClient::openai_body(&request, "qwen-max", true);
        assert_eq!(body["model"], "qwen-max");
        assert_eq!(body["stream"], true);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_openai_images_become_data_urls() {
        let request = InvocationRequest::new(Provider::Doubao, ExecutionMode::Frontend, "ocr")
            .with_images(vec![ImageAttachment {
                media_type: "image/jpeg".to_string(),
                data: "YWJj".to_string(),
            }]);
        let messages = FrontendClient::openai_messages(&request);
        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,YWJj");
    }
}
