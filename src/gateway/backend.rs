// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Backend proxy client
//!
//! All backend-mode traffic goes to one fixed proxy: `/generate` for
//! non-streaming calls, `/generate-stream` for streaming, `/find-related`
//! for knowledge-base retrieval. The proxy returns raw model text on 2xx
//! and an error body (optionally a JSON `{error}` envelope) otherwise.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{classify_send_error, classify_status, GatewayError, Result};
use crate::gateway::request::{ImageAttachment, InvocationRequest, TaskKind, Turn};
use crate::gateway::stream::{
    ChunkStream, EventLineDecoder, StreamChunk, StreamEvent, Utf8StreamDecoder, EVENT_PREFIX,
};

/// One ranked snippet returned by the knowledge base
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrievedSnippet {
    /// File the chunk came from
    pub source_file: String,
    /// The text chunk itself
    pub content_chunk: String,
    /// Relevance score from the retrieval ranking
    pub score: f64,
}

/// The knowledge-base retrieval collaborator, seen as one opaque call
#[async_trait]
pub trait SnippetRetriever: Send + Sync {
    async fn find_related(
        &self,
        text: &str,
        collection: &str,
        top_k: u32,
    ) -> Result<Vec<RetrievedSnippet>>;
}

/// Client for the backend proxy
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base: String,
    secure_context: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    provider: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a str>,
    user_prompt: &'a str,
    json_response: bool,
    mode: TaskKind,
    history: &'a [Turn],
    images: &'a [ImageAttachment],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateStreamBody<'a> {
    provider: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a str>,
    user_prompt: &'a str,
    history: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_budget: Option<u32>,
}

#[derive(Serialize)]
struct FindRelatedBody<'a> {
    text: &'a str,
    collection_name: &'a str,
    top_k: u32,
}

#[derive(Deserialize)]
struct FindRelatedResponse {
    #[serde(default)]
    related_documents: Option<Vec<RetrievedSnippet>>,
    #[serde(default)]
    error: Option<String>,
}

impl BackendClient {
    pub fn new(client: Client, base: String, secure_context: bool) -> Self {
        Self {
            client,
            base,
            secure_context,
        }
    }

    /// One non-streaming proxy call; the 2xx body is the raw model text.
    /// Retry lives in the invoker, not here.
    pub async fn generate(&self, request: &InvocationRequest) -> Result<String> {
        let endpoint = format!("{}/generate", self.base);
        let body = GenerateBody {
            provider: request.provider.wire_name(),
            system_instruction: request.system_instruction.as_deref(),
            user_prompt: &request.user_prompt,
            json_response: request.want_json,
            mode: request.task,
            history: &request.history,
            images: &request.images,
        };

        debug!(endpoint = %endpoint, provider = %request.provider, "backend generate");
        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        Ok(response.text().await?)
    }

    /// One streaming proxy call. An event-line framed stream starts with
    /// the `data: ` prefix, anything else is forwarded as raw text.
    pub async fn generate_stream(&self, request: &InvocationRequest) -> Result<ChunkStream> {
        let endpoint = format!("{}/generate-stream", self.base);
        let body = GenerateStreamBody {
            provider: request.provider.wire_name(),
            system_instruction: request.system_instruction.as_deref(),
            user_prompt: &request.user_prompt,
            history: &request.history,
            thinking_budget: request.thinking_budget,
        };

        debug!(endpoint = %endpoint, provider = %request.provider, "backend generate-stream");
        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        Ok(decode_proxy_stream(response.bytes_stream()))
    }
}

/// Decode a proxy streaming body into a chunk stream.
///
/// The wire shape is classified only once a full `data: ` prefix length of
/// bytes has arrived, since the first network read can split the prefix
/// itself. Framed streams end at the `[DONE]` sentinel; unframed bytes are
/// forwarded through the incremental UTF-8 decoder.
fn decode_proxy_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let stream = try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = EventLineDecoder::new();
        let mut raw = Utf8StreamDecoder::new();
        let mut sniff: Vec<u8> = Vec::new();
        let mut framed: Option<bool> = None;

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| GatewayError::Stream(e.to_string()))?;

            let payload = match framed {
                Some(_) => chunk.as_ref().to_vec(),
                None => {
                    sniff.extend_from_slice(chunk.as_ref());
                    if sniff.len() < EVENT_PREFIX.len() {
                        continue;
                    }
                    framed = Some(sniff.starts_with(EVENT_PREFIX.as_bytes()));
                    std::mem::take(&mut sniff)
                }
            };

            if framed == Some(true) {
                for event in decoder.push(&payload) {
                    match event {
                        StreamEvent::Delta(text) => yield StreamChunk::new(text),
                        StreamEvent::Done => break 'read,
                    }
                }
            } else {
                let text = raw.push(&payload);
                if !text.is_empty() {
                    yield StreamChunk::new(text);
                }
            }
        }

        // A stream shorter than the prefix was never classified; it is raw.
        if !sniff.is_empty() {
            let text = raw.push(&sniff);
            if !text.is_empty() {
                yield StreamChunk::new(text);
            }
        }
        let tail = raw.finish();
        if !tail.is_empty() {
            yield StreamChunk::new(tail);
        }
    };

    Box::pin(stream)
}

#[async_trait]
impl SnippetRetriever for BackendClient {
    async fn find_related(
        &self,
        text: &str,
        collection: &str,
        top_k: u32,
    ) -> Result<Vec<RetrievedSnippet>> {
        let endpoint = format!("{}/find-related", self.base);
        let body = FindRelatedBody {
            text,
            collection_name: collection,
            top_k,
        };

        debug!(endpoint = %endpoint, collection, top_k, "backend find-related");
        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(&endpoint, self.secure_context, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&endpoint, status.as_u16(), &text));
        }

        let decoded: FindRelatedResponse = response.json().await?;
        if let Some(error) = decoded.error {
            return Err(GatewayError::RetrievalFailed { detail: error });
        }

        Ok(decoded.related_documents.unwrap_or_default())
    }
}
