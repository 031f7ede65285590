// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Mock gateway and retriever for testing
//!
//! Configurable implementations of the [`ModelGateway`] and
//! [`SnippetRetriever`] seams so workflow tests run without network calls.
//! Responses are scripted per provider with failure injection, call
//! counting, and request recording.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::error::{GatewayError, Result};
use crate::gateway::backend::{RetrievedSnippet, SnippetRetriever};
use crate::gateway::invoker::ModelGateway;
use crate::gateway::request::{InvocationRequest, Provider};
use crate::gateway::stream::{ChunkStream, StreamChunk};

/// A scripted reply for one invocation
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Succeed with this text
    Text(String),
    /// Fail with a transport error carrying this detail
    Fail(String),
}

/// A mock model gateway with scripted per-provider replies
#[derive(Clone, Default)]
pub struct MockGateway {
    scripts: Arc<Mutex<HashMap<Provider, VecDeque<MockReply>>>>,
    call_count: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<InvocationRequest>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for a provider (replies drain in order)
    pub fn with_reply(self, provider: Provider, text: impl Into<String>) -> Self {
        self.push(provider, MockReply::Text(text.into()));
        self
    }

    /// Queue a failing reply for a provider
    pub fn with_failure(self, provider: Provider, detail: impl Into<String>) -> Self {
        self.push(provider, MockReply::Fail(detail.into()));
        self
    }

    fn push(&self, provider: Provider, reply: MockReply) {
        self.scripts
            .lock()
            .expect("mock scripts lock")
            .entry(provider)
            .or_default()
            .push_back(reply);
    }

    /// Number of invocations made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in invocation order
    pub fn recorded_requests(&self) -> Vec<InvocationRequest> {
        self.recorded.lock().expect("mock recording lock").clone()
    }

    fn next_reply(&self, provider: Provider) -> MockReply {
        self.scripts
            .lock()
            .expect("mock scripts lock")
            .get_mut(&provider)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MockReply::Fail(format!("no scripted reply for {provider}")))
    }
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .lock()
            .expect("mock recording lock")
            .push(request.clone());

        match self.next_reply(request.provider) {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(detail) => Err(GatewayError::TransportFailure {
                endpoint: "mock://gateway".to_string(),
                detail,
            }),
        }
    }

    async fn invoke_stream(&self, request: &InvocationRequest) -> Result<ChunkStream> {
        let text = self.invoke(request).await?;
        let chunks: Vec<Result<StreamChunk>> = text
            .split_inclusive(' ')
            .map(|piece| Ok(StreamChunk::new(piece)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// A mock knowledge-base retriever
#[derive(Clone, Default)]
pub struct MockRetriever {
    snippets: Arc<Mutex<Option<Result<Vec<RetrievedSnippet>>>>>,
    recorded: Arc<Mutex<Vec<(String, String, u32)>>>,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return these snippets from the next retrieval
    pub fn with_snippets(self, snippets: Vec<RetrievedSnippet>) -> Self {
        *self.snippets.lock().expect("mock snippets lock") = Some(Ok(snippets));
        self
    }

    /// Fail retrieval with this detail
    pub fn with_failure(self, detail: impl Into<String>) -> Self {
        *self.snippets.lock().expect("mock snippets lock") =
            Some(Err(GatewayError::RetrievalFailed {
                detail: detail.into(),
            }));
        self
    }

    /// Calls seen so far as (text, collection, top_k)
    pub fn recorded_calls(&self) -> Vec<(String, String, u32)> {
        self.recorded.lock().expect("mock recording lock").clone()
    }
}

#[async_trait]
impl SnippetRetriever for MockRetriever {
    async fn find_related(
        &self,
        text: &str,
        collection: &str,
        top_k: u32,
    ) -> Result<Vec<RetrievedSnippet>> {
        self.recorded
            .lock()
            .expect("mock recording lock")
            .push((text.to_string(), collection.to_string(), top_k));

        match &*self.snippets.lock().expect("mock snippets lock") {
            Some(Ok(snippets)) => Ok(snippets.clone()),
            Some(Err(GatewayError::RetrievalFailed { detail })) => {
                Err(GatewayError::RetrievalFailed {
                    detail: detail.clone(),
                })
            }
            Some(Err(_)) | None => Ok(vec![]),
        }
    }
}

/// Convenience constructor for test snippets
pub fn snippet(source: &str, chunk: &str, score: f64) -> RetrievedSnippet {
    RetrievedSnippet {
        source_file: source.to_string(),
        content_chunk: chunk.to_string(),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::request::ExecutionMode;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_scripted_replies_drain_in_order() {
        let gateway = MockGateway::new()
            .with_reply(Provider::Gemini, "first")
            .with_reply(Provider::Gemini, "second");
        let request = InvocationRequest::new(Provider::Gemini, ExecutionMode::Backend, "q");

        assert_eq!(gateway.invoke(&request).await.unwrap(), "first");
        assert_eq!(gateway.invoke(&request).await.unwrap(), "second");
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unscripted_provider_fails() {
        let gateway = MockGateway::new();
        let request = InvocationRequest::new(Provider::Ali, ExecutionMode::Backend, "q");
        assert!(gateway.invoke(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_reassembles_to_reply() {
        let gateway = MockGateway::new().with_reply(Provider::OpenAi, "a b c");
        let request = InvocationRequest::new(Provider::OpenAi, ExecutionMode::Backend, "q");

        let mut stream = gateway.invoke_stream(&request).await.unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap().text);
        }
        assert_eq!(collected, "a b c");
    }

    #[tokio::test]
    async fn test_retriever_records_calls() {
        let retriever = MockRetriever::new().with_snippets(vec![snippet("a.md", "text", 0.9)]);
        let snippets = retriever.find_related("note", "default", 3).await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(
            retriever.recorded_calls(),
            vec![("note".to_string(), "default".to_string(), 3)]
        );
    }
}
