// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! The invoker: one invocation against one provider
//!
//! Dispatches on execution mode: frontend requests go straight to the
//! provider (no retry), backend requests go through the proxy under the
//! fixed retry policy. Streaming never retries; a failure after the first
//! byte terminates the stream.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::{GatewaySettings, ProviderConfigTable};
use crate::error::{GatewayError, Result};
use crate::gateway::backend::BackendClient;
use crate::gateway::frontend::FrontendClient;
use crate::gateway::request::{ExecutionMode, InvocationRequest};
use crate::gateway::retry::{with_fixed_retry, RetryPolicy};
use crate::gateway::stream::ChunkStream;
use crate::parser::{recover_json, ExpectedShape};

/// The seam fan-out and roaming depend on
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// One non-streaming invocation, unwrapped to plain text
    async fn invoke(&self, request: &InvocationRequest) -> Result<String>;

    /// One streaming invocation with a single terminal outcome: the stream
    /// ends cleanly or yields exactly one `Err` item and fuses
    async fn invoke_stream(&self, request: &InvocationRequest) -> Result<ChunkStream>;

    /// Invoke, then recover a JSON value from the answer; parse failure
    /// keeps the raw text for diagnostics
    async fn invoke_structured(
        &self,
        request: &InvocationRequest,
        expected: ExpectedShape,
    ) -> Result<Value> {
        let text = self.invoke(request).await?;
        recover_json(&text, expected)
    }
}

/// Executes invocations over HTTP in either execution mode
pub struct Invoker {
    backend: BackendClient,
    frontend: FrontendClient,
    retry: RetryPolicy,
    configs: Arc<ProviderConfigTable>,
}

impl Invoker {
    /// Build an invoker from process-wide settings and the resolved
    /// provider table.
    pub fn new(settings: &GatewaySettings, configs: Arc<ProviderConfigTable>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            backend: BackendClient::new(
                client.clone(),
                settings.backend_base_url(),
                settings.secure_context,
            ),
            frontend: FrontendClient::new(client, configs.clone(), settings.secure_context),
            retry: settings.retry.clone(),
            configs,
        })
    }

    /// The proxy client, which doubles as the knowledge-base retriever
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    fn check_frontend_config(&self, request: &InvocationRequest) -> Result<()> {
        if let Some(missing) = self.configs.frontend_missing(request.provider) {
            return Err(GatewayError::ProviderMisconfigured {
                provider: request.provider,
                missing,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ModelGateway for Invoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String> {
        match request.mode {
            ExecutionMode::Frontend => {
                self.check_frontend_config(request)?;
                self.frontend.generate(request).await
            }
            ExecutionMode::Backend => {
                with_fixed_retry(&self.retry, "generate", || self.backend.generate(request)).await
            }
        }
    }

    async fn invoke_stream(&self, request: &InvocationRequest) -> Result<ChunkStream> {
        match request.mode {
            ExecutionMode::Frontend => {
                self.check_frontend_config(request)?;
                self.frontend.generate_stream(request).await
            }
            // A stream that has yielded bytes cannot be replayed, so no retry.
            ExecutionMode::Backend => self.backend.generate_stream(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewaySettings;
    use crate::gateway::request::Provider;

    fn invoker() -> Invoker {
        Invoker::new(
            &GatewaySettings::default(),
            Arc::new(ProviderConfigTable::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_frontend_invoke_fails_fast_when_misconfigured() {
        let request = InvocationRequest::new(Provider::OpenAi, ExecutionMode::Frontend, "hi");
        let err = invoker().invoke(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderMisconfigured { .. }));
    }

    #[tokio::test]
    async fn test_frontend_stream_fails_fast_when_misconfigured() {
        let request = InvocationRequest::new(Provider::DepOcr, ExecutionMode::Frontend, "hi");
        let err = match invoker().invoke_stream(&request).await {
            Ok(_) => panic!("expected invoke_stream to fail"),
            Err(err) => err,
        };
        match err {
            GatewayError::ProviderMisconfigured { missing, .. } => {
                assert!(missing.contains("endpoint"));
            }
            other => panic!("expected ProviderMisconfigured, got {other:?}"),
        }
    }
}
