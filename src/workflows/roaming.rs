// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Associative roaming against the knowledge base
//!
//! Two phases: one retrieval call for ranked snippets, then one synthesis
//! invocation per snippet, all in parallel. Unlike the audit fan-out there
//! is no partial success here — every synthesis call must yield a parseable
//! conclusion or the whole operation fails. Results preserve the retrieval
//! ranking order.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::backend::{RetrievedSnippet, SnippetRetriever};
use crate::gateway::invoker::ModelGateway;
use crate::gateway::request::{ExecutionMode, InvocationRequest, Provider, TaskKind};
use crate::parser::ExpectedShape;

/// Snippets requested from the knowledge base per roam
pub const ROAMING_TOP_K: u32 = 3;

/// One synthesized roaming result, in retrieval ranking order
#[derive(Debug, Clone, PartialEq)]
pub struct RoamingItem {
    /// Source file of the snippet
    pub source: String,
    /// The snippet text the conclusion is about
    pub relevant_text: String,
    /// The model's synthesis of snippet against note
    pub conclusion: String,
}

/// The two-phase retrieval-then-synthesis workflow
pub struct RoamingWorkflow {
    gateway: Arc<dyn ModelGateway>,
    retriever: Arc<dyn SnippetRetriever>,
}

impl RoamingWorkflow {
    pub fn new(gateway: Arc<dyn ModelGateway>, retriever: Arc<dyn SnippetRetriever>) -> Self {
        Self { gateway, retriever }
    }

    /// Roam the knowledge base for snippets related to the organized note,
    /// then synthesize one conclusion per snippet.
    ///
    /// Fails fast with [`GatewayError::RetrievalFailed`] when retrieval
    /// errors, and with [`GatewayError::NoRelevantContent`] when it returns
    /// nothing; the latter is a legitimate empty outcome, not a fault.
    pub async fn roam(
        &self,
        note: &str,
        collection: &str,
        provider: Provider,
        mode: ExecutionMode,
    ) -> Result<Vec<RoamingItem>> {
        // Phase 1: one retrieval call.
        let snippets = self
            .retriever
            .find_related(note, collection, ROAMING_TOP_K)
            .await
            .map_err(|err| match err {
                GatewayError::RetrievalFailed { .. } => err,
                other => GatewayError::RetrievalFailed {
                    detail: other.to_string(),
                },
            })?;

        if snippets.is_empty() {
            return Err(GatewayError::NoRelevantContent);
        }
        debug!(count = snippets.len(), "retrieval returned snippets");

        // Phase 2: parallel synthesis, all-or-nothing.
        let syntheses = snippets
            .iter()
            .map(|snippet| self.synthesize(note, snippet, provider, mode));
        let results = join_all(syntheses).await;

        results.into_iter().collect()
    }

    async fn synthesize(
        &self,
        note: &str,
        snippet: &RetrievedSnippet,
        provider: Provider,
        mode: ExecutionMode,
    ) -> Result<RoamingItem> {
        let system = "You connect a note with a related knowledge-base snippet. \
                      Reply with a single JSON object with one field, \"conclusion\", \
                      containing your synthesis.";
        let prompt = format!(
            "Note:\n{note}\n\nRelated snippet (from {}):\n{}",
            snippet.source_file, snippet.content_chunk
        );

        let request = InvocationRequest::new(provider, mode, prompt)
            .with_system(system)
            .expecting_json()
            .with_task(TaskKind::Roaming);

        let value = self
            .gateway
            .invoke_structured(&request, ExpectedShape::Any)
            .await?;

        let conclusion = value["conclusion"].as_str().map(str::to_string).ok_or_else(|| {
            warn!(source = %snippet.source_file, "synthesis answer had no conclusion field");
            GatewayError::MalformedResponse {
                raw: value.to_string(),
            }
        })?;

        Ok(RoamingItem {
            source: snippet.source_file.clone(),
            relevant_text: snippet.content_chunk.clone(),
            conclusion,
        })
    }
}
