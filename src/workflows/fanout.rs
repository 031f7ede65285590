// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Multi-provider audit fan-out
//!
//! Runs the same audit request against N providers concurrently. The batch
//! never fails as a unit: each provider's outcome is captured independently
//! and keyed by provider, so one provider's failure cannot remove or alter
//! another's entry.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use crate::gateway::invoker::ModelGateway;
use crate::gateway::request::{InvocationRequest, Provider};
use crate::parser::audit::{extract_issues, AuditIssue};
use crate::parser::{recover_json, ExpectedShape};

/// Outcome of one provider's audit invocation
#[derive(Debug, Clone, Default)]
pub struct AuditOutcome {
    /// Issues in the order the provider returned them
    pub issues: Vec<AuditIssue>,
    /// Error message, when invocation or parsing failed
    pub error: Option<String>,
    /// Raw model text, kept for diagnostics whenever one was received
    pub raw_response: Option<String>,
}

/// One entry per invoked provider; cross-provider ordering is irrelevant
pub type AuditResults = HashMap<Provider, AuditOutcome>;

/// Coordinates concurrent multi-provider invocations
pub struct FanoutCoordinator {
    gateway: Arc<dyn ModelGateway>,
}

impl FanoutCoordinator {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Audit the same logical request on every given provider concurrently.
    ///
    /// Always returns exactly one entry per provider. A provider that fails
    /// contributes an entry with an empty issue list and its error message.
    pub async fn audit_all(
        &self,
        providers: &[Provider],
        template: &InvocationRequest,
    ) -> AuditResults {
        let invocations = providers.iter().map(|&provider| {
            let request = template.for_provider(provider);
            async move { (provider, self.audit_one(request).await) }
        });

        join_all(invocations).await.into_iter().collect()
    }

    async fn audit_one(&self, request: InvocationRequest) -> AuditOutcome {
        let text = match self.gateway.invoke(&request).await {
            Ok(text) => text,
            Err(err) => {
                warn!(provider = %request.provider, %err, "audit invocation failed");
                return AuditOutcome {
                    error: Some(err.to_string()),
                    ..Default::default()
                };
            }
        };

        let parsed = recover_json(&text, ExpectedShape::List);
        let issues = parsed.ok().as_ref().and_then(extract_issues);

        match issues {
            Some(issues) => AuditOutcome {
                issues,
                error: None,
                raw_response: Some(text),
            },
            None => {
                warn!(provider = %request.provider, "audit response was not a recognizable issue list");
                AuditOutcome {
                    error: Some(format!(
                        "{} returned a response that could not be read as audit issues",
                        request.provider
                    )),
                    raw_response: Some(text),
                    ..Default::default()
                }
            }
        }
    }
}
