// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Gateway settings and the per-provider configuration resolver
//!
//! Configuration arrives as environment-provided strings resolved once at
//! startup into an immutable table. Resolution is pure and fails soft:
//! missing fields only make a provider unusable in frontend mode, enforced
//! at invocation time.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::request::Provider;
use crate::gateway::retry::RetryPolicy;

/// Base URL of the local development proxy
pub const DEV_PROXY_BASE: &str = "http://127.0.0.1:8787/api";

/// Cleaned per-provider settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API credential
    pub api_key: Option<String>,
    /// Endpoint base URL, overriding the provider default
    pub endpoint: Option<String>,
    /// Model identifier
    pub model: Option<String>,
}

/// Raw environment-provided strings for one provider, before cleaning
#[derive(Debug, Clone, Default)]
pub struct RawProviderSettings {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Trim whitespace and strip one layer of accidentally-embedded matched
/// quotes; empty results collapse to None.
fn clean(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    let stripped = if (trimmed.starts_with('"') && trimmed.ends_with('"')
        || trimmed.starts_with('\'') && trimmed.ends_with('\''))
        && trimmed.len() >= 2
    {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed
    };

    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Immutable table of resolved provider configurations
///
/// Built once at startup and passed by reference into every invocation,
/// never mutated afterward.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigTable {
    configs: HashMap<Provider, ProviderConfig>,
}

impl ProviderConfigTable {
    /// Resolve raw environment strings into a cleaned table. Pure, no I/O,
    /// idempotent.
    pub fn resolve(raw: impl IntoIterator<Item = (Provider, RawProviderSettings)>) -> Self {
        let configs = raw
            .into_iter()
            .map(|(provider, settings)| {
                (
                    provider,
                    ProviderConfig {
                        api_key: clean(settings.api_key),
                        endpoint: clean(settings.endpoint),
                        model: clean(settings.model),
                    },
                )
            })
            .collect();
        Self { configs }
    }

    /// Get the configuration for a provider; unlisted providers resolve to
    /// an empty configuration.
    pub fn get(&self, provider: Provider) -> ProviderConfig {
        self.configs.get(&provider).cloned().unwrap_or_default()
    }

    /// The fields that would block a frontend-mode call for this provider,
    /// or None when the provider is usable directly.
    ///
    /// Credential and model are always required; the endpoint additionally
    /// for providers without a well-known default.
    pub fn frontend_missing(&self, provider: Provider) -> Option<String> {
        let config = self.get(provider);
        let mut missing = vec![];

        if config.api_key.is_none() {
            missing.push("api key");
        }
        if config.model.is_none() {
            missing.push("model");
        }
        if config.endpoint.is_none() && provider.capabilities().default_endpoint.is_none() {
            missing.push("endpoint");
        }

        if missing.is_empty() {
            None
        } else {
            Some(missing.join(", "))
        }
    }
}

/// Where the backend proxy lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendBase {
    /// Fixed local development proxy
    DevProxy,
    /// Configured external base URL; `/api` is appended
    External(String),
}

/// Process-wide gateway settings, read-only after construction
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Backend proxy base resolution
    pub backend: BackendBase,
    /// Whether the embedding shell is served from a secure origin
    pub secure_context: bool,
    /// Optional timeout applied to every network call; None matches the
    /// historical no-timeout behavior
    pub request_timeout: Option<Duration>,
    /// Retry policy for backend-mode non-streaming calls
    pub retry: RetryPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            backend: BackendBase::DevProxy,
            secure_context: false,
            request_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewaySettings {
    /// Resolve the backend proxy base URL.
    ///
    /// External bases are defensively trimmed of embedded quote characters
    /// and trailing slashes before the fixed `/api` suffix is appended.
    pub fn backend_base_url(&self) -> String {
        match &self.backend {
            BackendBase::DevProxy => DEV_PROXY_BASE.to_string(),
            BackendBase::External(base) => {
                let cleaned = base.trim().trim_matches(['"', '\'']).trim_end_matches('/');
                format!("{cleaned}/api")
            }
        }
    }
}
