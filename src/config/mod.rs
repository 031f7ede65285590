// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Gateway configuration
//!
//! Resolved once at startup; read-only for the life of the process.

pub mod settings;

pub use settings::{
    BackendBase, GatewaySettings, ProviderConfig, ProviderConfigTable, RawProviderSettings,
};
