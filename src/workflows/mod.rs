// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Multi-call workflows built on the gateway
//!
//! Fan-out auditing (independent per-provider outcomes) and two-phase
//! roaming (all-or-nothing synthesis over retrieved snippets).

pub mod fanout;
pub mod roaming;

pub use fanout::{AuditOutcome, AuditResults, FanoutCoordinator};
pub use roaming::{RoamingItem, RoamingWorkflow, ROAMING_TOP_K};
