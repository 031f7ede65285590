// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Notegate - generative-model gateway for a note-processing assistant.
//!
//! This crate is the model-facing core shared by the Notegate UI shells: it
//! routes note text to one of six model providers, directly from the client
//! or through the trusted backend proxy, and turns unreliable model output
//! into typed results.
//!
//! Architecture highlights:
//! - `config`: per-provider settings resolved once at startup, immutable after
//! - `gateway`: the invoker (non-streaming + streaming, retry, failure
//!   classification), the proxy and direct-provider clients, event-line
//!   stream framing
//! - `parser`: multi-stage recovery of JSON from free-text model answers,
//!   plus the audit-issue validator
//! - `workflows`: concurrent multi-provider audit fan-out and the two-phase
//!   retrieval-then-synthesis roaming workflow
//!
//! The UI layers, document ingestion, markdown rendering, and the knowledge
//! base itself are external collaborators and live elsewhere.

pub mod config;
pub mod error;
pub mod gateway;
pub mod parser;
pub mod workflows;

pub use error::{GatewayError, Result};
