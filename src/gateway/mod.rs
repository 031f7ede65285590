// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! The generative-model gateway
//!
//! Abstracts six model providers behind two execution modes (direct from
//! the client, or proxied through the backend) for non-streaming and
//! streaming invocations.

pub mod backend;
pub mod frontend;
pub mod invoker;
pub mod mock;
pub mod request;
pub mod retry;
pub mod stream;

pub use backend::{BackendClient, RetrievedSnippet, SnippetRetriever};
pub use invoker::{Invoker, ModelGateway};
pub use request::{
    ExecutionMode, ImageAttachment, InvocationRequest, Provider, TaskKind, Turn, TurnRole,
    WireShape,
};
pub use retry::RetryPolicy;
pub use stream::{ChunkStream, StreamChunk};
