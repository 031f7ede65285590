// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Invocation request types and the provider capability table
//!
//! Defines the closed provider set, execution modes, and the immutable
//! request value built per user action.

use serde::{Deserialize, Serialize};

/// The closed set of backing model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini (native wire shape)
    Gemini,
    /// OpenAI
    OpenAi,
    /// DeepSeek
    DeepSeek,
    /// Alibaba DashScope (OpenAI-compatible)
    Ali,
    /// Dedicated OCR deployment (OpenAI-compatible, endpoint must be configured)
    // The proxy keys this one with its original mixed casing.
    #[serde(rename = "depOCR")]
    DepOcr,
    /// ByteDance Doubao (Volcengine Ark)
    Doubao,
}

/// How a provider's API is shaped on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// Gemini's native `generateContent` protocol
    NativeGemini,
    /// OpenAI `chat/completions` compatible protocol
    OpenAiCompatible,
}

/// Static capability record for one provider
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether incremental responses are supported
    pub supports_streaming: bool,
    /// Whether image attachments are accepted
    pub supports_images: bool,
    /// Wire protocol shape
    pub wire: WireShape,
    /// Well-known endpoint, if the provider has one
    pub default_endpoint: Option<&'static str>,
}

impl Provider {
    /// All providers, in display order
    pub const ALL: [Provider; 6] = [
        Provider::Gemini,
        Provider::OpenAi,
        Provider::DeepSeek,
        Provider::Ali,
        Provider::DepOcr,
        Provider::Doubao,
    ];

    /// Name used in proxy request bodies and result maps
    pub fn wire_name(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Ali => "ali",
            Provider::DepOcr => "depOCR",
            Provider::Doubao => "doubao",
        }
    }

    /// Look up the static capability record for this provider
    pub fn capabilities(self) -> Capabilities {
        match self {
            Provider::Gemini => Capabilities {
                supports_streaming: true,
                supports_images: true,
                wire: WireShape::NativeGemini,
                default_endpoint: Some("https://generativelanguage.googleapis.com/v1beta"),
            },
            Provider::OpenAi => Capabilities {
                supports_streaming: true,
                supports_images: true,
                wire: WireShape::OpenAiCompatible,
                default_endpoint: Some("https://api.openai.com/v1"),
            },
            Provider::DeepSeek => Capabilities {
                supports_streaming: true,
                supports_images: false,
                wire: WireShape::OpenAiCompatible,
                default_endpoint: Some("https://api.deepseek.com/v1"),
            },
            Provider::Ali => Capabilities {
                supports_streaming: true,
                supports_images: true,
                wire: WireShape::OpenAiCompatible,
                default_endpoint: Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            },
            Provider::DepOcr => Capabilities {
                supports_streaming: false,
                supports_images: true,
                wire: WireShape::OpenAiCompatible,
                // Self-hosted deployment, endpoint comes from configuration
                default_endpoint: None,
            },
            Provider::Doubao => Capabilities {
                supports_streaming: true,
                supports_images: true,
                wire: WireShape::OpenAiCompatible,
                default_endpoint: Some("https://ark.cn-beijing.volces.com/api/v3"),
            },
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Whether calls go straight to the provider or through the backend proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Relay through the trusted backend proxy
    Backend,
    /// Direct call from the client with locally held credentials
    Frontend,
}

/// High-level task the invocation serves; forwarded to the proxy as `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Notes,
    Audit,
    Roaming,
    Writing,
    Ocr,
    None,
}

/// Role of one prior conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// A base64 image attachment inlined into the user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Media type, e.g. "image/png"
    pub media_type: String,
    /// Base64-encoded image bytes
    pub data: String,
}

/// One model invocation, immutable once issued
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Target provider
    pub provider: Provider,
    /// Direct or proxied execution
    pub mode: ExecutionMode,
    /// System instruction, if any
    pub system_instruction: Option<String>,
    /// The user prompt
    pub user_prompt: String,
    /// Whether the model is asked for a JSON answer
    pub want_json: bool,
    /// Task tag forwarded to the proxy
    pub task: TaskKind,
    /// Prior turns, oldest first
    pub history: Vec<Turn>,
    /// Image attachments for multimodal providers
    pub images: Vec<ImageAttachment>,
    /// Thinking budget forwarded on streaming proxy calls
    pub thinking_budget: Option<u32>,
}

impl InvocationRequest {
    /// Create a new request with defaults for the optional fields
    pub fn new(provider: Provider, mode: ExecutionMode, user_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            mode,
            system_instruction: None,
            user_prompt: user_prompt.into(),
            want_json: false,
            task: TaskKind::None,
            history: vec![],
            images: vec![],
            thinking_budget: None,
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    /// Ask the model for a JSON answer
    pub fn expecting_json(mut self) -> Self {
        self.want_json = true;
        self
    }

    /// Set the task tag
    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = task;
        self
    }

    /// Set prior conversation turns
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Attach images
    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    /// Set the thinking budget for streaming proxy calls
    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    /// Re-target the same logical request at another provider
    pub fn for_provider(&self, provider: Provider) -> Self {
        let mut request = self.clone();
        request.provider = provider;
        request
    }
}
