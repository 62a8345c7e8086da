//! Common types for LLM interactions, plus the token-budgeting constants
//! shared by every provider's request translation.

use serde::{Deserialize, Serialize};

/// Request passed to [`super::LlmService::complete`].
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Vec<SystemContent>,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

/// System prompt content.
#[derive(Debug, Clone)]
pub struct SystemContent {
    pub text: String,
    pub cache: bool,
}

impl SystemContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: false,
        }
    }

    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: true,
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl LlmMessage {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Message role. Widened from the two-party (user/assistant) shape of a
/// pure chat API to the four roles the agent loop's history actually needs:
/// `system` messages are folded into the provider's native system channel
/// when one exists (Gemini) or kept inline as a leading message when it
/// doesn't (Perplexity, HuggingFace); `tool` carries a `ToolResult` block
/// back to providers that don't have first-class tool-result messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// Image source for multimodal screenshots sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
}

/// Tool definition exposed to the model.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

/// Response returned from [`super::LlmService::complete`].
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl LlmResponse {
    /// Extract all tool-use requests from the response.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// Concatenated text content from the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

/// Token usage for a single completion.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl Usage {
    pub fn context_window_used(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_tokens
            + self.cache_read_tokens
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// The three supported wire providers. Note the HuggingFace wire value is
/// `"hf"`, not `"huggingface"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Perplexity,
    #[serde(rename = "hf")]
    HuggingFace,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::Perplexity => "perplexity",
            LlmProvider::HuggingFace => "hf",
        }
    }
}

/// Token-budgeting constants shared by every provider, grounded in the
/// original implementation's `~4 chars/token` heuristic.
pub mod token_budget {
    /// Rough chars-per-token ratio used for all budgeting estimates.
    pub const CHARS_PER_TOKEN: usize = 4;
    /// Cap applied to any single message before it enters a request.
    pub const MAX_MESSAGE_TOKENS: usize = 5_000;
    /// Cap applied to a single tool result's content.
    pub const MAX_TOOL_RESULT_TOKENS: usize = 3_750;
    /// Cap on the whole conversation; oldest non-system messages are
    /// evicted first when a request would exceed this.
    pub const MAX_INPUT_TOKENS: usize = 80_000;

    /// Estimate the token count of a string using the fixed chars/token
    /// ratio. Not exact, but cheap and good enough for eviction decisions.
    #[must_use]
    pub fn estimate_tokens(text: &str) -> usize {
        text.len().div_ceil(CHARS_PER_TOKEN)
    }

    /// Truncate `text` to at most `max_tokens` worth of characters,
    /// appending a marker so the model knows content was cut.
    #[must_use]
    pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
        let max_chars = max_tokens * CHARS_PER_TOKEN;
        if text.len() <= max_chars {
            return text.to_string();
        }
        let mut truncated = String::with_capacity(max_chars + 32);
        truncated.push_str(&text[..max_chars]);
        truncated.push_str("\n...[truncated]");
        truncated
    }
}
