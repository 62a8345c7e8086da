//! Perplexity provider: OpenAI-compatible chat endpoint, simulated tool
//! calls via the injected `TOOL_CALL:`/`ARGUMENTS:` text protocol.
//!
//! Grounded in the original's `llm/perplexity.py` `PerplexityClient`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::text_protocol::{
    format_tools_prompt, looks_like_tool_call, normalize_messages, truncate_conversation,
};
use super::types::{
    token_budget::estimate_tokens, ContentBlock, FinishReason, LlmProvider, LlmRequest,
    LlmResponse, MessageRole, Usage,
};
use super::LlmService;

const BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";

pub struct PerplexityService {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl PerplexityService {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn build_messages(&self, request: &LlmRequest) -> Vec<WireMessage> {
        let mut system_text = request
            .system
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if !request.tools.is_empty() {
            let tools_prompt = format_tools_prompt(&request.tools);
            system_text = if system_text.is_empty() {
                tools_prompt
            } else {
                format!("{system_text}\n\n{tools_prompt}")
            };
        }

        let system_tokens = estimate_tokens(&system_text);
        let normalized = normalize_messages(&request.messages);
        let budgeted = truncate_conversation(normalized, system_tokens);

        let mut wire = Vec::with_capacity(budgeted.len() + 1);
        if !system_text.is_empty() {
            wire.push(WireMessage {
                role: "system".to_string(),
                content: system_text,
            });
        }
        for (role, content) in budgeted {
            let role = match role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System | MessageRole::Tool => "user",
            };
            wire.push(WireMessage {
                role: role.to_string(),
                content,
            });
        }
        wire
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl LlmService for PerplexityService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let wire_messages = self.build_messages(request);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: wire_messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(4096),
        };

        let response = self
            .client
            .post(format!("{BASE_URL}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::network(format!("Perplexity request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::rate_limit("Perplexity rate limit exceeded"));
        }
        if status.is_server_error() {
            return Err(LlmError::server_error(format!(
                "Perplexity server error: {status}"
            )));
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::invalid_request(format!(
                "Perplexity API error: {text}"
            )));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LlmError::auth(
                "Invalid Perplexity API key. Get one at https://www.perplexity.ai/settings/api",
            ));
        }
        if !status.is_success() {
            return Err(LlmError::unknown(format!(
                "Perplexity returned unexpected status {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::unknown(format!("Failed to parse Perplexity response: {e}")))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Ok(LlmResponse {
                content: vec![],
                finish_reason: FinishReason::Error,
                usage: Usage::default(),
            });
        };

        let text = choice.message.content;
        let known_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();

        let (content, finish_reason) = if !request.tools.is_empty()
            && looks_like_tool_call(&text, &known_names)
        {
            let calls = super::text_protocol::extract_tool_calls(&text);
            if calls.is_empty() {
                (vec![ContentBlock::text(text)], FinishReason::Stop)
            } else {
                let mut blocks: Vec<ContentBlock> = calls
                    .into_iter()
                    .map(|c| {
                        ContentBlock::tool_use(uuid::Uuid::new_v4().to_string(), c.name, c.arguments)
                    })
                    .collect();
                let residual_text = strip_tool_call_text(&text);
                if !residual_text.trim().is_empty() {
                    blocks.insert(0, ContentBlock::text(residual_text));
                }
                (blocks, FinishReason::ToolCalls)
            }
        } else {
            (vec![ContentBlock::text(text)], FinishReason::Stop)
        };

        let usage = parsed.usage.map_or(Usage::default(), |u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            ..Usage::default()
        });

        Ok(LlmResponse {
            content,
            finish_reason,
            usage,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        127_000
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Perplexity
    }
}

/// Remove the `TOOL_CALL:`/`ARGUMENTS:` block from the reply text, leaving
/// any leading narration the model produced before it.
fn strip_tool_call_text(text: &str) -> String {
    match text.to_uppercase().find("TOOL_CALL:") {
        Some(idx) => text[..idx].trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tool_call_leaving_narration() {
        let text = "Let me click that.\nTOOL_CALL: click\nARGUMENTS: {\"selector\": \"#a\"}";
        assert_eq!(strip_tool_call_text(text), "Let me click that.");
    }
}
