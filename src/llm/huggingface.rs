//! HuggingFace Inference API provider: chat-template prompt completion,
//! reusing the text-protocol parser for tool calls.
//!
//! Grounded in the original's `llm/huggingface.py` `HuggingFaceClient`,
//! specifically its Mistral/Llama `<s>[INST] ... [/INST]` formatting and its
//! `503` "model is loading" handling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::error::LlmError;
use super::text_protocol::{extract_tool_calls, format_tools_prompt, looks_like_tool_call};
use super::types::{ContentBlock, FinishReason, LlmProvider, LlmRequest, LlmResponse, MessageRole, Usage};
use super::LlmService;

const BASE_URL: &str = "https://api-inference.huggingface.co/models";
const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.3";

pub struct HuggingFaceService {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl HuggingFaceService {
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

    /// Format the conversation as a single Mistral/Llama-style prompt,
    /// `<s>[INST] system + first user [/INST] assistant</s>[INST] user [/INST]...`,
    /// matching `_format_prompt`.
    fn format_prompt(&self, request: &LlmRequest) -> String {
        let mut system_content = request
            .system
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if !request.tools.is_empty() {
            let tools_prompt = format_tools_prompt(&request.tools);
            system_content = if system_content.is_empty() {
                tools_prompt
            } else {
                format!("{system_content}\n\n{tools_prompt}")
            };
        }

        let mut parts = Vec::new();
        let mut first_user_seen = false;

        for msg in &request.messages {
            match msg.role {
                MessageRole::System => continue,
                MessageRole::User => {
                    let content = text_of(msg);
                    if !first_user_seen {
                        first_user_seen = true;
                        if system_content.is_empty() {
                            parts.push(format!("<s>[INST] {content} [/INST]"));
                        } else {
                            parts.push(format!("<s>[INST] {system_content}\n\n{content} [/INST]"));
                        }
                    } else {
                        parts.push(format!("[INST] {content} [/INST]"));
                    }
                }
                MessageRole::Assistant => {
                    let mut text = text_of(msg);
                    for block in &msg.content {
                        if let ContentBlock::ToolUse { name, input, .. } = block {
                            text.push_str(&format!(
                                "\nTOOL_CALL: {name}\nARGUMENTS: {input}"
                            ));
                        }
                    }
                    parts.push(format!("{text}</s>"));
                }
                MessageRole::Tool => {
                    for block in &msg.content {
                        if let ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } = block
                        {
                            parts.push(format!(
                                "[INST] Tool '{tool_use_id}' returned: {content} [/INST]"
                            ));
                        }
                    }
                }
            }
        }

        if !first_user_seen && !system_content.is_empty() {
            parts.insert(0, format!("<s>[INST] {system_content} [/INST]"));
        }

        parts.join("")
    }
}

fn text_of(msg: &super::types::LlmMessage) -> String {
    msg.content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Serialize)]
struct Parameters {
    temperature: f32,
    max_new_tokens: u32,
    return_full_text: bool,
    do_sample: bool,
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: Parameters,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    List(Vec<GeneratedText>),
    Single(GeneratedText),
}

#[derive(Debug, Deserialize, Default)]
struct GeneratedText {
    #[serde(default)]
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    estimated_time: Option<Value>,
}

#[async_trait]
impl LlmService for HuggingFaceService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let prompt = self.format_prompt(request);
        let body = InferenceRequest {
            inputs: prompt,
            parameters: Parameters {
                temperature: request.temperature,
                max_new_tokens: request.max_tokens.unwrap_or(4096),
                return_full_text: false,
                do_sample: request.temperature > 0.0,
            },
        };

        let response = self
            .client
            .post(format!("{BASE_URL}/{}", self.model))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::network(format!("HuggingFace request failed: {e}")))?;

        let status = response.status();

        if status == reqwest::StatusCode::BAD_REQUEST {
            let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: None,
                estimated_time: None,
            });
            return Err(LlmError::invalid_request(format!(
                "HuggingFace API error: {}",
                body.error.unwrap_or_else(|| "Bad request".to_string())
            )));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::auth(
                "Invalid HuggingFace API token. Get one at https://huggingface.co/settings/tokens",
            ));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::auth(
                "Access denied. This model may require accepting terms at huggingface.co or a Pro subscription.",
            ));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::invalid_request(format!(
                "Model '{}' not found. Check the model name or try '{DEFAULT_MODEL}'",
                self.model
            )));
        }
        if status.as_u16() == 429 {
            return Err(LlmError::rate_limit(
                "HuggingFace rate limit exceeded. Please wait and try again.",
            ));
        }
        if status.as_u16() == 503 {
            let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: None,
                estimated_time: None,
            });
            let estimated = body
                .estimated_time
                .map_or_else(|| "unknown".to_string(), |v| v.to_string());
            let retry_after = body
                .estimated_time
                .as_ref()
                .and_then(Value::as_f64)
                .map(Duration::from_secs_f64);
            let mut err = LlmError::server_error(format!(
                "Model is loading. Estimated time: {estimated}s. Please retry shortly."
            ));
            if let Some(retry_after) = retry_after {
                err = err.with_retry_after(retry_after);
            }
            return Err(err);
        }
        if status.is_server_error() {
            return Err(LlmError::server_error(format!(
                "HuggingFace server error: {status}"
            )));
        }
        if !status.is_success() {
            return Err(LlmError::unknown(format!(
                "HuggingFace returned unexpected status {status}"
            )));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| LlmError::unknown(format!("Failed to parse HuggingFace response: {e}")))?;

        let generated = match parsed {
            InferenceResponse::List(mut list) => list.pop().unwrap_or_default(),
            InferenceResponse::Single(g) => g,
        };

        let text = generated.generated_text;
        let known_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();

        let (content, finish_reason) = if !request.tools.is_empty()
            && looks_like_tool_call(&text, &known_names)
        {
            let calls = extract_tool_calls(&text);
            if calls.is_empty() {
                (vec![ContentBlock::text(text)], FinishReason::Stop)
            } else {
                let blocks = calls
                    .into_iter()
                    .map(|c| {
                        ContentBlock::tool_use(uuid::Uuid::new_v4().to_string(), c.name, c.arguments)
                    })
                    .collect();
                (blocks, FinishReason::ToolCalls)
            }
        } else {
            (vec![ContentBlock::text(text)], FinishReason::Stop)
        };

        Ok(LlmResponse {
            content,
            finish_reason,
            usage: Usage::default(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        32_000
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::HuggingFace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{LlmMessage, SystemContent};

    #[test]
    fn formats_first_user_turn_with_system_block() {
        let service = HuggingFaceService::new("key", None);
        let request = LlmRequest {
            system: vec![SystemContent::new("You are helpful.")],
            messages: vec![LlmMessage::user("Click the button")],
            tools: vec![],
            max_tokens: None,
            temperature: 0.0,
        };
        let prompt = service.format_prompt(&request);
        assert!(prompt.starts_with("<s>[INST] You are helpful."));
        assert!(prompt.contains("Click the button [/INST]"));
    }
}
