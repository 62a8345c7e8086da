//! Google Gemini provider: native function calling.
//!
//! Grounded in the original's `llm/gemini.py` `GeminiClient`, including its
//! `generationConfig.seed = 42` determinism trick for low-temperature calls.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{
    ContentBlock, FinishReason, LlmProvider, LlmRequest, LlmResponse, MessageRole, Usage,
};
use super::{LlmError, LlmService};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiService {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiService {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn translate_request(&self, request: &LlmRequest) -> GeminiRequest {
        let system_instruction = if request.system.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text {
                    text: request
                        .system
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                }],
            })
        };

        let mut contents = Vec::new();
        for msg in &request.messages {
            match msg.role {
                MessageRole::System => continue,
                MessageRole::User => {
                    let parts = text_parts(msg);
                    if !parts.is_empty() {
                        contents.push(GeminiContent {
                            role: Some("user".to_string()),
                            parts,
                        });
                    }
                }
                MessageRole::Assistant => {
                    let mut parts = text_parts(msg);
                    for block in &msg.content {
                        if let ContentBlock::ToolUse { name, input, .. } = block {
                            parts.push(GeminiPart::FunctionCall {
                                function_call: GeminiFunctionCall {
                                    name: name.clone(),
                                    args: input.clone(),
                                },
                            });
                        }
                    }
                    if !parts.is_empty() {
                        contents.push(GeminiContent {
                            role: Some("model".to_string()),
                            parts,
                        });
                    }
                }
                MessageRole::Tool => {
                    let mut parts = Vec::new();
                    for block in &msg.content {
                        if let ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } = block
                        {
                            let response = serde_json::from_str::<serde_json::Value>(content)
                                .unwrap_or_else(|_| {
                                    serde_json::json!({ "result": content })
                                });
                            parts.push(GeminiPart::FunctionResponse {
                                function_response: GeminiFunctionResponse {
                                    name: tool_use_id.clone(),
                                    response,
                                },
                            });
                        }
                    }
                    if !parts.is_empty() {
                        contents.push(GeminiContent {
                            role: Some("function".to_string()),
                            parts,
                        });
                    }
                }
            }
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    })
                    .collect(),
            }])
        };
        let tool_config = tools.as_ref().map(|_| GeminiToolConfig {
            function_calling_config: GeminiFunctionCallingConfig {
                mode: "AUTO".to_string(),
            },
        });

        let mut generation_config = GeminiGenerationConfig {
            temperature: Some(request.temperature),
            max_output_tokens: request.max_tokens.map(|t| t as i32),
            seed: None,
        };
        if request.temperature < 0.1 {
            generation_config.seed = Some(42);
        }

        GeminiRequest {
            contents,
            system_instruction,
            tools,
            tool_config,
            generation_config: Some(generation_config),
        }
    }

    fn normalize_response(resp: GeminiResponse) -> Result<LlmResponse, LlmError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No candidates in Gemini response"))?;

        let mut content = Vec::new();
        let mut has_tool_call = false;
        for part in candidate.content.parts {
            match part {
                GeminiPart::Text { text } => {
                    if !text.is_empty() {
                        content.push(ContentBlock::Text { text });
                    }
                }
                GeminiPart::FunctionCall { function_call } => {
                    has_tool_call = true;
                    content.push(ContentBlock::ToolUse {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: function_call.name,
                        input: function_call.args,
                    });
                }
                GeminiPart::FunctionResponse { .. } => {}
            }
        }

        let raw_finish = candidate.finish_reason.unwrap_or_else(|| "STOP".to_string());
        let finish_reason = match raw_finish.as_str() {
            "STOP" if has_tool_call => FinishReason::ToolCalls,
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            _ => FinishReason::Error,
        };

        let usage = resp.usage_metadata.map_or(Usage::default(), |u| Usage {
            input_tokens: u64::from(u.prompt_token_count),
            output_tokens: u64::from(u.candidates_token_count),
            ..Usage::default()
        });

        Ok(LlmResponse {
            content,
            finish_reason,
            usage,
        })
    }
}

fn text_parts(msg: &super::types::LlmMessage) -> Vec<GeminiPart> {
    msg.content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(GeminiPart::Text { text: text.clone() }),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let gemini_request = self.translate_request(request);
        let url = format!("{BASE_URL}/models/{}:generateContent", self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Gemini request timed out: {e}"))
                } else {
                    LlmError::network(format!("Gemini request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read Gemini response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map_or_else(|_| body.clone(), |e| e.error.message);
            return Err(match status.as_u16() {
                400 => LlmError::invalid_request(format!(
                    "Gemini API error: {message}. Please check your API key is valid."
                )),
                401 => LlmError::auth(format!(
                    "Invalid Gemini API key. Get one at https://aistudio.google.com/apikey ({message})"
                )),
                403 => LlmError::auth(format!(
                    "API key does not have access to this model. {message}"
                )),
                429 => LlmError::rate_limit(format!("Gemini rate limit exceeded: {message}")),
                500..=599 => LlmError::server_error(format!("Gemini server error: {message}")),
                _ => LlmError::unknown(format!("Gemini returned HTTP {status}: {message}")),
            });
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::unknown(format!("Failed to parse Gemini response: {e}")))?;

        Self::normalize_response(gemini_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        1_048_576
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Gemini
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GeminiToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolConfig {
    function_calling_config: GeminiFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFunctionCallingConfig {
    mode: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{LlmMessage, SystemContent};

    #[test]
    fn low_temperature_sets_deterministic_seed() {
        let service = GeminiService::new("key", None);
        let request = LlmRequest {
            system: vec![SystemContent::new("sys")],
            messages: vec![LlmMessage::user("hi")],
            tools: vec![],
            max_tokens: None,
            temperature: 0.0,
        };
        let translated = service.translate_request(&request);
        assert_eq!(translated.generation_config.unwrap().seed, Some(42));
    }

    #[test]
    fn higher_temperature_leaves_seed_unset() {
        let service = GeminiService::new("key", None);
        let request = LlmRequest {
            system: vec![],
            messages: vec![LlmMessage::user("hi")],
            tools: vec![],
            max_tokens: None,
            temperature: 0.7,
        };
        let translated = service.translate_request(&request);
        assert_eq!(translated.generation_config.unwrap().seed, None);
    }
}
