//! Core data types for the agent loop: run-level config, the task
//! decomposition plan, history records, and the outbound event stream.
//!
//! Grounded in the original's `models/agent.py` dataclasses and
//! `core/agent.py` (`AgentConfig`, `TaskStep`, `AgentStep`), reshaped into
//! plain owned structs in the manner of the teacher's `llm::types` (no
//! builder macros, `impl` blocks for convenience constructors).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::executor::ToolResult;

/// Standalone test-script framework. Only Playwright is implemented; the
/// field exists because the original's wire schema already carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Playwright,
}

impl Default for Framework {
    fn default() -> Self {
        Framework::Playwright
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Typescript,
    Python,
    Javascript,
}

impl Default for Language {
    fn default() -> Self {
        Language::Typescript
    }
}

/// Per-run tunables. The wire-level `AgentRequest` in `api::types` maps
/// onto this; fields the request doesn't expose keep the original's
/// defaults.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub timeout: Duration,
    pub headless: bool,
    pub viewport: (u32, u32),
    pub framework: Framework,
    pub language: Language,
    pub use_boost_prompt: bool,
    pub use_structured_execution: bool,
    pub verify_each_step: bool,
    pub temperature: f32,
    pub http_credentials: Option<(String, String)>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            timeout: Duration::from_secs(300),
            headless: true,
            viewport: (1280, 720),
            framework: Framework::Playwright,
            language: Language::Typescript,
            use_boost_prompt: true,
            use_structured_execution: false,
            verify_each_step: true,
            temperature: 0.0,
            http_credentials: None,
        }
    }
}

/// One item of a decomposed task plan, produced by `decompose_task` when
/// `use_structured_execution` is set.
#[derive(Debug, Clone)]
pub struct TaskStep {
    pub number: u32,
    pub action: String,
    pub target: String,
    pub value: Option<String>,
    pub completed: bool,
}

impl TaskStep {
    pub fn new(number: u32, action: impl Into<String>, target: impl Into<String>, value: Option<String>) -> Self {
        Self {
            number,
            action: action.into(),
            target: target.into(),
            value,
            completed: false,
        }
    }

    /// Render the way the original logs a decomposed plan:
    /// `STEP 1: fill - #search - "laptop"`.
    pub fn describe(&self) -> String {
        match &self.value {
            Some(v) => format!("STEP {}: {} - {} - \"{}\"", self.number, self.action, self.target, v),
            None => format!("STEP {}: {} - {}", self.number, self.action, self.target),
        }
    }
}

/// Append-only record of one loop iteration, consumed by
/// `history::history_to_test_steps`.
#[derive(Debug, Clone)]
pub struct AgentStep {
    pub step_number: u32,
    pub tool_name: Option<String>,
    pub tool_args: Option<Value>,
    pub tool_result: Option<ToolResult>,
    pub error: Option<String>,
}

/// Code-gen IR: one synthesized test-script action. Field names match the
/// wire shape of `/api/generate-code`'s `steps` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl TestStep {
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            action: "navigate".to_string(),
            selector: None,
            value: Some(url.into()),
            expected: None,
        }
    }

    /// Dedup key matching the original's `f"{action}:{selector}:{value}"`.
    pub(crate) fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.action,
            self.selector.as_deref().unwrap_or(""),
            self.value.as_deref().unwrap_or("")
        )
    }
}

/// One outbound SSE-shaped event. `event_type` names the SSE `event:`
/// line; `data` renders the payload.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Session { session_id: String },
    Log { message: String, timestamp: DateTime<Utc> },
    Screenshot { screenshot: String, timestamp: DateTime<Utc> },
    Tool { tool: String, args: Value },
    Code { code: String, timestamp: DateTime<Utc> },
    Error { message: String, timestamp: DateTime<Utc> },
    Complete { message: String, timestamp: DateTime<Utc> },
    BoostedPrompt { prompt: String, timestamp: DateTime<Utc> },
}

impl AgentEvent {
    pub fn log(message: impl Into<String>) -> Self {
        AgentEvent::Log { message: message.into(), timestamp: Utc::now() }
    }

    pub fn screenshot(screenshot: impl Into<String>) -> Self {
        AgentEvent::Screenshot { screenshot: screenshot.into(), timestamp: Utc::now() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent::Error { message: message.into(), timestamp: Utc::now() }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        AgentEvent::Complete { message: message.into(), timestamp: Utc::now() }
    }

    pub fn boosted_prompt(prompt: impl Into<String>) -> Self {
        AgentEvent::BoostedPrompt { prompt: prompt.into(), timestamp: Utc::now() }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::Session { .. } => "session",
            AgentEvent::Log { .. } => "log",
            AgentEvent::Screenshot { .. } => "screenshot",
            AgentEvent::Tool { .. } => "tool",
            AgentEvent::Code { .. } => "code",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Complete { .. } => "complete",
            AgentEvent::BoostedPrompt { .. } => "boosted_prompt",
        }
    }

    pub fn data(&self) -> Value {
        match self {
            AgentEvent::Session { session_id } => serde_json::json!({ "session_id": session_id }),
            AgentEvent::Log { message, timestamp } => serde_json::json!({ "message": message, "timestamp": timestamp }),
            AgentEvent::Screenshot { screenshot, timestamp } => {
                serde_json::json!({ "screenshot": screenshot, "timestamp": timestamp })
            }
            AgentEvent::Tool { tool, args } => serde_json::json!({ "tool": tool, "args": args }),
            AgentEvent::Code { code, timestamp } => serde_json::json!({ "code": code, "timestamp": timestamp }),
            AgentEvent::Error { message, timestamp } => serde_json::json!({ "message": message, "timestamp": timestamp }),
            AgentEvent::Complete { message, timestamp } => serde_json::json!({ "message": message, "timestamp": timestamp }),
            AgentEvent::BoostedPrompt { prompt, timestamp } => serde_json::json!({ "prompt": prompt, "timestamp": timestamp }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_distinguishes_selector_and_value() {
        let a = TestStep { action: "fill".to_string(), selector: Some("#a".to_string()), value: Some("x".to_string()), expected: None };
        let b = TestStep { action: "fill".to_string(), selector: Some("#b".to_string()), value: Some("x".to_string()), expected: None };
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn task_step_describe_includes_value_when_present() {
        let step = TaskStep::new(1, "fill", "#search", Some("laptop".to_string()));
        assert_eq!(step.describe(), "STEP 1: fill - #search - \"laptop\"");
    }
}
