//! The agent loop itself: launch, task preparation, the observe/think/act
//! cycle, code generation, and teardown.
//!
//! Grounded in the original's `Agent.run` async generator (`core/agent.py`),
//! reshaped as a method consuming `self` and pushing [`AgentEvent`]s onto an
//! unbounded channel rather than yielding dicts — the same "drive to
//! completion, emit events along the way" shape the teacher's
//! `RuntimeManager` uses for its own SSE-backed sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::codegen::CodeGenerator;
use crate::llm::{with_retry, ContentBlock, LlmMessage, LlmRequest, LlmService, MessageRole, RetryPolicy, SystemContent};
use crate::session::Session;
use crate::tools::browser::adapter::{BrowserAdapter, LaunchConfig};
use crate::tools::executor::{ToolExecutor, ToolResult};
use crate::tools::schemas::ToolRegistry;

use super::history::history_to_test_steps;
use super::prompts::{boost_request_prompt, format_boosted_task, parse_decomposition, task_decomposition_prompt, SYSTEM_PROMPT};
use super::types::{AgentConfig, AgentEvent, AgentStep, TaskStep};

const ACTIONABLE_TOOLS: &[&str] = &["click", "fill", "submit", "press_key", "check", "select_option"];
const MESSAGE_WINDOW: usize = 12;
const STALL_THRESHOLD: u32 = 3;
const NO_TOOL_CALL_THRESHOLD: u32 = 5;

enum Termination {
    Completed,
    MaxSteps(u32),
    StoppedByUser,
    Stalled,
}

impl Termination {
    fn message(&self) -> String {
        match self {
            Termination::Completed => "Task completed successfully".to_string(),
            Termination::MaxSteps(n) => format!("Reached maximum steps ({n})"),
            Termination::StoppedByUser => "Agent stopped by user".to_string(),
            Termination::Stalled => "Agent stopped".to_string(),
        }
    }
}

pub struct AgentLoop {
    llm: Arc<dyn LlmService>,
    config: AgentConfig,
    session: Option<Arc<Session>>,
    task: String,
    url: String,
}

impl AgentLoop {
    pub fn new(llm: Arc<dyn LlmService>, config: AgentConfig, session: Option<Arc<Session>>, task: String, url: String) -> Self {
        Self { llm, config, session, task, url }
    }

    fn should_stop(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.should_stop())
    }

    /// One-shot, toolless completion used for decomposition/boosting.
    async fn one_shot(&self, prompt: String, temperature: f32) -> Result<String, crate::llm::LlmError> {
        let request = LlmRequest {
            system: vec![],
            messages: vec![LlmMessage::user(prompt)],
            tools: vec![],
            max_tokens: Some(2048),
            temperature,
        };
        let response = with_retry(self.llm.as_ref(), &request, RetryPolicy::default()).await?;
        Ok(response.text())
    }

    /// Phase 2: structured decomposition (if enabled) falling back to
    /// boosting (if enabled and decomposition didn't produce steps), else
    /// the raw task text. Returns the text to open the conversation with
    /// plus the decomposed steps (empty if none).
    async fn prepare_task(&self, send: &impl Fn(AgentEvent)) -> (String, Vec<TaskStep>) {
        let mut structured_prompt = String::new();
        let mut task_steps = Vec::new();

        if self.config.use_structured_execution {
            send(AgentEvent::log("Decomposing task into structured steps..."));
            match self.one_shot(task_decomposition_prompt(&self.task, &self.url), 0.0).await {
                Ok(text) => {
                    let (steps, done_criteria) = parse_decomposition(&text);
                    if steps.is_empty() {
                        send(AgentEvent::log("Could not decompose task, using standard execution"));
                    } else {
                        let steps_text = steps.iter().map(TaskStep::describe).collect::<Vec<_>>().join("\n");
                        send(AgentEvent::log(format!("Task decomposed into {} steps:\n{steps_text}", steps.len())));
                        let done_criteria = done_criteria.unwrap_or_else(|| "all steps executed".to_string());
                        send(AgentEvent::log(format!("Completion criteria: {done_criteria}")));
                        structured_prompt = format!(
                            "\n## STRUCTURED TASK PLAN (follow these steps IN ORDER):\n{steps_text}\n\n## COMPLETION CRITERIA:\n{done_criteria}\n\nIMPORTANT: Execute steps in order. After each step, verify it succeeded before moving to the next.\nCurrent step: STEP 1\n"
                        );
                        task_steps = steps;
                    }
                }
                Err(err) => {
                    send(AgentEvent::log(format!("Task decomposition failed: {}", err.message)));
                }
            }
        }

        let boosted_task = if self.config.use_boost_prompt && structured_prompt.is_empty() {
            send(AgentEvent::log("Enhancing task with LLM..."));
            match self.one_shot(boost_request_prompt(&self.task, &self.url), 0.1).await {
                Ok(enhancement) if !enhancement.trim().is_empty() => {
                    let boosted = format_boosted_task(&self.task, &enhancement);
                    send(AgentEvent::boosted_prompt(boosted.clone()));
                    boosted
                }
                _ => self.task.clone(),
            }
        } else {
            self.task.clone()
        };

        let final_task = if !structured_prompt.is_empty() {
            format!("{}\n{structured_prompt}", self.task)
        } else {
            boosted_task
        };

        (final_task, task_steps)
    }

    /// Drive the run to completion, sending every [`AgentEvent`] to `tx`.
    /// Never panics; all failure modes resolve to an `error`/`complete`
    /// event pair so the SSE stream always terminates cleanly.
    pub async fn run(self, tx: UnboundedSender<AgentEvent>) {
        let send = |event: AgentEvent| {
            let _ = tx.send(event);
        };

        send(AgentEvent::log(format!("Starting agent for task: {}", self.task)));
        send(AgentEvent::log(format!("Target URL: {}", self.url)));

        let launch_config = LaunchConfig {
            headless: self.config.headless,
            viewport_width: self.config.viewport.0,
            viewport_height: self.config.viewport.1,
            http_credentials: self.config.http_credentials.clone(),
            ..Default::default()
        };

        let adapter = match BrowserAdapter::launch(launch_config).await {
            Ok(adapter) => Arc::new(adapter),
            Err(err) => {
                send(AgentEvent::error(format!("Agent error: failed to launch browser: {err}")));
                send(AgentEvent::complete(Termination::Stalled.message()));
                return;
            }
        };
        send(AgentEvent::log("Browser launched successfully"));

        let executor = ToolExecutor::new(adapter.clone());
        let tool_registry = ToolRegistry::new();

        send(AgentEvent::log(format!("Navigating to {}...", self.url)));
        let nav = executor.execute("navigate", json!({ "url": self.url })).await;
        let title = nav.fields.get("title").and_then(Value::as_str).unwrap_or("Unknown");
        send(AgentEvent::log(format!("Page loaded: {title}")));

        let shot = executor.execute("screenshot", json!({})).await;
        if let Some(s) = shot.fields.get("screenshot").and_then(Value::as_str) {
            send(AgentEvent::screenshot(s.to_string()));
        }

        let (final_task, mut task_steps) = self.prepare_task(&send).await;
        let mut step_cursor: usize = 0;

        let mut messages = vec![LlmMessage::user(format!(
            "{}\n\nI have already navigated to {}. The page is loaded.\n\nStart executing the task immediately. Be efficient and follow the steps in order.",
            final_task, self.url
        ))];

        let mut history: Vec<AgentStep> = Vec::new();
        let tool_defs = tool_registry.as_llm_tools();
        let mut stuck_count: u32 = 0;
        let mut last_call_key: Option<String> = None;
        let mut no_tool_count: u32 = 0;

        let mut termination = Termination::MaxSteps(self.config.max_steps);

        'steps: for step_count in 1..=self.config.max_steps {
            if self.should_stop() {
                termination = Termination::StoppedByUser;
                break;
            }

            send(AgentEvent::log(format!("--- Step {step_count} ---")));

            let request = LlmRequest {
                system: vec![SystemContent::cached(SYSTEM_PROMPT.to_string())],
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: Some(4096),
                temperature: self.config.temperature,
            };

            let response = match with_retry(self.llm.as_ref(), &request, RetryPolicy::default()).await {
                Ok(response) => response,
                Err(err) => {
                    send(AgentEvent::error(format!("LLM error: {}", err.message)));
                    termination = Termination::Stalled;
                    break;
                }
            };

            let response_text = response.text();
            if !response_text.is_empty() {
                let preview: String = response_text.chars().take(500).collect();
                send(AgentEvent::log(format!("Agent: {preview}")));
            }

            if response.has_tool_use() {
                no_tool_count = 0;

                let mut seen: HashSet<String> = HashSet::new();
                let mut unique_calls = Vec::new();
                for (id, name, input) in response.tool_uses() {
                    let key = format!("{name}:{}", canonical_args(input));
                    if seen.insert(key) {
                        unique_calls.push((id.to_string(), name.to_string(), input.clone()));
                    }
                }

                if unique_calls.len() == 1 {
                    let current_key = format!("{}:{}", unique_calls[0].1, canonical_args(&unique_calls[0].2));
                    if last_call_key.as_deref() == Some(current_key.as_str()) {
                        stuck_count += 1;
                        if stuck_count >= STALL_THRESHOLD {
                            send(AgentEvent::log("Agent repeating same action - attempting recovery"));
                            messages.push(LlmMessage::user(
                                "You are repeating the same action. This isn't working. Try a DIFFERENT approach or use a different tool/selector.",
                            ));
                            stuck_count = 0;
                            last_call_key = None;
                            prune_messages(&mut messages);
                            continue 'steps;
                        }
                    } else {
                        stuck_count = 0;
                    }
                    last_call_key = Some(current_key);
                }

                let mut assistant_content = Vec::new();
                if !response_text.is_empty() {
                    assistant_content.push(ContentBlock::text(response_text.clone()));
                }
                for (id, name, input) in &unique_calls {
                    assistant_content.push(ContentBlock::tool_use(id.clone(), name.clone(), input.clone()));
                }
                messages.push(LlmMessage::assistant(assistant_content));

                for (id, name, args) in unique_calls {
                    send(AgentEvent::Tool { tool: name.clone(), args: args.clone() });
                    send(AgentEvent::log(format!("Executing: {name}({args})")));

                    let result = executor.execute(&name, args.clone()).await;

                    let mut agent_step = AgentStep {
                        step_number: step_count,
                        tool_name: Some(name.clone()),
                        tool_args: Some(args.clone()),
                        tool_result: Some(result.clone()),
                        error: None,
                    };

                    if result.success {
                        send(AgentEvent::log(format!("Result: Success - {}", summarize_result(&result))));

                        if let Some(current) = task_steps.get_mut(step_cursor) {
                            if step_matches(current, &name, &args) {
                                current.completed = true;
                                step_cursor += 1;
                                let remaining = task_steps.len() - step_cursor;
                                send(AgentEvent::log(format!("Step {} completed. {remaining} steps remaining.", current.number)));
                                if let Some(next) = task_steps.get(step_cursor) {
                                    messages.push(LlmMessage::user(format!(
                                        "Step {} completed. Now execute STEP {}: {} - {}{}",
                                        current.number,
                                        next.number,
                                        next.action,
                                        next.target,
                                        next.value.as_deref().map(|v| format!(" - \"{v}\"")).unwrap_or_default()
                                    )));
                                }
                            }
                        }

                        if ToolExecutor::likely_mutates_dom(&name) {
                            let shot = executor.execute("screenshot", json!({})).await;
                            if let Some(s) = shot.fields.get("screenshot").and_then(Value::as_str) {
                                agent_step.tool_result = Some(result.clone());
                                send(AgentEvent::screenshot(s.to_string()));
                            }
                        }
                    } else {
                        let error = result.error.clone().unwrap_or_else(|| "Unknown error".to_string());
                        agent_step.error = Some(error.clone());
                        send(AgentEvent::log(format!("Result: Failed - {error}")));
                    }

                    let result_json = serde_json::to_string(&result).unwrap_or_default();
                    messages.push(LlmMessage::new(
                        MessageRole::Tool,
                        vec![ContentBlock::tool_result(id, result_json, !result.success)],
                    ));

                    history.push(agent_step);
                    prune_messages(&mut messages);
                }
            } else {
                no_tool_count += 1;
                last_call_key = None;

                if no_tool_count >= NO_TOOL_CALL_THRESHOLD {
                    send(AgentEvent::error("Agent appears stuck - no tool calls for 5 consecutive turns"));
                    termination = Termination::Stalled;
                    break;
                }

                messages.push(LlmMessage::assistant(vec![ContentBlock::text(response_text.clone())]));

                let content_stripped = response_text.trim().to_uppercase();
                let is_task_complete =
                    content_stripped == "TASK_COMPLETE" || (content_stripped.starts_with("TASK_COMPLETE") && content_stripped.len() < 50);

                if is_task_complete {
                    let has_actionable_steps = history
                        .iter()
                        .any(|s| s.error.is_none() && s.tool_name.as_deref().is_some_and(|n| ACTIONABLE_TOOLS.contains(&n)));

                    if has_actionable_steps {
                        send(AgentEvent::log("Agent marked task as complete"));
                        termination = Termination::Completed;
                        break;
                    }

                    send(AgentEvent::log("Agent tried to complete but no actionable steps performed - continuing"));
                    messages.push(LlmMessage::user(
                        "You have NOT completed the task yet. You only searched/viewed but didn't perform the actual action (e.g. clicking 'Add to Cart', submitting a form, etc.). Continue with the task!",
                    ));
                } else if content_stripped.contains("TASK_COMPLETE") {
                    send(AgentEvent::log("Task completion rejected - mixed with other content, continuing"));
                    messages.push(LlmMessage::user(
                        "Do not mix TASK_COMPLETE with analysis. If the task is done, respond ONLY with 'TASK_COMPLETE'. If not done, continue executing actions.",
                    ));
                } else {
                    messages.push(LlmMessage::user("Continue executing the task. What is the next action?"));
                }

                prune_messages(&mut messages);
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let test_steps = history_to_test_steps(&history, &self.url);
        let (code, _filename) = CodeGenerator::generate(&test_steps, self.config.framework, self.config.language);
        send(AgentEvent::Code { code, timestamp: chrono::Utc::now() });

        send(AgentEvent::complete(termination.message()));

        adapter.close().await;
        send(AgentEvent::log("Browser closed"));
    }
}

/// Canonical JSON for tool-call dedup/loop-detection keys: stable field
/// ordering so `{"a":1,"b":2}` and `{"b":2,"a":1}` compare equal.
fn canonical_args(value: &Value) -> String {
    fn sort_keys(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted = serde_json::Map::new();
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (key, val) in entries {
                    sorted.insert(key.clone(), sort_keys(val));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
            other => other.clone(),
        }
    }
    sort_keys(value).to_string()
}

fn summarize_result(result: &ToolResult) -> String {
    if let Some(url) = result.fields.get("url").and_then(Value::as_str) {
        return format!("URL: {url}");
    }
    if let Some(text) = result.fields.get("text").and_then(Value::as_str) {
        return if text.len() > 100 { format!("Text: {}...", &text[..100]) } else { format!("Text: {text}") };
    }
    if let Some(count) = result.fields.get("count") {
        return format!("Count: {count}");
    }
    if let Some(visible) = result.fields.get("visible") {
        return format!("Visible: {visible}");
    }
    if result.fields.get("screenshot").is_some() {
        return "Screenshot captured".to_string();
    }
    "Done".to_string()
}

/// Keep the system prompt out of band (it isn't part of `messages`) and
/// retain only the most recent `MESSAGE_WINDOW` messages, matching the
/// original's `_prune_messages(max_messages=12)`.
fn prune_messages(messages: &mut Vec<LlmMessage>) {
    if messages.len() > MESSAGE_WINDOW {
        let excess = messages.len() - MESSAGE_WINDOW;
        messages.drain(0..excess);
    }
}

fn step_tool_set(action: &str) -> &'static [&'static str] {
    match action {
        "click" => &["click", "click_text", "click_nth", "find_and_click"],
        "fill" | "type" => &["fill", "type_text"],
        "scroll" => &["scroll_by", "scroll_page", "scroll_to_element"],
        "wait" => &["wait_for_selector", "wait_for_navigation", "wait_for_timeout"],
        "navigate" => &["navigate"],
        "press" => &["press_key"],
        "hover" => &["hover"],
        "select" => &["select_option"],
        "check" => &["check"],
        "uncheck" => &["uncheck"],
        _ => &[],
    }
}

fn fuzzy_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    a.contains(&b) || b.contains(&a)
}

/// Mirrors the original's `Agent._tool_matches_step`: action-to-tool-set
/// membership plus a fuzzy value/text match for fill and click_text.
fn step_matches(step: &TaskStep, tool_name: &str, args: &Value) -> bool {
    let allowed = step_tool_set(&step.action.to_lowercase());
    if !allowed.contains(&tool_name) {
        return false;
    }

    if (step.action.eq_ignore_ascii_case("fill") || step.action.eq_ignore_ascii_case("type")) && step.value.is_some() {
        let expected = step.value.as_deref().unwrap_or("");
        let actual = args
            .get("value")
            .or_else(|| args.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if !fuzzy_match(expected, actual) {
            return false;
        }
    }

    if tool_name == "click_text" && !step.target.is_empty() {
        let actual = args.get("text").and_then(Value::as_str).unwrap_or("");
        if !fuzzy_match(&step.target, actual) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_matches_respects_action_tool_set() {
        let step = TaskStep::new(1, "click", "#go", None);
        assert!(step_matches(&step, "click", &json!({"selector": "#go"})));
        assert!(!step_matches(&step, "fill", &json!({"selector": "#go"})));
    }

    #[test]
    fn step_matches_fuzzily_compares_fill_values() {
        let step = TaskStep::new(1, "fill", "#search", Some("laptop".to_string()));
        assert!(step_matches(&step, "fill", &json!({"selector": "#search", "value": "gaming laptop"})));
        assert!(!step_matches(&step, "fill", &json!({"selector": "#search", "value": "phone"})));
    }

    #[test]
    fn step_matches_click_text_compares_target_fuzzily() {
        let step = TaskStep::new(1, "click", "Sign In", None);
        assert!(step_matches(&step, "click_text", &json!({"text": "Sign In Now"})));
    }

    #[test]
    fn canonical_args_is_order_independent() {
        let a = json!({"selector": "#go", "force": true});
        let b = json!({"force": true, "selector": "#go"});
        assert_eq!(canonical_args(&a), canonical_args(&b));
    }
}
