//! Pure conversion from an `AgentStep` history into the `TestStep` IR
//! consumed by `codegen`.
//!
//! Grounded directly in the original's `Agent._history_to_test_steps`:
//! same non-actionable tool list, same per-tool selector/value extraction,
//! same whole-history dedup by `action:selector:value`.

use std::collections::HashSet;

use serde_json::Value;

use super::types::{AgentStep, TestStep};

const NON_ACTIONABLE_TOOLS: &[&str] = &[
    "screenshot",
    "screenshot_element",
    "get_page_structure",
    "get_text",
    "get_attribute",
    "get_input_value",
    "get_inner_html",
    "is_visible",
    "is_enabled",
    "count_elements",
    "bounding_box",
    "get_url",
    "get_title",
    "get_content",
    "evaluate",
    "extract_modal_content",
    "dismiss_overlays",
];

fn get_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Map one executed tool call onto a `TestStep`, or `None` if it doesn't
/// produce actionable test code (failed, non-actionable, or unmapped).
fn map_step(step: &AgentStep) -> Option<TestStep> {
    if step.error.is_some() {
        return None;
    }
    let tool_name = step.tool_name.as_deref()?;
    if NON_ACTIONABLE_TOOLS.contains(&tool_name) {
        return None;
    }
    let args = step.tool_args.clone().unwrap_or(Value::Null);

    let (action, selector, value): (&str, Option<String>, Option<String>) = match tool_name {
        "navigate" => ("navigate", None, get_str(&args, "url")),
        "click" => ("click", get_str(&args, "selector"), None),
        "click_nth" => {
            let index = args.get("index").and_then(Value::as_u64).unwrap_or(0);
            ("click_nth", get_str(&args, "selector"), Some(index.to_string()))
        }
        "click_text" | "find_and_click" => {
            let value = get_str(&args, "text").or_else(|| get_str(&args, "target"));
            ("click_text", None, value)
        }
        "double_click" => ("double_click", get_str(&args, "selector"), None),
        "hover" => ("hover", get_str(&args, "selector"), None),
        "fill" => ("fill", get_str(&args, "selector"), get_str(&args, "value")),
        "type_text" => ("type", get_str(&args, "selector"), get_str(&args, "text")),
        "select_option" => ("select", get_str(&args, "selector"), get_str(&args, "value")),
        "check" => ("check", get_str(&args, "selector"), None),
        "uncheck" => ("uncheck", get_str(&args, "selector"), None),
        "press_key" => ("press", get_str(&args, "selector"), get_str(&args, "key")),
        "scroll_by" => {
            let dx = args.get("dx").and_then(Value::as_i64).unwrap_or(0);
            let dy = args.get("dy").and_then(Value::as_i64).unwrap_or(0);
            let (direction, amount) = if dy != 0 {
                (if dy > 0 { "down" } else { "up" }, dy.abs())
            } else {
                (if dx > 0 { "right" } else { "left" }, dx.abs())
            };
            ("scroll", None, Some(format!("{direction}:{amount}")))
        }
        "scroll_page" => {
            let direction = get_str(&args, "direction").unwrap_or_else(|| "down".to_string());
            let amount = args.get("amount").and_then(Value::as_i64).unwrap_or(500);
            ("scroll", None, Some(format!("{direction}:{amount}")))
        }
        "scroll_to" => {
            let x = args.get("x").and_then(Value::as_i64).unwrap_or(0);
            let y = args.get("y").and_then(Value::as_i64).unwrap_or(0);
            ("scroll", None, Some(format!("to:{x},{y}")))
        }
        "scroll_to_element" => ("scroll_to", get_str(&args, "selector"), None),
        "wait_for_selector" => ("wait_for", get_str(&args, "selector"), None),
        "wait_for_navigation" => ("wait_for", None, None),
        "wait_for_timeout" => {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(1000);
            ("wait", None, Some(ms.to_string()))
        }
        _ => return None,
    };

    Some(TestStep {
        action: action.to_string(),
        selector,
        value,
        expected: None,
    })
}

/// Convert a run's history into the ordered, deduplicated `TestStep` list
/// that `codegen::CodeGenerator` renders. Always starts with a `navigate`
/// step to `start_url`, matching the original's unconditional first step.
pub fn history_to_test_steps(history: &[AgentStep], start_url: &str) -> Vec<TestStep> {
    let mut steps = vec![TestStep::navigate(start_url)];
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(steps[0].dedup_key());

    for step in history {
        if let Some(test_step) = map_step(step) {
            let key = test_step.dedup_key();
            if seen.insert(key) {
                steps.push(test_step);
            }
        }
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::executor::ToolResult;
    use serde_json::json;

    fn ok_step(n: u32, tool: &str, args: Value) -> AgentStep {
        AgentStep {
            step_number: n,
            tool_name: Some(tool.to_string()),
            tool_args: Some(args),
            tool_result: Some(ToolResult {
                success: true,
                tool: tool.to_string(),
                fields: json!({}),
                error: None,
                error_kind: None,
            }),
            error: None,
        }
    }

    #[test]
    fn skips_non_actionable_and_failed_steps() {
        let mut failed = ok_step(2, "click", json!({"selector": "#a"}));
        failed.error = Some("boom".to_string());

        let history = vec![
            ok_step(1, "screenshot", json!({})),
            failed,
            ok_step(3, "fill", json!({"selector": "#q", "value": "laptop"})),
        ];

        let steps = history_to_test_steps(&history, "https://example.com");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action, "navigate");
        assert_eq!(steps[1].action, "fill");
        assert_eq!(steps[1].value.as_deref(), Some("laptop"));
    }

    #[test]
    fn dedups_repeated_actions_across_the_whole_history_not_just_adjacently() {
        let history = vec![
            ok_step(1, "click", json!({"selector": "#go"})),
            ok_step(2, "fill", json!({"selector": "#q", "value": "x"})),
            ok_step(3, "click", json!({"selector": "#go"})),
        ];
        let steps = history_to_test_steps(&history, "https://example.com");
        // navigate + click(#go) + fill(#q) -- the repeated click(#go) is dropped.
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn find_and_click_maps_to_click_text_with_no_selector() {
        let history = vec![ok_step(1, "find_and_click", json!({"target": "Add to cart"}))];
        let steps = history_to_test_steps(&history, "https://example.com");
        assert_eq!(steps[1].action, "click_text");
        assert!(steps[1].selector.is_none());
        assert_eq!(steps[1].value.as_deref(), Some("Add to cart"));
    }

    #[test]
    fn is_idempotent_on_repeated_conversion() {
        let history = vec![ok_step(1, "click", json!({"selector": "#go"}))];
        let a = history_to_test_steps(&history, "https://example.com");
        let b = history_to_test_steps(&history, "https://example.com");
        assert_eq!(a, b);
    }
}
