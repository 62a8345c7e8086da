//! Tool dispatch: a tagged-union `ToolInvocation` (one variant per tool,
//! per the design note preferring typed variants over dynamic dispatch)
//! matched directly onto [`BrowserAdapter`] methods.
//!
//! Grounded in the original's `tools/executor.py` `ToolExecutor.execute`
//! contract (never throws, uniform `{success, tool, ...}` envelope) and in
//! the teacher's `Tool::run` / `ToolOutput` shape.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::browser::adapter::{BrowserAdapter, OpOutcome};
use super::schemas::ToolRegistry;

fn default_quality() -> u32 {
    80
}

fn default_element_type() -> String {
    "any".to_string()
}

/// One variant per [`super::schemas::catalogue`] entry. `#[serde(tag =
/// "name", content = "arguments")]` means a `{"name": "click", "arguments":
/// {"selector": "#go"}}` value deserializes straight into `Click { selector:
/// "#go", .. }` — the LLM-issued tool call shape, unmodified.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolInvocation {
    Navigate {
        url: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Back {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Forward {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Reload {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Click {
        selector: String,
        #[serde(default)]
        force: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    DoubleClick {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Hover {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    PressKey {
        selector: String,
        key: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    TypeText {
        selector: String,
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    SelectOption {
        selector: String,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Check {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Uncheck {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    ScrollBy {
        dx: i64,
        dy: i64,
    },
    ScrollTo {
        x: i64,
        y: i64,
    },
    ScrollToElement {
        selector: String,
    },
    ScrollPage {
        direction: String,
        amount: i64,
    },
    WaitForSelector {
        selector: String,
        #[serde(default)]
        visible: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    WaitForNavigation {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    WaitForTimeout {
        ms: u64,
    },
    GetText {
        selector: String,
    },
    GetAttribute {
        selector: String,
        name: String,
    },
    GetInputValue {
        selector: String,
    },
    GetInnerHtml {
        selector: String,
    },
    IsVisible {
        selector: String,
    },
    IsEnabled {
        selector: String,
    },
    CountElements {
        selector: String,
    },
    BoundingBox {
        selector: String,
    },
    GetUrl {},
    GetTitle {},
    GetContent {},
    Screenshot {
        #[serde(default)]
        full_page: bool,
        #[serde(default = "default_quality")]
        quality: u32,
    },
    ScreenshotElement {
        selector: String,
    },
    Evaluate {
        expression: String,
    },
    ClickText {
        text: String,
        #[serde(default = "default_element_type")]
        element_type: String,
        #[serde(default)]
        exact: bool,
    },
    ClickNth {
        selector: String,
        index: usize,
    },
    DismissOverlays {},
    ExtractModalContent {},
    FindAndClick {
        target: String,
        #[serde(default)]
        scroll_first: bool,
    },
    GetPageStructure {},
}

/// Uniform per-call outcome. `fields` carries whatever [`OpOutcome::data`]
/// produced, flattened so callers see e.g. `{success, tool, url}` rather
/// than a nested `data` object.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub tool: String,
    #[serde(flatten)]
    pub fields: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ToolResult {
    fn from_outcome(tool: &str, outcome: OpOutcome) -> Self {
        Self {
            success: outcome.success,
            tool: tool.to_string(),
            fields: if outcome.data.is_null() {
                json!({})
            } else {
                outcome.data
            },
            error: outcome.error,
            error_kind: outcome.error_kind,
        }
    }

    fn rejected(tool: &str, error: impl Into<String>, kind: &str) -> Self {
        Self {
            success: false,
            tool: tool.to_string(),
            fields: json!({}),
            error: Some(error.into()),
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Holds a `BrowserAdapter` and dispatches `(name, arguments)` invocations
/// onto it. `execute` never panics and never propagates a `Result::Err` —
/// every failure mode, expected or not, becomes a `ToolResult` with
/// `success: false`.
pub struct ToolExecutor {
    adapter: Arc<BrowserAdapter>,
}

impl ToolExecutor {
    /// Construct the executor, warning (not failing) if the static
    /// catalogue and the `ToolInvocation` tagged union have drifted apart —
    /// the two are meant to move together, but a typo in either should be
    /// visible, not a silent dead tool.
    pub fn new(adapter: Arc<BrowserAdapter>) -> Self {
        let registry = ToolRegistry::new();
        let known_variant_count = 40;
        if registry.all().len() != known_variant_count {
            tracing::warn!(
                catalogue_len = registry.all().len(),
                expected = known_variant_count,
                "tool catalogue and ToolInvocation variant count have diverged"
            );
        }
        Self { adapter }
    }

    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let args = if args.is_object() { args } else { json!({}) };
        let wire = json!({"name": name, "arguments": args});

        let invocation: ToolInvocation = match serde_json::from_value(wire) {
            Ok(inv) => inv,
            Err(e) => {
                let registry = ToolRegistry::new();
                if registry.by_name(name).is_none() {
                    let known = registry
                        .all()
                        .iter()
                        .map(|t| t.name)
                        .collect::<Vec<_>>()
                        .join(", ");
                    return ToolResult::rejected(
                        name,
                        format!("Unknown tool: {name}. Available tools: {known}"),
                        "unknown_tool",
                    );
                }
                return ToolResult::rejected(
                    name,
                    format!("Invalid arguments for {name}: {e}"),
                    "invalid_arguments",
                );
            }
        };

        self.dispatch(name, invocation).await
    }

    async fn dispatch(&self, tool: &str, invocation: ToolInvocation) -> ToolResult {
        let ms = |v: Option<u64>| v.map(Duration::from_millis);
        let adapter = &self.adapter;

        let outcome = match invocation {
            ToolInvocation::Navigate { url, timeout_ms } => adapter.goto(&url, ms(timeout_ms)).await,
            ToolInvocation::Back { timeout_ms } => adapter.back(ms(timeout_ms)).await,
            ToolInvocation::Forward { timeout_ms } => adapter.forward(ms(timeout_ms)).await,
            ToolInvocation::Reload { timeout_ms } => adapter.reload(ms(timeout_ms)).await,
            ToolInvocation::Click {
                selector,
                force,
                timeout_ms,
            } => adapter.click(&selector, ms(timeout_ms), force).await,
            ToolInvocation::DoubleClick { selector, timeout_ms } => {
                adapter.double_click(&selector, ms(timeout_ms)).await
            }
            ToolInvocation::Hover { selector, timeout_ms } => adapter.hover(&selector, ms(timeout_ms)).await,
            ToolInvocation::PressKey {
                selector,
                key,
                timeout_ms,
            } => adapter.press(&selector, &key, ms(timeout_ms)).await,
            ToolInvocation::Fill {
                selector,
                value,
                timeout_ms,
            } => adapter.fill(&selector, &value, ms(timeout_ms)).await,
            ToolInvocation::TypeText {
                selector,
                text,
                timeout_ms,
            } => adapter.type_text(&selector, &text, ms(timeout_ms)).await,
            ToolInvocation::SelectOption {
                selector,
                value,
                timeout_ms,
            } => adapter.select_option(&selector, &value, ms(timeout_ms)).await,
            ToolInvocation::Check { selector, timeout_ms } => {
                adapter.check(&selector, true, ms(timeout_ms)).await
            }
            ToolInvocation::Uncheck { selector, timeout_ms } => {
                adapter.check(&selector, false, ms(timeout_ms)).await
            }
            ToolInvocation::ScrollBy { dx, dy } => adapter.scroll_by(dx, dy).await,
            ToolInvocation::ScrollTo { x, y } => adapter.scroll_to(x, y).await,
            ToolInvocation::ScrollToElement { selector } => adapter.scroll_to_element(&selector).await,
            ToolInvocation::ScrollPage { direction, amount } => {
                adapter.scroll_page(&direction, amount).await
            }
            ToolInvocation::WaitForSelector {
                selector,
                visible,
                timeout_ms,
            } => {
                adapter
                    .wait_for_selector(&selector, visible, ms(timeout_ms))
                    .await
            }
            ToolInvocation::WaitForNavigation { timeout_ms } => {
                adapter.wait_for_navigation(ms(timeout_ms)).await
            }
            ToolInvocation::WaitForTimeout { ms: millis } => adapter.wait_for_timeout(millis).await,
            ToolInvocation::GetText { selector } => adapter.get_text(&selector).await,
            ToolInvocation::GetAttribute { selector, name } => {
                adapter.get_attribute(&selector, &name).await
            }
            ToolInvocation::GetInputValue { selector } => adapter.get_input_value(&selector).await,
            ToolInvocation::GetInnerHtml { selector } => adapter.get_inner_html(&selector).await,
            ToolInvocation::IsVisible { selector } => adapter.is_visible(&selector).await,
            ToolInvocation::IsEnabled { selector } => adapter.is_enabled(&selector).await,
            ToolInvocation::CountElements { selector } => adapter.count_elements(&selector).await,
            ToolInvocation::BoundingBox { selector } => adapter.bounding_box(&selector).await,
            ToolInvocation::GetUrl {} => adapter.current_url().await,
            ToolInvocation::GetTitle {} => adapter.title().await,
            ToolInvocation::GetContent {} => adapter.content().await,
            ToolInvocation::Screenshot { full_page, quality } => {
                adapter.screenshot(full_page, quality).await
            }
            ToolInvocation::ScreenshotElement { selector } => {
                adapter.screenshot_element(&selector).await
            }
            ToolInvocation::Evaluate { expression } => adapter.evaluate(&expression).await,
            ToolInvocation::ClickText {
                text,
                element_type,
                exact,
            } => adapter.click_text(&text, &element_type, exact).await,
            ToolInvocation::ClickNth { selector, index } => adapter.click_nth(&selector, index).await,
            ToolInvocation::DismissOverlays {} => adapter.dismiss_overlays().await,
            ToolInvocation::ExtractModalContent {} => adapter.extract_modal_content().await,
            ToolInvocation::FindAndClick { target, scroll_first } => {
                adapter.find_and_click(&target, scroll_first).await
            }
            ToolInvocation::GetPageStructure {} => adapter.get_page_structure().await,
        };

        ToolResult::from_outcome(tool, outcome)
    }

    /// Whether `tool_name` is one that plausibly changed the DOM — used by
    /// the agent loop to decide whether to emit a follow-up screenshot.
    pub fn likely_mutates_dom(tool_name: &str) -> bool {
        matches!(
            tool_name,
            "navigate"
                | "back"
                | "forward"
                | "reload"
                | "click"
                | "double_click"
                | "fill"
                | "type_text"
                | "select_option"
                | "check"
                | "uncheck"
                | "scroll_by"
                | "scroll_to"
                | "scroll_to_element"
                | "scroll_page"
                | "click_text"
                | "click_nth"
                | "find_and_click"
                | "press_key"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_name_is_rejected_without_panicking() {
        let wire = json!({"name": "navigate", "arguments": {"url": "https://example.com"}});
        let invocation: Result<ToolInvocation, _> = serde_json::from_value(wire);
        assert!(invocation.is_ok());

        let bad_wire = json!({"name": "not_a_real_tool", "arguments": {}});
        let bad: Result<ToolInvocation, _> = serde_json::from_value(bad_wire);
        assert!(bad.is_err());
    }

    #[test]
    fn non_object_arguments_coerce_to_empty() {
        let args = Value::String("oops".to_string());
        let coerced = if args.is_object() { args } else { json!({}) };
        assert_eq!(coerced, json!({}));
    }

    #[test]
    fn dom_mutation_classification_matches_screenshot_cadence_rules() {
        assert!(ToolExecutor::likely_mutates_dom("click"));
        assert!(ToolExecutor::likely_mutates_dom("find_and_click"));
        assert!(!ToolExecutor::likely_mutates_dom("get_text"));
        assert!(!ToolExecutor::likely_mutates_dom("is_visible"));
    }
}
