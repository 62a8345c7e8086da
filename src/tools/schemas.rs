//! Declarative tool catalogue: name, description, typed parameter schema,
//! category. Grounded in the original's `tools/schemas.py` tool list and in
//! the teacher's `tools.rs` `input_schema()`/`description()` shape (JSON
//! Schema objects, one function per browser primitive).
//!
//! This module only produces *metadata* for prompting and native
//! function-calling declarations; dispatch lives in [`super::executor`] as
//! a tagged-union match, not a name→handler map, per the design note that
//! tool invocations should be typed variants rather than dynamic dispatch.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Navigation,
    Interaction,
    Scrolling,
    Wait,
    Extraction,
    PageInfo,
    Evaluation,
    Composite,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ToolCategory,
    /// JSON-Schema-shaped parameter object, used verbatim as the native
    /// function-calling declaration's `parameters` field.
    pub parameters: Value,
}

impl ToolDefinition {
    const fn new(
        name: &'static str,
        description: &'static str,
        category: ToolCategory,
        parameters: Value,
    ) -> Self {
        Self {
            name,
            description,
            category,
            parameters,
        }
    }
}

/// Static, process-lifetime, ordered catalogue. Names are unique; every
/// entry here must have a matching `ToolInvocation` variant in
/// [`super::executor`] (validated at `ToolExecutor` construction).
pub fn catalogue() -> Vec<ToolDefinition> {
    use ToolCategory::*;

    vec![
        ToolDefinition::new(
            "navigate",
            "Navigate the browser to a URL and wait for the page to load.",
            Navigation,
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "URL to navigate to"},
                    "timeout_ms": {"type": "integer", "description": "Timeout in milliseconds"}
                },
                "required": ["url"]
            }),
        ),
        ToolDefinition::new(
            "back",
            "Navigate back in browser history.",
            Navigation,
            json!({"type": "object", "properties": {"timeout_ms": {"type": "integer"}}}),
        ),
        ToolDefinition::new(
            "forward",
            "Navigate forward in browser history.",
            Navigation,
            json!({"type": "object", "properties": {"timeout_ms": {"type": "integer"}}}),
        ),
        ToolDefinition::new(
            "reload",
            "Reload the current page.",
            Navigation,
            json!({"type": "object", "properties": {"timeout_ms": {"type": "integer"}}}),
        ),
        ToolDefinition::new(
            "click",
            "Click an element by CSS selector. Falls back to a forced JS click, then a dispatched click event, if a normal click does not land.",
            Interaction,
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string"},
                    "force": {"type": "boolean", "description": "Skip straight to the JS-click fallback"},
                    "timeout_ms": {"type": "integer"}
                },
                "required": ["selector"]
            }),
        ),
        ToolDefinition::new(
            "double_click",
            "Double-click an element by CSS selector.",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "hover",
            "Hover the pointer over an element by CSS selector.",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "press_key",
            "Press a keyboard key while an element is focused (e.g. 'Enter', 'Tab', 'Escape').",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "key": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector", "key"]}),
        ),
        ToolDefinition::new(
            "fill",
            "Clear an input and set its value directly.",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "value": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector", "value"]}),
        ),
        ToolDefinition::new(
            "type_text",
            "Type text into an element using simulated keystrokes (fires key events frameworks listen to).",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "text": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector", "text"]}),
        ),
        ToolDefinition::new(
            "select_option",
            "Select an option in a <select> element by value.",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "value": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector", "value"]}),
        ),
        ToolDefinition::new(
            "check",
            "Check a checkbox or radio element.",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "uncheck",
            "Uncheck a checkbox element.",
            Interaction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "timeout_ms": {"type": "integer"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "scroll_by",
            "Scroll the page by a relative pixel offset.",
            Scrolling,
            json!({"type": "object", "properties": {"dx": {"type": "integer"}, "dy": {"type": "integer"}}, "required": ["dx", "dy"]}),
        ),
        ToolDefinition::new(
            "scroll_to",
            "Scroll the page to an absolute pixel coordinate.",
            Scrolling,
            json!({"type": "object", "properties": {"x": {"type": "integer"}, "y": {"type": "integer"}}, "required": ["x", "y"]}),
        ),
        ToolDefinition::new(
            "scroll_to_element",
            "Scroll an element into view.",
            Scrolling,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "scroll_page",
            "Scroll the page by a direction and pixel amount.",
            Scrolling,
            json!({
                "type": "object",
                "properties": {
                    "direction": {"type": "string", "enum": ["up", "down", "left", "right"]},
                    "amount": {"type": "integer"}
                },
                "required": ["direction", "amount"]
            }),
        ),
        ToolDefinition::new(
            "wait_for_selector",
            "Poll until an element (or, for a comma-separated list, the first of several candidates) reaches the requested state.",
            Wait,
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector, or a comma-separated list of alternatives"},
                    "visible": {"type": "boolean", "description": "Require visibility, not just DOM presence"},
                    "timeout_ms": {"type": "integer"}
                },
                "required": ["selector"]
            }),
        ),
        ToolDefinition::new(
            "wait_for_navigation",
            "Wait for an in-flight navigation to complete.",
            Wait,
            json!({"type": "object", "properties": {"timeout_ms": {"type": "integer"}}}),
        ),
        ToolDefinition::new(
            "wait_for_timeout",
            "Pause for a fixed number of milliseconds.",
            Wait,
            json!({"type": "object", "properties": {"ms": {"type": "integer"}}, "required": ["ms"]}),
        ),
        ToolDefinition::new(
            "get_text",
            "Read the visible text content of an element.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "get_attribute",
            "Read an HTML attribute's value from an element.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "name": {"type": "string"}}, "required": ["selector", "name"]}),
        ),
        ToolDefinition::new(
            "get_input_value",
            "Read the current value of an input/textarea element.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "get_inner_html",
            "Read the inner HTML of an element.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "is_visible",
            "Check whether an element is currently visible.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "is_enabled",
            "Check whether an element is enabled (not disabled).",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "count_elements",
            "Count elements matching a CSS selector.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "bounding_box",
            "Read an element's bounding rectangle.",
            Extraction,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "get_url",
            "Get the current page URL.",
            PageInfo,
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            "get_title",
            "Get the current page title.",
            PageInfo,
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            "get_content",
            "Get the current page's HTML content (truncated to a hard cap).",
            PageInfo,
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            "screenshot",
            "Capture a screenshot of the current page as base64 JPEG.",
            PageInfo,
            json!({"type": "object", "properties": {"full_page": {"type": "boolean"}, "quality": {"type": "integer"}}}),
        ),
        ToolDefinition::new(
            "screenshot_element",
            "Capture a screenshot of a specific element as base64 PNG.",
            PageInfo,
            json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
        ),
        ToolDefinition::new(
            "evaluate",
            "Evaluate an arbitrary JavaScript expression in the page context and return its (awaited) result.",
            Evaluation,
            json!({"type": "object", "properties": {"expression": {"type": "string"}}, "required": ["expression"]}),
        ),
        ToolDefinition::new(
            "click_text",
            "Click the first visible element whose text matches. Tries an accessibility-role locator first, then a substring scan over clickable/text elements.",
            Composite,
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "element_type": {"type": "string", "enum": ["any", "button", "link", "heading"]},
                    "exact": {"type": "boolean"}
                },
                "required": ["text"]
            }),
        ),
        ToolDefinition::new(
            "click_nth",
            "Click the Nth (0-indexed) element matching a CSS selector.",
            Composite,
            json!({"type": "object", "properties": {"selector": {"type": "string"}, "index": {"type": "integer"}}, "required": ["selector", "index"]}),
        ),
        ToolDefinition::new(
            "dismiss_overlays",
            "Best-effort dismissal of cookie banners, modals, and consent dialogs. Never fails.",
            Composite,
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            "extract_modal_content",
            "Extract the content of the first visible modal/dialog on the page.",
            Composite,
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            "find_and_click",
            "Orchestrated smart click: dismisses overlays, optionally scrolls, then tries text match, CSS selector, forced CSS, and a DOM walk in order.",
            Composite,
            json!({"type": "object", "properties": {"target": {"type": "string"}, "scroll_first": {"type": "boolean"}}, "required": ["target"]}),
        ),
        ToolDefinition::new(
            "get_page_structure",
            "Get a token-budgeted structural snapshot of the page's inputs, buttons, links, and selects.",
            Composite,
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

/// Registry over the static catalogue: lookup and the two prompt
/// representations LLMClient variants need (native function schemas, and a
/// textual listing for providers without function-calling).
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: catalogue(),
        }
    }

    pub fn all(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn by_name(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// JSON-Schema-style function declarations for native function-calling
    /// providers.
    pub fn schema_for_native(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect()
    }

    /// Textual listing grouped by category, for the text-protocol prompt.
    pub fn prompt_description(&self) -> String {
        let mut by_category: Vec<(ToolCategory, Vec<&ToolDefinition>)> = Vec::new();
        for tool in &self.tools {
            match by_category.iter_mut().find(|(c, _)| *c == tool.category) {
                Some((_, tools)) => tools.push(tool),
                None => by_category.push((tool.category, vec![tool])),
            }
        }

        let mut out = String::new();
        for (category, tools) in by_category {
            out.push_str(&format!("## {category:?}\n"));
            for tool in tools {
                out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            }
        }
        out
    }

    /// Convert the catalogue into `llm::ToolDefinition`s for a native
    /// function-calling request. Cheap and called once per agent turn, so
    /// no caching.
    pub fn as_llm_tools(&self) -> Vec<crate::llm::ToolDefinition> {
        self.tools
            .iter()
            .map(|t| crate::llm::ToolDefinition {
                name: t.name.to_string(),
                description: t.description.to_string(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let registry = ToolRegistry::new();
        let mut names: Vec<&str> = registry.all().iter().map(|t| t.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "duplicate tool name in catalogue");
    }

    #[test]
    fn by_name_finds_known_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.by_name("click").is_some());
        assert!(registry.by_name("nonexistent_tool").is_none());
    }

    #[test]
    fn prompt_description_groups_by_category() {
        let registry = ToolRegistry::new();
        let text = registry.prompt_description();
        assert!(text.contains("Composite"));
        assert!(text.contains("find_and_click"));
    }
}
