//! Per-language Playwright emission tables.
//!
//! Grounded in the original's `PLAYWRIGHT_TEMPLATES` dict of per-action,
//! per-language format strings; each `TestStep.action` maps to one call
//! per the fixed table below. An action this table doesn't recognize
//! becomes a commented line rather than a hard error, matching the
//! original's `# Unsupported action: {action}` fallback.

use crate::agent::{Language, TestStep};

/// Render a complete script for `language` from `steps`, wrapped in the
/// per-language test-file boilerplate.
pub fn render(steps: &[TestStep], language: Language) -> String {
    let body: String = steps
        .iter()
        .map(|step| format!("{}{}\n", indent(language), emit_step(step, language)))
        .collect();

    match language {
        Language::Typescript => format!(
            "import {{ test, expect }} from '@playwright/test';\n\ntest('generated test', async ({{ page }}) => {{\n{body}}});\n"
        ),
        Language::Javascript => format!(
            "const {{ test, expect }} = require('@playwright/test');\n\ntest('generated test', async ({{ page }}) => {{\n{body}}});\n"
        ),
        Language::Python => format!(
            "from playwright.sync_api import Page, expect\n\n\ndef test_generated(page: Page) -> None:\n{body}"
        ),
    }
}

fn indent(language: Language) -> &'static str {
    match language {
        Language::Typescript | Language::Javascript => "  ",
        Language::Python => "    ",
    }
}

/// Single-quote a string for embedding in generated TS/JS source, escaping
/// embedded single quotes and backslashes.
fn quote_js(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Double-quote a string for embedding in generated Python source.
fn quote_py(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn quote(value: &str, language: Language) -> String {
    match language {
        Language::Typescript | Language::Javascript => quote_js(value),
        Language::Python => quote_py(value),
    }
}

fn call(language: Language, expr: &str) -> String {
    match language {
        Language::Typescript | Language::Javascript => format!("await {expr};"),
        Language::Python => expr.to_string(),
    }
}

/// Parse the packed `"down:500"` / `"to:100,200"` scroll value produced by
/// `agent::history::map_step` back into a direction/amount or x/y pair.
enum ScrollSpec {
    Direction { direction: String, amount: i64 },
    Absolute { x: i64, y: i64 },
}

fn parse_scroll(value: Option<&str>) -> ScrollSpec {
    let value = value.unwrap_or("down:500");
    if let Some(rest) = value.strip_prefix("to:") {
        let mut parts = rest.splitn(2, ',');
        let x = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let y = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        return ScrollSpec::Absolute { x, y };
    }
    let mut parts = value.splitn(2, ':');
    let direction = parts.next().unwrap_or("down").to_string();
    let amount = parts.next().and_then(|s| s.parse().ok()).unwrap_or(500);
    ScrollSpec::Direction { direction, amount }
}

/// Emit the single call (or comment) for one `TestStep`, per the fixed
/// action-to-call table. Unknown actions produce a commented line instead
/// of failing the whole generation run.
fn emit_step(step: &TestStep, language: Language) -> String {
    let selector = step.selector.as_deref();
    let value = step.value.as_deref();

    let expr = match step.action.as_str() {
        "navigate" => {
            let url = value.unwrap_or_default();
            Some(format!("page.goto({})", quote(url, language)))
        }
        "click" => selector.map(|s| format!("page.click({})", quote(s, language))),
        "double_click" => selector.map(|s| format!("page.dblclick({})", quote(s, language))),
        "click_nth" => selector.map(|s| {
            let index: usize = value.and_then(|v| v.parse().ok()).unwrap_or(0);
            format!("page.locator({}).nth({index}).click()", quote(s, language))
        }),
        "click_text" => value.map(|text| match language {
            Language::Python => format!("page.get_by_text({}).click()", quote(text, language)),
            _ => format!("page.getByText({}).click()", quote(text, language)),
        }),
        "hover" => selector.map(|s| format!("page.hover({})", quote(s, language))),
        "fill" => selector.map(|s| {
            format!(
                "page.fill({}, {})",
                quote(s, language),
                quote(value.unwrap_or_default(), language)
            )
        }),
        "type" => selector.map(|s| {
            format!(
                "page.type({}, {})",
                quote(s, language),
                quote(value.unwrap_or_default(), language)
            )
        }),
        "select" => selector.map(|s| {
            format!(
                "page.{}({}, {})",
                select_option_name(language),
                quote(s, language),
                quote(value.unwrap_or_default(), language)
            )
        }),
        "check" => selector.map(|s| format!("page.check({})", quote(s, language))),
        "uncheck" => selector.map(|s| format!("page.uncheck({})", quote(s, language))),
        "press" => selector.map(|s| {
            format!(
                "page.press({}, {})",
                quote(s, language),
                quote(value.unwrap_or_default(), language)
            )
        }),
        "scroll" => Some(match parse_scroll(value) {
            ScrollSpec::Direction { direction, amount } => {
                let (dx, dy) = match direction.as_str() {
                    "up" => (0, -amount),
                    "down" => (0, amount),
                    "left" => (-amount, 0),
                    "right" => (amount, 0),
                    _ => (0, amount),
                };
                format!("page.mouse.wheel({dx}, {dy})")
            }
            ScrollSpec::Absolute { x, y } => {
                format!("page.evaluate({})", quote(&format!("window.scrollTo({x}, {y})"), language))
            }
        }),
        "scroll_to" => selector.map(|s| {
            format!("page.locator({}).{}()", quote(s, language), scroll_into_view_name(language))
        }),
        "wait_for" => Some(match selector {
            Some(s) => format!("page.{}({})", wait_for_selector_name(language), quote(s, language)),
            None => format!("page.{}()", wait_for_load_state_name(language)),
        }),
        "wait" => {
            let ms: u64 = value.and_then(|v| v.parse().ok()).unwrap_or(1000);
            Some(format!("page.{}({ms})", wait_for_timeout_name(language)))
        }
        other => return format!("// Unsupported action: {other}"),
    };

    match expr {
        Some(expr) => call(language, &expr),
        None => format!("// Unsupported action: {} (missing selector/value)", step.action),
    }
}

/// Playwright's Python binding uses snake_case method names where the
/// JS/TS binding uses camelCase; these helpers keep `emit_step`'s call
/// sites readable while picking the right spelling per language.
fn select_option_name(language: Language) -> &'static str {
    match language {
        Language::Python => "select_option",
        _ => "selectOption",
    }
}

fn scroll_into_view_name(language: Language) -> &'static str {
    match language {
        Language::Python => "scroll_into_view_if_needed",
        _ => "scrollIntoViewIfNeeded",
    }
}

fn wait_for_selector_name(language: Language) -> &'static str {
    match language {
        Language::Python => "wait_for_selector",
        _ => "waitForSelector",
    }
}

fn wait_for_load_state_name(language: Language) -> &'static str {
    match language {
        Language::Python => "wait_for_load_state",
        _ => "waitForLoadState",
    }
}

fn wait_for_timeout_name(language: Language) -> &'static str {
    match language {
        Language::Python => "wait_for_timeout",
        _ => "waitForTimeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(action: &str, selector: Option<&str>, value: Option<&str>) -> TestStep {
        TestStep {
            action: action.to_string(),
            selector: selector.map(str::to_string),
            value: value.map(str::to_string),
            expected: None,
        }
    }

    #[test]
    fn typescript_click_and_navigate() {
        let steps = vec![step("navigate", None, Some("https://example.com")), step("click", Some("#go"), None)];
        let code = render(&steps, Language::Typescript);
        assert!(code.contains("await page.goto('https://example.com');"));
        assert!(code.contains("await page.click('#go');"));
    }

    #[test]
    fn python_uses_snake_case_bindings() {
        let steps = vec![step("select", Some("#opt"), Some("a"))];
        let code = render(&steps, Language::Python);
        assert!(code.contains("page.select_option(\"#opt\", \"a\")"));
    }

    #[test]
    fn unknown_action_becomes_a_comment_not_an_error() {
        let steps = vec![step("teleport", Some("#x"), None)];
        let code = render(&steps, Language::Typescript);
        assert!(code.contains("// Unsupported action: teleport"));
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_js("it's"), "'it\\'s'");
        assert_eq!(quote_py("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
