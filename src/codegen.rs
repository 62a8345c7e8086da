//! Deterministic history-to-script code generator.
//!
//! Grounded in the original's `services/code_generator.py`
//! (`CodeGenerator.generate`, `_suggest_filename`): a pure function from an
//! ordered `TestStep` list plus `(framework, language)` to a script string
//! and a suggested filename, reshaped into the teacher's module-per-concern
//! style (`codegen::playwright` holds the per-language emission tables, the
//! way `llm::gemini`/`llm::perplexity` hold per-provider translation).
//!
//! Only one framework (Playwright) is implemented, matching the original's
//! actual coverage; `Framework` still carries the field because the wire
//! schema exposes it (see `agent::types::Framework`).

mod playwright;

use crate::agent::{Framework, Language, TestStep};

pub struct CodeGenerator;

impl CodeGenerator {
    /// Render `steps` into a complete script for `framework`/`language`,
    /// plus the filename the original would suggest for it. Pure: calling
    /// this twice with the same inputs always produces byte-identical
    /// output (P7 in the specification's testable properties).
    #[must_use]
    pub fn generate(steps: &[TestStep], framework: Framework, language: Language) -> (String, String) {
        let code = match framework {
            Framework::Playwright => playwright::render(steps, language),
        };
        let filename = suggest_filename(steps, language);
        (code, filename)
    }
}

/// Derive a filename from the first `navigate` step's URL: strip the
/// scheme, take the first host label, replace non-alphanumerics with `-`,
/// collapse repeats, and fall back to `"generated"` if no navigate step
/// exists or the host can't be parsed. Extension and stem convention are
/// per-language (pytest expects a `test_` prefix, not a `test-` suffix).
fn suggest_filename(steps: &[TestStep], language: Language) -> String {
    let host_label = steps
        .iter()
        .find(|s| s.action == "navigate")
        .and_then(|s| s.value.as_deref())
        .and_then(first_host_label)
        .unwrap_or_else(|| "generated".to_string());

    match language {
        Language::Typescript => format!("test-{host_label}.spec.ts"),
        Language::Javascript => format!("test-{host_label}.spec.js"),
        Language::Python => format!("test_{}.py", host_label.replace('-', "_")),
    }
}

/// Extract the first label of the host from a URL string, slugified.
fn first_host_label(url: &str) -> Option<String> {
    let without_scheme = url.split("://").next_back().unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let host = host.rsplit('@').next().unwrap_or(host);
    let host_no_port = host.split(':').next().unwrap_or(host);
    let first_label = host_no_port.split('.').next().unwrap_or(host_no_port);

    if first_label.is_empty() {
        return None;
    }

    let mut slug = String::with_capacity(first_label.len());
    let mut last_was_dash = false;
    for ch in first_label.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();

    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav(url: &str) -> TestStep {
        TestStep::navigate(url)
    }

    fn click(selector: &str) -> TestStep {
        TestStep {
            action: "click".to_string(),
            selector: Some(selector.to_string()),
            value: None,
            expected: None,
        }
    }

    #[test]
    fn scenario_6_from_the_worked_examples() {
        let steps = vec![nav("https://x.test"), click("button#go")];
        let (code, filename) = CodeGenerator::generate(&steps, Framework::Playwright, Language::Typescript);
        assert!(code.contains("await page.goto('https://x.test');"));
        assert!(code.contains("await page.click('button#go');"));
        assert_eq!(filename, "test-x.spec.ts");
    }

    #[test]
    fn filename_falls_back_to_generated_without_a_navigate_step() {
        let steps = vec![click("button#go")];
        let filename = suggest_filename(&steps, Language::Typescript);
        assert_eq!(filename, "test-generated.spec.ts");
    }

    #[test]
    fn filename_slugifies_multi_label_hosts() {
        assert_eq!(first_host_label("https://www.example.co.uk/path"), Some("www".to_string()));
        assert_eq!(first_host_label("http://localhost:3000"), Some("localhost".to_string()));
    }

    #[test]
    fn generate_is_idempotent_byte_for_byte() {
        let steps = vec![nav("https://example.com"), click("#a"), click("#b")];
        let (a, _) = CodeGenerator::generate(&steps, Framework::Playwright, Language::Python);
        let (b, _) = CodeGenerator::generate(&steps, Framework::Playwright, Language::Python);
        assert_eq!(a, b);
    }
}
