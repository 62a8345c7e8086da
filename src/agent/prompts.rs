//! Fixed prompt text and the task-decomposition parser.
//!
//! `SYSTEM_PROMPT`, `TASK_DECOMPOSITION_PROMPT` and `BOOST_PROMPT` are
//! carried over near-verbatim from the original's `core/agent.py` module
//! constants; `parse_decomposition` reimplements `parse_task_steps` with
//! `regex` in place of Python's `re`.

use regex::Regex;

use super::types::TaskStep;

pub const SYSTEM_PROMPT: &str = r#"You are a browser automation agent. Execute tasks step by step.

## CRITICAL RULES:
1. Execute ONE tool call at a time - never skip steps
2. Wait for each action result before proceeding
3. ALWAYS CONTINUE until the user's ACTUAL GOAL is fully achieved
4. NEVER declare completion based on partial progress
5. BE CONSISTENT: Always use the same approach for similar tasks

## SELECTOR PRIORITY (use in this order for consistency):
1. ID selectors: #login-button, #search-input
2. Name attribute: [name="email"], [name="password"]
3. Data attributes: [data-testid="submit"], [data-action="login"]
4. Specific classes: .btn-primary, .search-box
5. Text-based: click_text("Sign In") - use for buttons/links with clear text
6. Generic selectors: button, input[type="submit"] - LAST RESORT

## TASK COMPLETION - VERY IMPORTANT:
To mark a task complete, you MUST:
1. Have PERFORMED all required actions to achieve the goal
2. Have VERIFIED the final result through observation
3. On your FINAL message, write ONLY: TASK_COMPLETE

WRONG - Premature completion:
- Completing after finding/locating something when the user wanted action taken
- Completing after filling a form when the user wanted it submitted
- Completing after searching when the user wanted to interact with results
- Mixing "TASK_COMPLETE" with explanations or analysis

RIGHT - Proper completion:
- Perform the full action chain, verify success, then say only "TASK_COMPLETE"

## VERIFY NAVIGATION
After clicking links:
1. Use get_url() / get_title() to check the URL changed
2. If the URL is unchanged, navigation FAILED - try again with a different method
3. Don't perform final actions until you've reached the correct page

## Tool usage:

### Basic interactions:
- fill(selector, value) - fill input fields
- click(selector, force=false) - click by CSS selector; use force=true if blocked
- click_text(text, element_type="any") - click by visible text (PREFERRED - more reliable)
- click_nth(selector, index) - click the Nth matching element (0-indexed)
- press_key(selector, key) - press keyboard keys like "Enter"

### Handling blocked elements:
When clicks fail due to overlays or popups:
1. First try: dismiss_overlays() - dismisses popups, modals, cookie banners
2. Then try: click_text("button text") - more reliable than CSS selectors
3. Or try: find_and_click(target) - smart click with multiple strategies
4. Last resort: click(selector, force=true) - force click through overlays

### Navigation and page analysis:
- scroll_by(dx, dy) / scroll_to_element(selector) - scroll the page
- screenshot() - capture the current state
- get_page_structure() - get interactive elements (inputs, buttons, links)
- get_url() / get_title() - verify navigation succeeded

## Execution flow:
1. Navigate or search to find the target
2. Click on the target item or link
3. VERIFY the URL changed - if not, try a different click method
4. Once on the correct page, perform the required actions
5. VERIFY the action succeeded (check confirmation, URL, page content)
6. ONLY THEN say TASK_COMPLETE

Remember: finding something is not the same as acting on it. Always verify navigation succeeded before proceeding."#;

const TASK_DECOMPOSITION_TEMPLATE: &str = r#"You are a task decomposer for browser automation. Break down the task into NUMBERED STEPS.

TASK: {task}
URL: {url}

RULES:
1. Each step must be ONE atomic action (click, fill, scroll, wait)
2. Use SPECIFIC selectors when possible (IDs, names, data attributes)
3. Include verification after critical steps
4. Number steps sequentially: 1, 2, 3...

OUTPUT FORMAT (follow EXACTLY):
STEP 1: [action] - [target/selector] - [value if needed]
STEP 2: [action] - [target/selector] - [value if needed]
...
DONE: [how to verify task is complete]

EXAMPLE:
STEP 1: fill - #search-input - "laptop"
STEP 2: click - button[type="submit"]
STEP 3: wait - .search-results
STEP 4: click - first product link
DONE: Product page is displayed with product details

Now decompose this task:"#;

const BOOST_TEMPLATE: &str = r#"You are a task planner for browser automation. Given a user's task and target URL, create an ENHANCED task description that is clear, specific, and actionable.

USER TASK: {task}
TARGET URL: {url}

Analyze the task and output an ENHANCED version that includes:
1. Clear step-by-step breakdown of what needs to be done
2. Specific actions (search, click, fill, scroll, etc.)
3. What to look for at each step (buttons, inputs, links)
4. Success criteria - how to know when the task is complete

Output ONLY the enhanced task description, no explanations. Keep it concise but complete.
Format: a numbered list of specific actions to take."#;

pub fn task_decomposition_prompt(task: &str, url: &str) -> String {
    TASK_DECOMPOSITION_TEMPLATE.replace("{task}", task).replace("{url}", url)
}

pub fn boost_request_prompt(task: &str, url: &str) -> String {
    BOOST_TEMPLATE.replace("{task}", task).replace("{url}", url)
}

pub fn format_boosted_task(original_task: &str, enhancement: &str) -> String {
    format!(
        "ORIGINAL TASK: {original_task}\n\nENHANCED EXECUTION PLAN:\n{enhancement}\n\nExecute this plan efficiently. Start with step 1."
    )
}

/// Parse a `TASK_DECOMPOSITION_PROMPT` response into its steps and a
/// completion criterion. Malformed or unrecognized lines are skipped
/// rather than rejected, mirroring the original's permissive parser.
pub fn parse_decomposition(text: &str) -> (Vec<TaskStep>, Option<String>) {
    let step_re = Regex::new(r"(?i)^STEP\s*(\d+):\s*(.+)$").expect("valid regex");
    let done_re = Regex::new(r"(?i)^DONE:\s*(.+)$").expect("valid regex");

    let mut steps = Vec::new();
    let mut done_criteria = None;

    for raw_line in text.trim().lines() {
        let line = raw_line.trim();

        if let Some(caps) = step_re.captures(line) {
            let number: u32 = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let rest = &caps[2];
            let parts: Vec<&str> = rest.splitn(3, " - ").map(str::trim).collect();
            if parts.len() >= 2 {
                let action = parts[0].to_lowercase();
                let target = parts[1].to_string();
                let value = parts.get(2).map(|v| v.trim_matches(|c| c == '"' || c == '\'').to_string());
                steps.push(TaskStep::new(number, action, target, value));
            }
            continue;
        }

        if let Some(caps) = done_re.captures(line) {
            done_criteria = Some(caps[1].trim().to_string());
        }
    }

    (steps, done_criteria)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_worked_example_from_the_prompt_template() {
        let text = r#"STEP 1: fill - #search-input - "laptop"
STEP 2: click - button[type="submit"]
STEP 3: wait - .search-results
STEP 4: click - first product link
DONE: Product page is displayed with product details"#;

        let (steps, done) = parse_decomposition(text);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].action, "fill");
        assert_eq!(steps[0].target, "#search-input");
        assert_eq!(steps[0].value.as_deref(), Some("laptop"));
        assert_eq!(steps[1].value, None);
        assert_eq!(done.as_deref(), Some("Product page is displayed with product details"));
    }

    #[test]
    fn skips_unparseable_lines_without_erroring() {
        let text = "This is not a step\nSTEP abc: broken\nSTEP 1: click - button\n";
        let (steps, done) = parse_decomposition(text);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].number, 1);
        assert!(done.is_none());
    }

    #[test]
    fn format_boosted_task_embeds_both_original_and_enhancement() {
        let combined = format_boosted_task("log in", "1. click login\n2. fill form");
        assert!(combined.contains("ORIGINAL TASK: log in"));
        assert!(combined.contains("1. click login"));
    }
}
