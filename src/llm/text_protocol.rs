//! Shared machinery for providers without native function-calling: the
//! `TOOL_CALL:`/`ARGUMENTS:` text protocol, message normalization for
//! strict-alternation chat APIs, and token budgeting.
//!
//! Grounded exactly in the original's `llm/perplexity.py`
//! (`_format_tools_prompt`, `_convert_messages`, `_enforce_alternation`,
//! `_truncate_conversation`, `_extract_json_object`, `_try_fix_json`,
//! `_extract_tool_calls`), reused verbatim by the chat-template HuggingFace
//! variant per base spec §4.3(3).

use serde_json::Value;
use std::collections::HashSet;

use super::types::token_budget::{
    estimate_tokens, truncate_to_tokens, CHARS_PER_TOKEN, MAX_INPUT_TOKENS, MAX_MESSAGE_TOKENS,
};
use super::types::{ContentBlock, LlmMessage, MessageRole, ToolDefinition};

/// A parsed tool call before an id has been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Build the instructional block injected into the system prompt describing
/// the `TOOL_CALL:`/`ARGUMENTS:` convention, matching the original's
/// `_format_tools_prompt`.
#[must_use]
pub fn format_tools_prompt(tools: &[ToolDefinition]) -> String {
    let mut lines = vec![
        "You have access to browser automation tools. To use a tool, respond with:".to_string(),
        "TOOL_CALL: tool_name".to_string(),
        "ARGUMENTS: {\"param\": \"value\"}".to_string(),
        String::new(),
        "Rules:".to_string(),
        "- Issue exactly one tool call per response.".to_string(),
        "- ARGUMENTS must be valid, double-quoted JSON.".to_string(),
        "- Never mix TASK_COMPLETE with analysis text.".to_string(),
        String::new(),
        "Available tools:".to_string(),
    ];

    for tool in tools {
        lines.push(format!("\n- {}: {}", tool.name, tool.description));
        if let Some(props) = tool.input_schema.get("properties").and_then(Value::as_object) {
            let required: HashSet<&str> = tool
                .input_schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for (name, info) in props {
                let req = if required.contains(name.as_str()) {
                    " (required)"
                } else {
                    ""
                };
                let desc = info
                    .get("description")
                    .and_then(Value::as_str)
                    .or_else(|| info.get("type").and_then(Value::as_str))
                    .unwrap_or("any");
                lines.push(format!("  - {name}{req}: {desc}"));
            }
        }
    }

    lines.push("\nAnalyze the task, then use TOOL_CALL to perform actions.".to_string());
    lines.join("\n")
}

/// Fold `tool`-role messages into neighboring user messages, merge
/// consecutive same-role messages, then enforce strict alternation.
/// Mirrors `_convert_messages` + `_enforce_alternation`.
#[must_use]
pub fn normalize_messages(messages: &[LlmMessage]) -> Vec<(MessageRole, String)> {
    let mut flat: Vec<(MessageRole, String)> = Vec::new();
    let mut call_names: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => continue,
            MessageRole::Assistant => {
                let mut text = text_of(msg);
                for block in &msg.content {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        call_names.insert(id.clone(), name.clone());
                        text.push_str(&format!(
                            "\nUsing tools:\nTOOL_CALL: {name}\nARGUMENTS: {}\n",
                            input
                        ));
                    }
                }
                push_or_merge(&mut flat, MessageRole::Assistant, text);
            }
            MessageRole::User => {
                push_or_merge(&mut flat, MessageRole::User, text_of(msg));
            }
            MessageRole::Tool => {
                for block in &msg.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let name = call_names.get(tool_use_id).map_or("unknown", String::as_str);
                        let folded = format!("Tool '{name}': {content}");
                        push_or_merge(&mut flat, MessageRole::User, folded);
                    }
                }
            }
        }
    }

    enforce_alternation(&mut flat);
    flat
}

fn text_of(msg: &LlmMessage) -> String {
    msg.content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_or_merge(flat: &mut Vec<(MessageRole, String)>, role: MessageRole, text: String) {
    if let Some(last) = flat.last_mut() {
        if last.0 == role {
            if !last.1.is_empty() && !text.is_empty() {
                last.1.push('\n');
            }
            last.1.push_str(&text);
            return;
        }
    }
    flat.push((role, text));
}

/// Insert minimal placeholders so the sequence alternates user/assistant and
/// ends on a user turn. Mirrors `_enforce_alternation` exactly.
fn enforce_alternation(flat: &mut Vec<(MessageRole, String)>) {
    if flat.is_empty() {
        return;
    }

    // Leading-assistant edge case: a text-protocol conversation must open
    // with a user turn.
    if flat[0].0 == MessageRole::Assistant {
        flat.insert(0, (MessageRole::User, "Continue with the task.".to_string()));
    }

    let mut i = 1;
    while i < flat.len() {
        let expected = if flat[i - 1].0 == MessageRole::User {
            MessageRole::Assistant
        } else {
            MessageRole::User
        };
        if flat[i].0 != expected {
            let placeholder = if expected == MessageRole::Assistant {
                "Acknowledged. Continue."
            } else {
                "Understood."
            };
            flat.insert(i, (expected, placeholder.to_string()));
        }
        i += 1;
    }

    if flat.last().map(|(r, _)| *r) == Some(MessageRole::Assistant) {
        flat.push((
            MessageRole::User,
            "Please continue with the next action.".to_string(),
        ));
    }
}

/// Apply per-message and whole-conversation token budgeting, matching
/// `_truncate_conversation`. `system_tokens` is subtracted from the total
/// budget up front since the system prompt is never dropped.
#[must_use]
pub fn truncate_conversation(
    flat: Vec<(MessageRole, String)>,
    system_tokens: usize,
) -> Vec<(MessageRole, String)> {
    let capped: Vec<(MessageRole, String)> = flat
        .into_iter()
        .map(|(role, text)| (role, truncate_to_tokens(&text, MAX_MESSAGE_TOKENS)))
        .collect();

    let available = MAX_INPUT_TOKENS.saturating_sub(system_tokens + 5_000);

    let total: usize = capped.iter().map(|(_, t)| estimate_tokens(t)).sum();
    if total <= available {
        return capped;
    }

    // Reverse-walk greedy keep from the most recent message backwards.
    let mut kept: Vec<(MessageRole, String)> = Vec::new();
    let mut used = 0usize;
    for (role, text) in capped.into_iter().rev() {
        let tokens = estimate_tokens(&text);
        if used + tokens <= available {
            used += tokens;
            kept.push((role, text));
        } else if kept.is_empty() {
            // The single oldest-kept message alone exceeds budget; force
            // truncate it so at least one message survives.
            let forced = truncate_to_tokens(&text, available.saturating_sub(1_000));
            kept.push((role, forced));
            break;
        } else {
            break;
        }
    }
    kept.reverse();
    kept
}

const TOOL_INDICATORS: &[&str] = &["TOOL_CALL:", "TOOL_CALL :", "<INVOKE", "FUNCTION_CALL", "ARGUMENTS:"];

/// Heuristic check for whether a reply is attempting a tool call at all,
/// matching the original's permissive indicator scan.
#[must_use]
pub fn looks_like_tool_call(content: &str, known_tool_names: &[&str]) -> bool {
    let upper = content.to_uppercase();
    if TOOL_INDICATORS.iter().any(|i| upper.contains(i)) {
        return true;
    }
    known_tool_names
        .iter()
        .any(|name| content.contains(name))
}

/// Extract all tool calls from a model reply using the three-strategy
/// pipeline from `_extract_tool_calls`, deduplicated by name + canonical
/// (sorted-key) argument JSON.
#[must_use]
pub fn extract_tool_calls(content: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    let mut seen = HashSet::new();

    extract_tool_call_style(content, &mut calls, &mut seen);
    extract_invoke_style(content, &mut calls, &mut seen);
    extract_bare_function_style(content, &mut calls, &mut seen);

    calls
}

fn dedup_key(name: &str, args: &Value) -> String {
    format!("{name}:{}", canonical_json(args))
}

#[must_use]
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}

fn extract_tool_call_style(
    content: &str,
    calls: &mut Vec<ParsedToolCall>,
    seen: &mut HashSet<String>,
) {
    let upper = content.to_uppercase();
    let mut search_from = 0;
    while let Some(rel) = upper[search_from..].find("TOOL_CALL:") {
        let start = search_from + rel + "TOOL_CALL:".len();
        let rest = &content[start..];
        let name_end = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        let name = rest[..name_end].trim().to_string();
        if name.is_empty() {
            search_from = start;
            continue;
        }

        let window_end = (start + name_end + 500).min(content.len());
        let window = &content[start + name_end..window_end];
        if let Some(args) = find_arguments_json(window) {
            let key = dedup_key(&name, &args);
            if seen.insert(key) {
                calls.push(ParsedToolCall { name, arguments: args });
            }
        }

        search_from = start + name_end;
    }
}

fn find_arguments_json(window: &str) -> Option<Value> {
    let upper = window.to_uppercase();
    let marker = upper.find("ARGUMENTS:")?;
    let after = &window[marker + "ARGUMENTS:".len()..];
    let brace_start = after.find('{')?;
    let raw = extract_json_object(&after[brace_start..])?;
    parse_or_repair_json(&raw)
}

/// Brace-matching extractor respecting string literals and escapes (not
/// regex), matching `_extract_json_object`. Returns the matched slice
/// including both braces.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.first() != Some(&'{') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(chars[..=i].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

/// Apply a fixed set of JSON repairs on parse failure, matching
/// `_try_fix_json`: single→double quotes, unquoted identifier values,
/// trailing commas.
#[must_use]
pub fn parse_or_repair_json(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }

    let single_to_double = raw.replace('\'', "\"");
    if let Ok(v) = serde_json::from_str(&single_to_double) {
        return Some(v);
    }

    let trailing_comma_re = regex::Regex::new(r",\s*([}\]])").ok()?;
    let no_trailing = trailing_comma_re.replace_all(&single_to_double, "$1");
    if let Ok(v) = serde_json::from_str(&no_trailing) {
        return Some(v);
    }

    let unquoted_re = regex::Regex::new(r#":\s*([A-Za-z_][A-Za-z0-9_]*)\s*([,}])"#).ok()?;
    let quoted = unquoted_re.replace_all(&no_trailing, r#": "$1"$2"#);
    serde_json::from_str(&quoted).ok()
}

fn extract_invoke_style(
    content: &str,
    calls: &mut Vec<ParsedToolCall>,
    seen: &mut HashSet<String>,
) {
    let re = regex::Regex::new(r#"<invoke\s+name="([^"]+)">"#).unwrap();
    let param_re = regex::Regex::new(r#"<parameter\s+name="([^"]+)">([^<]*)</parameter>"#).unwrap();

    for cap in re.captures_iter(content) {
        let name = cap[1].to_string();
        let start = cap.get(0).unwrap().end();
        let end = content[start..]
            .find("</invoke>")
            .map_or(content.len(), |e| start + e);
        let body = &content[start..end];

        let mut args = serde_json::Map::new();
        for pcap in param_re.captures_iter(body) {
            args.insert(pcap[1].to_string(), Value::String(pcap[2].trim().to_string()));
        }
        let arguments = Value::Object(args);
        let key = dedup_key(&name, &arguments);
        if seen.insert(key) {
            calls.push(ParsedToolCall { name, arguments });
        }
    }
}

const BLOCKED_FUNC_NAMES: &[&str] = &["if", "for", "while", "function", "def", "class"];

fn extract_bare_function_style(
    content: &str,
    calls: &mut Vec<ParsedToolCall>,
    seen: &mut HashSet<String>,
) {
    let re = regex::Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\(\s*(\{)").unwrap();
    for cap in re.captures_iter(content) {
        let name = cap[1].to_string();
        if BLOCKED_FUNC_NAMES.contains(&name.as_str()) {
            continue;
        }
        let brace_start = cap.get(2).unwrap().start();
        let Some(raw) = extract_json_object(&content[brace_start..]) else {
            continue;
        };
        let Some(arguments) = parse_or_repair_json(&raw) else {
            continue;
        };
        let key = dedup_key(&name, &arguments);
        if seen.insert(key) {
            calls.push(ParsedToolCall { name, arguments });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_object_respects_strings_and_escapes() {
        let text = r#"{"a": "value with \"escaped\" and { brace }", "b": 1}"#;
        let extracted = extract_json_object(text).unwrap();
        let value: Value = serde_json::from_str(&extracted).unwrap();
        assert_eq!(value["b"], 1);
    }

    #[test]
    fn repairs_single_quotes_and_trailing_commas() {
        let raw = "{'a': 1, 'b': 2,}";
        let value = parse_or_repair_json(raw).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], 2);
    }

    #[test]
    fn repairs_unquoted_identifier_values() {
        let raw = r#"{"action": click}"#;
        let value = parse_or_repair_json(raw).unwrap();
        assert_eq!(value["action"], "click");
    }

    #[test]
    fn extracts_tool_call_and_arguments() {
        let content = "I'll click it.\nTOOL_CALL: click\nARGUMENTS: {\"selector\": \"#go\"}";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "click");
        assert_eq!(calls[0].arguments["selector"], "#go");
    }

    #[test]
    fn deduplicates_identical_calls_by_name_and_canonical_args() {
        let content = "TOOL_CALL: click\nARGUMENTS: {\"b\": 2, \"a\": 1}\nTOOL_CALL: click\nARGUMENTS: {\"a\": 1, \"b\": 2}";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn rejects_blocklisted_bare_function_names() {
        let content = "if ({\"a\": 1}) { doStuff(); }";
        let calls = extract_tool_calls(content);
        assert!(calls.is_empty());
    }

    #[test]
    fn invoke_style_extraction() {
        let content = r#"<invoke name="fill"><parameter name="selector">#q</parameter><parameter name="value">laptop</parameter></invoke>"#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "fill");
        assert_eq!(calls[0].arguments["selector"], "#q");
    }

    #[test]
    fn normalization_alternates_and_ends_on_user() {
        let messages = vec![
            LlmMessage::user("hi"),
            LlmMessage::assistant(vec![ContentBlock::text("hello")]),
            LlmMessage::assistant(vec![ContentBlock::text("again")]),
        ];
        let flat = normalize_messages(&messages);
        for w in flat.windows(2) {
            assert_ne!(w[0].0, w[1].0);
        }
        assert_eq!(flat.last().unwrap().0, MessageRole::User);
    }

    #[test]
    fn normalization_handles_leading_assistant() {
        let messages = vec![LlmMessage::assistant(vec![ContentBlock::text("hello")])];
        let flat = normalize_messages(&messages);
        assert_eq!(flat[0].0, MessageRole::User);
    }

    #[test]
    fn truncate_conversation_respects_cap() {
        let big = "x".repeat(500_000);
        let flat = vec![
            (MessageRole::User, big.clone()),
            (MessageRole::Assistant, "ok".to_string()),
            (MessageRole::User, big),
        ];
        let result = truncate_conversation(flat, 0);
        let total_chars: usize = result.iter().map(|(_, t)| t.len()).sum();
        assert!(total_chars / CHARS_PER_TOKEN <= MAX_INPUT_TOKENS);
    }
}
