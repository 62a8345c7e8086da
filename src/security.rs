//! API-key resolution.
//!
//! Grounded in the original's `dependencies.py` (`get_api_key`) and the
//! teacher's convention of a small free function at the request boundary
//! rather than an extractor type: the header, the request body, and the
//! server's own environment are tried in order, and the first hit wins.

use crate::config::Settings;
use crate::error::ApiKeyError;
use crate::llm::LlmProvider;

/// `X-API-Key` header → request body `apiKey` → `<PROVIDER>_API_KEY` env var.
///
/// Returns a descriptive error naming `provider` when none resolve, so the
/// caller can turn it directly into a 401 via [`ApiKeyError`]'s
/// `IntoResponse` impl.
pub fn resolve_api_key(
    provider: LlmProvider,
    header: Option<&str>,
    body: Option<&str>,
    settings: &Settings,
) -> Result<String, ApiKeyError> {
    if let Some(key) = header.filter(|k| !k.is_empty()) {
        tracing::debug!(provider = provider.as_str(), key = %mask(key), source = "header", "resolved API key");
        return Ok(key.to_string());
    }
    if let Some(key) = body.filter(|k| !k.is_empty()) {
        tracing::debug!(provider = provider.as_str(), key = %mask(key), source = "body", "resolved API key");
        return Ok(key.to_string());
    }
    if let Some(key) = env_key_for(provider, settings) {
        tracing::debug!(provider = provider.as_str(), key = %mask(key), source = "env", "resolved API key");
        return Ok(key.to_string());
    }

    Err(ApiKeyError(format!(
        "no API key available for provider '{}': supply X-API-Key, apiKey, or set {}",
        provider.as_str(),
        env_var_name(provider),
    )))
}

/// Mask a secret for logging: first 4 / last 4 characters only, matching
/// the original's `mask_api_key`. Short keys mask entirely rather than
/// leak their full length in cleartext.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn env_key_for(provider: LlmProvider, settings: &Settings) -> Option<&str> {
    match provider {
        LlmProvider::Gemini => settings.gemini_api_key.as_deref(),
        LlmProvider::Perplexity => settings.perplexity_api_key.as_deref(),
        LlmProvider::HuggingFace => settings.huggingface_api_key.as_deref(),
    }
}

fn env_var_name(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Gemini => "GEMINI_API_KEY",
        LlmProvider::Perplexity => "PERPLEXITY_API_KEY",
        LlmProvider::HuggingFace => "HUGGINGFACE_API_KEY",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(gemini: Option<&str>) -> Settings {
        Settings {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![],
            rate_limit_enabled: true,
            rate_limit_agent_per_min: 5,
            rate_limit_codegen_per_min: 20,
            rate_limit_default_per_min: 60,
            max_steps_cap: 50,
            llm_timeout_secs: 120,
            browser_timeout_secs: 30,
            agent_timeout_secs: 300,
            llm_retry_max_attempts: 3,
            llm_retry_min_wait_secs: 1,
            llm_retry_max_wait_secs: 10,
            screenshot_quality: 80,
            gemini_api_key: gemini.map(str::to_string),
            perplexity_api_key: None,
            huggingface_api_key: None,
        }
    }

    #[test]
    fn header_wins_over_body_and_env() {
        let settings = settings_with(Some("env-key"));
        let resolved = resolve_api_key(LlmProvider::Gemini, Some("header-key"), Some("body-key"), &settings);
        assert_eq!(resolved.unwrap(), "header-key");
    }

    #[test]
    fn body_wins_over_env_when_header_absent() {
        let settings = settings_with(Some("env-key"));
        let resolved = resolve_api_key(LlmProvider::Gemini, None, Some("body-key"), &settings);
        assert_eq!(resolved.unwrap(), "body-key");
    }

    #[test]
    fn falls_back_to_env_var() {
        let settings = settings_with(Some("env-key"));
        let resolved = resolve_api_key(LlmProvider::Gemini, None, None, &settings);
        assert_eq!(resolved.unwrap(), "env-key");
    }

    #[test]
    fn missing_key_names_the_provider() {
        let settings = settings_with(None);
        let err = resolve_api_key(LlmProvider::Gemini, None, None, &settings).unwrap_err();
        assert!(err.0.contains("gemini"));
        assert!(err.0.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn empty_header_and_body_are_treated_as_absent() {
        let settings = settings_with(Some("env-key"));
        let resolved = resolve_api_key(LlmProvider::Gemini, Some(""), Some(""), &settings);
        assert_eq!(resolved.unwrap(), "env-key");
    }

    #[test]
    fn mask_keeps_only_head_and_tail() {
        assert_eq!(mask("sk-abcdefghijklmnop"), "sk-a...mnop");
    }

    #[test]
    fn mask_hides_short_keys_entirely() {
        assert_eq!(mask("short"), "*****");
    }
}
