//! Process-wide configuration, read once from the environment at startup.
//!
//! Follows the teacher's `main.rs` precedent of plain `std::env::var` reads
//! rather than a config-file crate (`config`, `figment`, …), generalized from
//! the original's `config.py` `Settings` dataclass.

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Comma-separated CORS origins; empty means "allow any" (development
    /// default, matching the teacher's `CorsLayer::new().allow_origin(Any)`).
    pub cors_origins: Vec<String>,

    pub rate_limit_enabled: bool,
    pub rate_limit_agent_per_min: u32,
    pub rate_limit_codegen_per_min: u32,
    pub rate_limit_default_per_min: u32,

    /// Server-side hard cap on `AgentRequest`-requested `max_steps`; a
    /// request asking for more is clamped, not rejected.
    pub max_steps_cap: u32,

    pub llm_timeout_secs: u64,
    pub browser_timeout_secs: u64,
    pub agent_timeout_secs: u64,

    pub llm_retry_max_attempts: u32,
    pub llm_retry_min_wait_secs: u64,
    pub llm_retry_max_wait_secs: u64,

    pub screenshot_quality: u8,

    pub gemini_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
}

impl Settings {
    /// Load settings from the environment, falling back to the defaults
    /// from the original's `config.py`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            host: env_or("BROWSER_AGENT_HOST", "0.0.0.0"),
            port: env_parse("BROWSER_AGENT_PORT", 8000),
            cors_origins: std::env::var("BROWSER_AGENT_CORS_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(str::trim).map(String::from).collect())
                .unwrap_or_default(),
            rate_limit_enabled: env_parse("BROWSER_AGENT_RATE_LIMIT_ENABLED", true),
            rate_limit_agent_per_min: env_parse("BROWSER_AGENT_RATE_LIMIT_AGENT", 5),
            rate_limit_codegen_per_min: env_parse("BROWSER_AGENT_RATE_LIMIT_CODEGEN", 20),
            rate_limit_default_per_min: env_parse("BROWSER_AGENT_RATE_LIMIT_DEFAULT", 60),
            max_steps_cap: env_parse("BROWSER_AGENT_MAX_STEPS", 50),
            llm_timeout_secs: env_parse("BROWSER_AGENT_LLM_TIMEOUT", 120),
            browser_timeout_secs: env_parse("BROWSER_AGENT_BROWSER_TIMEOUT", 30),
            agent_timeout_secs: env_parse("BROWSER_AGENT_AGENT_TIMEOUT", 300),
            llm_retry_max_attempts: env_parse("BROWSER_AGENT_LLM_RETRY_MAX_ATTEMPTS", 3),
            llm_retry_min_wait_secs: env_parse("BROWSER_AGENT_LLM_RETRY_MIN_WAIT", 1),
            llm_retry_max_wait_secs: env_parse("BROWSER_AGENT_LLM_RETRY_MAX_WAIT", 10),
            screenshot_quality: env_parse("BROWSER_AGENT_SCREENSHOT_QUALITY", 80),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            perplexity_api_key: std::env::var("PERPLEXITY_API_KEY").ok(),
            huggingface_api_key: std::env::var("HUGGINGFACE_API_KEY").ok(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_config_py() {
        std::env::remove_var("BROWSER_AGENT_MAX_STEPS");
        std::env::remove_var("BROWSER_AGENT_RATE_LIMIT_AGENT");
        let settings = Settings::from_env();
        assert_eq!(settings.max_steps_cap, 50);
        assert_eq!(settings.rate_limit_agent_per_min, 5);
        assert_eq!(settings.rate_limit_codegen_per_min, 20);
        assert_eq!(settings.llm_timeout_secs, 120);
        assert_eq!(settings.agent_timeout_secs, 300);
    }
}
