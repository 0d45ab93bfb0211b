//! Process configuration from the environment

use std::env;

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Process-level settings. Per-call configuration comes from the platform
/// service; this is only what the process needs to stand up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,
    pub gpu_server_url: String,
    pub gpu_server_api_key: String,
    pub platform_url: String,
    pub platform_secret: String,
    pub max_call_duration_secs: u64,
    pub silence_timeout_secs: u64,
    pub validate_signatures: bool,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Self {
        // SILENCE_TIMEOUT_SECONDS and SILENCE_HANGUP_SECONDS are aliases;
        // the former wins when both are set.
        let silence_timeout_secs = env::var("SILENCE_TIMEOUT_SECONDS")
            .or_else(|_| env::var("SILENCE_HANGUP_SECONDS"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            port: parse_or("PORT", 8080),
            openai_api_key: var_or("OPENAI_API_KEY", ""),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-realtime-preview"),
            openai_temperature: parse_or("OPENAI_TEMPERATURE", 0.8),
            openai_max_tokens: parse_or("OPENAI_MAX_TOKENS", 4096),
            gpu_server_url: var_or("GPU_SERVER_URL", "http://127.0.0.1:8001"),
            gpu_server_api_key: var_or("GPU_SERVER_API_KEY", ""),
            platform_url: var_or("LARAVEL_API_URL", "http://127.0.0.1:8000/api/internal"),
            platform_secret: var_or("LARAVEL_API_SECRET", ""),
            max_call_duration_secs: parse_or("MAX_CALL_DURATION_SECONDS", 1800),
            silence_timeout_secs,
            validate_signatures: parse_or("TWILIO_VALIDATE_SIGNATURES", false),
            log_level: var_or("LOG_LEVEL", "info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Only check keys unlikely to be set in a test environment.
        let settings = Settings::from_env();
        assert!(settings.port > 0);
        assert!(settings.max_call_duration_secs > 0);
    }
}
