use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the portfolio chat server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub profile: ProfileConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Upper bound for one chat exchange, tool steps included.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: i32,
    /// Model round trips per request; each tool-calling round costs one.
    pub max_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

pub const API_KEY_ENV: &str = "MODEL_API_KEY";
const API_KEY_FALLBACK_ENV: &str = "GROQ_API_KEY";

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::warn!("No .env file found - continuing with env vars only");
        }

        let config_path =
            env::var("PORTFOLIO_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = Self::from_file(&config_path);

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    fn from_file(config_path: &str) -> Self {
        if !Path::new(config_path).exists() {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            return Self::default();
        }

        match fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path);
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!(
                    "Failed to read config file {}: {} - using defaults",
                    config_path,
                    e
                );
                Self::default()
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(bind) = var("PORTFOLIO_BIND") {
            self.server.bind = bind;
        }
        if let Some(timeout) = var("PORTFOLIO_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(secs) = timeout.parse() {
                self.server.request_timeout_seconds = secs;
            }
        }

        // Profile overrides
        if let Some(path) = var("PORTFOLIO_PROFILE_PATH") {
            self.profile.path = path;
        }

        // Model overrides
        if let Some(api_key) = var(API_KEY_ENV).or_else(|| var(API_KEY_FALLBACK_ENV)) {
            self.model.api_key = api_key;
        }
        if let Some(base) = var("MODEL_API_BASE") {
            self.model.api_base = base;
        }
        if let Some(model) = var("MODEL_NAME") {
            self.model.model = model;
        }
        if let Some(steps) = var("MODEL_MAX_STEPS") {
            if let Ok(steps) = steps.parse() {
                self.model.max_steps = steps;
            }
        }

        // Retry overrides
        if let Some(attempts) = var("PORTFOLIO_RETRY_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                self.retry.max_attempts = attempts;
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.server.request_timeout_seconds == 0 {
            return Err("server.request_timeout_seconds cannot be 0".into());
        }

        if self.model.max_steps == 0 {
            return Err("model.max_steps cannot be 0".into());
        }

        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts cannot be 0".into());
        }
        if self.retry.jitter_factor < 0.0 || self.retry.jitter_factor > 1.0 {
            return Err("Retry jitter factor must be between 0.0 and 1.0".into());
        }

        if !self.has_api_key() {
            return Err(format!(
                "{API_KEY_ENV} is not set - /api/chat will answer 500 until it is"
            )
            .into());
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.model.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.model.api_base.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:3000".to_string(),
                request_timeout_seconds: 30,
            },
            model: ModelConfig {
                api_base: "https://api.groq.com/openai/v1".to_string(),
                api_key: String::new(),
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.7,
                max_tokens: 1500,
                max_steps: 2,
            },
            profile: ProfileConfig {
                path: "portfolio-config.json".to_string(),
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 200,
                max_delay_ms: 5000,
                jitter_factor: 0.2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_cap_tool_steps_at_two() {
        let cfg = Config::default();
        assert_eq!(cfg.model.max_steps, 2);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert!(!cfg.has_api_key());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[
            ("PORTFOLIO_BIND", "0.0.0.0:8080"),
            ("GROQ_API_KEY", "gsk_fallback"),
            ("MODEL_MAX_STEPS", "3"),
            ("PORTFOLIO_REQUEST_TIMEOUT_SECONDS", "not-a-number"),
        ]));
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.model.api_key, "gsk_fallback");
        assert_eq!(cfg.model.max_steps, 3);
        assert_eq!(cfg.server.request_timeout_seconds, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_primary_api_key_wins_over_fallback() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[(API_KEY_ENV, "primary"), ("GROQ_API_KEY", "fallback")]));
        assert_eq!(cfg.model.api_key, "primary");
    }

    #[test]
    fn test_unparseable_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("portfolio-config-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(&path, "server: [not, a, map]").unwrap();
        let cfg = Config::from_file(path.to_str().unwrap());
        assert_eq!(cfg.server.bind, Config::default().server.bind);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let mut cfg = Config::default();
        cfg.model.api_base = "http://localhost:9000/v1/".to_string();
        assert_eq!(cfg.completions_url(), "http://localhost:9000/v1/chat/completions");
    }
}
