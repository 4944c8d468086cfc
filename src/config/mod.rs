//! # Settings
//!
//! Runtime settings read from the environment once at startup. Every value
//! has a default, so the runner works with no configuration at all.
//!
//! | Variable                | Default                  |
//! |-------------------------|--------------------------|
//! | `APP_ENV`               | `development`            |
//! | `UI_RUNNER_SERVICE_URL` | `http://localhost:8000`  |
//! | `UI_RUNNER_BROWSER`     | `chromium`               |
//! | `PLAYWRIGHT_HEADLESS`   | `true`                   |
//! | `PLAYWRIGHT_TIMEOUT`    | `30000` (ms)             |
//! | `OPENAI_MODEL`          | `gpt-4o-mini`            |
//! | `OPENAI_TEMPERATURE`    | `0.1`                    |
//! | `LLM_MAX_TOKENS`        | `4096`                   |
//! | `LLM_CACHE_TTL`         | `300` (s)                |
//! | `LOG_LEVEL`             | `INFO`                   |
//! | `LOG_FORMAT`            | `console`                |

use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::limits::DEFAULT_EXECUTION_TIMEOUT_MS;
use crate::protocol::{BrowserKind, ExecutionOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" => Ok(Self::Webkit),
            other => Err(format!("unsupported browser '{}'", other)),
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model for medium-complexity tasks.
    pub model: String,
    pub simple_model: String,
    pub complex_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub cache_ttl: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            simple_model: "gpt-4o-mini".to_string(),
            complex_model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub app_env: AppEnv,
    /// Base URL of the remote automation service.
    pub service_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Default per-step timeout, ms.
    pub step_timeout_ms: u64,
    pub generation: GenerationSettings,
    pub log_level: Level,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_env: AppEnv::Development,
            service_url: "http://localhost:8000".to_string(),
            browser: BrowserKind::Chromium,
            headless: true,
            step_timeout_ms: DEFAULT_EXECUTION_TIMEOUT_MS,
            generation: GenerationSettings::default(),
            log_level: Level::INFO,
            log_format: LogFormat::Compact,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Unparseable values keep their
    /// default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(env) = parse("APP_ENV").and_then(|v| v.parse().ok()) {
            settings.app_env = env;
        }
        if let Some(url) = parse("UI_RUNNER_SERVICE_URL") {
            settings.service_url = url.trim_end_matches('/').to_string();
        }
        if let Some(browser) = parse("UI_RUNNER_BROWSER").and_then(|v| v.parse().ok()) {
            settings.browser = browser;
        }
        if let Some(headless) = parse("PLAYWRIGHT_HEADLESS").and_then(|v| parse_bool(&v)) {
            settings.headless = headless;
        }
        if let Some(timeout) = parse("PLAYWRIGHT_TIMEOUT").and_then(|v| v.parse().ok()) {
            settings.step_timeout_ms = timeout;
        }
        if let Some(model) = parse("OPENAI_MODEL") {
            settings.generation.model = model;
        }
        if let Some(t) = parse("OPENAI_TEMPERATURE").and_then(|v| v.parse().ok()) {
            settings.generation.temperature = t;
        }
        if let Some(n) = parse("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            settings.generation.max_tokens = n;
        }
        if let Some(secs) = parse("LLM_CACHE_TTL").and_then(|v| v.parse().ok()) {
            settings.generation.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(level) = parse("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            settings.log_level = level;
        }
        if let Some(format) = parse("LOG_FORMAT").and_then(|v| v.parse().ok()) {
            settings.log_format = format;
        }

        settings
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    /// Run options seeded from these settings.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            browser: self.browser,
            headless: self.headless,
            timeout: self.step_timeout_ms,
            ..ExecutionOptions::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
