//! Configuration management for deep-research.
//!
//! Configuration can be set via environment variables:
//! - `LM_URL` - Optional. OpenAI-compatible endpoint. Defaults to `http://localhost:1234/v1`
//!   (or the Windows host when running under WSL).
//! - `LM_API_KEY` - Optional. Bearer token for the endpoint. Defaults to `lm-studio`.
//! - `LM_MODEL` - Optional. Model name sent with each request. Defaults to `local-model`.
//! - `LM_TIMEOUT_SECS` - Optional. Per-request timeout. Defaults to `300`.
//! - `SEARX_URL` - Optional. SearXNG base URL. Defaults to `http://localhost:8080`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8081`.
//! - `RESEARCH_LOOPS`, `RESEARCH_PARALLEL`, `CONTEXT_LENGTH`, `MIN_RESULTS`,
//!   `DELAY_MS`, `MAX_PAGES` - Optional. Research defaults (see [`ResearchSettings`]).
//! - `DEEP_MODE`, `RESULT_LINKS`, `SIMPLE_MODE` - Optional booleans.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::util::env_var_bool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_MAX_ROUNDS: usize = 5;
pub const DEFAULT_PARALLELISM: usize = 5;
pub const DEFAULT_CONTEXT_LENGTH: i64 = 32768;
pub const DEFAULT_MIN_RESULTS: usize = 20;
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Knobs for a single research run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSettings {
    /// Maximum number of rounds
    pub max_rounds: usize,

    /// Queries per round and concurrent query slots
    pub parallelism: usize,

    /// Fetch and summarize each page instead of using snippets
    pub deep_mode: bool,

    /// Ask the model to emphasize direct item links
    pub result_links: bool,

    /// Use the decide/search/summarize loop instead of exhaustive mode
    pub simple_mode: bool,

    /// Stop exhaustive mode once this many unique sources are collected
    pub min_results: usize,

    /// Delay before every outbound search or fetch request
    pub delay: Duration,

    /// Pages per query; 0 means keep paging until a page comes back empty
    pub max_pages: usize,

    /// Model context window in tokens; non-positive means unknown
    pub context_length: i64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallelism: DEFAULT_PARALLELISM,
            deep_mode: false,
            result_links: false,
            simple_mode: false,
            min_results: DEFAULT_MIN_RESULTS,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            max_pages: 0,
            context_length: DEFAULT_CONTEXT_LENGTH,
        }
    }
}

impl ResearchSettings {
    /// Read research defaults from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_rounds: env_parse("RESEARCH_LOOPS", DEFAULT_MAX_ROUNDS)?,
            parallelism: env_parse("RESEARCH_PARALLEL", DEFAULT_PARALLELISM)?,
            deep_mode: env_var_bool("DEEP_MODE", false),
            result_links: env_var_bool("RESULT_LINKS", false),
            simple_mode: env_var_bool("SIMPLE_MODE", false),
            min_results: env_parse("MIN_RESULTS", DEFAULT_MIN_RESULTS)?,
            delay: Duration::from_millis(env_parse("DELAY_MS", DEFAULT_DELAY_MS)?),
            max_pages: env_parse("MAX_PAGES", 0)?,
            context_length: env_parse("CONTEXT_LENGTH", DEFAULT_CONTEXT_LENGTH)?,
        })
    }

    /// Replace zero values with defaults.
    ///
    /// `max_pages` keeps 0 (auto) and the boolean flags are untouched.
    pub fn with_defaults(mut self) -> Self {
        if self.max_rounds == 0 {
            self.max_rounds = DEFAULT_MAX_ROUNDS;
        }
        if self.parallelism == 0 {
            self.parallelism = DEFAULT_PARALLELISM;
        }
        if self.context_length <= 0 {
            self.context_length = DEFAULT_CONTEXT_LENGTH;
        }
        if self.min_results == 0 {
            self.min_results = DEFAULT_MIN_RESULTS;
        }
        if self.delay.is_zero() {
            self.delay = Duration::from_millis(DEFAULT_DELAY_MS);
        }
        self
    }
}

/// Generation endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f64,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_lm_url(),
            api_key: "lm-studio".to_string(),
            model: "local-model".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Generation endpoint
    pub llm: LlmConfig,

    /// SearXNG base URL
    pub searx_url: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Defaults applied to research runs
    pub research: ResearchSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm = LlmConfig {
            base_url: std::env::var("LM_URL").unwrap_or_else(|_| default_lm_url()),
            api_key: std::env::var("LM_API_KEY").unwrap_or_else(|_| "lm-studio".to_string()),
            model: std::env::var("LM_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            temperature: 0.0,
            timeout: Duration::from_secs(env_parse("LM_TIMEOUT_SECS", 300)?),
        };

        let searx_url =
            std::env::var("SEARX_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 8081)?;

        Ok(Self {
            llm,
            searx_url,
            host,
            port,
            research: ResearchSettings::from_env()?,
        })
    }

    /// Create a config with custom endpoints (useful for testing).
    pub fn new(lm_url: String, searx_url: String) -> Self {
        Self {
            llm: LlmConfig {
                base_url: lm_url,
                ..LlmConfig::default()
            },
            searx_url,
            host: "127.0.0.1".to_string(),
            port: 8081,
            research: ResearchSettings::default(),
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        _ => Ok(default),
    }
}

/// Default LM Studio URL, pointing at the Windows host when running under WSL.
pub fn default_lm_url() -> String {
    if is_wsl() {
        if let Some(host) = wsl_host() {
            return format!("http://{}:1234/v1", host);
        }
    }
    "http://localhost:1234/v1".to_string()
}

fn is_wsl() -> bool {
    if std::env::var("WSL_DISTRO_NAME").is_ok() {
        return true;
    }
    if !cfg!(target_os = "linux") {
        return false;
    }
    std::fs::read_to_string("/proc/version")
        .map(|v| v.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Resolve the Windows host IP from inside WSL.
///
/// Prefers the default gateway, then the first resolv.conf nameserver.
fn wsl_host() -> Option<String> {
    if let Ok(out) = std::process::Command::new("ip")
        .args(["route", "show", "default"])
        .output()
    {
        if let Some(gw) = gateway_from_route(&String::from_utf8_lossy(&out.stdout)) {
            return Some(gw);
        }
    }
    std::fs::read_to_string("/etc/resolv.conf")
        .ok()
        .and_then(|conf| nameserver_from_resolv(&conf))
}

fn gateway_from_route(output: &str) -> Option<String> {
    let fields: Vec<&str> = output.split_whitespace().collect();
    fields
        .windows(2)
        .find(|w| w[0] == "via")
        .map(|w| w[1].to_string())
}

fn nameserver_from_resolv(conf: &str) -> Option<String> {
    conf.lines()
        .filter(|line| line.starts_with("nameserver"))
        .find_map(|line| line.split_whitespace().nth(1))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_fills_zero_values() {
        let settings = ResearchSettings {
            max_rounds: 0,
            parallelism: 0,
            min_results: 0,
            delay: Duration::ZERO,
            context_length: -1,
            max_pages: 0,
            deep_mode: true,
            ..ResearchSettings::default()
        }
        .with_defaults();

        assert_eq!(settings.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(settings.parallelism, DEFAULT_PARALLELISM);
        assert_eq!(settings.min_results, DEFAULT_MIN_RESULTS);
        assert_eq!(settings.delay, Duration::from_millis(DEFAULT_DELAY_MS));
        assert_eq!(settings.context_length, DEFAULT_CONTEXT_LENGTH);
        assert_eq!(settings.max_pages, 0);
        assert!(settings.deep_mode);
    }

    #[test]
    fn gateway_is_parsed_from_ip_route() {
        let out = "default via 172.20.16.1 dev eth0 proto kernel\n";
        assert_eq!(gateway_from_route(out).as_deref(), Some("172.20.16.1"));
        assert_eq!(gateway_from_route(""), None);
    }

    #[test]
    fn nameserver_is_parsed_from_resolv_conf() {
        let conf = "# generated\nsearch lan\nnameserver 10.255.255.254\n";
        assert_eq!(
            nameserver_from_resolv(conf).as_deref(),
            Some("10.255.255.254")
        );
    }
}
