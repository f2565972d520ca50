// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the mailbox admission gate.
//!
//! Every value has a default so the service starts with an empty
//! environment. The CAPTCHA keys default to empty strings, which is only
//! useful for local development: verification will always be rejected.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Configuration for the admission gate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Admission thresholds
    #[serde(default)]
    pub policy: AdmissionPolicy,

    /// CAPTCHA provider settings
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Caller identity resolution
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Interval between expired-record sweeps in seconds (default: 60)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Thresholds applied to every identity's counter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    /// Attempts since the last reset at which a CAPTCHA is demanded (default: 5)
    #[serde(default = "default_challenge_threshold")]
    pub challenge_threshold: u32,

    /// Attempts per window beyond which requests are refused outright,
    /// solved challenges included. 0 disables the ceiling (default: 50)
    #[serde(default = "default_hard_ceiling")]
    pub hard_ceiling: u32,

    /// Counting window in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// CAPTCHA provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Public site key handed to clients for rendering the widget
    #[serde(default)]
    pub site_key: String,

    /// Secret key sent to the provider's verification endpoint
    #[serde(default, skip_serializing)]
    pub secret_key: String,

    /// Provider "siteverify" endpoint
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Upper bound on a single verification call in milliseconds (default: 5000)
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
}

/// Identity resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Prefer X-Forwarded-For / X-Real-IP over the socket address (default: true).
    /// Disable when the service is reachable without a reverse proxy.
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Invalid configuration detected at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("challenge_threshold must be at least 1")]
    ZeroThreshold,

    #[error("hard_ceiling ({ceiling}) must be 0 or above challenge_threshold ({threshold})")]
    CeilingBelowThreshold { ceiling: u32, threshold: u32 },

    #[error("window_secs must be greater than zero")]
    ZeroWindow,

    #[error("invalid CAPTCHA verify URL: {0}")]
    InvalidVerifyUrl(String),

    #[error("failed to build CAPTCHA HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to register metrics: {0}")]
    Metrics(String),
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_challenge_threshold() -> u32 {
    5
}

fn default_hard_ceiling() -> u32 {
    50
}

fn default_window_secs() -> u64 {
    3600
}

fn default_verify_url() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_verify_timeout_ms() -> u64 {
    5000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            policy: AdmissionPolicy::default(),
            captcha: CaptchaConfig::default(),
            identity: IdentityConfig::default(),
            metrics: MetricsConfig::default(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            challenge_threshold: default_challenge_threshold(),
            hard_ceiling: default_hard_ceiling(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            site_key: String::new(),
            secret_key: String::new(),
            verify_url: default_verify_url(),
            verify_timeout_ms: default_verify_timeout_ms(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_headers: default_true(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl AdmissionPolicy {
    /// Get the counting window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Whether the hard-deny ceiling is active.
    pub fn ceiling_enabled(&self) -> bool {
        self.hard_ceiling > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.challenge_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.ceiling_enabled() && self.hard_ceiling <= self.challenge_threshold {
            return Err(ConfigError::CeilingBelowThreshold {
                ceiling: self.hard_ceiling,
                threshold: self.challenge_threshold,
            });
        }
        if self.window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

impl CaptchaConfig {
    /// Get the verification timeout
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    /// Parse the verify URL, accepting only http(s) endpoints with a host.
    pub fn parsed_verify_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.verify_url)
            .map_err(|e| ConfigError::InvalidVerifyUrl(format!("{}: {e}", self.verify_url)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidVerifyUrl(self.verify_url.clone()));
        }
        Ok(url)
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// - `BIND_ADDR`
    /// - `CHALLENGE_THRESHOLD`, `HARD_CEILING`, `WINDOW_SECS`
    /// - `CAPTCHA_SITE_KEY`, `CAPTCHA_SECRET_KEY`, `CAPTCHA_VERIFY_URL`, `CAPTCHA_TIMEOUT_MS`
    /// - `TRUST_FORWARDED_HEADERS`
    /// - `METRICS_ENABLED`, `CLEANUP_INTERVAL_SECS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> T {
            lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        let defaults = Config::default();
        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            policy: AdmissionPolicy {
                challenge_threshold: parsed(
                    &lookup,
                    "CHALLENGE_THRESHOLD",
                    defaults.policy.challenge_threshold,
                ),
                hard_ceiling: parsed(&lookup, "HARD_CEILING", defaults.policy.hard_ceiling),
                window_secs: parsed(&lookup, "WINDOW_SECS", defaults.policy.window_secs),
            },
            captcha: CaptchaConfig {
                site_key: lookup("CAPTCHA_SITE_KEY").unwrap_or(defaults.captcha.site_key),
                secret_key: lookup("CAPTCHA_SECRET_KEY").unwrap_or(defaults.captcha.secret_key),
                verify_url: lookup("CAPTCHA_VERIFY_URL").unwrap_or(defaults.captcha.verify_url),
                verify_timeout_ms: parsed(
                    &lookup,
                    "CAPTCHA_TIMEOUT_MS",
                    defaults.captcha.verify_timeout_ms,
                ),
            },
            identity: IdentityConfig {
                trust_forwarded_headers: parsed(
                    &lookup,
                    "TRUST_FORWARDED_HEADERS",
                    defaults.identity.trust_forwarded_headers,
                ),
            },
            metrics: MetricsConfig {
                enabled: parsed(&lookup, "METRICS_ENABLED", defaults.metrics.enabled),
                ..defaults.metrics
            },
            cleanup_interval_secs: parsed(
                &lookup,
                "CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
            ),
        }
    }

    /// Check the configuration for values the gate cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.captcha.parsed_verify_url()?;
        Ok(())
    }

    /// Get the eviction sweep interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
