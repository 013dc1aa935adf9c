//! HTTP client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    naming::NamingStrategy,
    retry::{RetryConfig, DEFAULT_RETRY_BUDGET},
    snapshot::ClientOptions,
};

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// HTTP/HTTPS proxy URL
    #[serde(default)]
    pub proxy: Option<String>,

    /// Custom user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum redirects to follow (0 = no redirects)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Enable connection pooling
    #[serde(default = "default_pool_enabled")]
    pub pool_enabled: bool,

    /// Pool idle timeout
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout: Duration,

    /// Maximum resend attempts per logical call
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Delay before the first resend (exponential backoff, zero = immediate)
    #[serde(default)]
    pub retry_delay: Duration,

    /// Upper bound on the delay between resends
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: Duration,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Field casing for structured payloads
    #[serde(default)]
    pub naming_strategy: NamingStrategy,

    /// Treat every non-2xx final response as a failure
    #[serde(default)]
    pub enforce_success: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            proxy: None,
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            pool_enabled: default_pool_enabled(),
            pool_idle_timeout: default_pool_idle_timeout(),
            retry_budget: default_retry_budget(),
            retry_delay: Duration::ZERO,
            retry_max_delay: default_retry_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            naming_strategy: NamingStrategy::default(),
            enforce_success: false,
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config for fast operations (5s timeout, no retries)
    pub fn fast() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry_budget: 0,
            ..Default::default()
        }
    }

    /// Create config for long operations (60s timeout, 3 retries with backoff)
    pub fn long() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            retry_budget: 3,
            retry_delay: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry budget
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Set delay before the first resend
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set proxy URL
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set payload naming strategy
    pub fn with_naming_strategy(mut self, strategy: NamingStrategy) -> Self {
        self.naming_strategy = strategy;
        self
    }

    /// Enforce 2xx final responses by default
    pub fn with_enforce_success(mut self, enforce: bool) -> Self {
        self.enforce_success = enforce;
        self
    }

    /// Retry settings for the pipeline
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            budget: self.retry_budget,
            initial_delay: self.retry_delay,
            max_delay: self.retry_max_delay,
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    /// Options a client config resets to after each call
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            naming_strategy: self.naming_strategy,
            enforce_success: self.enforce_success,
            on_success_violation: None,
        }
    }
}

// Default value functions for serde
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    format!("tether-http/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

fn default_pool_enabled() -> bool {
    true
}

fn default_pool_idle_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.retry_delay, Duration::ZERO);
        assert_eq!(config.naming_strategy, NamingStrategy::Camel);
        assert!(!config.enforce_success);
        assert!(config.pool_enabled);
    }

    #[test]
    fn test_fast_config() {
        let config = HttpConfig::fast();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry_budget, 0);
    }

    #[test]
    fn test_long_config() {
        let config = HttpConfig::long();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry().budget, 3);
        assert_eq!(config.retry().calculate_delay(1), Duration::from_secs(4));
    }

    #[test]
    fn test_builder_pattern() {
        let config = HttpConfig::new()
            .with_timeout(Duration::from_secs(15))
            .with_retry_budget(2)
            .with_naming_strategy(NamingStrategy::Snake)
            .with_enforce_success(true)
            .with_proxy("http://proxy.example.com:8080");

        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.retry_budget, 2);
        assert_eq!(config.proxy, Some("http://proxy.example.com:8080".to_string()));

        let options = config.client_options();
        assert_eq!(options.naming_strategy, NamingStrategy::Snake);
        assert!(options.enforce_success);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: HttpConfig =
            serde_json::from_str(r#"{"retry_budget": 1, "naming_strategy": "snake"}"#).unwrap();
        assert_eq!(config.retry_budget, 1);
        assert_eq!(config.naming_strategy, NamingStrategy::Snake);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
