use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::protocol::dispatcher::{DispatchPolicy, FailurePolicy, UnknownMethodPolicy};

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SEC_USER_AGENT: &str = "AutoInvestigator/1.0 contact@example.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub api_token: Option<String>,
    pub dispatch: DispatchPolicy,
    pub upstream: UpstreamConfig,
}

/// Credentials and endpoints of the external collaborators. Missing credentials only
/// disable the affected tool.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub google_search_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub serp_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub sender_mail: Option<String>,
    pub mail_password: Option<String>,
    pub smtp_host: String,
    pub sec_user_agent: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("DISPATCH_FAILURE_POLICY must be one of: isolate, strict")]
    InvalidFailurePolicy,
    #[error("DISPATCH_UNKNOWN_METHOD must be one of: ignore, report")]
    InvalidUnknownMethodPolicy,
    #[error("DISPATCH_MAX_CONCURRENCY must be a positive integer")]
    InvalidConcurrency,
    #[error("DISPATCH_TOOL_TIMEOUT_SECS must be a non-negative integer")]
    InvalidTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            google_search_key: None,
            google_cse_id: None,
            serp_api_key: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            sender_mail: None,
            mail_password: None,
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            sec_user_agent: DEFAULT_SEC_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = value("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = value("BIND_PORT")
            .map(|port| port.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(5001);

        let failure = value("DISPATCH_FAILURE_POLICY")
            .map(|name| {
                FailurePolicy::from_name(&name.to_ascii_lowercase())
                    .ok_or(ConfigError::InvalidFailurePolicy)
            })
            .transpose()?
            .unwrap_or(FailurePolicy::Isolate);
        let unknown_method = value("DISPATCH_UNKNOWN_METHOD")
            .map(|name| {
                UnknownMethodPolicy::from_name(&name.to_ascii_lowercase())
                    .ok_or(ConfigError::InvalidUnknownMethodPolicy)
            })
            .transpose()?
            .unwrap_or(UnknownMethodPolicy::Ignore);
        let max_concurrency = value("DISPATCH_MAX_CONCURRENCY")
            .map(|count| {
                count
                    .parse::<usize>()
                    .ok()
                    .filter(|count| *count > 0)
                    .ok_or(ConfigError::InvalidConcurrency)
            })
            .transpose()?
            .unwrap_or(1);
        let timeout_secs = value("DISPATCH_TOOL_TIMEOUT_SECS")
            .map(|secs| secs.parse::<u64>().map_err(|_| ConfigError::InvalidTimeout))
            .transpose()?
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);

        let defaults = UpstreamConfig::default();
        let upstream = UpstreamConfig {
            google_search_key: value("GOOGL_SEARCH_KEY"),
            google_cse_id: value("CSE"),
            serp_api_key: value("SERP_KEY"),
            gemini_api_key: value("GEMINI_API_KEY"),
            gemini_model: value("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            sender_mail: value("SENDER_MAIL"),
            mail_password: value("MAIL_PASS"),
            smtp_host: value("SMTP_HOST").unwrap_or(defaults.smtp_host),
            sec_user_agent: value("SEC_USER_AGENT").unwrap_or(defaults.sec_user_agent),
        };

        let config = Self {
            bind_addr,
            bind_port,
            api_token: value("DISPATCH_API_TOKEN"),
            dispatch: DispatchPolicy {
                failure,
                unknown_method,
                max_concurrency,
                timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            },
            upstream,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = parse(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, 5001);
        assert_eq!(config.api_token, None);
        assert_eq!(config.dispatch.failure, FailurePolicy::Isolate);
        assert_eq!(config.dispatch.unknown_method, UnknownMethodPolicy::Ignore);
        assert_eq!(config.dispatch.max_concurrency, 1);
        assert_eq!(config.dispatch.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.upstream.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.upstream.smtp_host, "smtp.gmail.com");
    }

    #[test]
    fn blank_token_is_treated_as_unset() {
        let config = parse(&[("DISPATCH_API_TOKEN", "   ")]).expect("config should parse");
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn parses_dispatch_policy() {
        let config = parse(&[
            ("DISPATCH_FAILURE_POLICY", "Strict"),
            ("DISPATCH_UNKNOWN_METHOD", "report"),
            ("DISPATCH_MAX_CONCURRENCY", "4"),
            ("DISPATCH_TOOL_TIMEOUT_SECS", "0"),
        ])
        .expect("config should parse");

        assert_eq!(config.dispatch.failure, FailurePolicy::Strict);
        assert_eq!(config.dispatch.unknown_method, UnknownMethodPolicy::Report);
        assert_eq!(config.dispatch.max_concurrency, 4);
        assert_eq!(config.dispatch.timeout, None);
    }

    #[test]
    fn invalid_values_fail() {
        let err = parse(&[("BIND_PORT", "70000")]).expect_err("port out of range");
        assert!(matches!(err, ConfigError::InvalidPort));

        let err = parse(&[("DISPATCH_FAILURE_POLICY", "lenient")]).expect_err("bad policy");
        assert!(matches!(err, ConfigError::InvalidFailurePolicy));

        let err = parse(&[("DISPATCH_MAX_CONCURRENCY", "0")]).expect_err("zero workers");
        assert!(matches!(err, ConfigError::InvalidConcurrency));

        let err = parse(&[("BIND_ADDR", "not-an-ip")]).expect_err("bad socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }

    #[test]
    fn reads_upstream_credentials() {
        let config = parse(&[
            ("GOOGL_SEARCH_KEY", "g-key"),
            ("CSE", "cse-id"),
            ("SENDER_MAIL", "bot@example.com"),
            ("MAIL_PASS", "hunter2"),
        ])
        .expect("config should parse");

        assert_eq!(config.upstream.google_search_key.as_deref(), Some("g-key"));
        assert_eq!(config.upstream.google_cse_id.as_deref(), Some("cse-id"));
        assert_eq!(config.upstream.sender_mail.as_deref(), Some("bot@example.com"));
        assert_eq!(config.upstream.mail_password.as_deref(), Some("hunter2"));
        assert_eq!(config.upstream.serp_api_key, None);
    }
}
