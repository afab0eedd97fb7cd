//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the client and
//! submission services. Nothing in the core reads environment variables while handling a
//! request, so several repositories can be targeted side by side and tests can point a client at
//! a fake transport without touching process state.

use crate::constants::{DEFAULT_SERVER_BASE, DEFAULT_TIMEOUT_SECS};
use crate::{GatewayError, GatewayResult};
use reqwest::Url;
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    server_base: String,
    timeout: Duration,
    strict_kinds: bool,
}

impl GatewayConfig {
    /// Create a new `GatewayConfig`.
    ///
    /// `server_base` must be an absolute `http` or `https` URL; a trailing `/` is dropped so
    /// resource paths can be appended directly.
    pub fn new(server_base: &str, timeout: Duration, strict_kinds: bool) -> GatewayResult<Self> {
        let trimmed = server_base.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "server base URL cannot be empty".into(),
            ));
        }

        let url = Url::parse(trimmed).map_err(|e| {
            GatewayError::InvalidConfig(format!("server base URL '{trimmed}' is invalid: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(GatewayError::InvalidConfig(format!(
                "server base URL '{trimmed}' must be an http(s) URL with a host"
            )));
        }

        if timeout.is_zero() {
            return Err(GatewayError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            server_base: trimmed.to_string(),
            timeout,
            strict_kinds,
        })
    }

    /// Build a configuration from raw, optional environment values.
    ///
    /// Missing or blank values fall back to the defaults: the public HAPI R4 server, a 30 second
    /// timeout, and lenient handling of unmapped measurement kinds.
    pub fn from_env_values(
        server_base: Option<String>,
        timeout_secs: Option<String>,
        strict_kinds: Option<String>,
    ) -> GatewayResult<Self> {
        let server_base = non_blank(server_base).unwrap_or_else(|| DEFAULT_SERVER_BASE.into());

        let timeout_secs = non_blank(timeout_secs)
            .map(|v| {
                v.parse::<u64>().map_err(|_| {
                    GatewayError::InvalidConfig(format!("timeout '{v}' is not a whole number of seconds"))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let strict_kinds = non_blank(strict_kinds)
            .map(|v| parse_flag(&v))
            .transpose()?
            .unwrap_or(false);

        Self::new(&server_base, Duration::from_secs(timeout_secs), strict_kinds)
    }

    /// Base URL of the repository, without a trailing `/`.
    pub fn server_base(&self) -> &str {
        &self.server_base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether unmapped measurement kinds are refused instead of submitted uncoded.
    pub fn strict_kinds(&self) -> bool {
        self.strict_kinds
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> GatewayResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GatewayError::InvalidConfig(format!(
            "expected a boolean flag, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = GatewayConfig::from_env_values(None, None, None).expect("defaults are valid");
        assert_eq!(cfg.server_base(), DEFAULT_SERVER_BASE);
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(!cfg.strict_kinds());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = GatewayConfig::from_env_values(Some("  ".into()), Some("".into()), Some(" ".into()))
            .expect("blank values fall back");
        assert_eq!(cfg.server_base(), DEFAULT_SERVER_BASE);
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let cfg = GatewayConfig::new("http://localhost:8080/fhir/", Duration::from_secs(5), false)
            .expect("valid base");
        assert_eq!(cfg.server_base(), "http://localhost:8080/fhir");
    }

    #[test]
    fn rejects_non_http_base() {
        let err = GatewayConfig::new("ftp://example.org/fhir", Duration::from_secs(5), false)
            .expect_err("ftp rejected");
        assert!(matches!(err, GatewayError::InvalidConfig(_)));

        let err = GatewayConfig::new("not a url", Duration::from_secs(5), false)
            .expect_err("garbage rejected");
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = GatewayConfig::from_env_values(None, Some("0".into()), None)
            .expect_err("zero timeout rejected");
        assert!(matches!(err, GatewayError::InvalidConfig(msg) if msg.contains("timeout")));
    }

    #[test]
    fn parses_timeout_and_flag() {
        let cfg = GatewayConfig::from_env_values(
            Some("https://fhir.example.org/r4".into()),
            Some("12".into()),
            Some("TRUE".into()),
        )
        .expect("valid values");
        assert_eq!(cfg.server_base(), "https://fhir.example.org/r4");
        assert_eq!(cfg.timeout(), Duration::from_secs(12));
        assert!(cfg.strict_kinds());

        let err = GatewayConfig::from_env_values(None, Some("ten".into()), None)
            .expect_err("non-numeric timeout");
        assert!(matches!(err, GatewayError::InvalidConfig(_)));

        let err = GatewayConfig::from_env_values(None, None, Some("maybe".into()))
            .expect_err("bad flag");
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }
}
