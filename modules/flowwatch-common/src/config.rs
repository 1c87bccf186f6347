use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{FlowwatchError, Result};

/// What the driver does when a non-extraction stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log the failure and finish the run with what completed.
    Continue,
}

impl FromStr for ErrorPolicy {
    type Err = FlowwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(FlowwatchError::Config(format!(
                "PIPELINE_ERROR_POLICY must be 'abort' or 'continue', got '{other}'"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Search backend
    pub elastic_request_url: String,
    pub elastic_username: String,
    pub elastic_password: String,
    pub elastic_accept_invalid_certs: bool,

    // Scoring service
    pub predict_request_url: String,

    // Local state
    pub cursor_file: PathBuf,
    pub alert_log_dir: PathBuf,
    pub lock_file: PathBuf,

    pub http_timeout: Duration,
    pub error_policy: ErrorPolicy,
}

impl Config {
    /// Load `.env` (if present) and read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                FlowwatchError::Config(format!("{key} environment variable is required"))
            })
        };

        let http_timeout_secs: u64 = match get("HTTP_TIMEOUT_SECS") {
            Some(v) => v.trim().parse().map_err(|_| {
                FlowwatchError::Config(format!("HTTP_TIMEOUT_SECS must be a number, got '{v}'"))
            })?,
            None => 30,
        };

        let accept_invalid_certs = match get("ELASTIC_ACCEPT_INVALID_CERTS") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                FlowwatchError::Config(format!(
                    "ELASTIC_ACCEPT_INVALID_CERTS must be true or false, got '{v}'"
                ))
            })?,
            None => false,
        };

        let error_policy = match get("PIPELINE_ERROR_POLICY") {
            Some(v) => v.parse()?,
            None => ErrorPolicy::default(),
        };

        Ok(Self {
            elastic_request_url: required("ELASTIC_REQUEST_URL")?,
            elastic_username: required("ELASTIC_USERNAME")?,
            elastic_password: required("ELASTIC_PASSWORD")?,
            elastic_accept_invalid_certs: accept_invalid_certs,
            predict_request_url: required("PREDICT_REQUEST_URL")?,
            cursor_file: PathBuf::from(
                get("CURSOR_FILE").unwrap_or_else(|| "saved-timestamp.txt".to_string()),
            ),
            alert_log_dir: PathBuf::from(get("ALERT_LOG_DIR").unwrap_or_else(|| "log".to_string())),
            lock_file: PathBuf::from(
                get("LOCK_FILE").unwrap_or_else(|| "flowwatch.lock".to_string()),
            ),
            http_timeout: Duration::from_secs(http_timeout_secs),
            error_policy,
        })
    }

    /// Log config with secrets redacted.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n: usize = val.chars().take(2).map(char::len_utf8).sum();
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  ELASTIC_REQUEST_URL: {}", redact_url(&self.elastic_request_url));
        tracing::info!("  ELASTIC_USERNAME: {}", self.elastic_username);
        tracing::info!("  ELASTIC_PASSWORD: {}", preview(&self.elastic_password));
        tracing::info!("  ELASTIC_ACCEPT_INVALID_CERTS: {}", self.elastic_accept_invalid_certs);
        tracing::info!("  PREDICT_REQUEST_URL: {}", redact_url(&self.predict_request_url));
        tracing::info!("  CURSOR_FILE: {}", self.cursor_file.display());
        tracing::info!("  ALERT_LOG_DIR: {}", self.alert_log_dir.display());
        tracing::info!("  LOCK_FILE: {}", self.lock_file.display());
        tracing::info!("  HTTP_TIMEOUT_SECS: {}", self.http_timeout.as_secs());
        tracing::info!("  PIPELINE_ERROR_POLICY: {:?}", self.error_policy);
    }
}

/// Strip credentials embedded in a URL before it is logged. Unparseable
/// values are not echoed at all.
fn redact_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return format!("<unparseable url, {} chars>", raw.len());
    };
    if !url.username().is_empty() {
        let _ = url.set_username("***");
    }
    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
    }
    url.to_string()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("ELASTIC_REQUEST_URL", "https://es:9200/filebeat-*/_search"),
        ("ELASTIC_USERNAME", "elastic"),
        ("ELASTIC_PASSWORD", "changeme"),
        ("PREDICT_REQUEST_URL", "http://model:8000/predict"),
    ];

    #[test]
    fn defaults_applied() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.cursor_file, PathBuf::from("saved-timestamp.txt"));
        assert_eq!(config.alert_log_dir, PathBuf::from("log"));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.error_policy, ErrorPolicy::Abort);
        assert!(!config.elastic_accept_invalid_certs);
    }

    #[test]
    fn missing_required_value_is_config_error() {
        let err = Config::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        match err {
            FlowwatchError::Config(msg) => assert!(msg.contains("PREDICT_REQUEST_URL")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("ELASTIC_PASSWORD", "  ");
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn optional_values_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ELASTIC_ACCEPT_INVALID_CERTS", "true"));
        pairs.push(("HTTP_TIMEOUT_SECS", "5"));
        pairs.push(("PIPELINE_ERROR_POLICY", "Continue"));
        pairs.push(("CURSOR_FILE", "/var/lib/flowwatch/cursor"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.elastic_accept_invalid_certs);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
        assert_eq!(config.cursor_file, PathBuf::from("/var/lib/flowwatch/cursor"));
    }

    #[test]
    fn url_credentials_redacted() {
        let redacted = redact_url("https://elastic:s3cret@es:9200/filebeat-*/_search");
        assert!(!redacted.contains("s3cret"));
        assert!(!redacted.contains("elastic:"));
        assert_eq!(redacted, "https://***:***@es:9200/filebeat-*/_search");

        let token_only = redact_url("http://apikey@model:8000/predict");
        assert!(!token_only.contains("apikey"));
    }

    #[test]
    fn url_without_credentials_unchanged() {
        assert_eq!(
            redact_url("http://model:8000/predict"),
            "http://model:8000/predict"
        );
        assert!(!redact_url("not a url with pass").contains("pass"));
    }

    #[test]
    fn invalid_policy_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PIPELINE_ERROR_POLICY", "retry"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
