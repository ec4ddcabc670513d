//! Server and client configuration.
//!
//! Read from the environment after loading `.env`. Each sheet source takes
//! `HR_<SOURCE>_URL` plus optional `HR_<SOURCE>_TIMEOUT_SECS` and
//! `HR_<SOURCE>_ATTEMPTS` overrides of its retry policy.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

use crate::fetch::RetryPolicy;
use crate::models::Source;

pub const DEFAULT_HTTP_PORT: u16 = 8080;

const SCRIPT_BASE: &str = "https://script.google.com/macros/s";

/// Deployment URL a source uses when nothing is configured.
pub fn default_url(source: Source) -> Option<String> {
    let id = match source {
        Source::Workforce => "AKfycbwnhwQ6b59cGeK4Fi8KpO9yBAb6AuERQ2JpXlEvScg4u1NhZyPo48xAdNrqKtv18hAwNA",
        Source::Attendance => "AKfycbynn0NtjrdC1U2cf0IevblQmFeaEyZoX9CexWQQfe9A4c7WgwVYc233i7KE7fc95IpLKg",
        Source::Turnover => "AKfycbzZ0hXQqn0Io7kwHky_c73CI3IswwZHY2iz5BtmVFlVCdfaWXbJln6GbEPeVf6NZ4a1",
        Source::Recruitment => "AKfycbyjlSMF3hCNzt9Ifa_jox3NdRAlfHzNYwzaZtdvoZ7YKYY4qyOKQ45M4rdZtX4ryJTu",
        Source::Sortie => "AKfycbwUke_wNtq7o6ErgQeXIxN1As9ccVSfqJqXfLq3bKcUZN3TWt6LtYaHay9QGGtM2Hw7",
        Source::Auth => "AKfycbwHvky0ULsONJ-lvYRSlX5sPAhiTu1LwqSWFlaaK2ch_mxkJJx-MRte4p7Haq0ZIg4",
        Source::Performance => return None,
    };
    Some(format!("{SCRIPT_BASE}/{id}/exec"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// `None` leaves the source unconfigured; its endpoint answers 500.
    pub url: Option<String>,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_port: u16,
    sources: HashMap<Source, SourceConfig>,
}

/// Load `.env` (if present), then read the environment.
pub fn load() -> Result<Config> {
    let _ = dotenvy::dotenv();
    Config::from_env()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            sources: Source::ALL
                .iter()
                .map(|&source| {
                    let config = SourceConfig {
                        url: default_url(source),
                        policy: RetryPolicy::for_source(source),
                    };
                    (source, config)
                })
                .collect(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(port) = lookup("HTTP_PORT") {
            config.http_port = port
                .trim()
                .parse()
                .with_context(|| format!("HTTP_PORT must be a valid port, got {port:?}"))?;
        }

        for source in Source::ALL {
            let prefix = source.env_prefix();
            let entry = config.sources.entry(source).or_insert_with(|| SourceConfig {
                url: None,
                policy: RetryPolicy::for_source(source),
            });

            if let Some(url) = lookup(&format!("{prefix}_URL")).filter(|u| !u.trim().is_empty()) {
                entry.url = Some(url.trim().to_string());
            }
            if let Some(secs) = lookup(&format!("{prefix}_TIMEOUT_SECS")) {
                let secs: u64 = secs
                    .trim()
                    .parse()
                    .with_context(|| format!("{prefix}_TIMEOUT_SECS must be a whole number of seconds"))?;
                entry.policy.timeout = Duration::from_secs(secs);
            }
            if let Some(attempts) = lookup(&format!("{prefix}_ATTEMPTS")) {
                let attempts: u32 = attempts
                    .trim()
                    .parse()
                    .with_context(|| format!("{prefix}_ATTEMPTS must be a positive integer"))?;
                entry.policy.attempts = attempts.max(1);
            }
        }

        Ok(config)
    }

    pub fn source(&self, source: Source) -> SourceConfig {
        self.sources.get(&source).cloned().unwrap_or_else(|| SourceConfig {
            url: default_url(source),
            policy: RetryPolicy::for_source(source),
        })
    }

    pub fn set_url(&mut self, source: Source, url: impl Into<String>) {
        self.sources
            .entry(source)
            .or_insert_with(|| SourceConfig {
                url: None,
                policy: RetryPolicy::for_source(source),
            })
            .url = Some(url.into());
    }

    pub fn set_policy(&mut self, source: Source, policy: RetryPolicy) {
        if let Some(entry) = self.sources.get_mut(&source) {
            entry.policy = policy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        let workforce = config.source(Source::Workforce);
        assert!(workforce.url.unwrap().ends_with("/exec"));
        assert_eq!(workforce.policy.timeout, Duration::from_secs(15));
        assert_eq!(config.source(Source::Performance).url, None);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HTTP_PORT", "9000"),
            ("HR_PERFORMANCE_URL", "http://localhost:4000/perf"),
            ("HR_ATTENDANCE_TIMEOUT_SECS", "5"),
            ("HR_ATTENDANCE_ATTEMPTS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(
            config.source(Source::Performance).url.as_deref(),
            Some("http://localhost:4000/perf")
        );
        let attendance = config.source(Source::Attendance).policy;
        assert_eq!(attendance.timeout, Duration::from_secs(5));
        assert_eq!(attendance.attempts, 1);
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::from_lookup(lookup(&[("HTTP_PORT", "eighty")])).is_err());
    }
}
