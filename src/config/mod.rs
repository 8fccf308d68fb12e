//! Runtime configuration read from `TEMPINBOX_*` environment variables.

use crate::recipient::AllowedDomains;
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_SMTP_ADDR: &str = "0.0.0.0:2525";
pub const DEFAULT_WEB_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE: &str = "sqlite://data/emails.db";
pub const DEFAULT_MAX_EMAIL_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
/// Upper bound on the retention window: one hundred years.
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{key}: invalid value {value:?}: {reason}")]
  Invalid {
    key: &'static str,
    value: String,
    reason: String,
  },
}

/// Settings consumed by the ingestion core and the HTTP layer.
#[derive(Debug, Clone)]
pub struct Config {
  pub smtp_addr: SocketAddr,
  pub web_addr: SocketAddr,
  pub database_url: String,
  pub hostname: String,
  pub max_email_size: usize,
  pub retention_days: i64,
  pub sweep_interval: Duration,
  pub allowed_domains: AllowedDomains,
  pub list_limit: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      smtp_addr: SocketAddr::from(([0, 0, 0, 0], 2525)),
      web_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
      database_url: DEFAULT_DATABASE.to_string(),
      hostname: "tempinbox".to_string(),
      max_email_size: DEFAULT_MAX_EMAIL_SIZE,
      retention_days: DEFAULT_RETENTION_DAYS,
      sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
      allowed_domains: AllowedDomains::Any,
      list_limit: DEFAULT_LIST_LIMIT,
    }
  }
}

impl Config {
  /// Read configuration from the process environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build configuration from an arbitrary key lookup, falling back to defaults.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &'static str, default: &str| -> (&'static str, String) {
      let value = lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
          debug!("{key} not set, using default {default}");
          default.to_string()
        });
      (key, value)
    };

    let smtp_addr = parse_value(get("TEMPINBOX_SMTP_ADDR", DEFAULT_SMTP_ADDR))?;
    let web_addr = parse_value(get("TEMPINBOX_WEB_ADDR", DEFAULT_WEB_ADDR))?;
    let (_, database_url) = get("TEMPINBOX_DATABASE", DEFAULT_DATABASE);
    let (_, hostname) = get("TEMPINBOX_HOSTNAME", "tempinbox");

    let max_email_size: usize = parse_value(get(
      "TEMPINBOX_MAX_EMAIL_SIZE",
      &DEFAULT_MAX_EMAIL_SIZE.to_string(),
    ))?;
    let retention_days: i64 = parse_value(get(
      "TEMPINBOX_RETENTION_DAYS",
      &DEFAULT_RETENTION_DAYS.to_string(),
    ))?;
    let sweep_secs: u64 = parse_value(get(
      "TEMPINBOX_SWEEP_INTERVAL_SECS",
      &DEFAULT_SWEEP_INTERVAL_SECS.to_string(),
    ))?;
    let list_limit: u32 = parse_value(get(
      "TEMPINBOX_LIST_LIMIT",
      &DEFAULT_LIST_LIMIT.to_string(),
    ))?;
    let (_, domains) = get("TEMPINBOX_ALLOWED_DOMAINS", "*");

    require_positive("TEMPINBOX_MAX_EMAIL_SIZE", max_email_size as i64)?;
    require_positive("TEMPINBOX_RETENTION_DAYS", retention_days)?;
    require_at_most("TEMPINBOX_RETENTION_DAYS", retention_days, MAX_RETENTION_DAYS)?;
    require_positive("TEMPINBOX_SWEEP_INTERVAL_SECS", sweep_secs as i64)?;
    require_positive("TEMPINBOX_LIST_LIMIT", i64::from(list_limit))?;

    Ok(Self {
      smtp_addr,
      web_addr,
      database_url,
      hostname,
      max_email_size,
      retention_days,
      sweep_interval: Duration::from_secs(sweep_secs),
      allowed_domains: AllowedDomains::parse(&domains),
      list_limit,
    })
  }
}

fn parse_value<T>((key, value): (&'static str, String)) -> Result<T, ConfigError>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  value.parse().map_err(|e: T::Err| ConfigError::Invalid {
    key,
    reason: e.to_string(),
    value,
  })
}

fn require_positive(key: &'static str, value: i64) -> Result<(), ConfigError> {
  if value > 0 {
    return Ok(());
  }
  Err(ConfigError::Invalid {
    key,
    value: value.to_string(),
    reason: "must be greater than zero".into(),
  })
}

fn require_at_most(key: &'static str, value: i64, max: i64) -> Result<(), ConfigError> {
  if value <= max {
    return Ok(());
  }
  Err(ConfigError::Invalid {
    key,
    value: value.to_string(),
    reason: format!("must be at most {max}"),
  })
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
    move |k| map.get(k).cloned()
  }

  #[test]
  fn defaults_when_unset() {
    let cfg = Config::from_lookup(|_| None).unwrap();
    assert_eq!(cfg.smtp_addr.port(), 2525);
    assert_eq!(cfg.web_addr.port(), 3000);
    assert_eq!(cfg.max_email_size, 10 * 1024 * 1024);
    assert_eq!(cfg.retention_days, 7);
    assert_eq!(cfg.sweep_interval, Duration::from_secs(3600));
    assert_eq!(cfg.allowed_domains, AllowedDomains::Any);
    assert_eq!(cfg.list_limit, 50);
  }

  #[test]
  fn explicit_values_override_defaults() {
    let cfg = Config::from_lookup(lookup(&[
      ("TEMPINBOX_SMTP_ADDR", "127.0.0.1:25"),
      ("TEMPINBOX_RETENTION_DAYS", "3"),
      ("TEMPINBOX_ALLOWED_DOMAINS", "Example.com, test.dev"),
    ]))
    .unwrap();
    assert_eq!(cfg.smtp_addr.port(), 25);
    assert_eq!(cfg.retention_days, 3);
    assert!(cfg.allowed_domains.permits("example.com"));
    assert!(!cfg.allowed_domains.permits("other.org"));
  }

  #[test]
  fn rejects_garbage_and_zero() {
    let err = Config::from_lookup(lookup(&[("TEMPINBOX_MAX_EMAIL_SIZE", "ten")])).unwrap_err();
    assert!(err.to_string().contains("TEMPINBOX_MAX_EMAIL_SIZE"));

    let err = Config::from_lookup(lookup(&[("TEMPINBOX_RETENTION_DAYS", "0")])).unwrap_err();
    assert!(err.to_string().contains("greater than zero"));
  }

  #[test]
  fn rejects_retention_beyond_limit() {
    let err = Config::from_lookup(lookup(&[("TEMPINBOX_RETENTION_DAYS", "100000000")]))
      .unwrap_err();
    assert!(err.to_string().contains("TEMPINBOX_RETENTION_DAYS"));
    assert!(err.to_string().contains("at most"));

    let cfg = Config::from_lookup(lookup(&[(
      "TEMPINBOX_RETENTION_DAYS",
      &MAX_RETENTION_DAYS.to_string(),
    )]))
    .unwrap();
    assert_eq!(cfg.retention_days, MAX_RETENTION_DAYS);
  }
}
