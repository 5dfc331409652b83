//! Service configuration, read from the environment (and `.env` when present).

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name} value '{value}': {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'compact' or 'json', got '{other}'")),
        }
    }
}

/// Transactional-mail HTTP endpoint. Absent means mail is only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub admin_emails: Vec<String>,
    pub mail: Option<MailConfig>,
    pub mail_sender_email: String,
    pub mail_sender_name: String,
    pub dispatch_interval: Duration,
    pub dispatch_batch_size: i64,
    /// How long a claimed outbox message may stay `dispatching` before another pass takes it.
    pub dispatch_lease: Duration,
    pub nats_url: Option<String>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            jwt_secret: "change-me".to_string(),
            jwt_ttl_hours: 24,
            admin_emails: Vec::new(),
            mail: None,
            mail_sender_email: "noreply@example.com".to_string(),
            mail_sender_name: "Storefront".to_string(),
            dispatch_interval: Duration::from_millis(2000),
            dispatch_batch_size: 25,
            dispatch_lease: Duration::from_secs(300),
            nats_url: None,
            log_format: LogFormat::Compact,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid { name, value, reason: e.to_string() }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        _ = dotenvy::dotenv();
        let defaults = Self::default();

        let mail = match (optional("MAIL_API_URL"), optional("MAIL_API_KEY")) {
            (Some(api_url), api_key) => Some(MailConfig {
                api_url,
                api_key: api_key.unwrap_or_default(),
                timeout: Duration::from_secs(parsed("MAIL_TIMEOUT_SECS", 10u64)?),
            }),
            (None, _) => None,
        };

        let admin_emails = optional("ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(crate::domain::value_objects::normalize_email)
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: optional("HOST").unwrap_or(defaults.host),
            port: parsed("PORT", defaults.port)?,
            database_url: optional("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            jwt_secret: optional("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", defaults.jwt_ttl_hours)?,
            admin_emails,
            mail,
            mail_sender_email: optional("MAIL_SENDER_EMAIL").unwrap_or(defaults.mail_sender_email),
            mail_sender_name: optional("MAIL_SENDER_NAME").unwrap_or(defaults.mail_sender_name),
            dispatch_interval: Duration::from_millis(parsed("DISPATCH_INTERVAL_MS", 2000u64)?),
            dispatch_batch_size: parsed("DISPATCH_BATCH_SIZE", defaults.dispatch_batch_size)?,
            dispatch_lease: Duration::from_secs(parsed("DISPATCH_LEASE_SECS", 300u64)?),
            nats_url: optional("NATS_URL"),
            log_format: parsed("LOG_FORMAT", defaults.log_format)?,
        })
    }

    pub fn uses_default_secret(&self) -> bool { self.jwt_secret == Self::default().jwt_secret }

    pub fn socket_addr(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("pretty".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.socket_addr(), "0.0.0.0:8083");
        assert_eq!(config.dispatch_batch_size, 25);
        assert_eq!(config.dispatch_lease, Duration::from_secs(300));
        assert!(config.mail.is_none());
    }
}
