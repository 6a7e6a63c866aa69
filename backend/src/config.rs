use std::env;
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A bearer token and the subject it authenticates as.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub subject: String,
    pub token: String,
}

impl fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEntry")
            .field("subject", &self.subject)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub admin_tokens: Vec<TokenEntry>,
    pub student_tokens: Vec<TokenEntry>,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://course_enrollment.db?mode=rwc".to_string());

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DB_MAX_CONNECTIONS",
                        reason: format!("expected a positive integer, got {:?}", raw),
                    });
                }
            },
            None => 5,
        };

        let admin_tokens = parse_tokens("ADMIN_TOKENS", lookup("ADMIN_TOKENS").as_deref(), "admin")?;
        let student_tokens =
            parse_tokens("STUDENT_TOKENS", lookup("STUDENT_TOKENS").as_deref(), "student")?;

        Ok(Self {
            database_url,
            bind_addr,
            max_connections,
            admin_tokens,
            student_tokens,
        })
    }
}

/// Parses `subject:token,token2,...`. A bare token authenticates as `default_subject`.
fn parse_tokens(
    key: &'static str,
    raw: Option<&str>,
    default_subject: &str,
) -> Result<Vec<TokenEntry>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (subject, token) = match entry.split_once(':') {
                Some((subject, token)) => (subject.trim(), token.trim()),
                None => (default_subject, entry),
            };
            if subject.is_empty() || token.is_empty() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "entries must look like subject:token".to_string(),
                });
            }
            Ok(TokenEntry { subject: subject.to_string(), token: token.to_string() })
        })
        .collect()
}
