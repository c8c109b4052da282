//! Service configuration parsed from environment variables.
//!
//! `main` loads `.env` (if present) before calling [`Settings::from_env`], so
//! everything here reads plain process env.

use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 3600;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 3600;
pub const DEFAULT_MAIL_PORT: u16 = 465;
pub const DEFAULT_MAIL_FROM_NAME: &str = "Contact book";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";
pub const DEFAULT_RATE_LIMIT_REQUESTS: usize = 2;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 5;
pub const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: String },
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

/// SMTP settings. Present only when every required `MAIL_*` var is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub mail: Option<MailSettings>,
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub rate_limit_requests: usize,
    pub rate_limit_window_secs: u64,
    pub static_dir: String,
}

impl Settings {
    /// Build settings from the process environment.
    ///
    /// Required: `DATABASE_URL`, `JWT_SECRET_KEY`. Everything else has a default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an absent required variable and
    /// [`ConfigError::Invalid`] for a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Lets tests avoid touching
    /// the real process environment.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let jwt_secret = required(&lookup, "JWT_SECRET_KEY")?;
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;

        let mail = mail_settings(&lookup)?;

        let public_base_url = non_empty(&lookup, "PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let cors_raw = non_empty(&lookup, "CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_owned());
        // Credentials are allowed, which rules out a wildcard origin.
        if cors_raw.split(',').any(|origin| origin.trim() == "*") {
            return Err(ConfigError::Invalid { var: "CORS_ORIGINS".to_owned(), value: cors_raw });
        }
        let cors_origins = cors_raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        Ok(Self {
            database_url,
            port,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            jwt_secret,
            access_ttl_secs: parse_or(&lookup, "JWT_ACCESS_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?,
            refresh_ttl_secs: parse_or(&lookup, "JWT_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?,
            mail,
            public_base_url,
            cors_origins,
            rate_limit_requests: parse_or(&lookup, "RATE_LIMIT_REQUESTS", DEFAULT_RATE_LIMIT_REQUESTS)?,
            rate_limit_window_secs: parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS)?,
            static_dir: non_empty(&lookup, "STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_owned()),
        })
    }
}

fn mail_settings<F>(lookup: &F) -> Result<Option<MailSettings>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (Some(server), Some(username), Some(password), Some(from)) = (
        non_empty(lookup, "MAIL_SERVER"),
        non_empty(lookup, "MAIL_USERNAME"),
        non_empty(lookup, "MAIL_PASSWORD"),
        non_empty(lookup, "MAIL_FROM"),
    ) else {
        return Ok(None);
    };

    Ok(Some(MailSettings {
        server,
        port: parse_or(lookup, "MAIL_PORT", DEFAULT_MAIL_PORT)?,
        username,
        password,
        from,
        from_name: non_empty(lookup, "MAIL_FROM_NAME").unwrap_or_else(|| DEFAULT_MAIL_FROM_NAME.to_owned()),
    }))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or_else(|| ConfigError::Missing { var: key.to_owned() })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key.to_owned(), value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
