use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

/// Signing secret used only when running in development posture without `JWT_SECRET`.
const DEV_FALLBACK_SECRET: &str = "dev-only-insecure-jwt-secret";

const DEFAULT_ISSUER: &str = "account-auth";
const DEFAULT_TTL_MINUTES: i64 = 60 * 24;
const DEFAULT_PORT: u16 = 8001;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set outside development (APP_ENV=development)")]
    MissingSecret,
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: Option<String>) -> Result<Self, ConfigError> {
        let normalized = raw.as_deref().map(|v| v.trim().to_ascii_lowercase());
        match normalized.as_deref() {
            None | Some("") | Some("production") | Some("prod") => Ok(Self::Production),
            Some("development") | Some("dev") | Some("local") => Ok(Self::Development),
            Some(_) => Err(ConfigError::Invalid {
                var: "APP_ENV",
                value: raw.unwrap_or_default(),
            }),
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_minutes: i64,
    pub leeway_secs: u64,
    /// True when `secret` is the development fallback.
    pub fallback_secret: bool,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("ttl_minutes", &self.ttl_minutes)
            .field("leeway_secs", &self.leeway_secs)
            .field("fallback_secret", &self.fallback_secret)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// `None` selects the in-memory user store (development only).
    pub database_url: Option<String>,
    pub store_timeout_secs: u64,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = Environment::parse(lookup("APP_ENV"))?;

        let (secret, fallback_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None if environment.is_production() => return Err(ConfigError::MissingSecret),
            None => (DEV_FALLBACK_SECRET.to_string(), true),
        };

        let database_url = get("DATABASE_URL");
        if database_url.is_none() && environment.is_production() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let port = match get("APP_PORT").or_else(|| get("PORT")) {
            Some(raw) => parse_var("APP_PORT", raw)?,
            None => DEFAULT_PORT,
        };

        let jwt = JwtConfig {
            secret,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.into()),
            ttl_minutes: get("JWT_TTL_MINUTES")
                .map(|raw| parse_var("JWT_TTL_MINUTES", raw))
                .transpose()?
                .unwrap_or(DEFAULT_TTL_MINUTES),
            leeway_secs: get("JWT_LEEWAY_SECS")
                .map(|raw| parse_var("JWT_LEEWAY_SECS", raw))
                .transpose()?
                .unwrap_or(0),
            fallback_secret,
        };
        if jwt.ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_TTL_MINUTES",
                value: jwt.ttl_minutes.to_string(),
            });
        }

        Ok(Self {
            environment,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url,
            store_timeout_secs: get("STORE_TIMEOUT_SECS")
                .map(|raw| parse_var("STORE_TIMEOUT_SECS", raw))
                .transpose()?
                .unwrap_or(DEFAULT_STORE_TIMEOUT_SECS),
            jwt,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Log the resolved settings. The signing secret is never printed.
    pub fn log_summary(&self) {
        info!(
            environment = ?self.environment,
            host = %self.host,
            port = self.port,
            store = if self.database_url.is_some() { "postgres" } else { "memory" },
            store_timeout_secs = self.store_timeout_secs,
            jwt_issuer = %self.jwt.issuer,
            jwt_ttl_minutes = self.jwt.ttl_minutes,
            jwt_leeway_secs = self.jwt.leeway_secs,
            "configuration loaded"
        );
        if self.jwt.fallback_secret {
            warn!("JWT_SECRET not set; using the development fallback secret");
        }
        if self.database_url.is_none() {
            warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}
