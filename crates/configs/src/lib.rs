//! # configs
//!
//! Layered settings: built-in defaults, then `config/default.toml` (optional),
//! then `config/local.toml` (optional), then `NOTEMART__*` environment
//! variables (e.g. `NOTEMART__SERVER__PORT=9000`). A `.env` file is read first
//! when present.
//!
//! `auth.jwt_secret` has no default anywhere; loading fails until it is set.

use std::collections::HashSet;
use std::net::IpAddr;

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub pricing: PricingSettings,
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub redis: Option<RedisSettings>,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Without a URL the in-memory ledger is used.
    #[serde(default)]
    pub url: Option<SecretString>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingSettings {
    pub points_per_dollar: i64,
    pub points_discount_percent: u32,
    pub donation_fee_percent: u32,
    pub donation_presets: Vec<i64>,
    #[serde(default)]
    pub packages: Vec<PackageSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageSettings {
    pub id: String,
    pub points: i64,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Reverse proxies allowed to set `x-forwarded-for`. Empty means the
    /// socket peer is the client.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
    pub format: LogFormat,
}

const DEFAULTS: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
max_connections = 10
run_migrations = true

[auth]
token_ttl_secs = 86400

[pricing]
points_per_dollar = 100
points_discount_percent = 5
donation_fee_percent = 30
donation_presets = [10, 50, 100, 500]

[rate_limit]
max_requests = 30
window_secs = 60

[log]
filter = "info"
format = "pretty"
"#;

const MIN_SECRET_LEN: usize = 16;

/// Secrets that have been published in docs or sample files.
const KNOWN_PLACEHOLDERS: &[&str] = &["dev-only-secret-change-me-in-production", "change-me"];

impl Settings {
    /// Loads `.env`, the config files under `config/`, and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let settings: Settings = Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("NOTEMART").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with a TOML document. Used by tests and tools.
    pub fn from_toml(overrides: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let pricing = &self.pricing;

        if pricing.points_per_dollar <= 0 {
            return invalid("pricing.points_per_dollar must be positive");
        }
        if pricing.points_discount_percent >= 100 || pricing.donation_fee_percent >= 100 {
            return invalid("pricing percentages must be below 100");
        }
        if pricing.donation_presets.is_empty() || pricing.donation_presets.iter().any(|p| *p <= 0) {
            return invalid("pricing.donation_presets must be non-empty and positive");
        }
        let keep = i64::from(100 - pricing.donation_fee_percent);
        if let Some(preset) = pricing.donation_presets.iter().find(|p| p.saturating_mul(keep) / 100 <= 0) {
            return Err(ConfigError::Invalid(format!(
                "donation preset {preset} leaves the author nothing after the fee"
            )));
        }
        let mut ids = HashSet::new();
        for package in &pricing.packages {
            if !ids.insert(package.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate points package '{}'", package.id)));
            }
            if package.points <= 0 || package.price_cents <= 0 {
                return Err(ConfigError::Invalid(format!("points package '{}' is empty", package.id)));
            }
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return invalid("rate_limit values must be positive");
        }
        let secret = self.auth.jwt_secret.expose_secret();
        if secret.len() < MIN_SECRET_LEN {
            return invalid("auth.jwt_secret is too short");
        }
        if KNOWN_PLACEHOLDERS.iter().any(|p| secret.contains(p)) {
            return invalid("auth.jwt_secret is a published placeholder; generate a real one");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_AUTH: &str = "[auth]\njwt_secret = \"unit-test-secret-0123456789\"\n";

    fn settings(extra: &str) -> Result<Settings, ConfigError> {
        let auth = if extra.contains("[auth]") { "" } else { TEST_AUTH };
        Settings::from_toml(&format!("{auth}{extra}"))
    }

    #[test]
    fn defaults_are_valid() {
        let settings = settings("").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.pricing.points_discount_percent, 5);
        assert_eq!(settings.pricing.donation_presets, vec![10, 50, 100, 500]);
        assert_eq!(settings.auth.token_ttl_secs, 86400);
        assert!(settings.database.url.is_none());
        assert!(settings.redis.is_none());
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert_eq!(settings.bind_address(), "127.0.0.1:8080");
        assert!(settings.rate_limit.trusted_proxies.is_empty());
    }

    #[test]
    fn parses_trusted_proxies() {
        let settings = settings("[rate_limit]\ntrusted_proxies = [\"10.0.0.1\", \"::1\"]").unwrap();
        let expected: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap(), "::1".parse().unwrap()];
        assert_eq!(settings.rate_limit.trusted_proxies, expected);
    }

    #[test]
    fn missing_jwt_secret_fails_to_load() {
        let err = Settings::from_toml("").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)), "{err}");
    }

    #[test]
    fn rejects_placeholder_secret() {
        let err = settings("[auth]\njwt_secret = \"dev-only-secret-change-me-in-production\"").unwrap_err();
        assert!(err.to_string().contains("placeholder"), "{err}");
    }

    #[test]
    fn overrides_and_packages() {
        let settings = settings(
            r#"
            [server]
            port = 9000

            [pricing]
            donation_fee_percent = 25

            [[pricing.packages]]
            id = "starter"
            points = 500
            price_cents = 500

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.pricing.donation_fee_percent, 25);
        assert_eq!(settings.pricing.packages.len(), 1);
        assert_eq!(settings.log.format, LogFormat::Json);
    }

    #[test]
    fn rejects_fee_of_100_percent() {
        let err = settings("[pricing]\ndonation_fee_percent = 100").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_presets_with_no_net_after_fee() {
        let err = settings("[pricing]\ndonation_presets = [1, 10]").unwrap_err();
        assert!(err.to_string().contains("donation preset 1"), "{err}");
    }

    #[test]
    fn rejects_duplicate_packages() {
        let err = settings(
            r#"
            [[pricing.packages]]
            id = "a"
            points = 1
            price_cents = 1

            [[pricing.packages]]
            id = "a"
            points = 2
            price_cents = 2
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_short_secret() {
        let err = settings("[auth]\njwt_secret = \"short\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
