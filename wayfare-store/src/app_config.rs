use serde::Deserialize;
use std::env;
use wayfare_shared::Masked;

/// Secrets carrying this prefix are the checked-in development values and
/// are refused in production.
pub const DEV_SECRET_PREFIX: &str = "insecure-dev-";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_mode: String,
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Browser origins allowed to send credentialed requests.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Take the client address from `X-Forwarded-For`. Only set this
    /// behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub access_secret: Masked<String>,
    pub refresh_secret: Masked<String>,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: i64,
}

fn default_access_ttl() -> i64 { 15 * 60 }
fn default_refresh_ttl() -> i64 { 7 * 24 * 60 * 60 }

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationConfig {
    #[serde(default = "default_reservation_timeout")]
    pub timeout_ms: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self { timeout_ms: default_reservation_timeout() }
    }
}

fn default_reservation_timeout() -> u64 { 3000 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file; optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `WAYFARE__AUTH__ACCESS_SECRET=...` sets `auth.access_secret`
            .add_source(
                config::Environment::with_prefix("WAYFARE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins"),
            )
            .set_override("run_mode", run_mode)?
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.run_mode == "production"
    }

    /// Refuses to start with missing, shared or guessable token secrets.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let fail = |msg: &str| Err(config::ConfigError::Message(msg.to_string()));

        let access = self.auth.access_secret.expose();
        let refresh = self.auth.refresh_secret.expose();

        if access.trim().is_empty() || refresh.trim().is_empty() {
            return fail("auth.access_secret and auth.refresh_secret must be set");
        }
        if access == refresh {
            return fail("auth.access_secret and auth.refresh_secret must differ");
        }
        if self.auth.access_ttl_seconds <= 0 || self.auth.refresh_ttl_seconds <= 0 {
            return fail("token lifetimes must be positive");
        }

        if self.is_production() {
            for secret in [access, refresh] {
                if secret.len() < MIN_PRODUCTION_SECRET_LEN {
                    return fail("token secrets must be at least 32 bytes in production");
                }
                if secret.starts_with(DEV_SECRET_PREFIX) {
                    return fail("development token secrets cannot be used in production");
                }
            }
            if self.database.url.is_none() {
                return fail("database.url is required in production");
            }
        }

        Ok(())
    }
}
