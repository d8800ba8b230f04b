use std::env;
use std::time::Duration;
use thiserror::Error;

/// ConfigError
///
/// Startup configuration problems. Loading fails fast instead of starting
/// with an incomplete or insecure configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Env
///
/// Runtime context. `Local` enables development conveniences (pretty logs,
/// in-memory profile store, `x-user-id` sign-in); `Production` disables them.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// ProfileStoreKind
///
/// Which backend answers profile lookups.
#[derive(Clone, PartialEq, Debug)]
pub enum ProfileStoreKind {
    Postgres { db_url: String },
    Rest { base_url: String, api_key: String },
    /// In-memory, empty. Every identity resolves to the fail-closed profile.
    Memory,
}

/// AppConfig
///
/// Immutable once loaded; shared with handlers and the guard through the
/// application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: Env,
    pub bind_addr: String,
    pub profile_store: ProfileStoreKind,
    // Secret used to verify ID tokens issued by the managed auth service.
    pub jwt_secret: String,
    // Upper bound on a single profile fetch before falling back to defaults.
    pub profile_fetch_timeout: Duration,
    // How long the guard waits for an unsettled session before answering 503.
    pub guard_settle_timeout: Duration,
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

impl Default for AppConfig {
    /// Non-panicking values for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:3000".to_string(),
            profile_store: ProfileStoreKind::Memory,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            profile_fetch_timeout: Duration::from_secs(10),
            guard_settle_timeout: Duration::from_millis(2000),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. In production the
    /// JWT secret and the profile store settings are mandatory.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match env {
            Env::Production => {
                env::var("AUTH_JWT_SECRET").map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?
            }
            Env::Local => {
                env::var("AUTH_JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string())
            }
        };

        let default_store = match env {
            Env::Production => "rest",
            Env::Local => "memory",
        };
        let profile_store = match env::var("PROFILE_STORE")
            .unwrap_or_else(|_| default_store.to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => ProfileStoreKind::Postgres {
                db_url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            },
            "rest" => ProfileStoreKind::Rest {
                base_url: env::var("PROFILE_STORE_URL")
                    .map_err(|_| ConfigError::Missing("PROFILE_STORE_URL"))?,
                api_key: env::var("PROFILE_STORE_API_KEY")
                    .map_err(|_| ConfigError::Missing("PROFILE_STORE_API_KEY"))?,
            },
            "memory" if env == Env::Local => ProfileStoreKind::Memory,
            _ => return Err(ConfigError::Invalid("PROFILE_STORE")),
        };

        let profile_fetch_timeout = match env::var("PROFILE_FETCH_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::Invalid("PROFILE_FETCH_TIMEOUT_SECS"))?,
            ),
            Err(_) => Duration::from_secs(10),
        };

        let guard_settle_timeout = match env::var("GUARD_SETTLE_TIMEOUT_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse::<u64>()
                    .map_err(|_| ConfigError::Invalid("GUARD_SETTLE_TIMEOUT_MS"))?,
            ),
            Err(_) => Duration::from_millis(2000),
        };

        Ok(Self {
            env,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            profile_store,
            jwt_secret,
            profile_fetch_timeout,
            guard_settle_timeout,
        })
    }
}
