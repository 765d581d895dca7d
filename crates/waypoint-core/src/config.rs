//! Server and request configuration
//!
//! Configuration is plain data with builder-style setters. [`ServerConfig::from_env`]
//! loads `.env`, then layers `WAYPOINT_*` environment variables over the
//! defaults through `envy`.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Prefix of every environment variable read by [`ServerConfig::from_env`]
pub const ENV_PREFIX: &str = "WAYPOINT_";

/// Default maximum request body size (5 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 5 * 1024 * 1024;

/// Default bind address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Options applied to every request read through the transport adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Maximum number of body bytes read before failing with `TooLarge`
    pub body_limit: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Deployment profile
///
/// Production masks the message of internal errors in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    pub fn is_production(self) -> bool {
        matches!(self, Profile::Production)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Profile::Development),
            "prod" | "production" => Some(Profile::Production),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Profile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Profile::parse(&value).ok_or_else(|| {
            de::Error::custom(format!(
                "unknown profile `{}`, expected `development` or `production`",
                value
            ))
        })
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `WAYPOINT_*` variable failed to deserialize
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),
}

/// `WAYPOINT_*` variables, with the prefix stripped
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    addr: Option<SocketAddr>,
    body_limit: Option<usize>,
    env: Option<Profile>,
}

/// Transport-level configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub request: RequestOptions,
    pub profile: Profile,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request: RequestOptions::default(),
            profile: Profile::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.request.body_limit = limit;
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Load from `WAYPOINT_ADDR`, `WAYPOINT_BODY_LIMIT` and `WAYPOINT_ENV`
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let raw = envy::prefixed(ENV_PREFIX).from_env::<RawConfig>()?;
        Ok(Self::from_raw(raw))
    }

    /// Load from an explicit set of variables instead of the process environment
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw = envy::prefixed(ENV_PREFIX).from_iter::<_, RawConfig>(vars)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();
        let config = Self {
            addr: raw.addr.unwrap_or(defaults.addr),
            request: RequestOptions {
                body_limit: raw.body_limit.unwrap_or(defaults.request.body_limit),
            },
            profile: raw.env.unwrap_or(defaults.profile),
        };

        tracing::debug!(
            addr = %config.addr,
            body_limit = config.request.body_limit,
            profile = ?config.profile,
            "Loaded server configuration"
        );
        config
    }
}
