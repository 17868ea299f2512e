//! Configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | none (required by the Postgres stores) |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `JWT_SECRET` | insecure dev default, with a warning |
//! | `ACCESS_TOKEN_TTL_SECS` | `900` |
//! | `REFRESH_TOKEN_TTL_SECS` | `2592000` (30 days) |
//! | `BCRYPT_COST` | `bcrypt::DEFAULT_COST` |
//! | `ROLE_NAME_SCOPE` | `global` (`global` or `actor_type`) |

use chrono::Duration;
use thiserror::Error;

use warden_auth::RoleNameScope;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub role_name_scope: RoleNameScope,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_ttl: Duration::seconds(900),
            refresh_token_ttl: Duration::seconds(2_592_000),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            role_name_scope: RoleNameScope::Global,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        let bcrypt_cost = parse_or("BCRYPT_COST", &lookup, defaults.bcrypt_cost)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
                reason: "must be between 4 and 31".to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                &lookup,
                defaults.database_max_connections,
            )?,
            jwt_secret,
            access_token_ttl: ttl("ACCESS_TOKEN_TTL_SECS", &lookup, defaults.access_token_ttl)?,
            refresh_token_ttl: ttl("REFRESH_TOKEN_TTL_SECS", &lookup, defaults.refresh_token_ttl)?,
            bcrypt_cost,
            role_name_scope: match lookup("ROLE_NAME_SCOPE").as_deref() {
                None | Some("global") => RoleNameScope::Global,
                Some("actor_type") => RoleNameScope::ActorType,
                Some(other) => {
                    return Err(ConfigError::Invalid {
                        key: "ROLE_NAME_SCOPE",
                        value: other.to_string(),
                        reason: "expected 'global' or 'actor_type'".to_string(),
                    });
                }
            },
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn ttl<F>(key: &'static str, lookup: &F, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: i64 = parse_or(key, lookup, default.num_seconds())?;
    if secs <= 0 {
        return Err(ConfigError::Invalid {
            key,
            value: secs.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(Duration::seconds(secs))
}
