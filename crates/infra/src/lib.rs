//! Infrastructure layer: configuration, Postgres and in-memory stores, and the
//! concrete password/token capabilities.

pub mod config;
pub mod hasher;
pub mod memory;
pub mod postgres;
pub mod stores;
pub mod testing;
pub mod token;

#[cfg(test)]
mod integration_tests;

pub use config::{Config, ConfigError};
pub use hasher::BcryptHasher;
pub use memory::{InMemoryStore, StoreOp};
pub use postgres::{MIGRATOR, PgUowFactory};
pub use token::JwtTokenIssuer;
