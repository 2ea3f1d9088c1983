//! Anon Chat - anonymous one-on-one chat pairing service
//!
//! This crate pairs participants by preference, relays their messages through
//! a Telegram or AMQP transport, and keeps an audit trail that operators can
//! query through the admin API.

pub mod admin;
pub mod audit;
pub mod bot;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pairing;
pub mod service;
pub mod store;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ChatError, Result};
pub use types::*;

// Re-export key components
pub use bot::ChatHandler;
pub use pairing::{PairingEngine, Relay};
pub use store::{InMemoryStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
