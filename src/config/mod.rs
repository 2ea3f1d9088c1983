//! Configuration management for the anonymous chat service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_admin_config, validate_config, AdminCredential, AdminSettings, AmqpSettings,
    AppConfig, ServiceSettings, StorageSettings, TelegramSettings, TransportKind,
    TransportSettings, MAX_EVENT_LANES,
};
