//! Service layer for the anonymous chat service
//!
//! This module contains the main application state, service coordination,
//! and background task management for the production service.

pub mod app;
pub mod dispatch;
pub mod health;

pub use app::{AppState, ServiceContext, ServiceError, Storage};
pub use dispatch::EventDispatcher;
pub use health::{HealthCheck, HealthStatus};
