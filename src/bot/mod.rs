//! Chat bot front end
//!
//! Parses inbound payloads into commands, drives the relay and sends the
//! notices participants see.

pub mod commands;
pub mod handler;
pub mod notices;

pub use commands::Command;
pub use handler::ChatHandler;
