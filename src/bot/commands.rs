//! Parsing of inbound text into bot commands

use crate::types::Preference;
use std::fmt;

/// What a participant asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register and show the welcome text
    Start,
    /// Look for a partner
    Search,
    /// End the current chat or cancel the search
    Stop,
    /// Set the matching preference; `None` asks for the options
    Gender(Option<Preference>),
    Help,
    /// Anything that is not a command is relayed to the partner
    Text(String),
    Unknown(String),
}

impl Command {
    /// Parse a raw inbound payload.
    ///
    /// Commands are case-insensitive and may carry a `@botname` suffix as
    /// Telegram sends them in groups.
    pub fn parse(payload: &str) -> Self {
        let trimmed = payload.trim();
        if !trimmed.starts_with('/') {
            return Command::Text(payload.to_string());
        }

        let mut parts = trimmed.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let name = head[1..]
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match name.as_str() {
            "start" => Command::Start,
            "search" | "next" => Command::Search,
            "stop" => Command::Stop,
            "help" => Command::Help,
            "gender" => match parts.next() {
                Some(arg) => match arg.parse::<Preference>() {
                    Ok(preference) => Command::Gender(Some(preference)),
                    Err(_) => Command::Unknown(trimmed.to_string()),
                },
                None => Command::Gender(None),
            },
            _ => Command::Unknown(trimmed.to_string()),
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Search => "search",
            Command::Stop => "stop",
            Command::Gender(_) => "gender",
            Command::Help => "help",
            Command::Text(_) => "text",
            Command::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Gender(Some(preference)) => write!(f, "/gender {}", preference.as_str()),
            Command::Text(_) => write!(f, "text"),
            Command::Unknown(raw) => write!(f, "{}", raw),
            other => write!(f, "/{}", other.kind()),
        }
    }
}
