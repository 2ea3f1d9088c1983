//! User-facing texts sent by the bot

use crate::types::Preference;

pub const WELCOME: &str = "👋 Welcome to Anonymous Chat Bot!\n\n\
    • Chat completely anonymously\n\
    • Meet new people\n\
    • Your privacy is protected\n\n\
    Send /search to find a partner, /gender to set your gender, /help for more.";

pub const HELP: &str = "📖 Help Guide\n\n\
    • /start registers you with the bot\n\
    • /search finds a chat partner\n\
    • /gender male|female|any sets your gender for better matching\n\
    • /stop ends the current chat or cancels the search\n\
    • Be respectful to others!\n\n\
    Your chats are anonymous.";

pub const SEARCHING: &str = "🔍 Searching for a chat partner...\n\
    Please wait while we find someone for you to talk with!";

pub const CONNECTED: &str = "✅ Connected! You're now chatting anonymously.\n\n\
    Type your messages and they'll be sent to your partner.\n\
    Use /stop to end the chat.";

pub const ALREADY_IN_CHAT: &str = "💬 You're already in a chat. Use /stop to end it first.";

pub const MESSAGE_SENT: &str = "✅ Message sent!";

pub const PARTNER_DISCONNECTED: &str = "❌ Partner disconnected. Starting new search...";

pub const NOT_IN_CHAT: &str = "❌ You're not in an active chat. Use /search to find a partner.";

pub const CHAT_ENDED: &str = "✅ Chat ended. Use /search to find a new partner.";

pub const SEARCH_CANCELLED: &str = "✅ Search cancelled.";

pub const PARTNER_ENDED: &str =
    "❌ Your partner has ended the chat. Use /search to find a new partner.";

pub const GENDER_PROMPT: &str = "Please select your gender for better matching:\n\
    /gender male\n\
    /gender female\n\
    /gender any (prefer not to say)";

pub const BANNED: &str = "🚫 You have been banned from this bot.";

pub const UNKNOWN_COMMAND: &str = "❓ Unknown command. Send /help to see what I understand.";

pub const SERVICE_UNAVAILABLE: &str = "⚠️ Something went wrong on our side. Please try again.";

/// Confirmation after a preference change
pub fn gender_set(preference: Preference) -> String {
    let display = match preference {
        Preference::Male => "👨 Male",
        Preference::Female => "👩 Female",
        Preference::Any => "❓ Prefer not to say",
    };
    format!("✅ Gender set to: {}", display)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_set_text() {
        assert_eq!(gender_set(Preference::Female), "✅ Gender set to: 👩 Female");
        assert!(gender_set(Preference::Any).contains("Prefer not to say"));
    }

    #[test]
    fn test_help_lists_commands() {
        for command in ["/start", "/search", "/gender", "/stop"] {
            assert!(HELP.contains(command), "help is missing {}", command);
        }
    }
}
