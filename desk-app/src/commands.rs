//! Slash-command parser.
//!
//! Malformed arguments are a typed outcome surfaced to the invoking
//! admin as a usage hint, never a swallowed error.

use desk_channels::{CommandSpec, UserId};
use thiserror::Error;

pub const CHAT_USAGE: &str = "Usage: /chat <user_id>";
pub const STOPCHAT_USAGE: &str = "Usage: /stopchat <user_id>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Faq,
    Chat(UserId),
    StopChat(UserId),
    Ping,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{usage}")]
    MalformedArgs { usage: &'static str },
}

/// None for plain text; Some(Err) when a known command has bad args.
/// A `/command@botname` mention parses the same as the bare command.
pub fn parse(text: &str) -> Option<Result<Command, CommandError>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head);

    let parsed = match name {
        "/start" => Ok(Command::Start),
        "/faq" => Ok(Command::Faq),
        "/ping" => Ok(Command::Ping),
        "/chat" => parse_user_arg(parts.next(), CHAT_USAGE).map(Command::Chat),
        "/stopchat" => parse_user_arg(parts.next(), STOPCHAT_USAGE).map(Command::StopChat),
        other => Ok(Command::Unknown(other.to_string())),
    };
    Some(parsed)
}

fn parse_user_arg(arg: Option<&str>, usage: &'static str) -> Result<UserId, CommandError> {
    let arg = arg.ok_or(CommandError::MalformedArgs { usage })?;
    if arg.parse::<i64>().is_err() {
        return Err(CommandError::MalformedArgs { usage });
    }
    Ok(UserId::new(arg))
}

/// Platform command menu registered at startup.
pub fn command_menu() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("start", "🚀 Start support session"),
        CommandSpec::new("faq", "📋 View frequently asked questions"),
        CommandSpec::new("chat", "👤 Start human support (admin only)"),
        CommandSpec::new("stopchat", "🔕 Stop human support (admin only)"),
        CommandSpec::new("ping", "✅ Check the bot is alive"),
    ]
}

#[cfg(test)]
mod tests {
    use super::{CHAT_USAGE, Command, CommandError, STOPCHAT_USAGE, command_menu, parse};
    use desk_channels::UserId;

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(parse("where is my order").is_none());
        assert!(parse("  hello  ").is_none());
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse("/start"), Some(Ok(Command::Start)));
        assert_eq!(parse("/faq"), Some(Ok(Command::Faq)));
        assert_eq!(parse("/ping"), Some(Ok(Command::Ping)));
    }

    #[test]
    fn bot_mention_suffix_is_stripped() {
        assert_eq!(parse("/start@relaydesk_bot"), Some(Ok(Command::Start)));
        assert_eq!(
            parse("/chat@relaydesk_bot 42"),
            Some(Ok(Command::Chat(UserId::new("42"))))
        );
    }

    #[test]
    fn chat_commands_require_a_numeric_user_id() {
        assert_eq!(parse("/chat 42"), Some(Ok(Command::Chat(UserId::new("42")))));
        assert_eq!(
            parse("/stopchat -100123"),
            Some(Ok(Command::StopChat(UserId::new("-100123"))))
        );

        assert_eq!(
            parse("/chat"),
            Some(Err(CommandError::MalformedArgs { usage: CHAT_USAGE }))
        );
        assert_eq!(
            parse("/chat alice"),
            Some(Err(CommandError::MalformedArgs { usage: CHAT_USAGE }))
        );
        assert_eq!(
            parse("/stopchat"),
            Some(Err(CommandError::MalformedArgs {
                usage: STOPCHAT_USAGE
            }))
        );
    }

    #[test]
    fn unknown_slash_text_is_reported_as_unknown() {
        assert_eq!(
            parse("/help"),
            Some(Ok(Command::Unknown("/help".to_string())))
        );
    }

    #[test]
    fn command_menu_covers_all_five_commands() {
        let names: Vec<String> = command_menu().into_iter().map(|c| c.command).collect();
        assert_eq!(names, vec!["start", "faq", "chat", "stopchat", "ping"]);
    }
}
