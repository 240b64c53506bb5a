//! Slash command routing.

use crate::bot::messaging::{MessageSender, SendError};
use crate::bot::views::{GREETING_MESSAGE, HELP_MESSAGE};
use teloxide::utils::command::BotCommands;
use thiserror::Error;

/// Errors raised while handling a command
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command name is not one of [`Command`]
    #[error("got non-existent command /{name} from user {user_id}")]
    Unknown {
        /// Name as typed by the user
        name: String,
        /// Offending user
        user_id: i64,
    },
    /// Reply could not be delivered
    #[error("failed to send command reply: {0}")]
    Send(#[from] SendError),
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting
    #[command(description = "Start the bot.")]
    Start,
    /// Usage instructions
    #[command(description = "How to search and download.")]
    Help,
}

impl Command {
    /// Look up a command by name, ignoring case
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Canned reply for the command
    #[must_use]
    pub const fn response(self) -> &'static str {
        match self {
            Self::Start => GREETING_MESSAGE,
            Self::Help => HELP_MESSAGE,
        }
    }
}

/// Extract the command name from command-shaped text.
///
/// `/Start@my_bot extra words` yields `Start`. Returns `None` when the text is
/// not a slash command.
///
/// # Examples
///
/// ```
/// use oxide_tunes::bot::commands::command_name;
///
/// assert_eq!(command_name("/help"), Some("help"));
/// assert_eq!(command_name("/start@tunes_bot now"), Some("start"));
/// assert_eq!(command_name("hello /help"), None);
/// ```
#[must_use]
pub fn command_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?;
    let word = rest.split(char::is_whitespace).next().unwrap_or_default();
    let name = word.split('@').next().unwrap_or_default();

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(name)
}

/// Whether a command is meant for the bot named `username`.
///
/// `/start` is addressed to every bot in the chat, `/start@name` only to
/// `name` (compared case-insensitively, as Telegram usernames are).
#[must_use]
pub fn is_addressed_to(text: &str, username: &str) -> bool {
    let word = text.split(char::is_whitespace).next().unwrap_or_default();
    match word.split_once('@') {
        Some((_, mention)) => mention.eq_ignore_ascii_case(username),
        None => true,
    }
}

/// Resolve a command name to its reply text
///
/// # Errors
///
/// Returns `CommandError::Unknown` naming the user for unsupported commands.
pub fn route(name: &str, user_id: i64) -> Result<&'static str, CommandError> {
    Command::from_name(name)
        .map(Command::response)
        .ok_or_else(|| CommandError::Unknown {
            name: name.to_string(),
            user_id,
        })
}

/// Answer a command in its chat
///
/// # Errors
///
/// Returns an error for unknown commands or when the reply cannot be sent.
pub async fn handle_command(
    sender: &MessageSender,
    chat_id: i64,
    user_id: i64,
    name: &str,
) -> Result<(), CommandError> {
    let reply = route(name, user_id)?;
    sender.send_text(chat_id, reply).await?;
    Ok(())
}
