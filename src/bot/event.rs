//! Inbound event classification.
//!
//! Every Telegram update is classified exactly once into an [`InboundEvent`]
//! before any handler runs, so routing is a single `match`.

use crate::bot::commands::{command_name, is_addressed_to};
use teloxide::types::{Update, UpdateKind};

/// One user action the dispatcher knows how to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Slash command such as `/start`
    Command {
        /// Chat to answer in
        chat_id: i64,
        /// Sender of the command
        user_id: i64,
        /// Command name without slash or bot mention
        name: String,
        /// Full message text
        text: String,
    },
    /// Plain text: a search query or a direct link
    FreeText {
        /// Chat to answer in
        chat_id: i64,
        /// Sender of the message
        user_id: i64,
        /// Message text
        text: String,
    },
    /// Search result button pressed
    CallbackSelection {
        /// Chat containing the menu
        chat_id: i64,
        /// User who pressed the button
        user_id: i64,
        /// Callback payload of the button
        token: String,
    },
    /// Anything the bot does not react to
    Ignorable,
}

impl InboundEvent {
    /// Classify a message by its text.
    ///
    /// Messages without text (stickers, photos, ...) are ignorable, and so are
    /// commands mentioning a bot other than `bot_username`.
    #[must_use]
    pub fn from_message(
        chat_id: i64,
        user_id: i64,
        text: Option<&str>,
        bot_username: &str,
    ) -> Self {
        let Some(text) = text else {
            return Self::Ignorable;
        };

        match command_name(text) {
            Some(_) if !is_addressed_to(text, bot_username) => Self::Ignorable,
            Some(name) => Self::Command {
                chat_id,
                user_id,
                name: name.to_string(),
                text: text.to_string(),
            },
            None => Self::FreeText {
                chat_id,
                user_id,
                text: text.to_string(),
            },
        }
    }

    /// Classify a raw Telegram update received by `bot_username`
    #[must_use]
    pub fn from_update(update: &Update, bot_username: &str) -> Self {
        match &update.kind {
            UpdateKind::Message(msg) => {
                let user_id = msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed());
                Self::from_message(msg.chat.id.0, user_id, msg.text(), bot_username)
            }
            UpdateKind::CallbackQuery(q) => {
                let chat_id = q.message.as_ref().map(|m| m.chat().id.0);
                match (chat_id, q.data.as_deref()) {
                    (Some(chat_id), Some(data)) => Self::CallbackSelection {
                        chat_id,
                        user_id: q.from.id.0.cast_signed(),
                        token: data.to_string(),
                    },
                    _ => Self::Ignorable,
                }
            }
            _ => Self::Ignorable,
        }
    }

    /// Short label for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Command { .. } => "COMMAND",
            Self::FreeText { .. } => "MESSAGE",
            Self::CallbackSelection { .. } => "CALLBACK",
            Self::Ignorable => "IGNORED",
        }
    }

    /// Chat the event originated from
    #[must_use]
    pub const fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Command { chat_id, .. }
            | Self::FreeText { chat_id, .. }
            | Self::CallbackSelection { chat_id, .. } => Some(*chat_id),
            Self::Ignorable => None,
        }
    }

    /// User who caused the event
    #[must_use]
    pub const fn user_id(&self) -> Option<i64> {
        match self {
            Self::Command { user_id, .. }
            | Self::FreeText { user_id, .. }
            | Self::CallbackSelection { user_id, .. } => Some(*user_id),
            Self::Ignorable => None,
        }
    }
}
