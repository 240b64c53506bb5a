//! Message sending primitives.
//!
//! [`ChatTransport`] is the seam to the chat platform; [`MessageSender`]
//! adds the delivery rules every handler relies on. [`TelegramTransport`]
//! is the production transport built on `teloxide`.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, LinkPreviewOptions, ParseMode,
};
use thiserror::Error;
use tracing::debug;

/// Errors returned by a chat transport
#[derive(Debug, Error)]
pub enum SendError {
    /// Telegram Bot API request failed
    #[error("Telegram request error: {0}")]
    Request(#[from] teloxide::RequestError),
    /// Any other transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// One selectable row of an inline menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Visible button label
    pub label: String,
    /// Hidden callback payload
    pub payload: String,
}

/// Raw send operations of the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send an HTML text message without link previews
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError>;

    /// Send an HTML text message with an inline menu, one entry per row
    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        entries: &[MenuEntry],
    ) -> Result<(), SendError>;

    /// Upload a local file as playable audio
    async fn send_audio(&self, chat_id: i64, path: &Path) -> Result<(), SendError>;
}

/// Send front end shared by every handler
#[derive(Clone)]
pub struct MessageSender {
    transport: Arc<dyn ChatTransport>,
}

impl MessageSender {
    /// Wrap a transport
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Send text to a chat.
    ///
    /// A non-positive chat id means there is nobody to answer, so nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns the transport error if delivery fails.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        if chat_id <= 0 {
            debug!(chat_id, "Skipping text message to non-positive chat id");
            return Ok(());
        }
        self.transport.send_text(chat_id, text).await
    }

    /// Send text with a selectable menu
    ///
    /// # Errors
    ///
    /// Returns the transport error if delivery fails.
    pub async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        entries: &[MenuEntry],
    ) -> Result<(), SendError> {
        self.transport.send_menu(chat_id, text, entries).await
    }

    /// Upload the file at `path` as audio
    ///
    /// # Errors
    ///
    /// Returns the transport error if the upload fails.
    pub async fn send_file(&self, chat_id: i64, path: &Path) -> Result<(), SendError> {
        self.transport.send_audio(chat_id, path).await
    }
}

/// [`ChatTransport`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Create a transport for an authorized bot
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

const fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_link_preview())
            .await?;
        Ok(())
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        entries: &[MenuEntry],
    ) -> Result<(), SendError> {
        let rows = entries
            .iter()
            .map(|entry| {
                vec![InlineKeyboardButton::callback(
                    entry.label.clone(),
                    entry.payload.clone(),
                )]
            })
            .collect::<Vec<_>>();

        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(InlineKeyboardMarkup::new(rows))
            .await?;
        Ok(())
    }

    async fn send_audio(&self, chat_id: i64, path: &Path) -> Result<(), SendError> {
        self.bot
            .send_audio(ChatId(chat_id), InputFile::file(path.to_path_buf()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_send_text_skips_non_positive_chat() {
        let mut transport = MockChatTransport::new();
        transport.expect_send_text().times(0);

        let sender = MessageSender::new(Arc::new(transport));
        assert!(sender.send_text(0, "hello").await.is_ok());
        assert!(sender.send_text(-100, "hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_text_delivers_to_positive_chat() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .with(eq(42), eq("hello"))
            .times(1)
            .returning(|_, _| Ok(()));

        let sender = MessageSender::new(Arc::new(transport));
        assert!(sender.send_text(42, "hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_text_reports_transport_failure() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .times(1)
            .returning(|_, _| Err(SendError::Transport("boom".into())));

        let sender = MessageSender::new(Arc::new(transport));
        let err = sender.send_text(42, "hello").await.expect_err("must fail");
        assert!(err.to_string().contains("boom"));
    }
}
