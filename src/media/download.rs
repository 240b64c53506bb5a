//! Download path: media reference in, audio upload out.

use crate::bot::messaging::{MessageSender, SendError};
use crate::bot::views;
use crate::media::codec::{CallbackToken, CodecError};
use crate::media::extractor::{Extractor, ExtractorError};
use crate::media::workspace::WorkspaceManager;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors of a single download attempt
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Callback payload could not be decoded
    #[error("invalid callback token: {0}")]
    Token(#[from] CodecError),
    /// Callback payload was issued for another chat
    #[error("token issued for chat {token_chat} used in chat {event_chat}")]
    ChatMismatch {
        /// Chat bound into the token
        token_chat: i64,
        /// Chat the selection came from
        event_chat: i64,
    },
    /// Workspace directory could not be prepared
    #[error("workspace error: {0}")]
    Workspace(#[from] io::Error),
    /// Extractor failed
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
    /// Extractor succeeded but the expected file is not there
    #[error("file missing after download: {}", .0.display())]
    MissingAfterDownload(PathBuf),
    /// Upload failed
    #[error("failed to upload audio: {0}")]
    Send(#[from] SendError),
}

/// Decode a callback payload and check it belongs to `event_chat`.
///
/// # Errors
///
/// Returns `DownloadError::Token` for malformed payloads and
/// `DownloadError::ChatMismatch` when the token names another chat.
pub fn reference_from_token(token: &str, event_chat: i64) -> Result<String, DownloadError> {
    let decoded = CallbackToken::decode(token)?;
    if decoded.chat_id != event_chat {
        return Err(DownloadError::ChatMismatch {
            token_chat: decoded.chat_id,
            event_chat,
        });
    }
    Ok(decoded.reference)
}

/// Drives the extractor inside a chat workspace and uploads the result
#[derive(Clone)]
pub struct Downloader {
    sender: MessageSender,
    extractor: Arc<dyn Extractor>,
    workspaces: WorkspaceManager,
}

impl Downloader {
    /// Create a downloader
    #[must_use]
    pub fn new(
        sender: MessageSender,
        extractor: Arc<dyn Extractor>,
        workspaces: WorkspaceManager,
    ) -> Self {
        Self {
            sender,
            extractor,
            workspaces,
        }
    }

    /// Download `reference` as audio and upload it to `chat_id`.
    ///
    /// `title`, when known, is shown in the start notice. The chat workspace
    /// is emptied on every exit path.
    ///
    /// # Errors
    ///
    /// Returns a `DownloadError` describing the failed step.
    pub async fn download(
        &self,
        reference: &str,
        chat_id: i64,
        title: Option<&str>,
    ) -> Result<(), DownloadError> {
        self.notify_started(chat_id, title);

        let workspace = self.workspaces.acquire(chat_id).await?;
        debug!(chat_id, reference, path = %workspace.path().display(), "Workspace acquired");

        let file_name = self.extractor.resolve_filename(reference).await?;
        self.extractor
            .fetch_audio(reference, workspace.path())
            .await?;

        let file = workspace.file(&file_name);
        if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
            return Err(DownloadError::MissingAfterDownload(file));
        }

        self.sender.send_file(chat_id, &file).await?;
        info!(chat_id, reference, file = %file_name, "Audio delivered");
        Ok(())
    }

    /// Fire-and-forget "Downloading..." notice
    fn notify_started(&self, chat_id: i64, title: Option<&str>) {
        let sender = self.sender.clone();
        let text = views::download_started(title);
        tokio::spawn(async move {
            if let Err(e) = sender.send_text(chat_id, &text).await {
                warn!(chat_id, error = %e, "Failed to send download notice");
            }
        });
    }
}
