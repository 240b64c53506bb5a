//! Per-event handling paths and the failure boundary around them.

use crate::bot::candidate_cache::CandidateCache;
use crate::bot::commands::{handle_command, CommandError};
use crate::bot::event::InboundEvent;
use crate::bot::messaging::{MenuEntry, MessageSender, SendError};
use crate::bot::views;
use crate::media::codec::{CallbackToken, CodecError};
use crate::media::download::{reference_from_token, DownloadError, Downloader};
use crate::media::links::extract_media_reference;
use crate::media::search::{SearchError, VideoCandidate, VideoSearch};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors of the search path
#[derive(Debug, Error)]
pub enum SearchPathError {
    /// Provider failed
    #[error(transparent)]
    Search(#[from] SearchError),
    /// A result could not be packed into a button
    #[error("failed to build menu: {0}")]
    Menu(#[from] CodecError),
    /// Menu could not be delivered
    #[error("failed to send menu: {0}")]
    Send(#[from] SendError),
}

/// Failure of one inbound event, tagged with the user who caused it
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Command routing failed
    #[error("command from user {user_id} failed: {source}")]
    Command {
        /// Sender
        user_id: i64,
        /// Cause
        source: CommandError,
    },
    /// Search for free text failed
    #[error("search for user {user_id} failed: {source}")]
    Search {
        /// Sender
        user_id: i64,
        /// Cause
        source: SearchPathError,
    },
    /// Download of a link sent as text failed
    #[error("link download for user {user_id} failed: {source}")]
    LinkDownload {
        /// Sender
        user_id: i64,
        /// Cause
        source: DownloadError,
    },
    /// Download of a selected search result failed
    #[error("selection download for user {user_id} failed: {source}")]
    SelectionDownload {
        /// User who pressed the button
        user_id: i64,
        /// Cause
        source: DownloadError,
    },
}

impl HandlerError {
    /// Text shown to the user for this failure
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Command { .. } => views::COMMAND_NOT_RECOGNIZED,
            Self::Search { .. } => views::SEARCH_FAILED,
            Self::LinkDownload { .. } => views::LINK_DOWNLOAD_FAILED,
            Self::SelectionDownload { .. } => views::SELECTION_DOWNLOAD_FAILED,
        }
    }

    /// User the failure belongs to
    #[must_use]
    pub const fn user_id(&self) -> i64 {
        match self {
            Self::Command { user_id, .. }
            | Self::Search { user_id, .. }
            | Self::LinkDownload { user_id, .. }
            | Self::SelectionDownload { user_id, .. } => *user_id,
        }
    }
}

/// Build one menu entry per candidate, each bound to `chat_id`.
///
/// # Errors
///
/// Returns `CodecError` if a candidate reference does not fit a button payload.
pub fn build_menu(
    candidates: &[VideoCandidate],
    chat_id: i64,
) -> Result<Vec<MenuEntry>, CodecError> {
    candidates
        .iter()
        .map(|candidate| {
            Ok(MenuEntry {
                label: candidate.title.clone(),
                payload: CallbackToken::new(candidate.reference.as_str(), chat_id).encode()?,
            })
        })
        .collect()
}

/// Everything a unit of work needs
#[derive(Clone)]
pub struct EventHandler {
    sender: MessageSender,
    search: Arc<dyn VideoSearch>,
    downloader: Downloader,
    candidates: CandidateCache,
}

impl EventHandler {
    /// Wire the handling paths together
    #[must_use]
    pub fn new(
        sender: MessageSender,
        search: Arc<dyn VideoSearch>,
        downloader: Downloader,
        candidates: CandidateCache,
    ) -> Self {
        Self {
            sender,
            search,
            downloader,
            candidates,
        }
    }

    /// Handle one event. Never fails: errors are logged and reported to the chat.
    pub async fn process(&self, event: InboundEvent) {
        let Some(chat_id) = event.chat_id() else {
            return;
        };

        if let Err(e) = self.handle(event).await {
            error!(user_id = e.user_id(), chat_id, error = %e, "Failed to handle event");
            if let Err(send_err) = self.sender.send_text(chat_id, e.user_message()).await {
                warn!(
                    user_id = e.user_id(),
                    chat_id,
                    error = %send_err,
                    "Failed to notify user about error"
                );
            }
        }
    }

    /// Route one event to its path
    ///
    /// # Errors
    ///
    /// Returns a `HandlerError` tagged with the path and user that failed.
    pub async fn handle(&self, event: InboundEvent) -> Result<(), HandlerError> {
        match event {
            InboundEvent::Command {
                chat_id,
                user_id,
                name,
                ..
            } => {
                info!(user_id, chat_id, command = %name, "[COMMAND]");
                handle_command(&self.sender, chat_id, user_id, &name)
                    .await
                    .map_err(|source| HandlerError::Command { user_id, source })
            }
            InboundEvent::FreeText {
                chat_id,
                user_id,
                text,
            } => {
                info!(user_id, chat_id, text = %text, "[MESSAGE]");
                self.handle_text(chat_id, user_id, &text).await
            }
            InboundEvent::CallbackSelection {
                chat_id,
                user_id,
                token,
            } => {
                info!(user_id, chat_id, "[CALLBACK]");
                self.handle_selection(chat_id, &token)
                    .await
                    .map_err(|source| HandlerError::SelectionDownload { user_id, source })
            }
            InboundEvent::Ignorable => Ok(()),
        }
    }

    async fn handle_text(&self, chat_id: i64, user_id: i64, text: &str) -> Result<(), HandlerError> {
        if let Some(reference) = extract_media_reference(text) {
            return self
                .downloader
                .download(&reference, chat_id, None)
                .await
                .map_err(|source| HandlerError::LinkDownload { user_id, source });
        }

        self.offer_candidates(chat_id, text)
            .await
            .map_err(|source| HandlerError::Search { user_id, source })
    }

    async fn offer_candidates(&self, chat_id: i64, query: &str) -> Result<(), SearchPathError> {
        let candidates = self.search.search(query).await?;
        if candidates.is_empty() {
            self.sender.send_text(chat_id, views::NOTHING_FOUND).await?;
            return Ok(());
        }

        let menu = build_menu(&candidates, chat_id)?;
        self.sender
            .send_menu(chat_id, &views::search_results_header(query), &menu)
            .await?;
        self.candidates.store(chat_id, candidates).await;
        Ok(())
    }

    async fn handle_selection(&self, chat_id: i64, token: &str) -> Result<(), DownloadError> {
        let reference = reference_from_token(token, chat_id)?;
        let title = self.candidates.title_for(chat_id, &reference).await;
        self.downloader
            .download(&reference, chat_id, title.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::messaging::MockChatTransport;
    use crate::media::extractor::MockExtractor;
    use crate::media::search::MockVideoSearch;
    use crate::media::workspace::WorkspaceManager;
    use mockall::predicate::eq;
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log lock")).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn candidate(title: &str, reference: &str) -> VideoCandidate {
        VideoCandidate {
            title: title.to_string(),
            reference: reference.to_string(),
        }
    }

    fn handler(
        transport: MockChatTransport,
        search: MockVideoSearch,
        extractor: MockExtractor,
        root: &Path,
    ) -> EventHandler {
        let sender = MessageSender::new(Arc::new(transport));
        let downloader = Downloader::new(
            sender.clone(),
            Arc::new(extractor),
            WorkspaceManager::new(root),
        );
        EventHandler::new(
            sender,
            Arc::new(search),
            downloader,
            CandidateCache::new(Duration::from_secs(60), 100),
        )
    }

    #[test]
    fn test_build_menu_binds_chat() {
        let menu = build_menu(&[candidate("A", "aaa"), candidate("B", "bbb")], 42).expect("menu");
        assert_eq!(menu.len(), 2);
        assert_eq!(menu[0].label, "A");
        let token = CallbackToken::decode(&menu[1].payload).expect("decode");
        assert_eq!(token, CallbackToken::new("bbb", 42));
    }

    #[test]
    fn test_user_messages_per_path() {
        let err = HandlerError::Search {
            user_id: 1,
            source: SearchPathError::Search(SearchError::Network("down".into())),
        };
        assert_eq!(err.user_message(), views::SEARCH_FAILED);
        assert_eq!(err.user_id(), 1);

        let err = HandlerError::SelectionDownload {
            user_id: 2,
            source: DownloadError::ChatMismatch {
                token_chat: 1,
                event_chat: 2,
            },
        };
        assert_eq!(err.user_message(), views::SELECTION_DOWNLOAD_FAILED);
    }

    #[tokio::test]
    async fn test_free_text_search_sends_menu() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut search = MockVideoSearch::new();
        search
            .expect_search()
            .with(eq("lofi hip hop radio"))
            .times(1)
            .returning(|_| Ok(vec![candidate("Lofi", "aaaaaaaaaaa")]));

        let mut transport = MockChatTransport::new();
        transport
            .expect_send_menu()
            .withf(|chat_id, text, entries| {
                *chat_id == 42
                    && text == "Results on search:\n<b>lofi hip hop radio</b>"
                    && entries.len() == 1
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let handler = handler(transport, search, MockExtractor::new(), tmp.path());
        handler
            .handle(InboundEvent::FreeText {
                chat_id: 42,
                user_id: 7,
                text: "lofi hip hop radio".into(),
            })
            .await
            .expect("search path");

        assert_eq!(
            handler.candidates.title_for(42, "aaaaaaaaaaa").await.as_deref(),
            Some("Lofi")
        );
    }

    #[tokio::test]
    async fn test_empty_search_reports_nothing_found() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut search = MockVideoSearch::new();
        search.expect_search().returning(|_| Ok(Vec::new()));

        let mut transport = MockChatTransport::new();
        transport.expect_send_menu().times(0);
        transport
            .expect_send_text()
            .with(eq(42), eq(views::NOTHING_FOUND))
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = handler(transport, search, MockExtractor::new(), tmp.path());
        handler
            .handle(InboundEvent::FreeText {
                chat_id: 42,
                user_id: 7,
                text: "zzzz".into(),
            })
            .await
            .expect("empty search is not an error");
    }

    #[tokio::test]
    async fn test_process_reports_search_failure_to_chat() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut search = MockVideoSearch::new();
        search.expect_search().returning(|_| {
            Err(SearchError::Api {
                status: 403,
                message: "quota".into(),
            })
        });

        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .with(eq(42), eq(views::SEARCH_FAILED))
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = handler(transport, search, MockExtractor::new(), tmp.path());
        handler
            .process(InboundEvent::FreeText {
                chat_id: 42,
                user_id: 7,
                text: "query".into(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_unknown_command_reports_not_recognized() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .with(eq(5), eq(views::COMMAND_NOT_RECOGNIZED))
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = handler(
            transport,
            MockVideoSearch::new(),
            MockExtractor::new(),
            tmp.path(),
        );
        handler
            .process(InboundEvent::Command {
                chat_id: 5,
                user_id: 9,
                name: "stats".into(),
                text: "/stats".into(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_foreign_token_is_selection_failure() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve_filename().times(0);

        let handler = handler(
            MockChatTransport::new(),
            MockVideoSearch::new(),
            extractor,
            tmp.path(),
        );
        let token = CallbackToken::new("abc123", 1).encode().expect("encode");
        let result = handler
            .handle(InboundEvent::CallbackSelection {
                chat_id: 2,
                user_id: 9,
                token,
            })
            .await;

        assert!(matches!(
            result,
            Err(HandlerError::SelectionDownload {
                user_id: 9,
                source: DownloadError::ChatMismatch { .. }
            })
        ));
    }

    #[tokio::test]
    async fn test_ignorable_does_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let handler = handler(
            MockChatTransport::new(),
            MockVideoSearch::new(),
            MockExtractor::new(),
            tmp.path(),
        );
        handler.process(InboundEvent::Ignorable).await;
    }

    #[tokio::test]
    async fn test_failure_log_names_chat_and_user() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let tmp = tempfile::tempdir().expect("tempdir");
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .with(eq(42), eq(views::SELECTION_DOWNLOAD_FAILED))
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = handler(
            transport,
            MockVideoSearch::new(),
            MockExtractor::new(),
            tmp.path(),
        );
        let token = CallbackToken::new("abc123", 1).encode().expect("encode");
        handler
            .process(InboundEvent::CallbackSelection {
                chat_id: 42,
                user_id: 7,
                token,
            })
            .await;

        let output = logs.contents();
        let line = output
            .lines()
            .find(|line| line.contains("ERROR"))
            .unwrap_or_else(|| panic!("no error line in {output:?}"));
        assert!(line.contains("chat_id=42"), "{line}");
        assert!(line.contains("user_id=7"), "{line}");
        assert!(line.contains("Failed to handle event"), "{line}");
    }
}
