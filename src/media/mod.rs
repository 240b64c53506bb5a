//! Media side of the bot: finding videos and turning them into audio files.

/// Callback payload encoding for search result buttons
pub mod codec;
/// Download path: extractor run inside a chat workspace, then upload
pub mod download;
/// External extractor process
pub mod extractor;
/// Link detection in free text
pub mod links;
/// Video search provider
pub mod search;
/// Per-chat scratch directories
pub mod workspace;

pub use download::{DownloadError, Downloader};
pub use extractor::{Extractor, ExtractorError, YtDlpExtractor};
pub use search::{SearchError, VideoCandidate, VideoSearch, YoutubeSearch};
pub use workspace::WorkspaceManager;
