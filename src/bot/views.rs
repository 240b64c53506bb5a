//! User-facing texts.

/// Reply to `/start`
pub const GREETING_MESSAGE: &str = "\
Send me a song's name or a link. More info /help
Note that I can't download too long songs (approx more than 10-15 min) due to Telegram upload limits";

/// Reply to `/help`
pub const HELP_MESSAGE: &str = "\
<b>Search and download</b>
Write me a track name and author to find music. A list of available downloads will appear.
Search covers YouTube only.

<b>Download using link</b>
Send me a link to start downloading right away (youtube, soundcloud, vimeo, etc). Not all services are supported.
List of <a href=\"https://github.com/yt-dlp/yt-dlp/blob/master/supportedsites.md\">available services</a>

- Backend is open-source
- Written in Rust
- Downloads via <a href=\"https://github.com/yt-dlp/yt-dlp\">yt-dlp</a>";

/// Notice sent when a download begins
pub const DOWNLOAD_STARTED: &str = "Downloading...";

/// Unrecognized slash command
pub const COMMAND_NOT_RECOGNIZED: &str = "\
Command is not recognized. Please type / and select from existing";

/// Search provider failed
pub const SEARCH_FAILED: &str = "\
I couldn't retrieve search results right now. Please try again a bit later or send me a direct link. More info /help";

/// Search succeeded but returned nothing
pub const NOTHING_FOUND: &str = "Nothing found. Try other keywords or send me a link.";

/// Download from a link in a text message failed
pub const LINK_DOWNLOAD_FAILED: &str = "\
Something went wrong and I couldn't download. Try next:
1. Check the URL that you've sent me (open it in browser)
2. Some services are not available. Check support status at /help
3. An internal error occurred. Contact the author to fix it. Thanks!";

/// Download of a selected search result failed
pub const SELECTION_DOWNLOAD_FAILED: &str = "\
An internal error occurred. Please check the duration of the track (in most cases that's the problem) and \
retry your request, or use /help to get more info";

/// Header of the search results menu
#[must_use]
pub fn search_results_header(query: &str) -> String {
    format!("Results on search:\n<b>{}</b>", html_escape::encode_text(query))
}

/// Download notice, naming the track when it is known
#[must_use]
pub fn download_started(title: Option<&str>) -> String {
    match title {
        Some(title) => format!("{DOWNLOAD_STARTED} <i>{}</i>", html_escape::encode_text(title)),
        None => DOWNLOAD_STARTED.to_string(),
    }
}
