//! Direct link detection in free text.

// lazy_regex! validates patterns at compile time
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// Any http/https/ftp URL
static RE_ANY_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(http|ftp|https)://([\w-]+(?:(?:\.[\w-]+)+))([\w.,@?^=%&:/~+#-]*[\w@?^=%&/~+#-])?"
);

/// Long and short YouTube links, group 6 is the video id
static RE_YOUTUBE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(http(s|):|)//(www\.|)yout(.*?)/(embed/|watch.*?v=|)([a-z_A-Z0-9\-]{11})"
);

/// Find a media reference in user text.
///
/// Returns `None` when the text contains no URL. YouTube links are narrowed
/// to the bare 11-character video id; any other URL is returned as found.
///
/// # Examples
///
/// ```
/// use oxide_tunes::media::links::extract_media_reference;
///
/// let text = "listen https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42 now";
/// assert_eq!(extract_media_reference(text).as_deref(), Some("dQw4w9WgXcQ"));
/// assert_eq!(extract_media_reference("lofi hip hop radio"), None);
/// ```
#[must_use]
pub fn extract_media_reference(text: &str) -> Option<String> {
    let url = RE_ANY_URL.find(text)?.as_str();

    let reference = RE_YOUTUBE
        .captures(url)
        .and_then(|caps| caps.get(6))
        .map_or(url, |id| id.as_str());

    Some(reference.to_string())
}
