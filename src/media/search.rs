//! Video search provider.
//!
//! Resolves keywords into a short ranked list of [`VideoCandidate`]s using the
//! YouTube Data API v3.

use crate::config::{SEARCH_HTTP_TIMEOUT_SECS, SEARCH_MAX_RESULTS};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// Errors that can occur while searching
#[derive(Debug, Error)]
pub enum SearchError {
    /// Error during network communication
    #[error("Network error: {0}")]
    Network(String),
    /// Error returned by the provider's API
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the provider
        message: String,
    },
    /// Response body could not be parsed
    #[error("JSON error: {0}")]
    Json(String),
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCandidate {
    /// Human readable title, HTML entities already decoded
    pub title: String,
    /// Reference the extractor understands (video id)
    pub reference: String,
}

/// Interface for search providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// Return up to five videos matching `query`, most relevant first
    async fn search(&self, query: &str) -> Result<Vec<VideoCandidate>, SearchError>;
}

/// YouTube Data API search client
pub struct YoutubeSearch {
    http: HttpClient,
    api_key: String,
}

impl YoutubeSearch {
    /// Create a client for the given API key.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Network` if the HTTP client cannot be built.
    pub fn new(api_key: &str, proxy: Option<reqwest::Proxy>) -> Result<Self, SearchError> {
        let mut builder =
            HttpClient::builder().timeout(Duration::from_secs(SEARCH_HTTP_TIMEOUT_SECS));
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a `search.list` response body into candidates, keeping rank order
fn parse_search_response(body: &str) -> Result<Vec<VideoCandidate>, SearchError> {
    let response: SearchListResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Json(e.to_string()))?;

    Ok(response
        .items
        .into_iter()
        .filter_map(|item| {
            let reference = item.id.video_id?;
            Some(VideoCandidate {
                title: html_escape::decode_html_entities(&item.snippet.title).into_owned(),
                reference,
            })
        })
        .take(usize::from(SEARCH_MAX_RESULTS))
        .collect())
}

#[async_trait]
impl VideoSearch for YoutubeSearch {
    async fn search(&self, query: &str) -> Result<Vec<VideoCandidate>, SearchError> {
        let max_results = SEARCH_MAX_RESULTS.to_string();
        let response = self
            .http
            .get(YOUTUBE_SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("maxResults", max_results.as_str()),
                ("order", "relevance"),
                ("type", "video"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map_or_else(|_| status.to_string(), |e| e.error.message);
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let candidates = parse_search_response(&body)?;
        debug!(query, found = candidates.len(), "YouTube search completed");
        Ok(candidates)
    }
}
