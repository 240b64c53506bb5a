//! Callback token codec
//!
//! A search result button carries the video reference and the chat it was
//! offered to. The payload comes back from the client untouched, so decoding
//! treats it as untrusted input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Telegram rejects inline buttons whose callback data exceeds 64 bytes
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Errors produced while encoding or decoding callback tokens
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not a token produced by [`CallbackToken::encode`]
    #[error("malformed callback token: {0}")]
    Malformed(String),
    /// Encoded token would not fit into a callback button
    #[error("callback token is {len} bytes, limit is {MAX_CALLBACK_DATA_LEN}")]
    TooLong {
        /// Encoded length in bytes
        len: usize,
    },
}

/// Self-contained payload of a search result button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackToken {
    /// Reference the extractor understands (video id or URL)
    #[serde(rename = "url")]
    pub reference: String,
    /// Chat the button was sent to
    pub chat_id: i64,
}

impl CallbackToken {
    /// Bind a reference to a chat
    #[must_use]
    pub fn new(reference: impl Into<String>, chat_id: i64) -> Self {
        Self {
            reference: reference.into(),
            chat_id,
        }
    }

    /// Serialize into callback data
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Malformed` for an empty reference or a zero chat id,
    /// and `CodecError::TooLong` when the result exceeds the callback data limit.
    pub fn encode(&self) -> Result<String, CodecError> {
        self.check()?;
        let data =
            serde_json::to_string(self).map_err(|e| CodecError::Malformed(e.to_string()))?;
        if data.len() > MAX_CALLBACK_DATA_LEN {
            return Err(CodecError::TooLong { len: data.len() });
        }
        Ok(data)
    }

    /// Parse callback data back into a token
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Malformed` for anything `encode` could not have produced.
    pub fn decode(data: &str) -> Result<Self, CodecError> {
        let token: Self =
            serde_json::from_str(data).map_err(|e| CodecError::Malformed(e.to_string()))?;
        token.check()?;
        Ok(token)
    }

    fn check(&self) -> Result<(), CodecError> {
        if self.reference.trim().is_empty() {
            return Err(CodecError::Malformed("empty reference".into()));
        }
        if self.chat_id == 0 {
            return Err(CodecError::Malformed("missing chat id".into()));
        }
        Ok(())
    }
}
