//! Wire message schema
//!
//! One JSON object per text frame with a single recognized key:
//!
//! ```json
//! { "audio": "<base64 AudioContainer>" }
//! ```
//!
//! Unknown keys are ignored. A missing `audio` key means the message carries
//! no audio; it is not an error.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::AudioContainer;
use crate::{Error, Result};

/// Structured message exchanged over the duplex channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of an [`AudioContainer`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl Envelope {
    /// Envelope without audio
    #[must_use]
    pub const fn empty() -> Self {
        Self { audio: None }
    }

    /// Wrap a container as base64 text
    #[must_use]
    pub fn with_container(container: &AudioContainer) -> Self {
        Self {
            audio: Some(base64::engine::general_purpose::STANDARD.encode(container.as_bytes())),
        }
    }

    /// Parse an inbound text frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the text is not a JSON object or `audio`
    /// is present but not a string
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::Parse(format!("invalid json: {e}")))?;

        if !value.is_object() {
            return Err(Error::Parse("envelope must be a JSON object".to_string()));
        }

        serde_json::from_value(value).map_err(|e| Error::Parse(format!("invalid envelope: {e}")))
    }

    /// Serialize for a text frame
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[must_use]
    pub const fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Decode the carried container, if any
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `audio` is not valid base64
    pub fn container(&self) -> Result<Option<AudioContainer>> {
        let Some(audio) = &self.audio else {
            return Ok(None);
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(audio)
            .map_err(|e| Error::Decode(format!("invalid base64 audio: {e}")))?;

        Ok(Some(AudioContainer::from_bytes(bytes)))
    }
}
