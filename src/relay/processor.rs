//! Reply generation for relayed envelopes

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::Envelope;
use crate::{Error, Result};

/// Turns one inbound envelope into at most one reply
#[async_trait]
pub trait ReplyProcessor: Send + Sync {
    /// Processor name for logs
    fn name(&self) -> &'static str;

    /// Produce the reply for `envelope`
    ///
    /// `Ok(None)` sends nothing back.
    ///
    /// # Errors
    ///
    /// Returns error if the envelope cannot be processed. The relay logs it
    /// and keeps the connection open.
    async fn process(&self, envelope: Envelope) -> Result<Option<Envelope>>;
}

/// Identity relay: the reply is the request
pub struct EchoProcessor;

#[async_trait]
impl ReplyProcessor for EchoProcessor {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn process(&self, envelope: Envelope) -> Result<Option<Envelope>> {
        Ok(Some(envelope))
    }
}

/// Logs what arrived and replies with an audio-less envelope
pub struct AckProcessor;

#[async_trait]
impl ReplyProcessor for AckProcessor {
    fn name(&self) -> &'static str {
        "ack"
    }

    async fn process(&self, envelope: Envelope) -> Result<Option<Envelope>> {
        match envelope.container()? {
            Some(container) => {
                tracing::info!(
                    bytes = container.len(),
                    samples = container.sample_count(),
                    duration_ms = container.duration().as_millis(),
                    "received audio"
                );
            }
            None => tracing::info!("received envelope without audio"),
        }

        Ok(Some(Envelope::empty()))
    }
}

/// Built-in reply strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Send every envelope back unchanged
    #[default]
    Echo,
    /// Log the audio and reply `{}`
    Ack,
}

impl RelayMode {
    #[must_use]
    pub fn processor(self) -> Arc<dyn ReplyProcessor> {
        match self {
            Self::Echo => Arc::new(EchoProcessor),
            Self::Ack => Arc::new(AckProcessor),
        }
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => f.write_str("echo"),
            Self::Ack => f.write_str("ack"),
        }
    }
}

impl FromStr for RelayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "ack" => Ok(Self::Ack),
            other => Err(Error::Config(format!("unknown relay mode: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioContainer, SpeechSegment, encode};

    #[tokio::test]
    async fn echo_returns_request() {
        let envelope = Envelope::with_container(&encode(&SpeechSegment::new(vec![0.3; 16])));
        let reply = EchoProcessor.process(envelope.clone()).await.unwrap();
        assert_eq!(reply, Some(envelope));
    }

    #[tokio::test]
    async fn ack_replies_without_audio() {
        let envelope = Envelope::with_container(&AudioContainer::from_bytes(vec![0u8; 48]));
        let reply = AckProcessor.process(envelope).await.unwrap();
        assert_eq!(reply, Some(Envelope::empty()));
    }

    #[tokio::test]
    async fn ack_rejects_bad_base64() {
        let envelope = Envelope {
            audio: Some("%%%".to_string()),
        };
        assert!(AckProcessor.process(envelope).await.is_err());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("echo".parse::<RelayMode>().unwrap(), RelayMode::Echo);
        assert_eq!(" ACK ".parse::<RelayMode>().unwrap(), RelayMode::Ack);
        assert!("loopback".parse::<RelayMode>().is_err());
        assert_eq!(RelayMode::Ack.processor().name(), "ack");
    }
}
