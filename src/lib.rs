//! Voice Turn - turn-taking voice client and relay
//!
//! This library provides:
//! - A PCM WAV codec for captured speech
//! - A duplex WebSocket channel carrying `{"audio": "<base64>"}` envelopes
//! - A playback controller that allows at most one active clip
//! - The turn state machine with barge-in
//! - An echo/ack relay server
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   SpeechStarted / SpeechEnded   ┌──────────────────┐
//! │ mic+detector │ ──────────────────────────────▶ │                  │
//! └──────────────┘                                  │ TurnStateMachine │
//! ┌──────────────┐   Opened / Closed / Message      │                  │
//! │ChannelClient │ ◀──────────────────────────────▶ │                  │
//! └──────┬───────┘                                  └────────┬─────────┘
//!        │ WebSocket                                          │ play / cancel
//! ┌──────▼───────┐                                  ┌────────▼─────────┐
//! │ RelayServer  │                                  │PlaybackController│
//! └──────────────┘                                  └──────────────────┘
//! ```

pub mod audio;
pub mod channel;
pub mod config;
pub mod error;
pub mod playback;
pub mod relay;
pub mod session;
pub mod turn;
pub mod voice;

pub use audio::{AudioContainer, DecodedAudio, SAMPLE_RATE, SpeechSegment};
pub use channel::{ChannelClient, ConnectionState, Envelope, EnvelopeSink};
pub use config::{ClientConfig, Config, ServerConfig};
pub use error::{Error, Result};
pub use playback::{AudioSink, CompletionNotifier, PlaybackController, PlaybackHandle};
pub use relay::{RelayMode, RelayServer, ReplyProcessor};
pub use session::{SampleSource, Session, process_capture};
pub use turn::{TurnEvent, TurnState, TurnStateMachine};
