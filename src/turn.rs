//! Turn-taking state machine
//!
//! Every input to a session (connection lifecycle, inbound envelopes, detector
//! output, playback completions) arrives as a [`TurnEvent`] and is applied one
//! at a time by [`TurnStateMachine::handle`].

use std::fmt;

use crate::audio::{self, SpeechSegment};
use crate::channel::{ConnectionState, Envelope, EnvelopeSink};
use crate::playback::{AudioSink, PlaybackController, PlaybackHandle};

/// Where the session is in the conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    Sending,
    AwaitingReply,
    Playing,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Sending => "sending",
            Self::AwaitingReply => "awaiting_reply",
            Self::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    ConnectionOpened,
    ConnectionClosed,
    MessageReceived(Envelope),
    SpeechStarted,
    SpeechEnded(SpeechSegment),
    PlaybackCompleted(PlaybackHandle),
}

impl TurnEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionOpened => "connection_opened",
            Self::ConnectionClosed => "connection_closed",
            Self::MessageReceived(_) => "message_received",
            Self::SpeechStarted => "speech_started",
            Self::SpeechEnded(_) => "speech_ended",
            Self::PlaybackCompleted(_) => "playback_completed",
        }
    }
}

/// Single authority over turn state, playback and outbound sends
///
/// Detection gating reads the channel's live connection state rather than a
/// copy, so there is one source of truth for "connected".
pub struct TurnStateMachine<C, S> {
    state: TurnState,
    barge_in: bool,
    channel: C,
    playback: PlaybackController<S>,
}

impl<C: EnvelopeSink, S: AudioSink> TurnStateMachine<C, S> {
    /// Create a machine in `Idle`
    ///
    /// With `barge_in` disabled, detection is switched off while playing and
    /// speech cannot interrupt a reply.
    pub const fn new(channel: C, playback: PlaybackController<S>, barge_in: bool) -> Self {
        Self {
            state: TurnState::Idle,
            barge_in,
            channel,
            playback,
        }
    }

    /// Apply one event and return the resulting state
    pub fn handle(&mut self, event: TurnEvent) -> TurnState {
        let before = self.state;
        let name = event.name();

        match event {
            TurnEvent::ConnectionOpened => self.on_connection_opened(),
            TurnEvent::ConnectionClosed => self.on_connection_closed(),
            TurnEvent::MessageReceived(envelope) => self.on_message(&envelope),
            TurnEvent::SpeechStarted => self.on_speech_started(),
            TurnEvent::SpeechEnded(segment) => self.on_speech_ended(&segment),
            TurnEvent::PlaybackCompleted(handle) => self.on_playback_completed(handle),
        }

        if before != self.state {
            tracing::debug!(event = name, from = %before, to = %self.state, "turn transition");
        }

        self.state
    }

    /// Whether detector output should be fed to the machine right now
    #[must_use]
    pub fn detection_enabled(&self) -> bool {
        self.is_connected() && (self.barge_in || self.state != TurnState::Playing)
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub const fn barge_in(&self) -> bool {
        self.barge_in
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.channel.connection_state()
    }

    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    pub const fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackController<S> {
        &self.playback
    }

    fn is_connected(&self) -> bool {
        self.channel.connection_state() == ConnectionState::Connected
    }

    fn on_connection_opened(&mut self) {
        if self.state != TurnState::Idle {
            self.playback.cancel_active();
            self.state = TurnState::Idle;
        }
        tracing::info!("connected, detection enabled");
    }

    fn on_connection_closed(&mut self) {
        if let Some(handle) = self.playback.cancel_active() {
            tracing::debug!(handle = %handle, "playback cancelled on disconnect");
        }
        self.state = TurnState::Idle;
        tracing::info!("disconnected, detection disabled");
    }

    fn on_speech_started(&mut self) {
        if !self.is_connected() {
            tracing::debug!("speech start ignored while disconnected");
            return;
        }

        match self.state {
            TurnState::Idle => self.state = TurnState::Listening,
            TurnState::Playing if self.barge_in => {
                if let Some(handle) = self.playback.cancel_active() {
                    tracing::info!(handle = %handle, "barge-in, playback cancelled");
                }
                self.state = TurnState::Listening;
            }
            TurnState::Listening => {}
            TurnState::AwaitingReply => {
                // The utterance is dropped once the reply starts playing
                tracing::debug!("speech start while awaiting reply, ignored");
            }
            state => {
                tracing::debug!(state = %state, "speech start ignored");
            }
        }
    }

    fn on_speech_ended(&mut self, segment: &SpeechSegment) {
        if !self.is_connected() {
            tracing::debug!("speech end ignored while disconnected");
            return;
        }

        if !matches!(self.state, TurnState::Idle | TurnState::Listening) {
            tracing::debug!(state = %self.state, "speech end ignored, turn in flight");
            return;
        }

        self.state = TurnState::Sending;

        let container = audio::encode(segment);
        tracing::debug!(
            samples = segment.len(),
            bytes = container.len(),
            "sending utterance"
        );

        self.state = if self.channel.send(Envelope::with_container(&container)) {
            TurnState::AwaitingReply
        } else {
            tracing::warn!("utterance dropped, channel not accepting sends");
            TurnState::Idle
        };
    }

    fn on_message(&mut self, envelope: &Envelope) {
        if self.state != TurnState::AwaitingReply {
            tracing::debug!(state = %self.state, "inbound envelope outside a turn, dropped");
            return;
        }

        let container = match envelope.container() {
            Ok(Some(container)) => container,
            Ok(None) => {
                tracing::debug!("reply without audio");
                self.state = TurnState::Idle;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reply audio unreadable");
                self.state = TurnState::Idle;
                return;
            }
        };

        match self.playback.play(&container) {
            Ok(handle) => {
                tracing::debug!(handle = %handle, "playing reply");
                self.state = TurnState::Playing;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reply playback failed");
                self.state = TurnState::Idle;
            }
        }
    }

    fn on_playback_completed(&mut self, handle: PlaybackHandle) {
        if !self.playback.complete(handle) {
            tracing::debug!(handle = %handle, "stale completion ignored");
            return;
        }

        if self.state == TurnState::Playing {
            self.state = TurnState::Idle;
        }
    }
}
