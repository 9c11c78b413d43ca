//! Playback ownership
//!
//! [`PlaybackController`] is the single owner of the active playback. Starting
//! a new clip stops the previous one first, and completions are checked
//! against the current handle so a late callback from a replaced clip cannot
//! end the turn.

use std::fmt;

use tokio::sync::mpsc;

use crate::audio::{self, AudioContainer, DecodedAudio};
use crate::turn::TurnEvent;
use crate::{Error, Result};

/// Identity of one started playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "playback-{}", self.0)
    }
}

/// Reports natural end of one playback back to the session queue
#[derive(Debug)]
pub struct CompletionNotifier {
    handle: PlaybackHandle,
    events: mpsc::UnboundedSender<TurnEvent>,
}

impl CompletionNotifier {
    #[must_use]
    pub const fn handle(&self) -> PlaybackHandle {
        self.handle
    }

    /// Queue [`TurnEvent::PlaybackCompleted`] for this handle
    pub fn notify(self) {
        if self
            .events
            .send(TurnEvent::PlaybackCompleted(self.handle))
            .is_err()
        {
            tracing::debug!(handle = %self.handle, "session gone, completion dropped");
        }
    }
}

/// Output backend for decoded audio
///
/// Implementations play one clip at a time and call
/// [`CompletionNotifier::notify`] when the clip drains on its own. A clip
/// ended by [`AudioSink::stop`] must not notify. A completed clip is not
/// stopped by the controller; `start` replaces whatever the sink still holds.
pub trait AudioSink {
    /// Start playing `audio`
    ///
    /// # Errors
    ///
    /// Returns error if the platform refuses to start playback
    fn start(&mut self, audio: DecodedAudio, notifier: CompletionNotifier) -> Result<()>;

    /// Stop the current clip, if any
    fn stop(&mut self);
}

/// Owns the single active playback for a session
pub struct PlaybackController<S> {
    sink: S,
    active: Option<PlaybackHandle>,
    next_id: u64,
    events: mpsc::UnboundedSender<TurnEvent>,
}

impl<S: AudioSink> PlaybackController<S> {
    /// Create a controller that reports completions to `events`
    pub const fn new(sink: S, events: mpsc::UnboundedSender<TurnEvent>) -> Self {
        Self {
            sink,
            active: None,
            next_id: 1,
            events,
        }
    }

    /// Decode and play a container, replacing any active playback
    ///
    /// If decoding fails nothing changes and the current playback keeps
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for an invalid container and
    /// [`Error::Playback`] if the sink refuses to start
    pub fn play(&mut self, container: &AudioContainer) -> Result<PlaybackHandle> {
        let audio = audio::decode(container)?;

        if let Some(previous) = self.cancel_active() {
            tracing::debug!(handle = %previous, "replacing active playback");
        }

        let handle = PlaybackHandle(self.next_id);
        self.next_id += 1;

        let notifier = CompletionNotifier {
            handle,
            events: self.events.clone(),
        };

        let duration = audio.duration();
        self.sink.start(audio, notifier).map_err(|e| match e {
            Error::Playback(_) => e,
            other => Error::Playback(other.to_string()),
        })?;

        self.active = Some(handle);
        tracing::debug!(handle = %handle, duration_ms = duration.as_millis(), "playback started");

        Ok(handle)
    }

    /// Stop `handle` if it is the active playback
    ///
    /// Returns `false` for a handle that already finished or was replaced.
    pub fn cancel(&mut self, handle: PlaybackHandle) -> bool {
        if self.active != Some(handle) {
            return false;
        }

        self.sink.stop();
        self.active = None;
        tracing::debug!(handle = %handle, "playback cancelled");
        true
    }

    /// Stop whatever is playing, returning the cancelled handle
    pub fn cancel_active(&mut self) -> Option<PlaybackHandle> {
        let handle = self.active?;
        self.cancel(handle);
        Some(handle)
    }

    /// Record natural completion of `handle`
    ///
    /// Returns `true` only if `handle` was still the active playback.
    pub fn complete(&mut self, handle: PlaybackHandle) -> bool {
        if self.active != Some(handle) {
            tracing::debug!(handle = %handle, "completion for inactive playback");
            return false;
        }

        // The sink may still be draining its last buffer; it is released by
        // the next start or stop
        self.active = None;
        true
    }

    #[must_use]
    pub const fn active(&self) -> Option<PlaybackHandle> {
        self.active
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}
