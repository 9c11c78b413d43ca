//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use voice_turn::audio::SAMPLE_RATE;
use voice_turn::{
    AudioSink, CompletionNotifier, ConnectionState, DecodedAudio, Envelope, EnvelopeSink, Error,
    PlaybackController, TurnEvent, TurnStateMachine,
};

/// Generate sine wave audio samples
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Mock channel that records outbound envelopes
#[derive(Clone)]
pub struct MockChannel {
    state: Arc<Mutex<ConnectionState>>,
    accepting: Arc<Mutex<bool>>,
    sent: Arc<Mutex<Vec<Envelope>>>,
}

impl MockChannel {
    pub fn connected() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectionState::Connected)),
            accepting: Arc::new(Mutex::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Make `send` report a dropped envelope while staying connected
    pub fn set_accepting(&self, accepting: bool) {
        *self.accepting.lock().unwrap() = accepting;
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }
}

impl EnvelopeSink for MockChannel {
    fn send(&self, envelope: Envelope) -> bool {
        if *self.state.lock().unwrap() != ConnectionState::Connected
            || !*self.accepting.lock().unwrap()
        {
            return false;
        }
        self.sent.lock().unwrap().push(envelope);
        true
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }
}

/// What the mock sink was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Start { samples: usize, sample_rate: u32 },
    Stop,
}

/// Mock audio sink that records calls and holds completion notifiers
#[derive(Clone, Default)]
pub struct MockSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    notifiers: Arc<Mutex<Vec<CompletionNotifier>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every `start` with a playback fault
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Largest number of clips that were playing at the same time
    pub fn max_concurrent(&self) -> usize {
        let mut playing = 0usize;
        let mut max = 0usize;
        for call in self.calls() {
            match call {
                SinkCall::Start { .. } => playing += 1,
                SinkCall::Stop => playing = playing.saturating_sub(1),
            }
            max = max.max(playing);
        }
        max
    }

    /// Fire the completion of the `index`th started clip
    pub fn finish(&self, index: usize) {
        let notifier = self.notifiers.lock().unwrap().remove(index);
        notifier.notify();
    }

    /// Fire the completion of the most recently started clip
    pub fn finish_latest(&self) {
        let notifier = self.notifiers.lock().unwrap().pop().unwrap();
        notifier.notify();
    }
}

impl AudioSink for MockSink {
    fn start(&mut self, audio: DecodedAudio, notifier: CompletionNotifier) -> voice_turn::Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(Error::Playback("device refused".to_string()));
        }

        self.calls.lock().unwrap().push(SinkCall::Start {
            samples: audio.samples.len(),
            sample_rate: audio.sample_rate,
        });
        self.notifiers.lock().unwrap().push(notifier);
        Ok(())
    }

    fn stop(&mut self) {
        // Stop with nothing playing is not recorded
        let calls = self.calls.lock().unwrap();
        let started = calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Start { .. }))
            .count();
        let stopped = calls.iter().filter(|c| **c == SinkCall::Stop).count();
        drop(calls);

        if started > stopped {
            self.calls.lock().unwrap().push(SinkCall::Stop);
        }
    }
}

/// Machine wired to mocks, plus handles to inspect them
pub struct Harness {
    pub machine: TurnStateMachine<MockChannel, MockSink>,
    pub channel: MockChannel,
    pub sink: MockSink,
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
}

impl Harness {
    pub fn new(barge_in: bool) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let channel = MockChannel::connected();
        let sink = MockSink::new();
        let playback = PlaybackController::new(sink.clone(), tx);
        let machine = TurnStateMachine::new(channel.clone(), playback, barge_in);

        Self {
            machine,
            channel,
            sink,
            events,
        }
    }

    /// Feed every queued event (completions) to the machine
    pub fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.machine.handle(event);
        }
    }
}

/// Wait for the next event on a session queue
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<TurnEvent>) -> TurnEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event queue closed")
}
