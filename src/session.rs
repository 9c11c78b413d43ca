//! Client session loop
//!
//! Wires the microphone, speech detector, channel and speaker into one
//! [`TurnStateMachine`] driven from a single task. cpal streams are not
//! `Send`, so the session runs on the caller's task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Result;
use crate::channel::{ChannelClient, EnvelopeSink};
use crate::config::ClientConfig;
use crate::playback::{AudioSink, PlaybackController};
use crate::turn::{TurnEvent, TurnStateMachine};
use crate::voice::{AudioCapture, DetectorEvent, SpeakerSink, SpeechDetector};

/// How often captured audio is handed to the detector
const CAPTURE_TICK: Duration = Duration::from_millis(100);

/// Captured audio feeding the detector
pub trait SampleSource {
    /// Begin capturing
    ///
    /// # Errors
    ///
    /// Returns error if the input cannot start
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    /// Samples at [`crate::SAMPLE_RATE`] captured since the last call
    ///
    /// # Errors
    ///
    /// Returns error if the captured chunk cannot be converted
    fn take_samples(&mut self) -> Result<Vec<f32>>;
}

impl SampleSource for AudioCapture {
    fn start(&mut self) -> Result<()> {
        Self::start(self)
    }

    fn stop(&mut self) {
        Self::stop(self);
    }

    fn take_samples(&mut self) -> Result<Vec<f32>> {
        self.take_buffer()
    }
}

/// One client conversation with a relay
pub struct Session<A = AudioCapture, S = SpeakerSink> {
    url: String,
    reconnect: Option<Duration>,
    capture: A,
    detector: SpeechDetector,
    machine: TurnStateMachine<ChannelClient, S>,
    events: mpsc::UnboundedReceiver<TurnEvent>,
}

impl Session {
    /// Open the default audio devices and build the session
    ///
    /// # Errors
    ///
    /// Returns error if an audio device cannot be opened
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let capture = AudioCapture::new()?;
        let speaker = SpeakerSink::new()?;
        Ok(Self::with_devices(config, capture, speaker))
    }
}

impl<A: SampleSource, S: AudioSink> Session<A, S> {
    /// Build a session over the given input and output
    pub fn with_devices(config: &ClientConfig, capture: A, speaker: S) -> Self {
        let (tx, events) = mpsc::unbounded_channel();

        let channel = ChannelClient::new(tx.clone());
        let playback = PlaybackController::new(speaker, tx);
        let machine = TurnStateMachine::new(channel, playback, config.barge_in);

        Self {
            url: config.url.clone(),
            reconnect: config.reconnect,
            capture,
            detector: SpeechDetector::new(config.detector),
            machine,
            events,
        }
    }

    /// Run until `shutdown` resolves or the channel closes for good
    ///
    /// With a reconnect delay configured, a refused first connect is retried
    /// like any later disconnect.
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot start, or if the first connect
    /// fails and reconnect is off
    #[allow(clippy::future_not_send)]
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self {
            url,
            reconnect,
            mut capture,
            mut detector,
            mut machine,
            mut events,
        } = self;

        capture.start()?;
        if let Err(e) = machine.channel_mut().connect(&url).await {
            if reconnect.is_none() {
                capture.stop();
                return Err(e);
            }
            // The queued ConnectionClosed drives the retry
            tracing::warn!(error = %e, "connect failed, retrying");
        }

        tracing::info!(
            url = %url,
            barge_in = machine.barge_in(),
            "session started"
        );

        let mut tick = tokio::time::interval(CAPTURE_TICK);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let closed = event == TurnEvent::ConnectionClosed;
                    machine.handle(event);

                    if closed {
                        let Some(delay) = reconnect else {
                            tracing::info!("channel closed, ending session");
                            break;
                        };

                        tokio::time::sleep(delay).await;
                        if let Err(e) = machine.channel_mut().connect(&url).await {
                            tracing::warn!(error = %e, "reconnect failed");
                        }
                    }
                }
                _ = tick.tick() => {
                    process_capture(&mut capture, &mut detector, &mut machine);
                }
            }
        }

        capture.stop();
        machine.channel_mut().close().await;
        tracing::info!("session ended");
        Ok(())
    }
}

/// Feed captured audio to the detector while detection is enabled
///
/// Audio captured while detection is off is discarded and the detector is
/// reset, so no partial utterance survives a disconnect or a played reply.
pub fn process_capture<A, C, S>(
    capture: &mut A,
    detector: &mut SpeechDetector,
    machine: &mut TurnStateMachine<C, S>,
) where
    A: SampleSource,
    C: EnvelopeSink,
    S: AudioSink,
{
    let samples = match capture.take_samples() {
        Ok(samples) => samples,
        Err(e) => {
            tracing::warn!(error = %e, "capture resample failed, chunk dropped");
            return;
        }
    };

    if !machine.detection_enabled() {
        detector.reset();
        return;
    }

    match detector.process(&samples) {
        Some(DetectorEvent::SpeechStart) => {
            machine.handle(TurnEvent::SpeechStarted);
        }
        Some(DetectorEvent::SpeechEnd(segment)) => {
            machine.handle(TurnEvent::SpeechEnded(segment));
        }
        None => {}
    }
}
