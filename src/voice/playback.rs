//! Audio playback to speakers

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::audio::{self, DecodedAudio, SAMPLE_RATE};
use crate::playback::{AudioSink, CompletionNotifier};
use crate::{Error, Result};

/// [`AudioSink`] backed by the default output device
///
/// Each clip gets its own output stream. Dropping the stream is how a clip
/// is stopped, so a stopped clip never reports completion. A drained clip's
/// stream keeps running on silence until the next `start` or `stop`, so the
/// device buffer holding its last frames is never cut short.
pub struct SpeakerSink {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl SpeakerSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        };

        let native = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports_rate(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports_rate(c, 2))
            });

        let config = match native {
            Some(supported) => supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config(),
            None => device
                .default_output_config()
                .map_err(|e| Error::Audio(e.to_string()))?
                .config(),
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl AudioSink for SpeakerSink {
    fn start(&mut self, audio: DecodedAudio, notifier: CompletionNotifier) -> Result<()> {
        self.stop();

        let device_rate = self.config.sample_rate.0;
        let samples = audio::resample(&audio.samples, audio.sample_rate, device_rate)?;
        let channels = usize::from(self.config.channels.max(1));
        let sample_count = samples.len();

        let mut position = 0usize;
        let mut notifier = Some(notifier);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(position).copied().unwrap_or(0.0);
                        frame.fill(sample);

                        if position < samples.len() {
                            position += 1;
                        }
                    }

                    // Last frames are queued on the device; report once
                    if position >= samples.len()
                        && let Some(notifier) = notifier.take()
                    {
                        notifier.notify();
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(samples = sample_count, device_rate, "speaker playback started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("speaker playback stopped");
        }
    }
}
