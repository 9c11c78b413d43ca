//! Audio data model
//!
//! Speech arrives from the detector as normalized `f32` samples at
//! [`SAMPLE_RATE`], travels as an [`AudioContainer`] (PCM WAV bytes) and is
//! handed to playback as [`DecodedAudio`].

pub mod codec;
mod resample;

use std::time::Duration;

use bytes::Bytes;

pub use codec::{HEADER_LEN, decode, encode};
pub use resample::{StreamResampler, resample};

/// Sample rate for captured speech (16kHz mono)
pub const SAMPLE_RATE: u32 = 16000;

/// One detected utterance
#[derive(Debug, Clone, PartialEq)]
///
/// Segments are always at [`SAMPLE_RATE`].
pub struct SpeechSegment {
    samples: Vec<f32>,
}

impl SpeechSegment {
    /// Create a segment captured at [`SAMPLE_RATE`]
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Normalized samples in `-1.0..=1.0`
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the utterance
    #[must_use]
    pub fn duration(&self) -> Duration {
        duration_of(self.samples.len(), SAMPLE_RATE)
    }

    /// Sine tone at [`SAMPLE_RATE`], for device checks and wire inspection
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn tone(frequency: f32, duration: Duration, amplitude: f32) -> Self {
        let count = (duration.as_secs_f64() * f64::from(SAMPLE_RATE)).round() as usize;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * amplitude
            })
            .collect();
        Self::new(samples)
    }
}

/// Self-describing PCM WAV bytes, as carried on the wire
///
/// Containers built by [`encode`] always satisfy the header invariant. Bytes
/// received from a peer are only trusted after [`decode`] validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContainer(Bytes);

impl AudioContainer {
    /// Wrap raw bytes received from a peer
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Total size including the header
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of 16-bit samples in the payload
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.0.len().saturating_sub(HEADER_LEN) / 2
    }

    /// Payload length at the sample rate declared in the header
    ///
    /// Zero if the header is missing.
    #[must_use]
    pub fn duration(&self) -> Duration {
        let Some(rate) = self.0.get(24..28) else {
            return Duration::ZERO;
        };
        let rate = u32::from_le_bytes([rate[0], rate[1], rate[2], rate[3]]);
        duration_of(self.sample_count(), rate)
    }
}

/// Audio ready to hand to an output device
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Playback length
    #[must_use]
    pub fn duration(&self) -> Duration {
        duration_of(self.samples.len(), self.sample_rate)
    }
}

#[allow(clippy::cast_precision_loss)]
fn duration_of(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / f64::from(sample_rate))
}
