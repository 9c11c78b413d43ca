//! Energy-based speech detector
//!
//! Turns a stream of microphone chunks into speech-start / speech-end events.
//! A chunk counts as voiced when its RMS energy is above the threshold.

use std::time::Duration;

use crate::audio::{SAMPLE_RATE, SpeechSegment};

/// Detector tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// RMS energy above which a chunk is voiced
    pub energy_threshold: f32,
    /// Voiced audio required before speech-start is reported
    pub min_speech: Duration,
    /// Silence that ends an utterance
    pub trailing_silence: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech: Duration::from_millis(300),
            trailing_silence: Duration::from_millis(500),
        }
    }
}

/// Detector output
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    SpeechStart,
    SpeechEnd(SpeechSegment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Voiced audio seen, not yet long enough to report
    Pending,
    /// Speech-start reported, waiting for trailing silence
    Speaking,
}

/// Segments speech out of a continuous 16kHz mono stream
pub struct SpeechDetector {
    energy_threshold: f32,
    min_speech_samples: usize,
    silence_samples: usize,
    state: DetectorState,
    buffer: Vec<f32>,
    voiced: usize,
    silence: usize,
}

impl SpeechDetector {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        tracing::debug!(
            threshold = config.energy_threshold,
            min_speech_ms = config.min_speech.as_millis(),
            silence_ms = config.trailing_silence.as_millis(),
            "speech detector initialized"
        );

        Self {
            energy_threshold: config.energy_threshold,
            min_speech_samples: samples_for(config.min_speech),
            silence_samples: samples_for(config.trailing_silence),
            state: DetectorState::Idle,
            buffer: Vec::new(),
            voiced: 0,
            silence: 0,
        }
    }

    /// Feed one chunk of samples
    ///
    /// At most one event is produced per chunk. Every `SpeechStart` is
    /// eventually followed by a `SpeechEnd` once enough silence arrives.
    pub fn process(&mut self, samples: &[f32]) -> Option<DetectorEvent> {
        if samples.is_empty() {
            return None;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.energy_threshold;

        if self.state == DetectorState::Idle {
            if !is_speech {
                return None;
            }
            self.state = DetectorState::Pending;
            self.buffer.clear();
            self.voiced = 0;
            self.silence = 0;
            tracing::trace!(energy, "voiced audio, pending");
        }

        self.buffer.extend_from_slice(samples);
        if is_speech {
            self.voiced = self.voiced.saturating_add(samples.len());
            self.silence = 0;
        } else {
            self.silence = self.silence.saturating_add(samples.len());
        }

        match self.state {
            DetectorState::Pending => {
                if self.voiced >= self.min_speech_samples {
                    self.state = DetectorState::Speaking;
                    tracing::debug!(voiced = self.voiced, "speech start");
                    return Some(DetectorEvent::SpeechStart);
                }

                // Too much silence without enough speech
                if self.silence > self.silence_samples.saturating_mul(2) {
                    tracing::trace!("pending speech timed out");
                    self.reset();
                }
                None
            }
            DetectorState::Speaking => {
                if self.silence < self.silence_samples {
                    return None;
                }

                let segment = SpeechSegment::new(std::mem::take(&mut self.buffer));
                tracing::debug!(samples = segment.len(), "speech end");
                self.reset();
                Some(DetectorEvent::SpeechEnd(segment))
            }
            DetectorState::Idle => None,
        }
    }

    /// Drop any partial utterance
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.buffer.clear();
        self.voiced = 0;
        self.silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

impl Default for SpeechDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

fn samples_for(duration: Duration) -> usize {
    let samples = duration.as_millis() * u128::from(SAMPLE_RATE) / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX)
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 100ms at 16kHz
    const CHUNK: usize = 1600;

    fn loud() -> Vec<f32> {
        vec![0.5; CHUNK]
    }

    fn quiet() -> Vec<f32> {
        vec![0.0; CHUNK]
    }

    #[test]
    fn energy_calculation() {
        assert!(calculate_energy(&[0.0; 100]) < 0.001);
        assert!(calculate_energy(&[0.5; 100]) > 0.4);
        assert!(calculate_energy(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn silence_produces_nothing() {
        let mut detector = SpeechDetector::default();
        for _ in 0..20 {
            assert_eq!(detector.process(&quiet()), None);
        }
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn utterance_start_then_end() {
        let mut detector = SpeechDetector::default();

        assert_eq!(detector.process(&loud()), None);
        assert_eq!(detector.process(&loud()), None);
        assert_eq!(detector.process(&loud()), Some(DetectorEvent::SpeechStart));
        assert_eq!(detector.state(), DetectorState::Speaking);

        for _ in 0..4 {
            assert_eq!(detector.process(&quiet()), None);
        }

        let Some(DetectorEvent::SpeechEnd(segment)) = detector.process(&quiet()) else {
            panic!("expected speech end");
        };
        // Pre-roll before the start event is kept
        assert_eq!(segment.len(), 8 * CHUNK);
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn short_blip_resets_silently() {
        let mut detector = SpeechDetector::default();

        assert_eq!(detector.process(&loud()), None);
        assert_eq!(detector.state(), DetectorState::Pending);

        for _ in 0..11 {
            assert_eq!(detector.process(&quiet()), None);
        }
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn huge_silence_window_does_not_overflow() {
        let mut detector = SpeechDetector::new(DetectorConfig {
            trailing_silence: Duration::MAX,
            ..DetectorConfig::default()
        });

        assert_eq!(detector.process(&loud()), None);
        for _ in 0..20 {
            assert_eq!(detector.process(&quiet()), None);
        }
        assert_eq!(detector.state(), DetectorState::Pending);
    }

    #[test]
    fn reset_discards_partial_utterance() {
        let mut detector = SpeechDetector::default();
        for _ in 0..3 {
            detector.process(&loud());
        }
        detector.reset();

        for _ in 0..10 {
            assert_eq!(detector.process(&quiet()), None);
        }
    }
}
