//! Voice device I/O
//!
//! Handles microphone capture, speech detection, and speaker playback.

mod capture;
mod detector;
mod playback;

pub use capture::AudioCapture;
pub use detector::{DetectorConfig, DetectorEvent, DetectorState, SpeechDetector, calculate_energy};
pub use playback::SpeakerSink;
