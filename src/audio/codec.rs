//! PCM WAV container codec
//!
//! The container layout is a wire contract shared with browser peers, so the
//! header is written field by field rather than by a general WAV writer:
//!
//! ```text
//! RIFF <36 + data> WAVE | fmt  <16> PCM mono <rate> <rate*2> <2> <16> | data <2*n> <samples>
//! ```

use std::io::Cursor;

use bytes::{BufMut, BytesMut};

use super::{AudioContainer, DecodedAudio, SAMPLE_RATE, SpeechSegment};
use crate::{Error, Result};

/// Size of the fixed header preceding the payload
pub const HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const PCM_FORMAT: u16 = 1;
const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;
#[allow(clippy::cast_lossless)]
const BYTE_RATE: u32 = SAMPLE_RATE * BLOCK_ALIGN as u32;

/// Encode a speech segment as a 16-bit PCM mono WAV container
///
/// Never fails: an empty segment yields a header-only container.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode(segment: &SpeechSegment) -> AudioContainer {
    let samples = segment.samples();
    let data_len = (samples.len() * usize::from(BLOCK_ALIGN)) as u32;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + data_len as usize);
    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");
    buf.put_slice(b"fmt ");
    buf.put_u32_le(FMT_CHUNK_LEN);
    buf.put_u16_le(PCM_FORMAT);
    buf.put_u16_le(CHANNELS);
    buf.put_u32_le(SAMPLE_RATE);
    buf.put_u32_le(BYTE_RATE);
    buf.put_u16_le(BLOCK_ALIGN);
    buf.put_u16_le(BITS_PER_SAMPLE);
    buf.put_slice(b"data");
    buf.put_u32_le(data_len);

    for &sample in samples {
        buf.put_i16_le(quantize(sample));
    }

    AudioContainer::from_bytes(buf.freeze())
}

/// Decode a container back into normalized samples
///
/// # Errors
///
/// Returns [`Error::Decode`] if the header is malformed, the declared sizes
/// disagree with the payload, or the format is not 16-bit PCM mono
pub fn decode(container: &AudioContainer) -> Result<DecodedAudio> {
    let bytes = container.as_bytes();

    if bytes.len() < HEADER_LEN {
        return Err(Error::Decode(format!(
            "container is {} bytes, header needs {HEADER_LEN}",
            bytes.len()
        )));
    }

    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[36..40] != b"data" {
        return Err(Error::Decode("missing RIFF/WAVE/data tags".to_string()));
    }

    let chunk_size = read_u32_le(bytes, 4) as usize;
    if chunk_size != bytes.len() - 8 {
        return Err(Error::Decode(format!(
            "chunk size {chunk_size} does not match {} container bytes",
            bytes.len()
        )));
    }

    let data_size = read_u32_le(bytes, 40) as usize;
    if data_size != bytes.len() - HEADER_LEN {
        return Err(Error::Decode(format!(
            "data size {data_size} does not match {} payload bytes",
            bytes.len() - HEADER_LEN
        )));
    }

    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Decode(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int
        || spec.bits_per_sample != BITS_PER_SAMPLE
        || spec.channels != CHANNELS
    {
        return Err(Error::Decode(format!(
            "unsupported format: {} channel(s), {} bits, {:?}",
            spec.channels, spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.map(dequantize))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| Error::Decode(e.to_string()))?;

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Clamp and scale asymmetrically: negatives by 32768, the rest by 32767
#[allow(clippy::cast_possible_truncation)]
fn quantize(sample: f32) -> i16 {
    let s = if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    };

    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn dequantize(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / 32768.0
    } else {
        f32::from(sample) / 32767.0
    }
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_uses_asymmetric_scale() {
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(-1.0), -32768);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(-0.5), -16384);
    }

    #[test]
    fn quantize_clamps_and_zeroes_non_finite() {
        assert_eq!(quantize(2.5), 32767);
        assert_eq!(quantize(-7.0), -32768);
        assert_eq!(quantize(f32::NAN), 0);
        assert_eq!(quantize(f32::INFINITY), 0);
    }

    #[test]
    fn header_fields_match_layout() {
        let segment = SpeechSegment::new(vec![0.25; 10]);
        let container = encode(&segment);
        let bytes = container.as_bytes();

        assert_eq!(bytes.len(), HEADER_LEN + 20);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32_le(bytes, 4), 56);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u32_le(bytes, 16), 16);
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 1);
        assert_eq!(read_u32_le(bytes, 24), 16000);
        assert_eq!(read_u32_le(bytes, 28), 32000);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 2);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32_le(bytes, 40), 20);
    }

    #[test]
    fn empty_segment_is_header_only() {
        let container = encode(&SpeechSegment::new(Vec::new()));
        assert_eq!(container.len(), HEADER_LEN);

        let decoded = decode(&container).unwrap();
        assert!(decoded.samples.is_empty());
        assert_eq!(decoded.sample_rate, 16000);
    }

    #[test]
    fn decode_rejects_short_container() {
        let err = decode(&AudioContainer::from_bytes(vec![0u8; 12])).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let container = encode(&SpeechSegment::new(vec![0.1; 100]));
        let mut bytes = container.as_bytes().to_vec();
        bytes.truncate(bytes.len() - 10);

        let err = decode(&AudioContainer::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn decode_rejects_inconsistent_data_size() {
        let container = encode(&SpeechSegment::new(vec![0.1; 100]));
        let mut bytes = container.as_bytes().to_vec();
        // Keep the RIFF size honest, lie about the data chunk
        bytes[40..44].copy_from_slice(&150u32.to_le_bytes());

        let err = decode(&AudioContainer::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn decode_rejects_stereo() {
        let container = encode(&SpeechSegment::new(vec![0.1; 100]));
        let mut bytes = container.as_bytes().to_vec();
        bytes[22..24].copy_from_slice(&2u16.to_le_bytes());

        assert!(decode(&AudioContainer::from_bytes(bytes)).is_err());
    }
}
