//! Sample rate conversion for devices that cannot run at the container rate

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Resample mono audio using rubato
///
/// The final partial chunk is zero-padded and the output trimmed back to the
/// expected length, so short utterances are not dropped.
///
/// # Errors
///
/// Returns error if the resampler cannot be built for the requested rates
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round()
        as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    // rubato may round the chunk size to fit the rate ratio
    let chunk_size = resampler.input_frames_next();

    for chunk in samples.chunks(chunk_size) {
        let mut input: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        input.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    output.truncate(expected);
    Ok(output)
}

/// Resampler for a continuous stream delivered in arbitrary slices
///
/// Input that does not fill a whole chunk is carried over to the next call,
/// so filter state is continuous across capture ticks.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f64>>,
    pending: Vec<f64>,
}

impl StreamResampler {
    /// Create a resampler from `from_rate` to `to_rate`
    ///
    /// Matching rates pass samples through untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be built for the requested rates
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = if from_rate == to_rate {
            None
        } else {
            Some(
                FftFixedIn::<f64>::new(
                    from_rate as usize,
                    to_rate as usize,
                    CHUNK_SIZE,
                    SUB_CHUNKS,
                    1,
                )
                .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?,
            )
        };

        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Feed samples, returning whatever output is ready
    ///
    /// # Errors
    ///
    /// Returns error if rubato rejects a chunk
    #[allow(clippy::cast_possible_truncation)]
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend(samples.iter().map(|&s| f64::from(s)));

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let chunk: Vec<f64> = self.pending.drain(..needed).collect();
            let result = resampler
                .process(&[chunk], None)
                .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
            output.extend(result[0].iter().map(|&s| s as f32));
        }

        Ok(output)
    }

    /// Drop carried-over input
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn upsampling_scales_length() {
        let samples = vec![0.0f32; 16000];
        let out = resample(&samples, 16000, 48000).unwrap();
        // Filter delay may leave the tail short of the exact ratio
        assert!(out.len() <= 48000);
        assert!(out.len() > 44000);
    }

    #[test]
    fn stream_carries_partial_chunks() {
        let mut stream = StreamResampler::new(48000, 16000).unwrap();

        // Less than one chunk produces nothing yet
        assert!(stream.process(&[0.0; 500]).unwrap().is_empty());

        let mut total = 0;
        for _ in 0..10 {
            total += stream.process(&[0.0; 4800]).unwrap().len();
        }
        // 48500 input samples, at most one chunk still pending
        assert!(total <= 16167);
        assert!(total >= 16167 - 1024);
    }

    #[test]
    fn stream_passthrough_at_same_rate() {
        let mut stream = StreamResampler::new(16000, 16000).unwrap();
        assert_eq!(stream.process(&[0.25, 0.5]).unwrap(), vec![0.25, 0.5]);
    }
}
