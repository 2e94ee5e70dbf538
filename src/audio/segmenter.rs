//! Waveform segmentation for the sinc front-end.
//!
//! Turns one variable-length waveform into fixed-duration, denoised,
//! normalized segments:
//! 1. a magnitude gate drops samples below a fraction of the peak amplitude
//! 2. the gated waveform is cut into `round(wavetime * sample_rate)`-sample
//!    chunks; the trailing partial chunk is discarded, never padded
//! 3. each chunk is normalized to zero mean and unit variance

use tracing::warn;

use crate::audio::AudioSample;
use crate::config::SincNetConfig;
use crate::error::{Error, Result};

/// A fixed-length, zero-mean, unit-variance slice of a waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    samples: Vec<f32>,
}

impl Segment {
    /// Normalize one chunk to zero mean and unit variance.
    ///
    /// A zero-variance chunk has no defined normalization and is rejected
    /// with [`Error::DegenerateSegment`] instead of producing NaN.
    pub fn normalized(chunk: &[f32]) -> Result<Self> {
        let n = chunk.len() as f32;
        let mean = chunk.iter().sum::<f32>() / n;
        let variance = chunk.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
        if variance == 0.0 {
            return Err(Error::DegenerateSegment);
        }
        let std = variance.sqrt();
        Ok(Self {
            samples: chunk.iter().map(|s| (s - mean) / std).collect(),
        })
    }

    /// The normalized amplitudes.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Segment length in samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the segment holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Slices raw waveforms into classifier-ready segments.
#[derive(Debug, Clone)]
pub struct Segmenter {
    wavetime: f32,
    threshold: f32,
}

impl Segmenter {
    /// Build a segmenter from the pipeline configuration.
    pub fn new(config: &SincNetConfig) -> Self {
        Self {
            wavetime: config.wavetime,
            threshold: config.denoise_threshold,
        }
    }

    /// Produce the ordered segments of one waveform.
    ///
    /// Returns an empty vector when the denoised waveform is not longer
    /// than one segment. Zero-variance chunks are skipped with a warning;
    /// they are data defects, not configuration errors.
    pub fn segment(&self, audio: &AudioSample) -> Result<Vec<Segment>> {
        if audio.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(audio.sample_rate));
        }

        let denoised = self.denoise(&audio.samples);
        let n = (self.wavetime * audio.sample_rate as f32).round() as usize;

        let mut segments = Vec::new();
        if n == 0 || denoised.len() <= n {
            return Ok(segments);
        }

        // The split yields floor(len / N) full chunks plus a partial tail;
        // the tail is dropped unconditionally.
        for chunk in denoised.chunks_exact(n) {
            match Segment::normalized(chunk) {
                Ok(segment) => segments.push(segment),
                Err(Error::DegenerateSegment) => {
                    warn!("skipping zero-variance segment");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(segments)
    }

    /// Magnitude gate: keep samples with `|x| >= threshold * max(|x|)`.
    ///
    /// This deletes samples outright and therefore changes temporal
    /// spacing; callers accept that as a property of the gate.
    fn denoise(&self, samples: &[f32]) -> Vec<f32> {
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let gate = self.threshold * peak;
        samples.iter().copied().filter(|s| s.abs() >= gate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(&SincNetConfig::default())
    }

    /// A waveform loud enough that the denoise gate keeps every sample.
    fn loud_waveform(len: usize, sample_rate: u32) -> AudioSample {
        let samples = (0..len)
            .map(|i| 0.5 + 0.4 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioSample::new(samples, sample_rate)
    }

    #[test]
    fn test_segment_count_and_length() {
        let audio = loud_waveform(48_000, 16_000);
        let segments = segmenter().segment(&audio).unwrap();
        // N = 3200, 48000 / 3200 = 15 full segments, nothing left over
        assert_eq!(segments.len(), 15);
        for segment in &segments {
            assert_eq!(segment.len(), 3200);
        }
    }

    #[test]
    fn test_partial_tail_discarded() {
        let audio = loud_waveform(48_800, 16_000);
        let segments = segmenter().segment(&audio).unwrap();
        // the 800-sample remainder is dropped
        assert_eq!(segments.len(), 15);
    }

    #[test]
    fn test_segments_are_normalized() {
        let audio = loud_waveform(16_000, 16_000);
        let segments = segmenter().segment(&audio).unwrap();
        for segment in &segments {
            let n = segment.len() as f32;
            let mean = segment.samples().iter().sum::<f32>() / n;
            let var = segment
                .samples()
                .iter()
                .map(|s| (s - mean) * (s - mean))
                .sum::<f32>()
                / n;
            assert!(mean.abs() < 1e-4, "mean {mean} not ~0");
            assert!((var - 1.0).abs() < 1e-3, "variance {var} not ~1");
        }
    }

    #[test]
    fn test_short_waveform_yields_nothing() {
        let audio = loud_waveform(3200, 16_000);
        assert!(segmenter().segment(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_denoise_can_empty_a_waveform() {
        // one loud click followed by near-silence: the gate removes the
        // quiet samples and what remains is shorter than a segment
        let mut samples = vec![1.0f32];
        samples.extend(std::iter::repeat(1e-5).take(40_000));
        let audio = AudioSample::new(samples, 16_000);
        assert!(segmenter().segment(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_constant_chunk_is_degenerate() {
        let err = Segment::normalized(&[0.5f32; 3200]).unwrap_err();
        assert!(matches!(err, Error::DegenerateSegment));
    }

    #[test]
    fn test_constant_waveform_skipped_not_nan() {
        let audio = AudioSample::new(vec![0.7f32; 10_000], 16_000);
        // every chunk is zero-variance: all skipped, none produce NaN
        assert!(segmenter().segment(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let audio = AudioSample::new(vec![0.0; 100], 0);
        assert!(matches!(
            segmenter().segment(&audio),
            Err(Error::InvalidSampleRate(0))
        ));
    }
}
