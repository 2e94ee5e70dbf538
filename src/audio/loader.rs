//! Audio file loading

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::resample;
use crate::error::{Error, Result};

/// A decoded mono waveform.
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// Amplitudes in `[-1, 1]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Dense speaker id, absent in inference mode.
    pub label: Option<u32>,
}

impl AudioSample {
    /// Wrap a raw waveform without a label.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            label: None,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Audio loader for the formats the dataset tree contains.
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file as mono f32 at `target_sr`.
    pub fn load<P: AsRef<Path>>(path: P, target_sr: u32) -> Result<AudioSample> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let (samples, sample_rate) = match ext.as_deref() {
            Some("wav") => Self::load_wav(path)?,
            Some("flac") => Self::load_flac(path)?,
            _ => {
                return Err(Error::UnsupportedAudio {
                    path: path.to_path_buf(),
                    reason: "unknown extension".to_string(),
                })
            }
        };

        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }

        if sample_rate != target_sr {
            let resampled = resample(&samples, sample_rate, target_sr)?;
            Ok(AudioSample::new(resampled, target_sr))
        } else {
            Ok(AudioSample::new(samples, sample_rate))
        }
    }

    fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let sample_rate = spec.sample_rate;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .filter_map(std::result::Result::ok)
                .collect(),
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .filter_map(std::result::Result::ok)
                    .map(|s| s as f32 / max_value)
                    .collect()
            }
        };

        Ok((downmix(samples, spec.channels as usize), sample_rate))
    }

    fn load_flac(path: &Path) -> Result<(Vec<f32>, u32)> {
        let src = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("flac");

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::UnsupportedAudio {
                path: path.to_path_buf(),
                reason: "no decodable audio track".to_string(),
            })?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(1)
            .max(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let mut interleaved = Vec::new();
        while let Ok(packet) = format.next_packet() {
            if packet.track_id() != track_id {
                continue;
            }
            let decoded = decoder.decode(&packet)?;
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }

        Ok((downmix(interleaved, channels), sample_rate))
    }
}

/// Average interleaved channels down to mono.
fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
