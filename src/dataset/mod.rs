//! Speaker dataset construction
//!
//! Consumes a directory tree with one subdirectory per speaker
//! (`root/<speaker>/<utterance>.flac`), producing batches of fixed-length
//! normalized segments and dense speaker ids. The label table is built
//! from the full tree before any file is decoded; segmentation of
//! independent files then runs in parallel against the read-only table.

mod labels;

pub use labels::LabelEncoder;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use candle_core::{Device, Tensor};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::audio::{AudioLoader, Segment, Segmenter};
use crate::config::SincNetConfig;
use crate::error::{Error, Result};

/// Closed set of dataset splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Training partition.
    Train,
    /// Validation partition.
    Val,
    /// Held-out test partition.
    Test,
}

impl FromStr for SplitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Segments and labels of one dataset split.
pub struct SpeakerDataset {
    segments: Vec<Segment>,
    label_ids: Vec<u32>,
    segment_len: usize,
}

impl SpeakerDataset {
    /// Build one split of the dataset under `root`.
    ///
    /// `encoder` must have been built from the full tree (see
    /// [`scan_labels`]); it is only read here. Files that fail to decode or
    /// yield no usable segments are skipped with a warning.
    pub fn build(
        root: &Path,
        mode: SplitMode,
        config: &SincNetConfig,
        encoder: &LabelEncoder,
    ) -> Result<Self> {
        config.validate()?;
        let segmenter = Segmenter::new(config);

        let mut work: Vec<(PathBuf, u32)> = Vec::new();
        for label in encoder.labels() {
            let id = match encoder.encode(label) {
                Some(id) => id,
                None => continue,
            };
            let files = audio_files(&root.join(label))?;
            for file in split_slice(&files, mode) {
                work.push((file.clone(), id));
            }
        }

        let per_file: Vec<(Vec<Segment>, u32)> = work
            .par_iter()
            .filter_map(|(path, id)| {
                match segments_for_file(path, Some(*id), config, &segmenter) {
                    Ok(segments) => Some((segments, *id)),
                    Err(e) => {
                        warn!("skipping {}: {e}", path.display());
                        None
                    }
                }
            })
            .collect();

        let mut segments = Vec::new();
        let mut label_ids = Vec::new();
        for (file_segments, id) in per_file {
            label_ids.extend(std::iter::repeat(id).take(file_segments.len()));
            segments.extend(file_segments);
        }

        debug!(
            "{mode} split: {} segments from {} files",
            segments.len(),
            work.len()
        );

        Ok(Self {
            segments,
            label_ids,
            segment_len: config.segment_len(),
        })
    }

    /// Number of segments in the split.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the split holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment length in samples.
    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    /// Assemble the segments at `indices` into a `(B, 1, N)` waveform
    /// tensor and a `(B,)` label tensor.
    pub fn batch(&self, indices: &[usize], device: &Device) -> Result<(Tensor, Tensor)> {
        if indices.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let segments = batch_tensor(indices.iter().map(|&i| &self.segments[i]), device)?;
        let labels: Vec<u32> = indices.iter().map(|&i| self.label_ids[i]).collect();
        let labels = Tensor::from_vec(labels, indices.len(), device)?;
        Ok((segments, labels))
    }
}

/// Stack segments into a `(B, 1, N)` f32 tensor.
pub fn batch_tensor<'a, I>(segments: I, device: &Device) -> Result<Tensor>
where
    I: IntoIterator<Item = &'a Segment>,
{
    let segments: Vec<&Segment> = segments.into_iter().collect();
    let first = segments.first().ok_or(Error::EmptyDataset)?.len();
    let mut flat = Vec::with_capacity(segments.len() * first);
    for segment in &segments {
        flat.extend_from_slice(segment.samples());
    }
    Tensor::from_vec(flat, (segments.len(), 1, first), device).map_err(Into::into)
}

/// Segment one file, treating an empty result as an error the caller can
/// log and skip.
pub fn segments_for_file(
    path: &Path,
    label: Option<u32>,
    config: &SincNetConfig,
    segmenter: &Segmenter,
) -> Result<Vec<Segment>> {
    let mut audio = AudioLoader::load(path, config.sample_rate)?;
    audio.label = label;
    let segments = segmenter.segment(&audio)?;
    if segments.is_empty() {
        return Err(Error::EmptySegmentSet(path.to_path_buf()));
    }
    Ok(segments)
}

/// Build the label table from every speaker subdirectory under `root`.
///
/// Must complete before dataset workers start; the table is never mutated
/// afterwards.
pub fn scan_labels(root: &Path) -> Result<LabelEncoder> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(LabelEncoder::from_labels(names))
}

/// Sorted audio files directly under one speaker directory.
fn audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("flac") | Some("wav")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Deterministic per-speaker 80/10/10 split by sorted file index.
fn split_slice(files: &[PathBuf], mode: SplitMode) -> &[PathBuf] {
    let n = files.len();
    let val_start = n * 8 / 10;
    let test_start = n * 9 / 10;
    match mode {
        SplitMode::Train => &files[..val_start],
        SplitMode::Val => &files[val_start..test_start],
        SplitMode::Test => &files[test_start..],
    }
}
