//! Speaker label encoding
//!
//! Maps speaker names to dense integer ids. The table is built once from
//! the full label set before any segmentation worker starts and is
//! read-only afterwards; the mapping is persisted as a JSON key-value dump
//! next to the trained weights so predictions can be decoded later.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Bidirectional speaker-name / dense-id mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    labels: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, u32>,
}

impl LabelEncoder {
    /// Build an encoder from the complete label set, sorted and deduplicated
    /// so ids are stable across runs.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        let mut encoder = Self {
            labels,
            index: HashMap::new(),
        };
        encoder.rebuild_index();
        encoder
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .labels
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id as u32))
            .collect();
    }

    /// Dense id of a speaker name.
    pub fn encode(&self, label: &str) -> Option<u32> {
        self.index.get(label).copied()
    }

    /// Speaker name of a dense id.
    pub fn decode(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    /// All speaker names in id order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of distinct speakers.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no speakers are registered.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Write the mapping as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a mapping back from JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut encoder: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        encoder.rebuild_index();
        Ok(encoder)
    }
}
