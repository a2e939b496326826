// Station response metadata
// One ChannelResponse per channel epoch: an ordered cascade of response
// stages plus the channel coordinates, read from a JSON metadata file

use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse station metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One link of the cascaded instrument response. Ordering is significant:
/// the signal flows stage 1 -> stage N.
///
/// Poles, zeros and the normalization factor are genuinely optional:
/// digitizer and FIR stages carry a gain but no pole-zero description.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseStage {
    pub stage_gain: f64,

    #[serde(default)]
    pub normalization_factor: Option<f64>,

    #[serde(default)]
    pub poles: Option<Vec<Complex64>>,

    #[serde(default)]
    pub zeros: Option<Vec<Complex64>>,

    pub input_units: String,
    pub output_units: String,

    #[serde(default)]
    pub decimation_input_sample_rate: Option<f64>,

    #[serde(default)]
    pub decimation_factor: Option<u32>,
}

impl ResponseStage {
    /// True when the stage carries an analog pole-zero description.
    pub fn has_paz(&self) -> bool {
        self.poles.is_some() && self.zeros.is_some()
    }
}

/// Full response description of one channel epoch.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelResponse {
    /// Fully-qualified channel name, `NET.STA.LOC.CHA`
    pub channel: String,

    pub latitude: f64,
    pub longitude: f64,

    /// Start of the epoch this response is valid for
    pub epoch_start: DateTime<Utc>,

    pub stages: Vec<ResponseStage>,
}

impl ChannelResponse {
    /// Output sampling rate of the channel, derived from the last stage
    /// that carries both decimation fields (scanning stage N -> stage 1).
    pub fn sampling_rate(&self) -> Option<f64> {
        self.stages.iter().rev().find_map(|s| {
            match (s.decimation_input_sample_rate, s.decimation_factor) {
                (Some(rate), Some(factor)) if factor > 0 => Some(rate / factor as f64),
                _ => None,
            }
        })
    }
}

/// Read a list of channel responses from a JSON metadata file.
pub fn read_channel_responses(path: &Path) -> Result<Vec<ChannelResponse>, MetadataError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
