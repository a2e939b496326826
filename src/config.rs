// Processing configuration
// Serde-backed settings for one processing run, loadable from a JSON file

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use crate::process::resample::ResampleMethod;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for the per-trace processing pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Correction unit: "disp", "vel" or "acc" ("dis" accepted)
    pub corr_unit: String,

    /// Desired sampling rate in Hz; `None` skips resampling
    pub des_sampling_rate: Option<f64>,

    pub resample_method: ResampleMethod,

    /// Whether the instrument response is removed
    pub instrument_correction: bool,

    /// Pre-filter corner frequencies (f1, f2, f3, f4) in Hz
    pub pre_filt: Option<[f64; 4]>,

    /// Water level in dB for the spectral division
    pub water_level: f64,

    /// Output format, compared case-insensitively against "sac"
    pub waveform_format: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            corr_unit: "disp".to_string(),
            des_sampling_rate: None,
            resample_method: ResampleMethod::Lanczos,
            instrument_correction: true,
            pre_filt: Some([0.008, 0.012, 3.0, 4.0]),
            water_level: 600.0,
            waveform_format: "sac".to_string(),
        }
    }
}

impl ProcessingConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProcessingConfig::default();
        assert_eq!(config.corr_unit, "disp");
        assert_eq!(config.waveform_format, "sac");
        assert!(config.instrument_correction);
        assert_eq!(config.des_sampling_rate, None);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "corr_unit": "vel",
            "des_sampling_rate": 10.0,
            "resample_method": "decimate",
            "waveform_format": "mseed"
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = ProcessingConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.corr_unit, "vel");
        assert_eq!(config.des_sampling_rate, Some(10.0));
        assert_eq!(config.resample_method, ResampleMethod::Decimate);
        assert_eq!(config.waveform_format, "mseed");
        // untouched fields keep their defaults
        assert_eq!(config.water_level, 600.0);
        assert!(config.instrument_correction);
    }
}
