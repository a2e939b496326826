// Response validator
// Compares the full evaluated response of each channel against its combined
// PAZ approximation over the leading part of the frequency band, flags
// channels whose phase mismatch is too frequent, and appends one line per
// validated channel to a tab-separated report file

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use super::evalresp::{paz_to_freq_resp, EvalError, PazCascadeEvaluator, ResponseEvaluator};
use super::paz::{build_combined_paz, OutputUnit, PazError};
use super::stage::ChannelResponse;

/// Default report file name, one `<channel>\t<percent_compare>` row per line
pub const REPORT_FILE_NAME: &str = "report_stationxml";

/// Phase mismatch above this many radians counts against the channel
const PHASE_MISMATCH_RAD: f64 = 0.1;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no stage carries decimation info, sampling rate unknown")]
    MissingSamplingRate,

    #[error("comparison window is empty")]
    EmptyWindow,

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Config(#[from] PazError),
}

impl ChannelError {
    /// Extract the configuration error when this failure must abort the
    /// whole run rather than skip the channel.
    fn fatal(self) -> Result<PazError, ChannelError> {
        match self {
            ChannelError::Config(e) if e.is_fatal() => Ok(e),
            ChannelError::Eval(EvalError::Unit(e)) if e.is_fatal() => Ok(e),
            other => Err(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Unit violation: the whole validation run is aborted.
    #[error(transparent)]
    Config(#[from] PazError),

    #[error("report IO error: {0}")]
    Io(#[from] io::Error),
}

/// Validation parameters for one run.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Lowest frequency of interest; the grid holds
    /// `sampling_rate / min_freq` points
    pub min_freq: f64,

    /// First stage of the evaluated cascade (1-based)
    pub start_stage: usize,

    /// Last stage of the evaluated cascade, clamped to the stage count
    pub end_stage: usize,

    /// Leading fraction of the frequency axis to compare (0, 1]; the
    /// high-frequency tail is excluded since PAZ approximations diverge
    /// near Nyquist
    pub percentage: f64,

    /// Channels whose percent_compare exceeds this are flagged
    pub threshold: f64,

    /// Output unit both responses are converted to
    pub output: OutputUnit,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            min_freq: 0.01,
            start_stage: 1,
            end_stage: 100,
            percentage: 0.8,
            threshold: 10.0,
            output: OutputUnit::Disp,
        }
    }
}

/// Result of one channel's validation.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel: String,
    pub latitude: f64,
    pub longitude: f64,

    /// Percentage of compared grid points whose full-response vs PAZ phase
    /// difference exceeds 0.1 rad
    pub percent_compare: f64,

    /// Largest phase deviation between the full response and the
    /// first-two-stages response inside the comparison window (sanity
    /// reference)
    pub stage12_max_phase_dev: f64,

    pub flagged: bool,
}

/// Per-channel outcome of a batch run. A skipped channel never unwinds
/// the batch.
#[derive(Debug)]
pub enum ChannelVerdict {
    Evaluated(ChannelReport),
    Skipped { channel: String, reason: String },
}

/// Append-mode report handle, flushed after every line, owned by the
/// validator for the duration of one run.
pub struct ReportWriter {
    writer: BufWriter<File>,
}

impl ReportWriter {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ReportWriter {
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, channel: &str, percent_compare: f64) -> io::Result<()> {
        writeln!(self.writer, "{}\t{}", channel, percent_compare)?;
        self.writer.flush()
    }
}

pub struct ResponseValidator<E: ResponseEvaluator = PazCascadeEvaluator> {
    config: ValidatorConfig,
    evaluator: E,
    report: ReportWriter,
}

impl ResponseValidator<PazCascadeEvaluator> {
    pub fn new(config: ValidatorConfig, report_path: &Path) -> io::Result<Self> {
        Self::with_evaluator(config, PazCascadeEvaluator, report_path)
    }
}

impl<E: ResponseEvaluator> ResponseValidator<E> {
    pub fn with_evaluator(
        config: ValidatorConfig,
        evaluator: E,
        report_path: &Path,
    ) -> io::Result<Self> {
        Ok(ResponseValidator {
            config,
            evaluator,
            report: ReportWriter::open(report_path)?,
        })
    }

    /// Validate a batch of channels. Per-channel failures are logged and
    /// reported as `Skipped`; only configuration-level unit violations
    /// abort the run.
    pub fn validate_channels(
        &mut self,
        channels: &[ChannelResponse],
    ) -> Result<Vec<ChannelVerdict>, ValidatorError> {
        let mut verdicts = Vec::with_capacity(channels.len());
        for resp in channels {
            match self.validate_channel(resp) {
                Ok(report) => {
                    self.report.append(&resp.channel, report.percent_compare)?;
                    verdicts.push(ChannelVerdict::Evaluated(report));
                }
                Err(err) => match err.fatal() {
                    Ok(fatal) => {
                        log::error!("{}: fatal configuration error: {}", resp.channel, fatal);
                        return Err(fatal.into());
                    }
                    Err(recoverable) => {
                        log::warn!("skipping channel {}: {}", resp.channel, recoverable);
                        verdicts.push(ChannelVerdict::Skipped {
                            channel: resp.channel.clone(),
                            reason: recoverable.to_string(),
                        });
                    }
                },
            }
        }
        Ok(verdicts)
    }

    /// Validate one channel against its PAZ approximation.
    pub fn validate_channel(
        &self,
        resp: &ChannelResponse,
    ) -> Result<ChannelReport, ChannelError> {
        let sampling_rate = resp
            .sampling_rate()
            .ok_or(ChannelError::MissingSamplingRate)?;
        let t_samp = 1.0 / sampling_rate;
        let nfft = (sampling_rate / self.config.min_freq) as usize;
        let end_stage = self.config.end_stage.min(resp.stages.len());

        let paz = build_combined_paz(&resp.stages, self.config.output)?;

        let (full, _) = self.evaluator.evaluate(
            &resp.stages,
            self.config.start_stage,
            end_stage,
            t_samp,
            nfft,
            self.config.output,
        )?;
        let (stage12, _) = self.evaluator.evaluate(
            &resp.stages,
            1,
            2.min(resp.stages.len()),
            t_samp,
            nfft,
            self.config.output,
        )?;
        let (h, _) = paz_to_freq_resp(&paz, t_samp, nfft)?;

        // Leading fraction of the grid only
        let window = (self.config.percentage.clamp(0.0, 1.0) * full.len() as f64) as usize;
        if window == 0 {
            return Err(ChannelError::EmptyWindow);
        }

        let mut mismatches = 0usize;
        let mut stage12_max_phase_dev: f64 = 0.0;
        for i in 0..window {
            let phase_full = full[i].arg();
            let phase_paz = (h[i] * paz.sensitivity).arg();
            if (phase_full - phase_paz).abs() > PHASE_MISMATCH_RAD {
                mismatches += 1;
            }
            stage12_max_phase_dev =
                stage12_max_phase_dev.max((phase_full - stage12[i].arg()).abs());
        }
        let percent_compare = mismatches as f64 / window as f64 * 100.0;
        let flagged = percent_compare > self.config.threshold;

        if flagged {
            log::info!(
                "{}: PAZ phase mismatch on {:.1}% of the band (threshold {:.1}%)",
                resp.channel,
                percent_compare,
                self.config.threshold
            );
        }

        Ok(ChannelReport {
            channel: resp.channel.clone(),
            latitude: resp.latitude,
            longitude: resp.longitude,
            percent_compare,
            stage12_max_phase_dev,
            flagged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::stage::ResponseStage;
    use chrono::Utc;
    use num_complex::Complex64;
    use std::fs;

    fn sensor_stage(input_units: &str) -> ResponseStage {
        ResponseStage {
            stage_gain: 1500.0,
            normalization_factor: Some(2.0),
            poles: Some(vec![Complex64::new(-1.0, 1.0), Complex64::new(-1.0, -1.0)]),
            zeros: Some(vec![]),
            input_units: input_units.to_string(),
            output_units: "v".to_string(),
            decimation_input_sample_rate: Some(20.0),
            decimation_factor: Some(1),
        }
    }

    fn channel(name: &str, stages: Vec<ResponseStage>) -> ChannelResponse {
        ChannelResponse {
            channel: name.to_string(),
            latitude: 10.0,
            longitude: 20.0,
            epoch_start: Utc::now(),
            stages,
        }
    }

    fn validator(dir: &tempfile::TempDir) -> ResponseValidator {
        ResponseValidator::new(
            ValidatorConfig::default(),
            &dir.path().join(REPORT_FILE_NAME),
        )
        .unwrap()
    }

    #[test]
    fn test_single_stage_channel_matches_its_own_paz() {
        let dir = tempfile::tempdir().unwrap();
        let v = validator(&dir);
        let report = v
            .validate_channel(&channel("XX.A..BHZ", vec![sensor_stage("m/s")]))
            .unwrap();

        assert_eq!(report.percent_compare, 0.0);
        assert!(!report.flagged);
        assert!(report.stage12_max_phase_dev < 1e-12);
    }

    #[test]
    fn test_channel_without_paz_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = validator(&dir);
        let gain_only = ResponseStage {
            stage_gain: 5.0,
            normalization_factor: None,
            poles: None,
            zeros: None,
            input_units: "m/s".to_string(),
            output_units: "counts".to_string(),
            decimation_input_sample_rate: Some(20.0),
            decimation_factor: Some(1),
        };
        let channels = vec![
            channel("XX.BAD..BHZ", vec![gain_only]),
            channel("XX.GOOD..BHZ", vec![sensor_stage("m/s")]),
        ];

        let verdicts = v.validate_channels(&channels).unwrap();
        assert_eq!(verdicts.len(), 2);
        assert!(matches!(&verdicts[0], ChannelVerdict::Skipped { channel, .. }
            if channel == "XX.BAD..BHZ"));
        assert!(matches!(&verdicts[1], ChannelVerdict::Evaluated(r)
            if r.channel == "XX.GOOD..BHZ"));
    }

    #[test]
    fn test_unknown_input_units_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = validator(&dir);
        let channels = vec![channel("XX.PA..BDF", vec![sensor_stage("pa")])];

        assert!(matches!(
            v.validate_channels(&channels),
            Err(ValidatorError::Config(PazError::UnsupportedInputUnits(_)))
        ));
    }

    #[test]
    fn test_missing_sampling_rate_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = validator(&dir);
        let mut stage = sensor_stage("m/s");
        stage.decimation_input_sample_rate = None;
        stage.decimation_factor = None;

        let verdicts = v
            .validate_channels(&[channel("XX.NOSR..BHZ", vec![stage])])
            .unwrap();
        assert!(matches!(&verdicts[0], ChannelVerdict::Skipped { .. }));
    }

    #[test]
    fn test_report_has_one_row_per_validated_channel() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join(REPORT_FILE_NAME);
        let mut v = ResponseValidator::new(ValidatorConfig::default(), &report_path).unwrap();

        let channels = vec![
            channel("XX.A..BHZ", vec![sensor_stage("m/s")]),
            channel("XX.B..BHZ", vec![sensor_stage("m/s")]),
        ];
        v.validate_channels(&channels).unwrap();
        drop(v);

        let contents = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "XX.A..BHZ\t0");
        assert!(lines[1].starts_with("XX.B..BHZ\t"));
    }

    #[test]
    fn test_report_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join(REPORT_FILE_NAME);
        for _ in 0..2 {
            let mut v = ResponseValidator::new(ValidatorConfig::default(), &report_path).unwrap();
            v.validate_channels(&[channel("XX.A..BHZ", vec![sensor_stage("m/s")])])
                .unwrap();
        }

        let contents = fs::read_to_string(&report_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
