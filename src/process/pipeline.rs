// Correction pipeline
// Per-trace orchestration: assemble -> resample -> correct -> serialize.
// Each invocation is self-contained; a failure here never touches sibling
// traces being processed in parallel.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ProcessingConfig;
use crate::response::PazError;
use crate::waveform::{assemble, container, sac, AssembleError, ContainerError, StationEvent, Trace};

use super::correction::{CorrectionError, InstrumentHandler};
use super::resample::{resample, ResampleError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Correction(#[from] CorrectionError),

    #[error("instrument correction requested but no handler was provided")]
    MissingHandler,

    #[error(transparent)]
    Config(#[from] PazError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Run the full processing chain for one stored waveform.
///
/// Returns the path of the written file, or `None` when the instrument
/// correction failed physically and the trace was dropped (an accepted,
/// non-fatal outcome: nothing is written in that case). Requesting the
/// correction without supplying a handler is an error, so a written file
/// is always in the state the configuration asked for.
pub fn process_unit(
    trace_path: &Path,
    target_path: &Path,
    config: &ProcessingConfig,
    staev: Option<&StationEvent>,
    handler: Option<&dyn InstrumentHandler>,
) -> Result<Option<PathBuf>, PipelineError> {
    let mut tr = assemble(trace_path)?;

    let unit = config.corr_unit.parse::<crate::response::OutputUnit>()?;

    // Unit-named output directory under the event path; creation is
    // idempotent and race-tolerant across sibling invocations
    let unit_dir = target_path.join(format!("BH_{}", unit));
    fs::create_dir_all(&unit_dir)?;
    let save_path = unit_dir.join(tr.id());

    if config.des_sampling_rate.is_some() {
        tr = resample(tr, config.des_sampling_rate, config.resample_method)?;
    }

    if config.instrument_correction {
        let Some(handler) = handler else {
            return Err(PipelineError::MissingHandler);
        };
        match handler.correct(tr, &save_path, unit, config.pre_filt, config.water_level)? {
            Some(corrected) => tr = corrected,
            None => {
                log::warn!(
                    "instrument correction dropped trace, nothing written to {}",
                    save_path.display()
                );
                return Ok(None);
            }
        }
    }

    write_trace(&tr, &save_path, &config.waveform_format, staev)?;
    Ok(Some(save_path))
}

/// Serialize one trace to `save_path`.
///
/// A format matching "sac" (case-insensitive) enriches the header with the
/// station/event descriptor first and writes SAC; anything else writes a
/// generic container record with the header untouched.
pub fn write_trace(
    trace: &Trace,
    save_path: &Path,
    format: &str,
    staev: Option<&StationEvent>,
) -> Result<(), PipelineError> {
    if format.eq_ignore_ascii_case("sac") {
        match staev {
            Some(staev) => {
                let enriched = sac::convert_to_sac(trace.clone(), staev);
                sac::write_sac(&enriched, save_path)?;
            }
            None => sac::write_sac(trace, save_path)?,
        }
    } else {
        container::write_record(trace, save_path)?;
    }
    Ok(())
}
