// Instrument correction
// Water-level-regularized spectral deconvolution of the instrument response:
// detrend, demean, taper, pre-filter, divide out the response, back to time

use num_complex::Complex64;
use realfft::RealFftPlanner;
use std::f64::consts::PI;
use std::path::Path;
use thiserror::Error;

use crate::response::{CombinedPaz, OutputUnit};
use crate::waveform::Trace;

/// Taper width applied to each end of the trace before the FFT
const TAPER_WIDTH: f64 = 0.05;

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("cannot correct an empty trace")]
    EmptyTrace,

    #[error("FFT failed: {0}")]
    Fft(String),
}

/// The deconvolution collaborator consumed by the pipeline.
///
/// `save_path` is where the caller intends to write the corrected trace;
/// implementations that do not produce side outputs may ignore it.
/// `Ok(None)` means the correction failed for physical reasons (unstable
/// deconvolution); the caller drops the trace without writing output.
pub trait InstrumentHandler {
    fn correct(
        &self,
        trace: Trace,
        save_path: &Path,
        output: OutputUnit,
        pre_filt: Option<[f64; 4]>,
        water_level: f64,
    ) -> Result<Option<Trace>, CorrectionError>;
}

/// Default handler: removes the combined PAZ response of the channel by
/// spectral division, flooring small response magnitudes at
/// `max|R| * 10^(-water_level/20)` to keep the division stable.
pub struct WaterLevelDeconvolver {
    paz: CombinedPaz,
}

impl WaterLevelDeconvolver {
    pub fn new(paz: CombinedPaz) -> Self {
        WaterLevelDeconvolver { paz }
    }
}

impl InstrumentHandler for WaterLevelDeconvolver {
    fn correct(
        &self,
        mut trace: Trace,
        _save_path: &Path,
        _output: OutputUnit,
        pre_filt: Option<[f64; 4]>,
        water_level: f64,
    ) -> Result<Option<Trace>, CorrectionError> {
        let n = trace.npts();
        if n == 0 {
            return Err(CorrectionError::EmptyTrace);
        }

        trace.detrend();
        trace.demean();
        trace.taper(TAPER_WIDTH);

        // Zero-padded to the next power of two past 2n to keep the
        // circular convolution out of the signal
        let nfft = (2 * n).next_power_of_two();
        let mut planner = RealFftPlanner::<f64>::new();
        let rfft = planner.plan_fft_forward(nfft);
        let irfft = planner.plan_fft_inverse(nfft);

        let mut input = vec![0.0; nfft];
        input[..n].copy_from_slice(&trace.samples);
        let mut spectrum = rfft.make_output_vec();
        rfft.process(&mut input, &mut spectrum)
            .map_err(|e| CorrectionError::Fft(e.to_string()))?;

        let df = trace.sample_rate / nfft as f64;

        // Full instrument response (shape times sensitivity) on the rfft grid
        let mut response: Vec<Complex64> = (0..spectrum.len())
            .map(|i| {
                let f = i as f64 * df;
                paz_value(&self.paz, f) * self.paz.sensitivity
            })
            .collect();
        water_level_floor(&mut response, water_level);

        for (i, spec) in spectrum.iter_mut().enumerate() {
            let f = i as f64 * df;
            let taper = match pre_filt {
                Some(corners) => cosine_taper(f, corners),
                None => 1.0,
            };
            let r = response[i];
            let value = Complex64::new(spec.re, spec.im) * taper;
            let corrected = if r.norm() == 0.0 {
                Complex64::new(0.0, 0.0)
            } else {
                value / r
            };
            *spec = realfft::num_complex::Complex::new(corrected.re, corrected.im);
        }

        // Real output signal: DC and Nyquist bins must stay purely real
        if let Some(first) = spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }

        let mut output_buf = irfft.make_output_vec();
        irfft
            .process(&mut spectrum, &mut output_buf)
            .map_err(|e| CorrectionError::Fft(e.to_string()))?;

        // realfft leaves the inverse unscaled
        let scale = 1.0 / nfft as f64;
        let corrected: Vec<f64> = output_buf[..n].iter().map(|s| s * scale).collect();

        if corrected.iter().any(|s| !s.is_finite()) {
            log::warn!("unstable deconvolution for {}", trace.id());
            return Ok(None);
        }

        trace.samples = corrected;
        Ok(Some(trace))
    }
}

/// Floor response magnitudes at `max|R| * 10^(-water_level_db/20)`,
/// preserving phase. Exact zeros stay zero and are dropped from the
/// division by the caller.
fn water_level_floor(response: &mut [Complex64], water_level_db: f64) {
    let max_norm = response.iter().map(|r| r.norm()).fold(0.0, f64::max);
    if max_norm == 0.0 {
        return;
    }
    let floor = max_norm * 10f64.powf(-water_level_db / 20.0);
    for r in response.iter_mut() {
        let norm = r.norm();
        if norm > 0.0 && norm < floor {
            *r *= floor / norm;
        }
    }
}

/// Cosine pre-filter taper: zero below f1 and above f4, unity between f2
/// and f3, cosine ramps in between.
fn cosine_taper(f: f64, [f1, f2, f3, f4]: [f64; 4]) -> f64 {
    if f <= f1 || f >= f4 {
        0.0
    } else if f >= f2 && f <= f3 {
        1.0
    } else if f < f2 {
        0.5 * (1.0 - (PI * (f - f1) / (f2 - f1)).cos())
    } else {
        0.5 * (1.0 + (PI * (f - f3) / (f4 - f3)).cos())
    }
}

/// PAZ transfer function value at one frequency (without sensitivity).
fn paz_value(paz: &CombinedPaz, freq: f64) -> Complex64 {
    let s = Complex64::new(0.0, 2.0 * PI * freq);
    let num = paz
        .zeros
        .iter()
        .fold(Complex64::new(paz.gain, 0.0), |acc, z| acc * (s - *z));
    let den = paz
        .poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (s - *p));
    num / den
}
