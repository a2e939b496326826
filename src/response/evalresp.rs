// Evaluated-response engine
// Computes the frequency response of a stage cascade over a regular grid,
// and the analog response of a combined PAZ model for comparison

use num_complex::Complex64;
use std::f64::consts::PI;
use thiserror::Error;

use super::paz::{unit_conversion_zeros, CombinedPaz, OutputUnit, PazError};
use super::stage::ResponseStage;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("stage range {0}..={1} selects no stages")]
    EmptyStageRange(usize, usize),

    #[error("frequency grid is empty (nfft = {0})")]
    EmptyGrid(usize),

    #[error(transparent)]
    Unit(#[from] PazError),
}

/// Evaluates the response of a stage cascade over a frequency grid.
///
/// The grid covers 0..=Nyquist in `nfft / 2 + 1` points for a sample
/// interval of `t_samp` seconds; both the complex response and the
/// frequency axis are returned.
pub trait ResponseEvaluator {
    fn evaluate(
        &self,
        stages: &[ResponseStage],
        start_stage: usize,
        end_stage: usize,
        t_samp: f64,
        nfft: usize,
        output: OutputUnit,
    ) -> Result<(Vec<Complex64>, Vec<f64>), EvalError>;
}

/// Default evaluator: each in-range stage with a pole-zero description
/// contributes its analog transfer function times its normalization factor;
/// every in-range stage contributes its stage gain. Unit-conversion zeros
/// are applied per the stage-1 input units.
#[derive(Debug, Default)]
pub struct PazCascadeEvaluator;

impl ResponseEvaluator for PazCascadeEvaluator {
    fn evaluate(
        &self,
        stages: &[ResponseStage],
        start_stage: usize,
        end_stage: usize,
        t_samp: f64,
        nfft: usize,
        output: OutputUnit,
    ) -> Result<(Vec<Complex64>, Vec<f64>), EvalError> {
        let end = end_stage.min(stages.len());
        if start_stage < 1 || start_stage > end {
            return Err(EvalError::EmptyStageRange(start_stage, end_stage));
        }
        let freqs = frequency_grid(t_samp, nfft)?;

        // Range check above guarantees at least one stage
        let conversion = unit_conversion_zeros(&stages[0].input_units, output)?;

        let mut response = vec![Complex64::new(1.0, 0.0); freqs.len()];
        for stage in &stages[start_stage - 1..end] {
            let gain = Complex64::new(stage.stage_gain, 0.0);
            if stage.has_paz() {
                let poles = stage.poles.as_deref().unwrap_or(&[]);
                let zeros = stage.zeros.as_deref().unwrap_or(&[]);
                let a0 = stage.normalization_factor.unwrap_or(1.0);
                for (r, f) in response.iter_mut().zip(&freqs) {
                    *r *= gain * paz_point(poles, zeros, a0, *f);
                }
            } else {
                for r in response.iter_mut() {
                    *r *= gain;
                }
            }
        }

        // s^k for the output-unit conversion (one origin zero per power)
        if conversion > 0 {
            for (r, f) in response.iter_mut().zip(&freqs) {
                let s = Complex64::new(0.0, 2.0 * PI * f);
                *r *= s.powu(conversion as u32);
            }
        }

        Ok((response, freqs))
    }
}

/// Analog frequency response of a combined PAZ model, together with the
/// frequency axis. `H(f) = gain * prod(s - z) / prod(s - p)`, `s = 2πjf`.
pub fn paz_to_freq_resp(
    paz: &CombinedPaz,
    t_samp: f64,
    nfft: usize,
) -> Result<(Vec<Complex64>, Vec<f64>), EvalError> {
    let freqs = frequency_grid(t_samp, nfft)?;
    let response = freqs
        .iter()
        .map(|f| paz_point(&paz.poles, &paz.zeros, paz.gain, *f))
        .collect();
    Ok((response, freqs))
}

/// Regular frequency axis: `nfft / 2 + 1` points from DC to Nyquist.
fn frequency_grid(t_samp: f64, nfft: usize) -> Result<Vec<f64>, EvalError> {
    if nfft < 2 {
        return Err(EvalError::EmptyGrid(nfft));
    }
    let n = nfft / 2 + 1;
    let df = 1.0 / (nfft as f64 * t_samp);
    Ok((0..n).map(|i| i as f64 * df).collect())
}

/// Single-frequency pole-zero transfer function value.
fn paz_point(poles: &[Complex64], zeros: &[Complex64], gain: f64, freq: f64) -> Complex64 {
    let s = Complex64::new(0.0, 2.0 * PI * freq);
    let num = zeros
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, z| acc * (s - *z));
    let den = poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (s - *p));
    gain * num / den
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_paz_stage() -> Vec<ResponseStage> {
        vec![ResponseStage {
            stage_gain: 100.0,
            normalization_factor: Some(1.5),
            poles: Some(vec![Complex64::new(-1.0, 1.0), Complex64::new(-1.0, -1.0)]),
            zeros: Some(vec![]),
            input_units: "m/s".to_string(),
            output_units: "v".to_string(),
            decimation_input_sample_rate: None,
            decimation_factor: None,
        }]
    }

    #[test]
    fn test_frequency_grid_spans_dc_to_nyquist() {
        let freqs = frequency_grid(0.05, 200).unwrap();
        assert_eq!(freqs.len(), 101);
        assert_eq!(freqs[0], 0.0);
        assert!((freqs[100] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cascade_matches_paz_for_single_stage() {
        // With one PAZ stage and no conversion zeros, the cascade equals
        // the combined model scaled by sensitivity at every grid point.
        let stages = single_paz_stage();
        let (resp, freqs) = PazCascadeEvaluator
            .evaluate(&stages, 1, 10, 0.05, 128, OutputUnit::Vel)
            .unwrap();

        let paz = crate::response::paz::build_combined_paz(&stages, OutputUnit::Vel).unwrap();
        let (h, f) = paz_to_freq_resp(&paz, 0.05, 128).unwrap();

        assert_eq!(freqs, f);
        for (a, b) in resp.iter().zip(h.iter()) {
            let scaled = b * paz.sensitivity;
            assert!((a - scaled).norm() < 1e-9 * scaled.norm().max(1.0));
        }
    }

    #[test]
    fn test_gain_only_stage_scales_flat() {
        let mut stages = single_paz_stage();
        stages.push(ResponseStage {
            stage_gain: 2.0,
            normalization_factor: None,
            poles: None,
            zeros: None,
            input_units: "v".to_string(),
            output_units: "counts".to_string(),
            decimation_input_sample_rate: None,
            decimation_factor: None,
        });

        let (with_dig, _) = PazCascadeEvaluator
            .evaluate(&stages, 1, 2, 0.05, 64, OutputUnit::Vel)
            .unwrap();
        let (without, _) = PazCascadeEvaluator
            .evaluate(&stages, 1, 1, 0.05, 64, OutputUnit::Vel)
            .unwrap();

        for (a, b) in with_dig.iter().zip(without.iter()) {
            assert!((a - b * 2.0).norm() < 1e-9 * b.norm().max(1.0));
        }
    }

    #[test]
    fn test_disp_conversion_multiplies_by_s() {
        let stages = single_paz_stage();
        let (disp, freqs) = PazCascadeEvaluator
            .evaluate(&stages, 1, 1, 0.05, 64, OutputUnit::Disp)
            .unwrap();
        let (vel, _) = PazCascadeEvaluator
            .evaluate(&stages, 1, 1, 0.05, 64, OutputUnit::Vel)
            .unwrap();

        // Skip DC where the conversion factor is zero
        for i in 1..freqs.len() {
            let s = Complex64::new(0.0, 2.0 * PI * freqs[i]);
            assert!((disp[i] - vel[i] * s).norm() < 1e-9 * disp[i].norm().max(1.0));
        }
        assert_eq!(disp[0], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_empty_stage_range_is_error() {
        let stages = single_paz_stage();
        let err = PazCascadeEvaluator
            .evaluate(&stages, 5, 10, 0.05, 64, OutputUnit::Vel)
            .unwrap_err();
        assert!(matches!(err, EvalError::EmptyStageRange(5, 10)));
    }
}
