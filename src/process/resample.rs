// Resampler
// Changes a trace's sampling rate with a selectable method: integer-factor
// decimation with an anti-alias low-pass, or Lanczos interpolation

use serde::Deserialize;
use std::f64::consts::PI;
use thiserror::Error;

use crate::waveform::Trace;

/// Lanczos kernel half-width (number of lobes on each side)
const LANCZOS_A: usize = 20;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("decimation needs an integer factor, got {0}/{1}")]
    NonIntegerFactor(f64, f64),

    #[error("target sampling rate must be positive, got {0}")]
    InvalidRate(f64),

    #[error("cannot resample an empty trace")]
    EmptyTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Anti-alias low-pass followed by picking every k-th sample.
    /// Only integer downsampling factors are accepted.
    Decimate,

    /// Windowed-sinc (Lanczos) interpolation; handles arbitrary ratios.
    Lanczos,
}

/// Resample the trace to `target_rate`. `None` is a no-op, as is a target
/// equal to the current rate (idempotent short-circuit).
pub fn resample(
    trace: Trace,
    target_rate: Option<f64>,
    method: ResampleMethod,
) -> Result<Trace, ResampleError> {
    let target = match target_rate {
        Some(r) => r,
        None => return Ok(trace),
    };
    if target <= 0.0 {
        return Err(ResampleError::InvalidRate(target));
    }

    log::info!("resampling for: {}", trace.id());

    if (target - trace.sample_rate).abs() < 1e-9 * trace.sample_rate {
        return Ok(trace);
    }
    if trace.samples.is_empty() {
        return Err(ResampleError::EmptyTrace);
    }

    match method {
        ResampleMethod::Decimate => decimate(trace, target),
        ResampleMethod::Lanczos => lanczos(trace, target),
    }
}

fn decimate(mut trace: Trace, target: f64) -> Result<Trace, ResampleError> {
    let ratio = trace.sample_rate / target;
    let factor = ratio.round();
    if factor < 1.0 || (ratio - factor).abs() > 1e-6 {
        return Err(ResampleError::NonIntegerFactor(trace.sample_rate, target));
    }
    let factor = factor as usize;

    // Anti-alias low-pass at 80% of the new Nyquist before picking samples
    let cutoff = 0.4 * target / trace.sample_rate;
    let filtered = lowpass(&trace.samples, cutoff, 4 * factor);

    trace.samples = filtered.iter().step_by(factor).copied().collect();
    trace.sample_rate = target;
    Ok(trace)
}

fn lanczos(mut trace: Trace, target: f64) -> Result<Trace, ResampleError> {
    let old_rate = trace.sample_rate;
    let n = trace.samples.len();
    let duration = (n - 1) as f64 / old_rate;
    let new_n = (duration * target).floor() as usize + 1;

    let a = LANCZOS_A as isize;
    let mut out = Vec::with_capacity(new_n);
    for i in 0..new_n {
        // Position of the output sample on the input index axis
        let x = i as f64 * old_rate / target;
        let center = x.floor() as isize;
        let mut acc = 0.0;
        let mut weight = 0.0;
        for j in (center - a + 1)..=(center + a) {
            let idx = j.clamp(0, n as isize - 1) as usize;
            let w = lanczos_kernel(x - j as f64);
            acc += trace.samples[idx] * w;
            weight += w;
        }
        out.push(if weight.abs() > f64::EPSILON {
            acc / weight
        } else {
            0.0
        });
    }

    trace.samples = out;
    trace.sample_rate = target;
    Ok(trace)
}

fn lanczos_kernel(x: f64) -> f64 {
    let a = LANCZOS_A as f64;
    if x == 0.0 {
        1.0
    } else if x.abs() < a {
        a * (PI * x).sin() * (PI * x / a).sin() / (PI * PI * x * x)
    } else {
        0.0
    }
}

/// Zero-phase windowed-sinc low-pass. `cutoff` is a fraction of the input
/// sampling rate, `half_len` the kernel half-width in samples.
fn lowpass(samples: &[f64], cutoff: f64, half_len: usize) -> Vec<f64> {
    let m = half_len as isize;
    let mut kernel = Vec::with_capacity(2 * half_len + 1);
    let mut sum = 0.0;
    for i in -m..=m {
        let x = i as f64;
        let sinc = if i == 0 {
            2.0 * cutoff
        } else {
            (2.0 * PI * cutoff * x).sin() / (PI * x)
        };
        // Hann window
        let w = 0.5 * (1.0 + (PI * x / (m as f64 + 1.0)).cos());
        kernel.push(sinc * w);
        sum += sinc * w;
    }
    // Unity DC gain
    for k in kernel.iter_mut() {
        *k /= sum;
    }

    let n = samples.len() as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(ki, k)| {
                    let idx = (i + ki as isize - m).clamp(0, n - 1) as usize;
                    k * samples[idx]
                })
                .sum()
        })
        .collect()
}
