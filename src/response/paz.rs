// Combined pole-zero-gain model
// Folds an ordered stage cascade into a single PAZ approximation:
// poles/zeros from the first pole-zero stage, gain as the product of the
// normalization factors, sensitivity as the product of the stage gains

use num_complex::Complex64;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::stage::ResponseStage;

#[derive(Debug, Error)]
pub enum PazError {
    /// Stage-1 input units outside the accepted set. Aborts the whole run.
    #[error("input unit is not supported: {0}")]
    UnsupportedInputUnits(String),

    /// Requested output unit that the model cannot produce. Aborts the run.
    #[error("output unit is not supported: {0}")]
    UnsupportedOutputUnit(String),

    /// No stage in the cascade carries a pole-zero description.
    #[error("response has no pole-zero stage")]
    NoPoleZeroStage,
}

impl PazError {
    /// Unit violations reflect a configuration the whole run cannot
    /// satisfy; everything else is recoverable per channel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PazError::UnsupportedInputUnits(_) | PazError::UnsupportedOutputUnit(_)
        )
    }
}

/// Requested output unit of the corrected waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputUnit {
    #[serde(alias = "dis")]
    Disp,
    Vel,
    Acc,
}

impl FromStr for OutputUnit {
    type Err = PazError;

    /// Case-insensitive; "dis" is accepted as shorthand for "disp".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disp" | "dis" => Ok(OutputUnit::Disp),
            "vel" => Ok(OutputUnit::Vel),
            "acc" => Ok(OutputUnit::Acc),
            other => Err(PazError::UnsupportedOutputUnit(other.to_string())),
        }
    }
}

impl fmt::Display for OutputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputUnit::Disp => write!(f, "DISP"),
            OutputUnit::Vel => write!(f, "VEL"),
            OutputUnit::Acc => write!(f, "ACC"),
        }
    }
}

/// Cascaded pole-zero-gain approximation of a full multi-stage response.
///
/// Poles come from the first pole-zero stage only; later stages are assumed
/// to contribute no additional poles. The validator's comparison threshold
/// is calibrated against this approximation, so it is kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedPaz {
    pub poles: Vec<Complex64>,
    pub zeros: Vec<Complex64>,

    /// Product of the stages' normalization factors
    pub gain: f64,

    /// Product of the stages' gains (overall counts per input unit)
    pub sensitivity: f64,
}

/// Number of zeros at the origin to append when converting a response with
/// the given stage-1 input units to the requested output unit.
///
/// Accepted input units are velocity ("m/s") and acceleration ("m/s**2");
/// anything else is a fatal configuration error, as is "acc" output.
pub fn unit_conversion_zeros(input_units: &str, output: OutputUnit) -> Result<usize, PazError> {
    let input = input_units.to_lowercase();
    if input != "m/s" && input != "m/s**2" {
        return Err(PazError::UnsupportedInputUnits(input_units.to_string()));
    }
    if output == OutputUnit::Acc {
        return Err(PazError::UnsupportedOutputUnit(output.to_string()));
    }
    Ok(match (input.as_str(), output) {
        ("m/s", OutputUnit::Disp) => 1,
        ("m/s**2", OutputUnit::Disp) => 2,
        ("m/s**2", OutputUnit::Vel) => 1,
        _ => 0,
    })
}

/// Fold an ordered stage cascade into a combined PAZ record.
///
/// Pure function: every stage contributes its gain to the sensitivity, every
/// stage with a normalization factor contributes it to the gain, and the
/// first stage with poles/zeros provides the PAZ base. Zeros at the origin
/// are appended per the output-unit conversion rule.
pub fn build_combined_paz(
    stages: &[ResponseStage],
    output: OutputUnit,
) -> Result<CombinedPaz, PazError> {
    let base = stages
        .iter()
        .find(|s| s.has_paz())
        .ok_or(PazError::NoPoleZeroStage)?;

    // Unit check runs against the actual first stage of the cascade
    let input_units = &stages[0].input_units;
    let extra_zeros = unit_conversion_zeros(input_units, output)?;

    let poles = base.poles.clone().unwrap_or_default();
    let mut zeros = base.zeros.clone().unwrap_or_default();
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(extra_zeros));

    let gain = stages
        .iter()
        .filter_map(|s| s.normalization_factor)
        .product();
    let sensitivity = stages.iter().map(|s| s.stage_gain).product();

    Ok(CombinedPaz {
        poles,
        zeros,
        gain,
        sensitivity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(
        gain: f64,
        norm: Option<f64>,
        paz: Option<(Vec<Complex64>, Vec<Complex64>)>,
        input_units: &str,
    ) -> ResponseStage {
        let (poles, zeros) = match paz {
            Some((p, z)) => (Some(p), Some(z)),
            None => (None, None),
        };
        ResponseStage {
            stage_gain: gain,
            normalization_factor: norm,
            poles,
            zeros,
            input_units: input_units.to_string(),
            output_units: "counts".to_string(),
            decimation_input_sample_rate: None,
            decimation_factor: None,
        }
    }

    fn sensor_plus_digitizer(input_units: &str) -> Vec<ResponseStage> {
        vec![
            stage(
                1500.0,
                Some(2.0),
                Some((
                    vec![Complex64::new(-1.0, 1.0), Complex64::new(-1.0, -1.0)],
                    vec![],
                )),
                input_units,
            ),
            stage(1000000.0, Some(3.0), None, "v"),
            stage(2.0, None, None, "counts"),
        ]
    }

    #[test]
    fn test_output_unit_parsing() {
        assert_eq!("DISP".parse::<OutputUnit>().unwrap(), OutputUnit::Disp);
        assert_eq!("dis".parse::<OutputUnit>().unwrap(), OutputUnit::Disp);
        assert_eq!("Vel".parse::<OutputUnit>().unwrap(), OutputUnit::Vel);
        assert!("meters".parse::<OutputUnit>().is_err());
    }

    #[test]
    fn test_velocity_to_disp_appends_one_origin_zero() {
        let paz = build_combined_paz(&sensor_plus_digitizer("m/s"), OutputUnit::Disp).unwrap();
        assert_eq!(paz.zeros, vec![Complex64::new(0.0, 0.0)]);
        assert_eq!(
            paz.poles,
            vec![Complex64::new(-1.0, 1.0), Complex64::new(-1.0, -1.0)]
        );
    }

    #[test]
    fn test_acceleration_to_disp_appends_two_origin_zeros() {
        let paz = build_combined_paz(&sensor_plus_digitizer("m/s**2"), OutputUnit::Disp).unwrap();
        assert_eq!(paz.zeros.len(), 2);
        assert!(paz.zeros.iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn test_acceleration_to_vel_appends_one_origin_zero() {
        let paz = build_combined_paz(&sensor_plus_digitizer("m/s**2"), OutputUnit::Vel).unwrap();
        assert_eq!(paz.zeros.len(), 1);
    }

    #[test]
    fn test_velocity_to_vel_appends_nothing() {
        let paz = build_combined_paz(&sensor_plus_digitizer("m/s"), OutputUnit::Vel).unwrap();
        assert!(paz.zeros.is_empty());
    }

    #[test]
    fn test_acc_output_is_fatal_for_any_input() {
        for input in ["m/s", "m/s**2"] {
            let err =
                build_combined_paz(&sensor_plus_digitizer(input), OutputUnit::Acc).unwrap_err();
            assert!(err.is_fatal());
            assert!(matches!(err, PazError::UnsupportedOutputUnit(_)));
        }
    }

    #[test]
    fn test_unknown_input_units_is_fatal() {
        let err = build_combined_paz(&sensor_plus_digitizer("pa"), OutputUnit::Disp).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PazError::UnsupportedInputUnits(_)));
    }

    #[test]
    fn test_gain_and_sensitivity_products() {
        let paz = build_combined_paz(&sensor_plus_digitizer("m/s"), OutputUnit::Disp).unwrap();
        // gain skips the stage without a normalization factor
        assert_eq!(paz.gain, 6.0);
        assert_eq!(paz.sensitivity, 1500.0 * 1000000.0 * 2.0);
    }

    #[test]
    fn test_no_paz_stage_is_recoverable() {
        let stages = vec![stage(10.0, None, None, "m/s")];
        let err = build_combined_paz(&stages, OutputUnit::Disp).unwrap_err();
        assert!(!err.is_fatal());
    }
}
