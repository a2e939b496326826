// Processing module
// Resampling, instrument correction and the per-trace pipeline

pub mod correction;
pub mod pipeline;
pub mod resample;

pub use correction::{CorrectionError, InstrumentHandler, WaterLevelDeconvolver};
pub use pipeline::{process_unit, write_trace, PipelineError};
pub use resample::{resample, ResampleError, ResampleMethod};
