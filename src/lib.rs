// seismoproc - seismic waveform post-processing
// Module declarations

pub mod config;
pub mod process;
pub mod response;
pub mod waveform;

pub use config::{ConfigError, ProcessingConfig};
pub use process::{process_unit, InstrumentHandler, ResampleMethod, WaterLevelDeconvolver};
pub use response::{
    build_combined_paz, CombinedPaz, OutputUnit, ResponseValidator, ValidatorConfig,
};
pub use waveform::{assemble, StationEvent, Trace};
