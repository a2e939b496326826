// Waveform module
// Trace/segment types, container decoding, gap merging and SAC output

pub mod assembler;
pub mod container;
pub mod sac;
pub mod trace;

pub use assembler::{assemble, AssembleError};
pub use container::{read_segments, write_record, ContainerError};
pub use sac::{convert_to_sac, write_sac};
pub use trace::{Segment, StationEvent, Trace};
