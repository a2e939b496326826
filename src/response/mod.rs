// Instrument response module
// Stage metadata, combined PAZ modeling, response evaluation and validation

pub mod evalresp;
pub mod paz;
pub mod stage;
pub mod validator;

pub use evalresp::{paz_to_freq_resp, EvalError, PazCascadeEvaluator, ResponseEvaluator};
pub use paz::{build_combined_paz, CombinedPaz, OutputUnit, PazError};
pub use stage::{read_channel_responses, ChannelResponse, MetadataError, ResponseStage};
pub use validator::{
    ChannelReport, ChannelVerdict, ResponseValidator, ValidatorConfig, ValidatorError,
    REPORT_FILE_NAME,
};
