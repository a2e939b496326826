// Trace assembler
// Loads the stored waveform segments for one channel and merges them into
// a single continuous trace, filling gaps with zeros (no interpolation)

use std::path::Path;
use thiserror::Error;

use super::container::{read_segments, ContainerError};
use super::trace::{Segment, Trace};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to decode waveform: {0}")]
    Decode(#[from] ContainerError),

    #[error("segments have mismatched sampling rates: {0} vs {1}")]
    RateMismatch(f64, f64),
}

/// Read one stored waveform file and return exactly one trace.
///
/// If decoding yields more than one segment (gapped data), the segments are
/// merged in start-time order with fixed-value zero gap fill and no smoothing
/// across the joins. Overlapping samples keep the earlier segment's data.
pub fn assemble(path: &Path) -> Result<Trace, AssembleError> {
    let mut segments = read_segments(path)?;
    segments.sort_by_key(|s| s.starttime);

    if segments.len() > 1 {
        log::debug!(
            "merging {} segments from {}",
            segments.len(),
            path.display()
        );
    }

    let mut iter = segments.into_iter();
    let Some(first) = iter.next() else {
        return Err(ContainerError::Empty.into());
    };
    let mut trace = Trace::from_segment(first);

    for seg in iter {
        merge_into(&mut trace, seg)?;
    }
    Ok(trace)
}

/// Append a later segment onto the trace, zero-filling any gap between the
/// end of the trace and the start of the segment. A negative gap (overlap)
/// drops the overlapped prefix of the incoming segment.
fn merge_into(trace: &mut Trace, seg: Segment) -> Result<(), AssembleError> {
    if (seg.sample_rate - trace.sample_rate).abs() > 1e-9 {
        return Err(AssembleError::RateMismatch(
            trace.sample_rate,
            seg.sample_rate,
        ));
    }

    let delta = trace.delta();
    let lag_secs = (seg.starttime - trace.endtime())
        .num_microseconds()
        .unwrap_or(0) as f64
        / 1e6;
    // Number of missing samples between the last trace sample and the
    // first segment sample
    let gap = (lag_secs / delta).round() as i64 - 1;

    if gap > 0 {
        trace.samples.extend(std::iter::repeat(0.0).take(gap as usize));
        trace.samples.extend(seg.samples);
    } else if gap < 0 {
        let skip = (-gap) as usize;
        if skip < seg.samples.len() {
            trace.samples.extend(seg.samples[skip..].iter().copied());
        }
        // Segment entirely inside already-covered time: nothing to add
    } else {
        trace.samples.extend(seg.samples);
    }
    Ok(())
}
