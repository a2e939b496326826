// Waveform trace types
// A Trace is one continuous, time-indexed run of samples for a single channel

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Station/event descriptor attached to a trace for header embedding.
/// Read from the on-disk catalog and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationEvent {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,

    /// Station latitude in degrees
    pub latitude: f64,

    /// Station longitude in degrees
    pub longitude: f64,

    /// Station elevation in meters
    pub elevation: f64,

    /// Station (borehole) depth in meters
    pub depth: f64,
}

/// One contiguous decoded block of samples, as produced by the container
/// reader. Several segments of the same channel are merged into a Trace
/// by the assembler.
#[derive(Debug, Clone)]
pub struct Segment {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,

    /// Sampling rate in Hz
    pub sample_rate: f64,

    /// Time of the first sample
    pub starttime: DateTime<Utc>,

    pub samples: Vec<f64>,
}

impl Segment {
    /// Time of the last sample
    pub fn endtime(&self) -> DateTime<Utc> {
        sample_time(self.starttime, self.sample_rate, self.samples.len())
    }
}

/// A single continuous waveform plus its identity metadata.
///
/// Samples are mutated in place as processing stages run; a Trace is owned
/// exclusively by the pipeline invocation that produced it until written out.
#[derive(Debug, Clone)]
pub struct Trace {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,

    /// Sampling rate in Hz
    pub sample_rate: f64,

    /// Time of the first sample
    pub starttime: DateTime<Utc>,

    pub samples: Vec<f64>,

    /// Station/event record for SAC header enrichment, if attached
    pub station_event: Option<StationEvent>,
}

impl Trace {
    /// Build a trace from a single decoded segment.
    pub fn from_segment(seg: Segment) -> Self {
        Trace {
            network: seg.network,
            station: seg.station,
            location: seg.location,
            channel: seg.channel,
            sample_rate: seg.sample_rate,
            starttime: seg.starttime,
            samples: seg.samples,
            station_event: None,
        }
    }

    /// Fully-qualified channel identifier, `NET.STA.LOC.CHA`
    pub fn id(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// Sample interval in seconds
    pub fn delta(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn npts(&self) -> usize {
        self.samples.len()
    }

    /// Time of the last sample
    pub fn endtime(&self) -> DateTime<Utc> {
        sample_time(self.starttime, self.sample_rate, self.samples.len())
    }

    /// Remove the mean from the samples in place.
    pub fn demean(&mut self) {
        if self.samples.is_empty() {
            return;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        for s in self.samples.iter_mut() {
            *s -= mean;
        }
    }

    /// Remove a least-squares linear trend from the samples in place.
    pub fn detrend(&mut self) {
        let n = self.samples.len();
        if n < 2 {
            return;
        }
        // Fit y = a + b*x with x = 0..n-1
        let nf = n as f64;
        let sum_x = nf * (nf - 1.0) / 2.0;
        let sum_x2 = (nf - 1.0) * nf * (2.0 * nf - 1.0) / 6.0;
        let sum_y: f64 = self.samples.iter().sum();
        let sum_xy: f64 = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, y)| i as f64 * y)
            .sum();
        let denom = nf * sum_x2 - sum_x * sum_x;
        if denom.abs() < f64::EPSILON {
            return;
        }
        let b = (nf * sum_xy - sum_x * sum_y) / denom;
        let a = (sum_y - b * sum_x) / nf;
        for (i, s) in self.samples.iter_mut().enumerate() {
            *s -= a + b * i as f64;
        }
    }

    /// Apply a Hann taper of the given fractional width to both ends
    /// of the trace (e.g. 0.05 tapers 5% of the samples on each side).
    pub fn taper(&mut self, width: f64) {
        let n = self.samples.len();
        let taper_len = ((n as f64) * width.clamp(0.0, 0.5)) as usize;
        if taper_len == 0 {
            return;
        }
        for i in 0..taper_len {
            let w = 0.5 * (1.0 - (std::f64::consts::PI * i as f64 / taper_len as f64).cos());
            self.samples[i] *= w;
            self.samples[n - 1 - i] *= w;
        }
    }
}

/// Time of the last sample of a run starting at `start` with `npts` samples.
fn sample_time(start: DateTime<Utc>, sample_rate: f64, npts: usize) -> DateTime<Utc> {
    if npts == 0 {
        return start;
    }
    let span_us = (npts as f64 - 1.0) / sample_rate * 1e6;
    start + Duration::microseconds(span_us.round() as i64)
}
