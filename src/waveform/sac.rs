// SAC binary writer
// Single-precision, little-endian SAC (NVHDR 6): 70 float header words,
// 40 integer words, 192 bytes of character fields, then the sample data.

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{Datelike, Timelike};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::trace::{StationEvent, Trace};

/// SAC sentinel for unset numeric header fields
const UNDEF_F: f32 = -12345.0;
const UNDEF_I: i32 = -12345;
const UNDEF_K: &str = "-12345";

// Float word indices
const F_DELTA: usize = 0;
const F_B: usize = 5;
const F_E: usize = 6;
const F_STLA: usize = 31;
const F_STLO: usize = 32;
const F_STEL: usize = 33;
const F_STDP: usize = 34;

// Integer word indices
const I_NZYEAR: usize = 0;
const I_NZJDAY: usize = 1;
const I_NZHOUR: usize = 2;
const I_NZMIN: usize = 3;
const I_NZSEC: usize = 4;
const I_NZMSEC: usize = 5;
const I_NVHDR: usize = 6;
const I_NPTS: usize = 9;
const I_IFTYPE: usize = 15;
const I_IZTYPE: usize = 17;
const I_LEVEN: usize = 35;
const I_LOVROK: usize = 37;
const I_LCALDA: usize = 38;

/// IFTYPE value for an evenly-sampled time series
const ITIME: i32 = 1;
/// IZTYPE value: reference time is the begin time
const IB: i32 = 9;

/// Attach the station/event descriptor to the trace so the SAC writer can
/// embed it in the header. The identity fields are overwritten from the
/// descriptor, matching the catalog entry the descriptor came from.
pub fn convert_to_sac(mut trace: Trace, staev: &StationEvent) -> Trace {
    trace.network = staev.network.clone();
    trace.station = staev.station.clone();
    trace.location = staev.location.clone();
    trace.channel = staev.channel.clone();
    trace.station_event = Some(staev.clone());
    trace
}

/// Write the trace to `path` in SAC binary form. Coordinates, elevation and
/// depth come from the attached station/event record when present; absent
/// fields stay at the SAC undefined sentinel.
pub fn write_sac(trace: &Trace, path: &Path) -> Result<(), io::Error> {
    let mut floats = [UNDEF_F; 70];
    let mut ints = [UNDEF_I; 40];
    let mut chars = [0u8; 192];

    // Character fields default to the "-12345" sentinel
    for i in 0..23 {
        let (offset, width) = char_field(i);
        write_char_field(&mut chars, offset, width, UNDEF_K);
    }

    let delta = trace.delta();
    floats[F_DELTA] = delta as f32;
    floats[F_B] = 0.0;
    floats[F_E] = ((trace.npts().saturating_sub(1)) as f64 * delta) as f32;

    if let Some(staev) = &trace.station_event {
        floats[F_STLA] = staev.latitude as f32;
        floats[F_STLO] = staev.longitude as f32;
        floats[F_STEL] = staev.elevation as f32;
        floats[F_STDP] = staev.depth as f32;
    }

    let t = trace.starttime;
    ints[I_NZYEAR] = t.year();
    ints[I_NZJDAY] = t.ordinal() as i32;
    ints[I_NZHOUR] = t.hour() as i32;
    ints[I_NZMIN] = t.minute() as i32;
    ints[I_NZSEC] = t.second() as i32;
    ints[I_NZMSEC] = (t.timestamp_subsec_millis()) as i32;
    ints[I_NVHDR] = 6;
    ints[I_NPTS] = trace.npts() as i32;
    ints[I_IFTYPE] = ITIME;
    ints[I_IZTYPE] = IB;
    ints[I_LEVEN] = 1;
    ints[I_LOVROK] = 1;
    ints[I_LCALDA] = 1;

    write_char_field(&mut chars, KSTNM_OFFSET, 8, &trace.station);
    write_char_field(&mut chars, KHOLE_OFFSET, 8, &trace.location);
    write_char_field(&mut chars, KCMPNM_OFFSET, 8, &trace.channel);
    write_char_field(&mut chars, KNETWK_OFFSET, 8, &trace.network);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for f in &floats {
        writer.write_f32::<LittleEndian>(*f)?;
    }
    for i in &ints {
        writer.write_i32::<LittleEndian>(*i)?;
    }
    writer.write_all(&chars)?;
    for s in &trace.samples {
        writer.write_f32::<LittleEndian>(*s as f32)?;
    }
    writer.flush()?;
    Ok(())
}

// Byte offsets of the character fields we populate, within the 192-byte block
const KSTNM_OFFSET: usize = 0;
const KHOLE_OFFSET: usize = 24;
const KCMPNM_OFFSET: usize = 160;
const KNETWK_OFFSET: usize = 168;

/// Offset and width of the i-th character field. KEVNM (index 1) is the
/// only 16-byte field; all others are 8 bytes.
fn char_field(index: usize) -> (usize, usize) {
    if index == 0 {
        (0, 8)
    } else if index == 1 {
        (8, 16)
    } else {
        (8 + 16 + (index - 2) * 8, 8)
    }
}

/// Space-padded, truncating copy into a fixed-width header slot.
fn write_char_field(block: &mut [u8], offset: usize, width: usize, value: &str) {
    let bytes = value.as_bytes();
    for i in 0..width {
        block[offset + i] = if i < bytes.len() { bytes[i] } else { b' ' };
    }
}
