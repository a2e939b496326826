// Generic segmented waveform container
// Record-based binary format: each record carries one contiguous run of
// samples plus its channel identity, start time and sampling rate. A file
// with several records for one channel represents a gapped waveform.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

use super::trace::{Segment, Trace};

/// Magic bytes opening every record
const RECORD_MAGIC: &[u8; 4] = b"SGC1";

/// Upper bound on the up-front sample allocation per record. A corrupt
/// header can claim billions of samples; reads past this bound grow the
/// vector incrementally until the data runs out.
const PREALLOC_SAMPLES: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("bad record magic at offset {0}")]
    BadMagic(u64),

    #[error("record field is not valid UTF-8")]
    BadIdentifier,

    #[error("record start time out of range: {0} us")]
    BadTimestamp(i64),

    #[error("no records in container file")]
    Empty,
}

/// Read every record of a container file, in file order.
/// An empty file (zero records) is an error.
pub fn read_segments(path: &Path) -> Result<Vec<Segment>, ContainerError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut segments = Vec::new();
    let mut offset: u64 = 0;

    loop {
        let mut magic = [0u8; 4];
        match reader.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        if &magic != RECORD_MAGIC {
            return Err(ContainerError::BadMagic(offset));
        }

        let network = read_string(&mut reader)?;
        let station = read_string(&mut reader)?;
        let location = read_string(&mut reader)?;
        let channel = read_string(&mut reader)?;

        let start_us = reader.read_i64::<LittleEndian>()?;
        let starttime = Utc
            .timestamp_micros(start_us)
            .single()
            .ok_or(ContainerError::BadTimestamp(start_us))?;
        let sample_rate = reader.read_f64::<LittleEndian>()?;
        let npts = reader.read_u32::<LittleEndian>()? as usize;

        let mut samples = Vec::with_capacity(npts.min(PREALLOC_SAMPLES));
        for _ in 0..npts {
            samples.push(reader.read_f64::<LittleEndian>()?);
        }

        offset += record_len(&network, &station, &location, &channel, npts);
        segments.push(Segment {
            network,
            station,
            location,
            channel,
            sample_rate,
            starttime,
            samples,
        });
    }

    if segments.is_empty() {
        return Err(ContainerError::Empty);
    }
    Ok(segments)
}

/// Write a trace as a single container record, replacing any existing file.
pub fn write_record(trace: &Trace, path: &Path) -> Result<(), ContainerError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    append_record(
        &mut writer,
        &trace.network,
        &trace.station,
        &trace.location,
        &trace.channel,
        trace.starttime,
        trace.sample_rate,
        &trace.samples,
    )?;
    writer.flush()?;
    Ok(())
}

/// Append one record to an open writer. Used by the serializer (one record
/// per file) and by tests building gapped multi-record fixtures.
#[allow(clippy::too_many_arguments)]
pub fn append_record<W: Write>(
    writer: &mut W,
    network: &str,
    station: &str,
    location: &str,
    channel: &str,
    starttime: DateTime<Utc>,
    sample_rate: f64,
    samples: &[f64],
) -> Result<(), ContainerError> {
    writer.write_all(RECORD_MAGIC)?;
    write_string(writer, network)?;
    write_string(writer, station)?;
    write_string(writer, location)?;
    write_string(writer, channel)?;
    writer.write_i64::<LittleEndian>(starttime.timestamp_micros())?;
    writer.write_f64::<LittleEndian>(sample_rate)?;
    writer.write_u32::<LittleEndian>(samples.len() as u32)?;
    for s in samples {
        writer.write_f64::<LittleEndian>(*s)?;
    }
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, ContainerError> {
    let len = reader.read_u8()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ContainerError::BadIdentifier)
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), ContainerError> {
    let bytes = value.as_bytes();
    writer.write_u8(bytes.len().min(u8::MAX as usize) as u8)?;
    writer.write_all(&bytes[..bytes.len().min(u8::MAX as usize)])?;
    Ok(())
}

fn record_len(net: &str, sta: &str, loc: &str, cha: &str, npts: usize) -> u64 {
    (4 + 4
        + net.len()
        + sta.len()
        + loc.len()
        + cha.len()
        + 8
        + 8
        + 4
        + npts * 8) as u64
}
