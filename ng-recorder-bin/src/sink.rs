use chrono::{DateTime, Utc};
use ng_recorder_core::{
    Algorithm, DecodedMeasurement, DecodedPoint, MeasuredValue, PointSink, RecorderError,
    RecorderResult,
};
use serde::{Serialize, Serializer};
use std::io::Write;

/// One output line per decoded point.
#[derive(Debug, Serialize)]
struct Line<'a> {
    recording: u32,
    time: DateTime<Utc>,
    config: u32,
    values: Values<'a>,
}

/// Measurements keyed by name, in the order the configuration lists them.
/// Repeated names are written as repeated keys.
#[derive(Debug)]
struct Values<'a>(&'a [DecodedMeasurement]);

impl Serialize for Values<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|m| (m.name.as_str(), Entry::from(m))))
    }
}

#[derive(Debug, Default, Serialize)]
struct Entry {
    #[serde(skip_serializing_if = "Option::is_none")]
    sample: Option<MeasuredValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avg: Option<MeasuredValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<MeasuredValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<MeasuredValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_time: Option<DateTime<Utc>>,
}

impl From<&DecodedMeasurement> for Entry {
    fn from(m: &DecodedMeasurement) -> Self {
        let mut entry = Entry {
            min: m.min,
            max: m.max,
            min_time: m.min_time,
            max_time: m.max_time,
            ..Default::default()
        };
        match m.algorithm {
            Algorithm::Sample => entry.sample = Some(m.value),
            Algorithm::Average => entry.avg = Some(m.value),
        }
        entry
    }
}

/// Writes every decoded point as a JSON object on its own line.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
    written: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> RecorderResult<()> {
        self.out
            .flush()
            .map_err(|e| RecorderError::InternalError(format!("flush output: {e}")))
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> PointSink for JsonLinesSink<W> {
    fn accept(&mut self, recording_id: u32, point: &DecodedPoint) -> RecorderResult<()> {
        let line = Line {
            recording: recording_id,
            time: point.timestamp,
            config: point.config_id,
            values: Values(&point.measurements),
        };
        serde_json::to_writer(&mut self.out, &line)
            .map_err(|e| RecorderError::Codec(format!("serialize point: {e}")))?;
        self.out
            .write_all(b"\n")
            .map_err(|e| RecorderError::InternalError(format!("write output: {e}")))?;
        self.written += 1;
        Ok(())
    }
}
