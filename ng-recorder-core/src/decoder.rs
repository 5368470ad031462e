//! Paged archive reads and demultiplexing of recording point payloads into
//! named measurements.
use crate::{
    error::RecorderResult,
    payload::{PayloadCodec, Series, TypedRecord},
    recording_config::{Algorithm, DataKind, RecordingConfiguration, RecordingExtremals},
    wire::{read_byte_string, read_u32, DecodeBinary, UaDateTime},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;

/// One archived point as delivered by `ReadByStartAndCount`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingPoint {
    pub config_id: u32,
    pub data: Bytes,
}

impl DecodeBinary for RecordingPoint {
    const BINARY_ENCODING_ID: u32 = 5021;

    fn decode(buf: &mut Bytes) -> RecorderResult<Self> {
        let config_id = read_u32(buf)?;
        let data = read_byte_string(buf)?;
        Ok(Self { config_id, data })
    }
}

/// Response of one paged read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Start time for the next request.
    pub cursor: UaDateTime,
    pub points: Vec<RecordingPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasuredValue {
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

macro_rules! measured_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for MeasuredValue {
            fn from(v: $ty) -> Self {
                MeasuredValue::$variant(v)
            }
        })*
    };
}

measured_from!(
    bool => Boolean,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMeasurement {
    pub name: String,
    pub algorithm: Algorithm,
    /// Sample or average, per `algorithm`.
    pub value: MeasuredValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<MeasuredValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<MeasuredValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPoint {
    pub timestamp: DateTime<Utc>,
    pub config_id: u32,
    pub measurements: Vec<DecodedMeasurement>,
}

/// Source of paged archive batches.
#[async_trait]
pub trait BatchSource: Send {
    async fn fetch(&mut self, start: UaDateTime, count: u32) -> RecorderResult<Batch>;
}

/// Read-through access to recording configurations by id.
#[async_trait]
pub trait ConfigurationSource: Send {
    async fn configuration(&mut self, id: u32) -> RecorderResult<Arc<RecordingConfiguration>>;
}

/// Receives decoded points in archive order.
pub trait PointSink: Send {
    fn accept(&mut self, recording_id: u32, point: &DecodedPoint) -> RecorderResult<()>;
}

impl PointSink for Vec<DecodedPoint> {
    fn accept(&mut self, _recording_id: u32, point: &DecodedPoint) -> RecorderResult<()> {
        self.push(point.clone());
        Ok(())
    }
}

fn posix_time(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn measure<T>(
    series: &Series<T>,
    slot: usize,
    algorithm: Algorithm,
    extremals: RecordingExtremals,
    name: String,
) -> Option<DecodedMeasurement>
where
    T: Copy + Into<MeasuredValue>,
{
    let primary = match algorithm {
        Algorithm::Average => &series.average,
        Algorithm::Sample => &series.sample,
    };
    let value = (*primary.get(slot)?).into();
    let min = extremals
        .minimum
        .then(|| series.minimum.get(slot).map(|v| (*v).into()))
        .flatten();
    let max = extremals
        .maximum
        .then(|| series.maximum.get(slot).map(|v| (*v).into()))
        .flatten();
    let min_time = (extremals.minimum && extremals.timestamps)
        .then(|| series.minimum_time.get(slot).and_then(|t| posix_time(*t)))
        .flatten();
    let max_time = (extremals.maximum && extremals.timestamps)
        .then(|| series.maximum_time.get(slot).and_then(|t| posix_time(*t)))
        .flatten();
    Some(DecodedMeasurement {
        name,
        algorithm,
        value,
        min,
        max,
        min_time,
        max_time,
    })
}

/// Map the per-kind arrays of `record` onto the configured values.
///
/// The position of a value inside its kind's array is the number of values
/// of the same kind configured before it, whether available or not.
pub fn demultiplex(config: &RecordingConfiguration, record: &TypedRecord) -> Vec<DecodedMeasurement> {
    let mut slots = [0usize; DataKind::COUNT];
    let mut measurements = Vec::with_capacity(config.values.len());

    for descriptor in &config.values {
        let kind = descriptor.kind;
        let slot = slots[kind.index()];
        slots[kind.index()] += 1;

        let Some(name) = descriptor.label() else {
            continue;
        };
        let (algorithm, extremals) = (config.algorithm, config.extremals);
        let measurement = match kind {
            DataKind::Boolean => measure(&record.boolean, slot, algorithm, extremals, name),
            DataKind::Int32 => measure(&record.int32, slot, algorithm, extremals, name),
            DataKind::UInt32 => measure(&record.uint32, slot, algorithm, extremals, name),
            DataKind::Int64 => measure(&record.int64, slot, algorithm, extremals, name),
            DataKind::UInt64 => measure(&record.uint64, slot, algorithm, extremals, name),
            DataKind::Float32 => measure(&record.float32, slot, algorithm, extremals, name),
            DataKind::Float64 => measure(&record.float64, slot, algorithm, extremals, name),
            DataKind::Undefined => {
                tracing::warn!(
                    config_id = config.id,
                    node = %descriptor.node,
                    "Available value with undefined data type"
                );
                continue;
            }
        };
        match measurement {
            Some(m) => measurements.push(m),
            None => tracing::warn!(
                config_id = config.id,
                node = %descriptor.node,
                kind = ?kind,
                slot,
                "Payload has no element for configured value"
            ),
        }
    }
    measurements
}

/// Counters of one paged read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub requests: u32,
    pub received: u32,
    pub decoded: u32,
    pub skipped: u32,
}

/// Drives paged reads of one recording and demultiplexes every point.
pub struct RecordingDataDecoder<'a> {
    recording_id: u32,
    codec: &'a dyn PayloadCodec,
}

impl<'a> RecordingDataDecoder<'a> {
    pub fn new(recording_id: u32, codec: &'a dyn PayloadCodec) -> Self {
        Self {
            recording_id,
            codec,
        }
    }

    /// Read up to `count` points starting at `start`.
    ///
    /// Stops without error when the cursor stops advancing or a batch comes
    /// back empty. A failing fetch aborts the read.
    pub async fn read<B, C>(
        &self,
        batches: &mut B,
        configs: &mut C,
        start: UaDateTime,
        count: u32,
        sink: &mut dyn PointSink,
    ) -> RecorderResult<ReadSummary>
    where
        B: BatchSource + ?Sized,
        C: ConfigurationSource + ?Sized,
    {
        let mut summary = ReadSummary::default();
        let mut cursor = start;
        let mut remaining = count;

        while remaining > 0 {
            let batch = batches.fetch(cursor, remaining).await?;
            summary.requests += 1;

            let stalled = batch.cursor <= cursor;
            if stalled {
                tracing::warn!(
                    recording_id = self.recording_id,
                    start = %cursor,
                    cursor = %batch.cursor,
                    "Returned cursor is not after the request start, stopping"
                );
            }

            let received = batch.points.len();
            summary.received += received as u32;
            for point in batch.points {
                if self.decode_point(point, configs, sink).await? {
                    summary.decoded += 1;
                } else {
                    summary.skipped += 1;
                }
            }

            if stalled {
                break;
            }
            if received == 0 {
                tracing::warn!(
                    recording_id = self.recording_id,
                    remaining,
                    "No recording points returned while more were expected, stopping"
                );
                break;
            }
            cursor = batch.cursor;
            remaining = remaining.saturating_sub(received as u32);
        }

        tracing::debug!(recording_id = self.recording_id, ?summary, "Paged read finished");
        Ok(summary)
    }

    /// Decode and emit one point. Returns `false` when the payload was
    /// unreadable and the point was skipped.
    async fn decode_point<C>(
        &self,
        point: RecordingPoint,
        configs: &mut C,
        sink: &mut dyn PointSink,
    ) -> RecorderResult<bool>
    where
        C: ConfigurationSource + ?Sized,
    {
        let record = match self.codec.decode(&point.data) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    recording_id = self.recording_id,
                    config_id = point.config_id,
                    error = %e,
                    "Failed to decode recording point payload"
                );
                return Ok(false);
            }
        };
        let config = configs.configuration(point.config_id).await?;
        let decoded = DecodedPoint {
            timestamp: record.timestamp,
            config_id: point.config_id,
            measurements: demultiplex(&config, &record),
        };
        sink.accept(self.recording_id, &decoded)?;
        Ok(true)
    }
}
