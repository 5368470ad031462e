//! Recording point payloads: the typed record view used for demultiplexing
//! and the protobuf codec that produces it.
use crate::error::{RecorderError, RecorderResult};
use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

/// Per-kind value arrays of one archive point. All vectors are indexed by
/// the same per-kind position.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<T> {
    pub sample: Vec<T>,
    pub average: Vec<T>,
    pub minimum: Vec<T>,
    pub maximum: Vec<T>,
    /// POSIX seconds.
    pub minimum_time: Vec<i64>,
    pub maximum_time: Vec<i64>,
}

impl<T> Default for Series<T> {
    fn default() -> Self {
        Self {
            sample: Vec::new(),
            average: Vec::new(),
            minimum: Vec::new(),
            maximum: Vec::new(),
            minimum_time: Vec::new(),
            maximum_time: Vec::new(),
        }
    }
}

/// Decoded payload of one recording point.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord {
    pub timestamp: DateTime<Utc>,
    pub boolean: Series<bool>,
    pub int32: Series<i32>,
    pub uint32: Series<u32>,
    pub int64: Series<i64>,
    pub uint64: Series<u64>,
    pub float32: Series<f32>,
    pub float64: Series<f64>,
}

impl Default for TypedRecord {
    fn default() -> Self {
        Self {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            boolean: Series::default(),
            int32: Series::default(),
            uint32: Series::default(),
            int64: Series::default(),
            uint64: Series::default(),
            float32: Series::default(),
            float64: Series::default(),
        }
    }
}

/// Turns an opaque recording point payload into a [`TypedRecord`].
pub trait PayloadCodec: Send + Sync {
    fn decode(&self, payload: &[u8]) -> RecorderResult<TypedRecord>;
}

/// Wire messages of the device's recorded data payload.
pub mod proto {
    macro_rules! value_series {
        ($name:ident, $pty:ident, $rty:ty) => {
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct $name {
                #[prost($pty, repeated, tag = "1")]
                pub sample: ::prost::alloc::vec::Vec<$rty>,
                #[prost($pty, repeated, tag = "2")]
                pub avg_value: ::prost::alloc::vec::Vec<$rty>,
                #[prost($pty, repeated, tag = "3")]
                pub min_value: ::prost::alloc::vec::Vec<$rty>,
                #[prost($pty, repeated, tag = "4")]
                pub max_value: ::prost::alloc::vec::Vec<$rty>,
                #[prost(int64, repeated, tag = "5")]
                pub min_timestamp: ::prost::alloc::vec::Vec<i64>,
                #[prost(int64, repeated, tag = "6")]
                pub max_timestamp: ::prost::alloc::vec::Vec<i64>,
            }
        };
    }

    value_series!(BoolSeries, bool, bool);
    value_series!(Sint32Series, sint32, i32);
    value_series!(Uint32Series, uint32, u32);
    value_series!(Sint64Series, sint64, i64);
    value_series!(Uint64Series, uint64, u64);
    value_series!(FloatSeries, float, f32);
    value_series!(DoubleSeries, double, f64);

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RecordedData {
        /// POSIX seconds.
        #[prost(int64, tag = "1")]
        pub start_time_utc: i64,
        #[prost(message, optional, tag = "2")]
        pub bool_values: ::core::option::Option<BoolSeries>,
        #[prost(message, optional, tag = "3")]
        pub sint32_values: ::core::option::Option<Sint32Series>,
        #[prost(message, optional, tag = "4")]
        pub uint32_values: ::core::option::Option<Uint32Series>,
        #[prost(message, optional, tag = "5")]
        pub sint64_values: ::core::option::Option<Sint64Series>,
        #[prost(message, optional, tag = "6")]
        pub uint64_values: ::core::option::Option<Uint64Series>,
        #[prost(message, optional, tag = "7")]
        pub float_values: ::core::option::Option<FloatSeries>,
        #[prost(message, optional, tag = "8")]
        pub double_values: ::core::option::Option<DoubleSeries>,
    }
}

macro_rules! into_series {
    ($msg:expr) => {
        match $msg {
            Some(m) => Series {
                sample: m.sample,
                average: m.avg_value,
                minimum: m.min_value,
                maximum: m.max_value,
                minimum_time: m.min_timestamp,
                maximum_time: m.max_timestamp,
            },
            None => Series::default(),
        }
    };
}

/// Codec for the protobuf `RecordedData` payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufPayloadCodec;

impl PayloadCodec for ProtobufPayloadCodec {
    fn decode(&self, payload: &[u8]) -> RecorderResult<TypedRecord> {
        let data = proto::RecordedData::decode(payload)
            .map_err(|e| RecorderError::Codec(format!("recorded data: {e}")))?;
        let timestamp = Utc
            .timestamp_opt(data.start_time_utc, 0)
            .single()
            .ok_or_else(|| {
                RecorderError::Codec(format!("start time {} out of range", data.start_time_utc))
            })?;
        Ok(TypedRecord {
            timestamp,
            boolean: into_series!(data.bool_values),
            int32: into_series!(data.sint32_values),
            uint32: into_series!(data.uint32_values),
            int64: into_series!(data.sint64_values),
            uint64: into_series!(data.uint64_values),
            float32: into_series!(data.float_values),
            float64: into_series!(data.double_values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_float_series() {
        let msg = proto::RecordedData {
            start_time_utc: 1_630_929_600,
            float_values: Some(proto::FloatSeries {
                sample: vec![10.0, 20.0],
                min_value: vec![9.5, 19.5],
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = ProtobufPayloadCodec.decode(&msg.encode_to_vec()).unwrap();
        assert_eq!(record.timestamp.timestamp(), 1_630_929_600);
        assert_eq!(record.float32.sample, vec![10.0, 20.0]);
        assert_eq!(record.float32.minimum, vec![9.5, 19.5]);
        assert!(record.float64.sample.is_empty());
        assert!(record.boolean.sample.is_empty());
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = ProtobufPayloadCodec.decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, RecorderError::Codec(_)));
    }
}
