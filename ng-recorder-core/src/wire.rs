//! Values exchanged with the protocol client and the OPC UA binary rules
//! needed to unpack the device-specific structures carried in extension
//! objects.
use crate::{
    error::{RecorderError, RecorderResult},
    node_id::{identifier_type, NodeIdentifier, WireNodeId, WirePayload},
};
use bytes::{Buf, Bytes};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// OPC UA `DateTime`: 100 ns ticks since 1601-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UaDateTime(pub i64);

impl UaDateTime {
    /// Ticks between 1601-01-01 and 1970-01-01.
    pub const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;
    pub const TICKS_PER_SECOND: i64 = 10_000_000;
    const TICKS_PER_MICRO: i64 = 10;

    #[inline]
    pub fn ticks(&self) -> i64 {
        self.0
    }

    pub fn from_unix_seconds(secs: i64) -> Self {
        UaDateTime(
            secs.saturating_mul(Self::TICKS_PER_SECOND)
                .saturating_add(Self::UNIX_EPOCH_TICKS),
        )
    }

    pub fn from_chrono(dt: DateTime<Utc>) -> Self {
        UaDateTime(
            dt.timestamp_micros()
                .saturating_mul(Self::TICKS_PER_MICRO)
                .saturating_add(Self::UNIX_EPOCH_TICKS),
        )
    }

    /// `None` when the tick count is outside chrono's range.
    pub fn to_chrono(&self) -> Option<DateTime<Utc>> {
        let micros = (self.0 - Self::UNIX_EPOCH_TICKS) / Self::TICKS_PER_MICRO;
        Utc.timestamp_micros(micros).single()
    }
}

impl fmt::Display for UaDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "{}", dt.format("%a %b %d %T %Y")),
            None => write!(f, "ticks({})", self.0),
        }
    }
}

/// Extension object as delivered by the protocol client: the binary encoding
/// id of the structure plus its undecoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionObject {
    pub type_id: NodeIdentifier,
    pub body: Bytes,
}

impl ExtensionObject {
    const BODY_NONE: u8 = 0x00;
    const BODY_BINARY: u8 = 0x01;
    const BODY_XML: u8 = 0x02;

    /// Decode a complete binary-encoded extension object
    /// (`NodeId`, encoding byte, length-prefixed body).
    pub fn decode(buf: &mut Bytes) -> RecorderResult<Self> {
        let type_id = NodeIdentifier::from_wire(&read_node_id(buf)?);
        let encoding = read_u8(buf)?;
        let body = match encoding {
            Self::BODY_NONE => Bytes::new(),
            Self::BODY_BINARY | Self::BODY_XML => read_byte_string(buf)?,
            other => {
                return Err(RecorderError::Codec(format!(
                    "unsupported extension object encoding 0x{other:02x}"
                )))
            }
        };
        Ok(Self { type_id, body })
    }

    /// Decode the body as a device structure.
    pub fn decode_body<T: DecodeBinary>(&self) -> RecorderResult<T> {
        let expected = NodeIdentifier::Numeric(T::NAMESPACE, T::BINARY_ENCODING_ID);
        if self.type_id != expected {
            tracing::warn!(
                expected = %expected,
                actual = %self.type_id,
                "Extension object encoding id mismatch"
            );
        }
        let mut body = self.body.clone();
        T::decode(&mut body)
    }
}

/// Abstract variant value exchanged with the protocol client.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WireVariant {
    #[default]
    Empty,
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(UaDateTime),
    ByteString(Bytes),
    NodeId(NodeIdentifier),
    ExtensionObject(ExtensionObject),
    Array(Vec<WireVariant>),
}

impl WireVariant {
    pub fn type_name(&self) -> &'static str {
        match self {
            WireVariant::Empty => "Empty",
            WireVariant::Boolean(_) => "Boolean",
            WireVariant::Int32(_) => "Int32",
            WireVariant::UInt32(_) => "UInt32",
            WireVariant::Int64(_) => "Int64",
            WireVariant::UInt64(_) => "UInt64",
            WireVariant::Float(_) => "Float",
            WireVariant::Double(_) => "Double",
            WireVariant::String(_) => "String",
            WireVariant::DateTime(_) => "DateTime",
            WireVariant::ByteString(_) => "ByteString",
            WireVariant::NodeId(_) => "NodeId",
            WireVariant::ExtensionObject(_) => "ExtensionObject",
            WireVariant::Array(_) => "Array",
        }
    }

    fn mismatch(&self, expected: &str) -> RecorderError {
        RecorderError::Codec(format!("expected {expected}, got {}", self.type_name()))
    }

    pub fn as_i32(&self) -> RecorderResult<i32> {
        match self {
            WireVariant::Int32(v) => Ok(*v),
            other => Err(other.mismatch("Int32")),
        }
    }

    pub fn as_u32(&self) -> RecorderResult<u32> {
        match self {
            WireVariant::UInt32(v) => Ok(*v),
            other => Err(other.mismatch("UInt32")),
        }
    }

    pub fn as_date_time(&self) -> RecorderResult<UaDateTime> {
        match self {
            WireVariant::DateTime(v) => Ok(*v),
            other => Err(other.mismatch("DateTime")),
        }
    }

    pub fn as_extension_object(&self) -> RecorderResult<&ExtensionObject> {
        match self {
            WireVariant::ExtensionObject(v) => Ok(v),
            other => Err(other.mismatch("ExtensionObject")),
        }
    }

    /// Array elements; `Empty` is treated as an empty array.
    pub fn as_array(&self) -> RecorderResult<&[WireVariant]> {
        match self {
            WireVariant::Array(v) => Ok(v),
            WireVariant::Empty => Ok(&[]),
            other => Err(other.mismatch("Array")),
        }
    }

    /// Decode every element of an extension object array as `T`, in order.
    pub fn decode_structures<T: DecodeBinary>(&self) -> RecorderResult<Vec<T>> {
        self.as_array()?
            .iter()
            .map(|v| v.as_extension_object().and_then(|eo| eo.decode_body::<T>()))
            .collect()
    }

    /// Decode a scalar extension object as `T`.
    pub fn decode_structure<T: DecodeBinary>(&self) -> RecorderResult<T> {
        self.as_extension_object()?.decode_body::<T>()
    }
}

/// Structures that can be decoded from an OPC UA binary body.
pub trait DecodeBinary: Sized {
    const NAMESPACE: u16 = 2;
    const BINARY_ENCODING_ID: u32;

    fn decode(buf: &mut Bytes) -> RecorderResult<Self>;
}

#[inline]
fn ensure(buf: &Bytes, needed: usize, what: &str) -> RecorderResult<()> {
    if buf.remaining() < needed {
        return Err(RecorderError::Codec(format!(
            "truncated {what}: need {needed} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

pub fn read_u8(buf: &mut Bytes) -> RecorderResult<u8> {
    ensure(buf, 1, "byte")?;
    Ok(buf.get_u8())
}

pub fn read_bool(buf: &mut Bytes) -> RecorderResult<bool> {
    Ok(read_u8(buf)? != 0)
}

pub fn read_u16(buf: &mut Bytes) -> RecorderResult<u16> {
    ensure(buf, 2, "UInt16")?;
    Ok(buf.get_u16_le())
}

pub fn read_i32(buf: &mut Bytes) -> RecorderResult<i32> {
    ensure(buf, 4, "Int32")?;
    Ok(buf.get_i32_le())
}

pub fn read_u32(buf: &mut Bytes) -> RecorderResult<u32> {
    ensure(buf, 4, "UInt32")?;
    Ok(buf.get_u32_le())
}

/// Length-prefixed byte string; a negative length is the null string.
pub fn read_byte_string(buf: &mut Bytes) -> RecorderResult<Bytes> {
    let len = read_i32(buf)?;
    if len <= 0 {
        return Ok(Bytes::new());
    }
    let len = len as usize;
    ensure(buf, len, "ByteString")?;
    Ok(buf.split_to(len))
}

pub fn read_string(buf: &mut Bytes) -> RecorderResult<String> {
    let raw = read_byte_string(buf)?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| RecorderError::Codec(format!("invalid UTF-8 in String: {e}")))
}

/// Decode a binary-encoded `NodeId` (or `ExpandedNodeId`) into its wire form.
pub fn read_node_id(buf: &mut Bytes) -> RecorderResult<WireNodeId> {
    const NAMESPACE_URI_FLAG: u8 = 0x80;
    const SERVER_INDEX_FLAG: u8 = 0x40;

    let encoding = read_u8(buf)?;
    let id = match encoding & 0x3f {
        0x00 => WireNodeId::numeric(0, read_u8(buf)? as u32),
        0x01 => {
            let ns = read_u8(buf)? as u16;
            WireNodeId::numeric(ns, read_u16(buf)? as u32)
        }
        0x02 => {
            let ns = read_u16(buf)?;
            WireNodeId::numeric(ns, read_u32(buf)?)
        }
        0x03 => {
            let ns = read_u16(buf)?;
            WireNodeId {
                namespace: ns,
                identifier_type: identifier_type::STRING,
                payload: WirePayload::Bytes(read_byte_string(buf)?),
            }
        }
        0x04 => {
            let ns = read_u16(buf)?;
            ensure(buf, 16, "Guid")?;
            WireNodeId {
                namespace: ns,
                identifier_type: identifier_type::GUID,
                payload: WirePayload::Bytes(buf.split_to(16)),
            }
        }
        0x05 => {
            let ns = read_u16(buf)?;
            WireNodeId::byte_string(ns, read_byte_string(buf)?)
        }
        other => {
            return Err(RecorderError::Codec(format!(
                "unknown NodeId encoding 0x{other:02x}"
            )))
        }
    };
    if encoding & NAMESPACE_URI_FLAG != 0 {
        let _ = read_byte_string(buf)?;
    }
    if encoding & SERVER_INDEX_FLAG != 0 {
        let _ = read_u32(buf)?;
    }
    Ok(id)
}

#[cfg(test)]
pub(crate) mod test_encode {
    //! Minimal OPC UA binary writers used to build fixtures.
    use crate::node_id::{NodeIdentifier, WirePayload};
    use bytes::{BufMut, BytesMut};

    pub fn put_string(buf: &mut BytesMut, s: &[u8]) {
        buf.put_i32_le(s.len() as i32);
        buf.put_slice(s);
    }

    pub fn put_node_id(buf: &mut BytesMut, id: &NodeIdentifier) {
        let wire = id.to_wire_form();
        match wire.payload {
            WirePayload::Numeric(n) => {
                buf.put_u8(0x02);
                buf.put_u16_le(wire.namespace);
                buf.put_u32_le(n);
            }
            WirePayload::Bytes(b) => {
                buf.put_u8(if matches!(id, NodeIdentifier::String(..)) {
                    0x03
                } else {
                    0x05
                });
                buf.put_u16_le(wire.namespace);
                put_string(buf, &b);
            }
        }
    }
}
