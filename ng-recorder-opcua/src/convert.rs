//! Conversions between the async-opcua types and the recorder's wire values.
use bytes::Bytes;
use ng_recorder_core::{
    node_id::{identifier_type, WireNodeId, WirePayload},
    ExtensionObject, NodeIdentifier, RecorderError, RecorderResult, StatusCode, UaDateTime,
    WireVariant,
};
use opcua::types::{
    self as ua, BinaryEncodable, ByteString, ContextOwned, Identifier, NodeId, UAString, Variant,
};

#[inline]
pub(crate) fn status(code: ua::StatusCode) -> StatusCode {
    StatusCode::from_raw(code.bits())
}

pub(crate) fn to_node_id(id: &NodeIdentifier) -> RecorderResult<NodeId> {
    match id {
        NodeIdentifier::Numeric(ns, value) => Ok(NodeId::new(*ns, *value)),
        NodeIdentifier::String(ns, value) => Ok(NodeId::new(*ns, UAString::from(&**value))),
        NodeIdentifier::ByteString(ns, value) => {
            Ok(NodeId::new(*ns, ByteString::from(value.to_vec())))
        }
        NodeIdentifier::Unknown(_) => Err(RecorderError::Invalid(format!(
            "node id {id} cannot be sent to the server"
        ))),
    }
}

pub(crate) fn from_node_id(id: &NodeId) -> NodeIdentifier {
    let wire = match &id.identifier {
        Identifier::Numeric(value) => WireNodeId::numeric(id.namespace, *value),
        Identifier::String(value) => WireNodeId::string(id.namespace, value.as_ref()),
        Identifier::ByteString(value) => WireNodeId::byte_string(
            id.namespace,
            Bytes::copy_from_slice(value.value.as_deref().unwrap_or_default()),
        ),
        Identifier::Guid(_) => WireNodeId {
            namespace: id.namespace,
            identifier_type: identifier_type::GUID,
            payload: WirePayload::Bytes(Bytes::new()),
        },
    };
    NodeIdentifier::from_wire(&wire)
}

pub(crate) fn to_variant(value: WireVariant) -> RecorderResult<Variant> {
    Ok(match value {
        WireVariant::Empty => Variant::Empty,
        WireVariant::Boolean(v) => Variant::Boolean(v),
        WireVariant::Int32(v) => Variant::Int32(v),
        WireVariant::UInt32(v) => Variant::UInt32(v),
        WireVariant::Int64(v) => Variant::Int64(v),
        WireVariant::UInt64(v) => Variant::UInt64(v),
        WireVariant::Float(v) => Variant::Float(v),
        WireVariant::Double(v) => Variant::Double(v),
        WireVariant::String(v) => Variant::String(UAString::from(v)),
        WireVariant::DateTime(v) => {
            let dt = v.to_chrono().ok_or_else(|| {
                RecorderError::Invalid(format!("date time {} out of range", v.ticks()))
            })?;
            Variant::DateTime(Box::new(ua::DateTime::from(dt)))
        }
        WireVariant::ByteString(v) => Variant::ByteString(ByteString::from(v.to_vec())),
        WireVariant::NodeId(v) => Variant::NodeId(Box::new(to_node_id(&v)?)),
        other @ (WireVariant::ExtensionObject(_) | WireVariant::Array(_)) => {
            return Err(RecorderError::Invalid(format!(
                "{} input arguments are not supported",
                other.type_name()
            )))
        }
    })
}

pub(crate) fn from_variant(value: Variant) -> RecorderResult<WireVariant> {
    Ok(match value {
        Variant::Empty => WireVariant::Empty,
        Variant::Boolean(v) => WireVariant::Boolean(v),
        Variant::SByte(v) => WireVariant::Int32(i32::from(v)),
        Variant::Byte(v) => WireVariant::UInt32(u32::from(v)),
        Variant::Int16(v) => WireVariant::Int32(i32::from(v)),
        Variant::UInt16(v) => WireVariant::UInt32(u32::from(v)),
        Variant::Int32(v) => WireVariant::Int32(v),
        Variant::UInt32(v) => WireVariant::UInt32(v),
        Variant::Int64(v) => WireVariant::Int64(v),
        Variant::UInt64(v) => WireVariant::UInt64(v),
        Variant::Float(v) => WireVariant::Float(v),
        Variant::Double(v) => WireVariant::Double(v),
        Variant::String(v) => WireVariant::String(v.as_ref().to_string()),
        Variant::DateTime(v) => WireVariant::DateTime(UaDateTime::from_chrono(v.as_chrono())),
        Variant::ByteString(v) => WireVariant::ByteString(Bytes::copy_from_slice(
            v.value.as_deref().unwrap_or_default(),
        )),
        Variant::NodeId(v) => WireVariant::NodeId(from_node_id(&v)),
        Variant::ExtensionObject(v) => WireVariant::ExtensionObject(extension_object(&v)?),
        Variant::Array(array) => WireVariant::Array(
            array
                .values
                .into_iter()
                .map(from_variant)
                .collect::<RecorderResult<Vec<_>>>()?,
        ),
        other => {
            return Err(RecorderError::Codec(format!("unsupported variant {other:?}")))
        }
    })
}

/// Re-encode a decoded extension object in binary so the device structures
/// are unpacked by the core decoders regardless of how the stack loaded them.
fn extension_object(value: &ua::ExtensionObject) -> RecorderResult<ExtensionObject> {
    let ctx = ContextOwned::default();
    let mut buf = Vec::new();
    value
        .encode(&mut buf, &ctx.context())
        .map_err(|e| RecorderError::Codec(format!("re-encode extension object: {e}")))?;
    ExtensionObject::decode(&mut Bytes::from(buf))
}
