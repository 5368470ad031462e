//! Node identity for the device information model.
//!
//! `NodeIdentifier` is the owned, tagged identity used everywhere a node is
//! addressed. `NumericNodeId` is the restricted `Copy` view used for
//! well-known namespace-0 ids and other long-lived, allocation-free keys.
use crate::error::{RecorderError, RecorderResult};
use base64::Engine as _;
use bytes::Bytes;
use std::{cmp::Ordering, fmt, str::FromStr, sync::Arc};

pub type Namespace = u16;

/// Namespace value carried by the invalid wire sentinel.
pub const INVALID_NAMESPACE: Namespace = 0xffff;

/// Canonical string rendered for identifiers of unknown kind.
pub const INVALID_STRING: &str = "?=?";

/// Identifier-kind tags as they appear on the protocol client boundary.
pub mod identifier_type {
    pub const NUMERIC: u8 = 0;
    pub const STRING: u8 = 3;
    pub const GUID: u8 = 4;
    pub const BYTE_STRING: u8 = 5;
    pub const INVALID: u8 = 0xff;
}

/// Identifier payload of a wire-level node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WirePayload {
    Numeric(u32),
    Bytes(Bytes),
}

/// Wire-level tagged node id, the form exchanged with the protocol client.
///
/// The tag and the payload are independent fields; a tag that does not match
/// its payload is treated like an unknown tag when converted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireNodeId {
    pub namespace: Namespace,
    pub identifier_type: u8,
    pub payload: WirePayload,
}

impl WireNodeId {
    /// Sentinel returned for identifiers that cannot be expressed on the wire.
    pub const INVALID: WireNodeId = WireNodeId {
        namespace: INVALID_NAMESPACE,
        identifier_type: identifier_type::INVALID,
        payload: WirePayload::Numeric(0),
    };

    pub fn numeric(namespace: Namespace, value: u32) -> Self {
        Self {
            namespace,
            identifier_type: identifier_type::NUMERIC,
            payload: WirePayload::Numeric(value),
        }
    }

    pub fn string(namespace: Namespace, value: &str) -> Self {
        Self {
            namespace,
            identifier_type: identifier_type::STRING,
            payload: WirePayload::Bytes(Bytes::copy_from_slice(value.as_bytes())),
        }
    }

    pub fn byte_string(namespace: Namespace, value: impl Into<Bytes>) -> Self {
        Self {
            namespace,
            identifier_type: identifier_type::BYTE_STRING,
            payload: WirePayload::Bytes(value.into()),
        }
    }
}

/// Kind of a node identifier. The discriminant is the ordering rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum IdentifierKind {
    Unknown = 0,
    Numeric = 1,
    String = 3,
    ByteString = 4,
}

/// Tagged node identity: namespace plus kind-specific payload.
///
/// Ordered by namespace, then kind, then payload. Identifiers of different
/// kinds never compare equal.
///
/// [`NodeIdentifier::Unknown`] carries no payload, so two unknown identifiers
/// in the same namespace are equal, hash alike and order as `Equal`. Keyed
/// collections therefore hold at most one unknown identifier per namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentifier {
    Numeric(Namespace, u32),
    String(Namespace, Arc<str>),
    ByteString(Namespace, Bytes),
    /// Identifier whose wire kind is not supported. Keeps the namespace it arrived with.
    Unknown(Namespace),
}

impl Default for NodeIdentifier {
    fn default() -> Self {
        Self::NULL
    }
}

impl NodeIdentifier {
    pub const NULL: NodeIdentifier = NodeIdentifier::Numeric(0, 0);

    pub fn string(namespace: Namespace, value: impl Into<Arc<str>>) -> Self {
        NodeIdentifier::String(namespace, value.into())
    }

    pub fn byte_string(namespace: Namespace, value: impl Into<Bytes>) -> Self {
        NodeIdentifier::ByteString(namespace, value.into())
    }

    #[inline]
    pub fn namespace(&self) -> Namespace {
        match self {
            NodeIdentifier::Numeric(ns, _)
            | NodeIdentifier::String(ns, _)
            | NodeIdentifier::ByteString(ns, _)
            | NodeIdentifier::Unknown(ns) => *ns,
        }
    }

    #[inline]
    pub fn kind(&self) -> IdentifierKind {
        match self {
            NodeIdentifier::Numeric(..) => IdentifierKind::Numeric,
            NodeIdentifier::String(..) => IdentifierKind::String,
            NodeIdentifier::ByteString(..) => IdentifierKind::ByteString,
            NodeIdentifier::Unknown(_) => IdentifierKind::Unknown,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !matches!(self, NodeIdentifier::Unknown(_))
    }

    fn is_payload_default(&self) -> Option<bool> {
        match self {
            NodeIdentifier::Numeric(_, n) => Some(*n == 0),
            NodeIdentifier::String(_, s) => Some(s.is_empty()),
            NodeIdentifier::ByteString(_, b) => Some(b.is_empty()),
            NodeIdentifier::Unknown(_) => None,
        }
    }

    /// True iff the namespace is 0 and the payload is the kind's default value.
    pub fn is_null(&self) -> bool {
        match self.is_payload_default() {
            Some(default) => self.namespace() == 0 && default,
            None => {
                tracing::warn!("isNull requested for node id of unknown kind");
                false
            }
        }
    }

    /// True iff the namespace is 0 and the payload is not the kind's default value.
    pub fn is_namespace0(&self) -> bool {
        match self.is_payload_default() {
            Some(default) => self.namespace() == 0 && !default,
            None => false,
        }
    }

    /// Render as `[ns=N;]i=…|s=…|b=…`; unknown kinds render as `?=?`.
    pub fn to_canonical_string(&self) -> String {
        let prefix = match self.namespace() {
            0 => String::new(),
            ns => format!("ns={ns};"),
        };
        match self {
            NodeIdentifier::Numeric(_, n) => format!("{prefix}i={n}"),
            NodeIdentifier::String(_, s) => format!("{prefix}s={s}"),
            NodeIdentifier::ByteString(_, b) => format!(
                "{prefix}b={}",
                base64::engine::general_purpose::STANDARD.encode(b)
            ),
            NodeIdentifier::Unknown(_) => INVALID_STRING.to_string(),
        }
    }

    /// Inverse of the wire conversion; unknown kinds yield [`WireNodeId::INVALID`].
    pub fn to_wire_form(&self) -> WireNodeId {
        match self {
            NodeIdentifier::Numeric(ns, n) => WireNodeId::numeric(*ns, *n),
            NodeIdentifier::String(ns, s) => WireNodeId::string(*ns, s),
            NodeIdentifier::ByteString(ns, b) => WireNodeId::byte_string(*ns, b.clone()),
            NodeIdentifier::Unknown(_) => WireNodeId::INVALID,
        }
    }

    /// Build from a wire-level node id. Never fails: anything not understood
    /// becomes [`NodeIdentifier::Unknown`] and is logged.
    pub fn from_wire(wire: &WireNodeId) -> Self {
        let ns = wire.namespace;
        match (wire.identifier_type, &wire.payload) {
            (identifier_type::NUMERIC, WirePayload::Numeric(n)) => NodeIdentifier::Numeric(ns, *n),
            (identifier_type::STRING, WirePayload::Bytes(b)) => {
                NodeIdentifier::String(ns, Arc::from(String::from_utf8_lossy(b).into_owned()))
            }
            (identifier_type::BYTE_STRING, WirePayload::Bytes(b)) => {
                NodeIdentifier::ByteString(ns, b.clone())
            }
            (tag, _) => {
                tracing::warn!(
                    namespace = ns,
                    identifier_type = tag,
                    "Got unknown node id identifier type"
                );
                NodeIdentifier::Unknown(ns)
            }
        }
    }
}

impl From<&WireNodeId> for NodeIdentifier {
    fn from(wire: &WireNodeId) -> Self {
        NodeIdentifier::from_wire(wire)
    }
}

impl From<WireNodeId> for NodeIdentifier {
    fn from(wire: WireNodeId) -> Self {
        NodeIdentifier::from_wire(&wire)
    }
}

impl Ord for NodeIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace()
            .cmp(&other.namespace())
            .then_with(|| self.kind().cmp(&other.kind()))
            .then_with(|| match (self, other) {
                (NodeIdentifier::Numeric(_, a), NodeIdentifier::Numeric(_, b)) => a.cmp(b),
                (NodeIdentifier::String(_, a), NodeIdentifier::String(_, b)) => {
                    a.as_bytes().cmp(b.as_bytes())
                }
                (NodeIdentifier::ByteString(_, a), NodeIdentifier::ByteString(_, b)) => {
                    a.as_ref().cmp(b.as_ref())
                }
                // Same namespace and same kind: only Unknown/Unknown is left.
                _ => Ordering::Equal,
            })
    }
}

impl PartialOrd for NodeIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for NodeIdentifier {
    type Err = RecorderError;

    fn from_str(s: &str) -> RecorderResult<Self> {
        let invalid = || RecorderError::Invalid(format!("malformed node id '{s}'"));
        let s = s.trim();
        let (ns, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(invalid)?;
                (ns.parse::<Namespace>().map_err(|_| invalid())?, rest)
            }
            None => (0, s),
        };
        let (kind, payload) = rest.split_once('=').ok_or_else(invalid)?;
        match kind {
            "i" => payload
                .parse::<u32>()
                .map(|n| NodeIdentifier::Numeric(ns, n))
                .map_err(|_| invalid()),
            "s" => Ok(NodeIdentifier::string(ns, payload)),
            "b" => base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map(|b| NodeIdentifier::byte_string(ns, b))
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Numeric-only view of a node identifier.
///
/// Converting a non-numeric identifier yields [`NumericNodeId::Invalid`]
/// instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericNodeId {
    Invalid,
    Id { namespace: Namespace, value: u32 },
}

impl NumericNodeId {
    pub const fn new(namespace: Namespace, value: u32) -> Self {
        NumericNodeId::Id { namespace, value }
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        matches!(self, NumericNodeId::Id { .. })
    }

    pub fn to_canonical_string(&self) -> String {
        match self {
            NumericNodeId::Id { namespace, value } => {
                NodeIdentifier::Numeric(*namespace, *value).to_canonical_string()
            }
            NumericNodeId::Invalid => INVALID_STRING.to_string(),
        }
    }
}

impl From<&NodeIdentifier> for NumericNodeId {
    fn from(id: &NodeIdentifier) -> Self {
        match id {
            NodeIdentifier::Numeric(namespace, value) => NumericNodeId::new(*namespace, *value),
            NodeIdentifier::String(..)
            | NodeIdentifier::ByteString(..)
            | NodeIdentifier::Unknown(_) => NumericNodeId::Invalid,
        }
    }
}

impl From<NumericNodeId> for NodeIdentifier {
    fn from(id: NumericNodeId) -> Self {
        match id {
            NumericNodeId::Id { namespace, value } => NodeIdentifier::Numeric(namespace, value),
            NumericNodeId::Invalid => NodeIdentifier::Unknown(INVALID_NAMESPACE),
        }
    }
}

impl fmt::Display for NumericNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

/// Well-known namespace-0 node ids.
pub mod ns0 {
    use super::NumericNodeId;

    pub const OBJECTS_FOLDER: NumericNodeId = NumericNodeId::new(0, 85);
    pub const BASE_OBJECT_TYPE: NumericNodeId = NumericNodeId::new(0, 58);

    pub const HIERARCHICAL_REFERENCES: NumericNodeId = NumericNodeId::new(0, 33);
    pub const HAS_CHILD: NumericNodeId = NumericNodeId::new(0, 34);
    pub const ORGANIZES: NumericNodeId = NumericNodeId::new(0, 35);
    pub const HAS_EVENT_SOURCE: NumericNodeId = NumericNodeId::new(0, 36);
    pub const AGGREGATES: NumericNodeId = NumericNodeId::new(0, 44);
    pub const HAS_SUBTYPE: NumericNodeId = NumericNodeId::new(0, 45);
    pub const HAS_PROPERTY: NumericNodeId = NumericNodeId::new(0, 46);
    pub const HAS_COMPONENT: NumericNodeId = NumericNodeId::new(0, 47);
    pub const HAS_NOTIFIER: NumericNodeId = NumericNodeId::new(0, 48);
    pub const HAS_ORDERED_COMPONENT: NumericNodeId = NumericNodeId::new(0, 49);
    pub const HAS_HISTORICAL_CONFIGURATION: NumericNodeId = NumericNodeId::new(0, 56);
}
