use crate::{
    client::UaClient,
    device::{LookupTag, NameLookup},
    error::{RecorderError, RecorderResult},
    hierarchy::NodeHierarchyIndex,
    node_id::NodeIdentifier,
    wire::{read_bool, read_i32, read_node_id, read_u16, DecodeBinary},
};
use bytes::Bytes;
use serde::Serialize;
use std::{fmt, sync::Arc};

/// How the primary value of a recorded measurement is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Sample,
    Average,
}

impl TryFrom<i32> for Algorithm {
    type Error = RecorderError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Algorithm::Sample),
            1 => Ok(Algorithm::Average),
            other => Err(RecorderError::Invalid(format!("recording algorithm {other}"))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Sample => f.write_str("Sample"),
            Algorithm::Average => f.write_str("Average"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingExtremals {
    pub minimum: bool,
    pub maximum: bool,
    pub timestamps: bool,
}

impl DecodeBinary for RecordingExtremals {
    const BINARY_ENCODING_ID: u32 = 1094;

    fn decode(buf: &mut Bytes) -> RecorderResult<Self> {
        Ok(Self {
            minimum: read_bool(buf)?,
            maximum: read_bool(buf)?,
            timestamps: read_bool(buf)?,
        })
    }
}

impl fmt::Display for RecordingExtremals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = [
            (self.maximum, "max"),
            (self.minimum, "min"),
            (self.timestamps, "timestamps"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if flags.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&flags.join(","))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferenceStatus {
    #[default]
    Undefined,
    NotFound,
    Invalid,
    Available,
    Missing,
}

impl From<i32> for ReferenceStatus {
    fn from(raw: i32) -> Self {
        match raw {
            1 => ReferenceStatus::NotFound,
            2 => ReferenceStatus::Invalid,
            3 => ReferenceStatus::Available,
            4 => ReferenceStatus::Missing,
            0 => ReferenceStatus::Undefined,
            other => {
                tracing::warn!(status = other, "Unknown reference status");
                ReferenceStatus::Undefined
            }
        }
    }
}

/// Data type of a recorded value. The discriminant selects the per-kind
/// array of a point payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataKind {
    #[default]
    Undefined = 0,
    Boolean = 1,
    Int32 = 2,
    UInt32 = 3,
    Int64 = 4,
    UInt64 = 5,
    Float32 = 6,
    Float64 = 7,
}

impl DataKind {
    pub const COUNT: usize = 8;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl From<i32> for DataKind {
    fn from(raw: i32) -> Self {
        match raw {
            1 => DataKind::Boolean,
            2 => DataKind::Int32,
            3 => DataKind::UInt32,
            4 => DataKind::Int64,
            5 => DataKind::UInt64,
            6 => DataKind::Float32,
            7 => DataKind::Float64,
            0 => DataKind::Undefined,
            other => {
                tracing::warn!(data_type = other, "Unknown recording data type");
                DataKind::Undefined
            }
        }
    }
}

/// `RecordingValueInfo` as carried in the configuration's `Values` array.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingValueInfo {
    pub status: ReferenceStatus,
    pub node: NodeIdentifier,
    pub array_index: i32,
    pub kind: DataKind,
    pub array: bool,
    pub array_size: u16,
}

impl DecodeBinary for RecordingValueInfo {
    const BINARY_ENCODING_ID: u32 = 5089;

    fn decode(buf: &mut Bytes) -> RecorderResult<Self> {
        let status = ReferenceStatus::from(read_i32(buf)?);
        let node = NodeIdentifier::from_wire(&read_node_id(buf)?);
        let array_index = read_i32(buf)?;
        let kind = DataKind::from(read_i32(buf)?);
        let array = read_bool(buf)?;
        let array_size = read_u16(buf)?;
        Ok(Self {
            status,
            node,
            array_index,
            kind,
            array,
            array_size,
        })
    }
}

/// One configured value of a recording, in device order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDescriptor {
    pub status: ReferenceStatus,
    pub node: NodeIdentifier,
    pub array_index: i32,
    pub kind: DataKind,
    pub is_array: bool,
    pub array_size: u16,
    /// Present only for [`ReferenceStatus::Available`] values.
    pub name: Option<String>,
}

impl ValueDescriptor {
    pub fn from_info(info: RecordingValueInfo, name: Option<String>) -> Self {
        let name = match info.status {
            ReferenceStatus::Available => name,
            _ => None,
        };
        Self {
            status: info.status,
            node: info.node,
            array_index: info.array_index,
            kind: info.kind,
            is_array: info.array,
            array_size: info.array_size,
            name,
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.status == ReferenceStatus::Available
    }

    /// Output label: the resolved name, suffixed with `[index]` for arrays.
    /// Available values without a resolved name fall back to the node id.
    pub fn label(&self) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        let name = match self.name.as_deref() {
            Some(name) => name.to_string(),
            None => self.node.to_canonical_string(),
        };
        Some(if self.is_array {
            format!("{name}[{}]", self.array_index)
        } else {
            name
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfiguration {
    pub id: u32,
    pub algorithm: Algorithm,
    pub extremals: RecordingExtremals,
    pub interval_seconds: u32,
    pub values: Vec<ValueDescriptor>,
}

impl fmt::Display for RecordingConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordingConfig{}: Algorithm={}; Extremals={}; Interval={}sec; Value-Count={}",
            self.id,
            self.algorithm,
            self.extremals,
            self.interval_seconds,
            self.values.len()
        )
    }
}

const ALGORITHM: &str = "Algorithm";
const EXTREMALS: &str = "Extremals";
const INTERVAL: &str = "Interval";
const VALUES: &str = "Values";

/// Reads recording configurations from their configuration nodes.
#[derive(Clone)]
pub struct RecordingConfigurationReader {
    client: Arc<dyn UaClient>,
    index: NodeHierarchyIndex,
}

impl RecordingConfigurationReader {
    pub fn new(client: Arc<dyn UaClient>) -> Self {
        let index = NodeHierarchyIndex::new(Arc::clone(&client));
        Self { client, index }
    }

    /// Read configuration `id` from `node`, resolving the names of available
    /// values through `names`.
    pub async fn read(
        &self,
        id: u32,
        node: &NodeIdentifier,
        names: &mut dyn NameLookup,
    ) -> RecorderResult<RecordingConfiguration> {
        let children = self.index.children(node).await;
        let child = |name: &str| {
            children.get(name).ok_or_else(|| {
                RecorderError::NotFound(format!("{name} of RecordingConfiguration{id} ({node})"))
            })
        };
        let algorithm_node = child(ALGORITHM)?;
        let extremals_node = child(EXTREMALS)?;
        let interval_node = child(INTERVAL)?;
        let values_node = child(VALUES)?;

        let algorithm = Algorithm::try_from(self.client.read_value(algorithm_node).await?.as_i32()?)?;
        let extremals = self
            .client
            .read_value(extremals_node)
            .await?
            .decode_structure::<RecordingExtremals>()?;
        let interval_seconds = self.client.read_value(interval_node).await?.as_u32()?;
        let infos = self
            .client
            .read_value(values_node)
            .await?
            .decode_structures::<RecordingValueInfo>()?;

        let mut values = Vec::with_capacity(infos.len());
        for info in infos {
            let name = match info.status {
                ReferenceStatus::Available => {
                    let name = names.lookup(&info.node, LookupTag::Recordable).await;
                    if name.is_none() {
                        tracing::warn!(node = %info.node, config_id = id, "No name found for recorded value");
                    }
                    name
                }
                _ => None,
            };
            values.push(ValueDescriptor::from_info(info, name));
        }

        let config = RecordingConfiguration {
            id,
            algorithm,
            extremals,
            interval_seconds,
            values,
        };
        tracing::info!("{config}");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::test_encode::put_node_id;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn decode_value_info() {
        let mut raw = BytesMut::new();
        raw.put_i32_le(3);
        put_node_id(&mut raw, &NodeIdentifier::Numeric(2, 4711));
        raw.put_i32_le(2);
        raw.put_i32_le(6);
        raw.put_u8(1);
        raw.put_u16_le(4);
        let info = RecordingValueInfo::decode(&mut raw.freeze()).unwrap();
        assert_eq!(info.status, ReferenceStatus::Available);
        assert_eq!(info.node, NodeIdentifier::Numeric(2, 4711));
        assert_eq!(info.array_index, 2);
        assert_eq!(info.kind, DataKind::Float32);
        assert!(info.array);
        assert_eq!(info.array_size, 4);
    }

    #[test]
    fn label_adds_array_suffix() {
        let info = RecordingValueInfo {
            status: ReferenceStatus::Available,
            node: NodeIdentifier::Numeric(2, 1),
            array_index: 3,
            kind: DataKind::Float64,
            array: true,
            array_size: 8,
        };
        let d = ValueDescriptor::from_info(info.clone(), Some("Voltage".into()));
        assert_eq!(d.label().as_deref(), Some("Voltage[3]"));

        let scalar = ValueDescriptor::from_info(
            RecordingValueInfo {
                array: false,
                ..info
            },
            Some("Voltage".into()),
        );
        assert_eq!(scalar.label().as_deref(), Some("Voltage"));
    }

    #[test]
    fn unnamed_available_value_uses_node_id() {
        let info = RecordingValueInfo {
            status: ReferenceStatus::Available,
            node: NodeIdentifier::Numeric(2, 77),
            array_index: 0,
            kind: DataKind::UInt32,
            array: false,
            array_size: 0,
        };
        let d = ValueDescriptor::from_info(info, None);
        assert_eq!(d.label().as_deref(), Some("ns=2;i=77"));
    }

    #[test]
    fn unavailable_values_carry_no_name() {
        let info = RecordingValueInfo {
            status: ReferenceStatus::Missing,
            node: NodeIdentifier::Numeric(2, 1),
            array_index: 0,
            kind: DataKind::Int32,
            array: false,
            array_size: 0,
        };
        let d = ValueDescriptor::from_info(info, Some("ignored".into()));
        assert!(d.name.is_none());
        assert!(d.label().is_none());
    }

    #[test]
    fn summary_line() {
        let config = RecordingConfiguration {
            id: 3,
            algorithm: Algorithm::Average,
            extremals: RecordingExtremals {
                minimum: true,
                maximum: true,
                timestamps: false,
            },
            interval_seconds: 900,
            values: vec![],
        };
        assert_eq!(
            config.to_string(),
            "RecordingConfig3: Algorithm=Average; Extremals=max,min; Interval=900sec; Value-Count=0"
        );
    }

    #[test]
    fn algorithm_rejects_unknown_values() {
        assert_eq!(Algorithm::try_from(1).unwrap(), Algorithm::Average);
        assert!(Algorithm::try_from(7).is_err());
    }
}
