mod browse_path;
mod cache;
mod client;
mod collector;
mod decoder;
mod device;
mod error;
mod hierarchy;
pub mod node_id;
pub mod payload;
mod recording;
mod recording_config;
pub mod wire;

pub use browse_path::{BrowsePath, BrowsePathResolver, BrowsePathStep};
pub use cache::{CachePolicy, RetainForever, SessionCache};
pub use client::{
    result_mask, BrowseOptions, BrowseReference, BrowseResponse, CallResponse, PathResult,
    QualifiedName, StatusCode, TranslateResponse, UaClient,
};
pub use collector::{collect_all, CollectOutcome};
pub use decoder::{
    demultiplex, Batch, BatchSource, ConfigurationSource, DecodedMeasurement, DecodedPoint,
    MeasuredValue, PointSink, ReadSummary, RecordingDataDecoder, RecordingPoint,
};
pub use device::{id_suffix, Device, LookupInfo, LookupTag, NameLookup, RECORDING_PREFIX};
pub use error::{RecorderError, RecorderResult};
pub use hierarchy::{index_children, is_hierarchical, NodeHierarchyIndex, HIERARCHICAL_REFERENCE_TYPES};
pub use node_id::{IdentifierKind, NodeIdentifier, NumericNodeId};
pub use payload::{PayloadCodec, ProtobufPayloadCodec, Series, TypedRecord};
pub use recording::RecordingSession;
pub use recording_config::{
    Algorithm, DataKind, RecordingConfiguration, RecordingConfigurationReader,
    RecordingExtremals, RecordingValueInfo, ReferenceStatus, ValueDescriptor,
};
pub use wire::{DecodeBinary, ExtensionObject, UaDateTime, WireVariant};
