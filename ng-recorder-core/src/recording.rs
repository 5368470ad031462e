use crate::{
    browse_path::{BrowsePathResolver, BrowsePathStep},
    cache::SessionCache,
    client::UaClient,
    decoder::{
        Batch, BatchSource, ConfigurationSource, PointSink, ReadSummary, RecordingDataDecoder,
        RecordingPoint,
    },
    device::{id_suffix, NameLookup},
    error::{RecorderError, RecorderResult},
    hierarchy::NodeHierarchyIndex,
    node_id::{ns0, NodeIdentifier},
    payload::{PayloadCodec, ProtobufPayloadCodec},
    recording_config::{RecordingConfiguration, RecordingConfigurationReader},
    wire::{UaDateTime, WireVariant},
};
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};

const DATA: &str = "Data";
const CONFIGURATION_PREFIX: &str = "RecordingConfiguration";
const GET_RANGE: &str = "GetRange";
const COUNT_BY_RANGE: &str = "CountByRange";
const READ_BY_START_AND_COUNT: &str = "ReadByStartAndCount";

/// `BaseObjectType/RecordingType/Data/<method>`.
fn method_path(method: &str) -> Vec<BrowsePathStep> {
    vec![
        BrowsePathStep::new(2, "RecordingType", ns0::HAS_SUBTYPE),
        BrowsePathStep::new(2, DATA, ns0::HAS_COMPONENT),
        BrowsePathStep::new(2, method, ns0::HAS_COMPONENT),
    ]
}

/// One recording of the device with its located nodes.
pub struct RecordingSession {
    id: u32,
    node: NodeIdentifier,
    client: Arc<dyn UaClient>,
    data: NodeIdentifier,
    get_range: NodeIdentifier,
    count_by_range: NodeIdentifier,
    read_by_start_and_count: NodeIdentifier,
    config_nodes: BTreeMap<u32, NodeIdentifier>,
    configs: SessionCache<u32, Arc<RecordingConfiguration>>,
    reader: RecordingConfigurationReader,
    codec: Arc<dyn PayloadCodec>,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("data", &self.data)
            .field("config_ids", &self.config_nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RecordingSession {
    /// Locate the `Data` container, the configuration nodes and the three
    /// archive methods. Any missing mandatory node makes the recording
    /// unusable.
    pub async fn initialize(
        client: Arc<dyn UaClient>,
        id: u32,
        node: NodeIdentifier,
        resolver: &mut BrowsePathResolver,
        index: &NodeHierarchyIndex,
    ) -> RecorderResult<Self> {
        let children = index.children(&node).await;
        let data = children
            .get(DATA)
            .filter(|n| !n.is_null())
            .cloned()
            .ok_or_else(|| {
                tracing::error!(recording_id = id, "Node 'Data' of Recording{id} not found");
                RecorderError::NotFound(format!("Data of Recording{id}"))
            })?;

        let config_nodes: BTreeMap<u32, NodeIdentifier> = children
            .iter()
            .filter(|(name, _)| name.starts_with(CONFIGURATION_PREFIX))
            .map(|(name, node)| (id_suffix(name), node.clone()))
            .collect();

        let get_range = locate_method(resolver, id, GET_RANGE).await?;
        let count_by_range = locate_method(resolver, id, COUNT_BY_RANGE).await?;
        let read_by_start_and_count = locate_method(resolver, id, READ_BY_START_AND_COUNT).await?;

        tracing::debug!(
            recording_id = id,
            node = %node,
            configs = config_nodes.len(),
            "Recording initialised"
        );
        Ok(Self {
            id,
            node,
            reader: RecordingConfigurationReader::new(Arc::clone(&client)),
            client,
            data,
            get_range,
            count_by_range,
            read_by_start_and_count,
            config_nodes,
            configs: SessionCache::new(),
            codec: Arc::new(ProtobufPayloadCodec),
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn node(&self) -> &NodeIdentifier {
        &self.node
    }

    pub fn configuration_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.config_nodes.keys().copied()
    }

    /// Time range covered by the archive.
    pub async fn get_range(&self) -> RecorderResult<(UaDateTime, UaDateTime)> {
        let outputs = call_method(
            self.client.as_ref(),
            self.id,
            &self.data,
            &self.get_range,
            GET_RANGE,
            Vec::new(),
        )
        .await?;
        let start = output(&outputs, 0, GET_RANGE)?.as_date_time()?;
        let end = output(&outputs, 1, GET_RANGE)?.as_date_time()?;
        Ok((start, end))
    }

    /// Number of archived points between `start` and `end`.
    pub async fn count_by_range(&self, start: UaDateTime, end: UaDateTime) -> RecorderResult<u32> {
        let outputs = call_method(
            self.client.as_ref(),
            self.id,
            &self.data,
            &self.count_by_range,
            COUNT_BY_RANGE,
            vec![WireVariant::DateTime(start), WireVariant::DateTime(end)],
        )
        .await?;
        output(&outputs, 0, COUNT_BY_RANGE)?.as_u32()
    }

    /// Read `count` points from `start`, decoding each into `sink`.
    pub async fn read_by_start_and_count(
        &mut self,
        start: UaDateTime,
        count: u32,
        names: &mut dyn NameLookup,
        sink: &mut dyn PointSink,
    ) -> RecorderResult<ReadSummary> {
        let decoder = RecordingDataDecoder::new(self.id, self.codec.as_ref());
        let mut batches = MethodBatches {
            client: self.client.as_ref(),
            recording_id: self.id,
            object: &self.data,
            method: &self.read_by_start_and_count,
        };
        let mut configs = SessionConfigurations {
            recording_id: self.id,
            nodes: &self.config_nodes,
            cache: &mut self.configs,
            reader: &self.reader,
            names,
        };
        decoder
            .read(&mut batches, &mut configs, start, count, sink)
            .await
    }

    /// Configuration `id`, read from the device on first use.
    pub async fn configuration(
        &mut self,
        id: u32,
        names: &mut dyn NameLookup,
    ) -> RecorderResult<Arc<RecordingConfiguration>> {
        SessionConfigurations {
            recording_id: self.id,
            nodes: &self.config_nodes,
            cache: &mut self.configs,
            reader: &self.reader,
            names,
        }
        .configuration(id)
        .await
    }
}

async fn locate_method(
    resolver: &mut BrowsePathResolver,
    recording_id: u32,
    method: &str,
) -> RecorderResult<NodeIdentifier> {
    let base = NodeIdentifier::from(ns0::BASE_OBJECT_TYPE);
    let resolved = resolver.resolve(&base, &method_path(method)).await;
    if resolved.is_null() {
        tracing::error!(
            recording_id,
            "Node BaseObjectType/RecordingType/Data/{method} not found"
        );
        return Err(RecorderError::NotFound(format!(
            "BaseObjectType/RecordingType/Data/{method}"
        )));
    }
    Ok(resolved)
}

fn output<'a>(outputs: &'a [WireVariant], index: usize, method: &str) -> RecorderResult<&'a WireVariant> {
    outputs.get(index).ok_or_else(|| {
        RecorderError::Codec(format!("{method} returned {} outputs, missing #{index}", outputs.len()))
    })
}

async fn call_method(
    client: &dyn UaClient,
    recording_id: u32,
    object: &NodeIdentifier,
    method: &NodeIdentifier,
    name: &str,
    inputs: Vec<WireVariant>,
) -> RecorderResult<Vec<WireVariant>> {
    let response = client.call(object, method, inputs).await.map_err(|e| {
        tracing::error!(recording_id, method = name, error = %e, "Method call failed");
        e
    })?;
    if response.status.is_bad() {
        tracing::error!(
            recording_id,
            method = name,
            status = %response.status,
            "Method call to {name} of Recording{recording_id} was unsuccessful"
        );
        return Err(RecorderError::Call {
            method: name.to_string(),
            status: response.status,
        });
    }
    Ok(response.outputs)
}

struct MethodBatches<'a> {
    client: &'a dyn UaClient,
    recording_id: u32,
    object: &'a NodeIdentifier,
    method: &'a NodeIdentifier,
}

#[async_trait]
impl BatchSource for MethodBatches<'_> {
    async fn fetch(&mut self, start: UaDateTime, count: u32) -> RecorderResult<Batch> {
        let outputs = call_method(
            self.client,
            self.recording_id,
            self.object,
            self.method,
            READ_BY_START_AND_COUNT,
            vec![WireVariant::DateTime(start), WireVariant::UInt32(count)],
        )
        .await?;
        let cursor = output(&outputs, 1, READ_BY_START_AND_COUNT)?.as_date_time()?;
        let points = output(&outputs, 2, READ_BY_START_AND_COUNT)?
            .decode_structures::<RecordingPoint>()?;
        tracing::trace!(
            recording_id = self.recording_id,
            points = points.len(),
            cursor = %cursor,
            "Fetched recording points"
        );
        Ok(Batch { cursor, points })
    }
}

struct SessionConfigurations<'a, 'n> {
    recording_id: u32,
    nodes: &'a BTreeMap<u32, NodeIdentifier>,
    cache: &'a mut SessionCache<u32, Arc<RecordingConfiguration>>,
    reader: &'a RecordingConfigurationReader,
    names: &'a mut (dyn NameLookup + 'n),
}

#[async_trait]
impl ConfigurationSource for SessionConfigurations<'_, '_> {
    async fn configuration(&mut self, id: u32) -> RecorderResult<Arc<RecordingConfiguration>> {
        if let Some(config) = self.cache.get(&id) {
            return Ok(Arc::clone(config));
        }
        let Some(node) = self.nodes.get(&id) else {
            tracing::error!(
                recording_id = self.recording_id,
                config_id = id,
                "RecordingConfiguration{id} not found"
            );
            return Err(RecorderError::NotFound(format!(
                "RecordingConfiguration{id} of Recording{}",
                self.recording_id
            )));
        };
        let config = Arc::new(self.reader.read(id, node, &mut *self.names).await?);
        self.cache.insert(id, Arc::clone(&config));
        Ok(config)
    }
}
