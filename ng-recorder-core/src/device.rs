use crate::{
    browse_path::{BrowsePathResolver, BrowsePathStep},
    cache::{CachePolicy, SessionCache},
    client::UaClient,
    error::{RecorderError, RecorderResult},
    hierarchy::NodeHierarchyIndex,
    node_id::{ns0, NodeIdentifier},
    payload::{PayloadCodec, ProtobufPayloadCodec},
    recording::RecordingSession,
    wire::{read_node_id, read_string, DecodeBinary, WireVariant},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Category filter of the device's `Lookup` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LookupTag {
    Measurement = 0,
    Energy = 1,
    Recordable = 2,
    Fieldbus = 3,
}

/// One entry returned by `Lookup`.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupInfo {
    pub node: NodeIdentifier,
    pub browse_path: String,
}

impl DecodeBinary for LookupInfo {
    const BINARY_ENCODING_ID: u32 = 5003;

    fn decode(buf: &mut Bytes) -> RecorderResult<Self> {
        let node = NodeIdentifier::from_wire(&read_node_id(buf)?);
        let browse_path = read_string(buf)?;
        Ok(Self { node, browse_path })
    }
}

/// Maps node identities to display names.
#[async_trait]
pub trait NameLookup: Send {
    async fn lookup(&mut self, node: &NodeIdentifier, tag: LookupTag) -> Option<String>;
}

/// Prefix of recording nodes below `Objects/Device/Recordings`.
pub const RECORDING_PREFIX: &str = "Recording";

fn device_path() -> Vec<BrowsePathStep> {
    vec![BrowsePathStep::new(2, "Device", ns0::ORGANIZES)]
}

fn recordings_path() -> Vec<BrowsePathStep> {
    vec![
        BrowsePathStep::new(2, "Device", ns0::ORGANIZES),
        BrowsePathStep::new(2, "Recordings", ns0::HAS_COMPONENT),
    ]
}

fn lookup_path() -> Vec<BrowsePathStep> {
    vec![BrowsePathStep::new(2, "Lookup", ns0::HAS_COMPONENT)]
}

/// Numeric suffix of a browse name: the digits from the first digit on.
/// Names without digits yield 0.
pub fn id_suffix(name: &str) -> u32 {
    let Some(start) = name.find(|c: char| c.is_ascii_digit()) else {
        return 0;
    };
    let digits: String = name[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// A measurement device holding the session scoped resolution and lookup
/// caches.
pub struct Device {
    client: Arc<dyn UaClient>,
    resolver: BrowsePathResolver,
    index: NodeHierarchyIndex,
    names: SessionCache<NodeIdentifier, String>,
    codec: Arc<dyn PayloadCodec>,
}

impl Device {
    pub fn new(client: Arc<dyn UaClient>) -> Self {
        Self {
            resolver: BrowsePathResolver::new(Arc::clone(&client)),
            index: NodeHierarchyIndex::new(Arc::clone(&client)),
            names: SessionCache::new(),
            codec: Arc::new(ProtobufPayloadCodec),
            client,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_name_policy(
        mut self,
        policy: impl CachePolicy<NodeIdentifier> + 'static,
    ) -> Self {
        self.names = SessionCache::with_policy(policy);
        self
    }

    pub fn client(&self) -> &Arc<dyn UaClient> {
        &self.client
    }

    pub async fn connect(&self, url: &str) -> RecorderResult<()> {
        self.client.connect(url).await
    }

    pub fn resolver_mut(&mut self) -> &mut BrowsePathResolver {
        &mut self.resolver
    }

    /// Every usable recording below `Objects/Device/Recordings`, ordered by id.
    /// Recordings that fail to initialise are logged and skipped.
    pub async fn recordings(&mut self) -> Vec<RecordingSession> {
        let objects = NodeIdentifier::from(ns0::OBJECTS_FOLDER);
        let container = self.resolver.resolve(&objects, &recordings_path()).await;
        if container.is_null() {
            tracing::error!("Node /Objects/Device/Recordings not found");
            return Vec::new();
        }

        let mut candidates: Vec<(u32, NodeIdentifier)> = self
            .index
            .children(&container)
            .await
            .into_iter()
            .filter(|(name, _)| name.starts_with(RECORDING_PREFIX))
            .map(|(name, node)| (id_suffix(&name), node))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut recordings = Vec::with_capacity(candidates.len());
        for (id, node) in candidates {
            match RecordingSession::initialize(
                Arc::clone(&self.client),
                id,
                node,
                &mut self.resolver,
                &self.index,
            )
            .await
            {
                Ok(session) => recordings.push(session.with_codec(Arc::clone(&self.codec))),
                Err(e) => {
                    tracing::warn!(recording_id = id, error = %e, "Skipping Recording{id}");
                }
            }
        }
        tracing::debug!(count = recordings.len(), "Discovered recordings");
        recordings
    }

    /// Display name of `node`. A cache miss fetches every entry of `tag`
    /// from the device in one call.
    pub async fn lookup(&mut self, node: &NodeIdentifier, tag: LookupTag) -> Option<String> {
        if let Some(name) = self.names.get(node) {
            return Some(name.clone());
        }
        if let Err(e) = self.load_lookup(tag).await {
            tracing::error!(tag = ?tag, error = %e, "Method call to Lookup was unsuccessful");
        }
        self.names.get(node).cloned()
    }

    async fn load_lookup(&mut self, tag: LookupTag) -> RecorderResult<()> {
        let objects = NodeIdentifier::from(ns0::OBJECTS_FOLDER);
        let device = self.resolver.resolve(&objects, &device_path()).await;
        if device.is_null() {
            return Err(RecorderError::NotFound(
                "Node /Objects/Device".to_string(),
            ));
        }
        let method = self.resolver.resolve(&device, &lookup_path()).await;
        if method.is_null() {
            return Err(RecorderError::NotFound(
                "Method node /Objects/Device/Lookup".to_string(),
            ));
        }

        let response = self
            .client
            .call(&device, &method, vec![WireVariant::Int32(tag as i32)])
            .await?;
        if response.status.is_bad() {
            return Err(RecorderError::Call {
                method: "Lookup".to_string(),
                status: response.status,
            });
        }
        let entries = response
            .outputs
            .first()
            .map(|v| v.decode_structures::<LookupInfo>())
            .transpose()?
            .unwrap_or_default();
        tracing::debug!(tag = ?tag, entries = entries.len(), "Loaded lookup entries");
        for entry in entries {
            self.names.insert(entry.node, entry.browse_path);
        }
        Ok(())
    }
}

#[async_trait]
impl NameLookup for Device {
    async fn lookup(&mut self, node: &NodeIdentifier, tag: LookupTag) -> Option<String> {
        Device::lookup(self, node, tag).await
    }
}
