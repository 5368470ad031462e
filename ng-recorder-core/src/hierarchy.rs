use crate::{
    client::{BrowseOptions, BrowseReference, UaClient},
    node_id::{ns0, NodeIdentifier, NumericNodeId},
};
use std::{collections::HashMap, sync::Arc};

/// Reference types followed when listing children.
pub const HIERARCHICAL_REFERENCE_TYPES: [NumericNodeId; 10] = [
    ns0::HAS_CHILD,
    ns0::HAS_EVENT_SOURCE,
    ns0::AGGREGATES,
    ns0::HAS_COMPONENT,
    ns0::HAS_ORDERED_COMPONENT,
    ns0::HAS_HISTORICAL_CONFIGURATION,
    ns0::HAS_PROPERTY,
    ns0::HAS_SUBTYPE,
    ns0::HAS_NOTIFIER,
    ns0::ORGANIZES,
];

#[inline]
pub fn is_hierarchical(reference_type: &NodeIdentifier) -> bool {
    let id = NumericNodeId::from(reference_type);
    id.is_valid() && HIERARCHICAL_REFERENCE_TYPES.contains(&id)
}

/// Fold browse references into a name keyed map. Later entries overwrite
/// earlier ones with the same name.
pub fn index_children(references: &[BrowseReference]) -> HashMap<String, NodeIdentifier> {
    let mut children = HashMap::with_capacity(references.len());
    for reference in references {
        if !is_hierarchical(&reference.reference_type) {
            continue;
        }
        children.insert(reference.browse_name.name.clone(), reference.target.clone());
    }
    children
}

/// Lists one level of named children of a node.
#[derive(Clone)]
pub struct NodeHierarchyIndex {
    client: Arc<dyn UaClient>,
}

impl NodeHierarchyIndex {
    pub fn new(client: Arc<dyn UaClient>) -> Self {
        Self { client }
    }

    /// Children of `node` by browse name. Browse failures are logged and
    /// produce an empty map.
    pub async fn children(&self, node: &NodeIdentifier) -> HashMap<String, NodeIdentifier> {
        let options = BrowseOptions::default();
        match self.client.browse(node, &options).await {
            Ok(response) if response.status.is_good() => index_children(&response.references),
            Ok(response) => {
                tracing::error!(node = %node, status = %response.status, "Browse returned bad status");
                HashMap::new()
            }
            Err(e) => {
                tracing::error!(node = %node, error = %e, "Browse failed");
                HashMap::new()
            }
        }
    }
}
