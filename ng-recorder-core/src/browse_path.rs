use crate::{
    cache::{CachePolicy, SessionCache},
    client::UaClient,
    node_id::{Namespace, NodeIdentifier, NumericNodeId},
};
use std::{fmt, sync::Arc};

/// One hop of a browse path: follow `reference_type` to the child named
/// `namespace:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowsePathStep {
    pub namespace: Namespace,
    pub name: String,
    pub reference_type: NumericNodeId,
}

impl BrowsePathStep {
    pub fn new(namespace: Namespace, name: impl Into<String>, reference_type: NumericNodeId) -> Self {
        Self {
            namespace,
            name: name.into(),
            reference_type,
        }
    }
}

impl fmt::Display for BrowsePathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Ordered steps; equality is structural.
pub type BrowsePath = Vec<BrowsePathStep>;

fn display_path(path: &[BrowsePathStep]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves browse paths with one round trip per distinct path.
///
/// Cache entries are keyed by the path alone. Resolving the same path from
/// two different starting nodes returns the first result.
pub struct BrowsePathResolver {
    client: Arc<dyn UaClient>,
    cache: SessionCache<BrowsePath, NodeIdentifier>,
}

impl BrowsePathResolver {
    pub fn new(client: Arc<dyn UaClient>) -> Self {
        Self {
            client,
            cache: SessionCache::new(),
        }
    }

    pub fn with_policy(
        client: Arc<dyn UaClient>,
        policy: impl CachePolicy<BrowsePath> + 'static,
    ) -> Self {
        Self {
            client,
            cache: SessionCache::with_policy(policy),
        }
    }

    /// Resolve `path` from `start`. Every failure is logged and yields
    /// [`NodeIdentifier::NULL`]. Whatever the server answered, NULL included,
    /// is cached, so a path that did not resolve is not asked for again.
    pub async fn resolve(&mut self, start: &NodeIdentifier, path: &[BrowsePathStep]) -> NodeIdentifier {
        if path.is_empty() {
            tracing::error!(start = %start, "Cannot resolve an empty browse path");
            return NodeIdentifier::NULL;
        }
        let key: BrowsePath = path.to_vec();
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let resolved = self.translate(start, path).await;
        self.cache.insert(key, resolved.clone());
        resolved
    }

    async fn translate(&self, start: &NodeIdentifier, path: &[BrowsePathStep]) -> NodeIdentifier {
        let response = match self.client.translate_path(start, path).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(path = %display_path(path), error = %e, "Translate browse path failed");
                return NodeIdentifier::NULL;
            }
        };
        if response.status.is_bad() {
            tracing::error!(path = %display_path(path), status = %response.status, "Translate browse path returned bad status");
            return NodeIdentifier::NULL;
        }

        let [result] = response.results.as_slice() else {
            tracing::error!(
                path = %display_path(path),
                results = response.results.len(),
                "Expected exactly one browse path result"
            );
            return NodeIdentifier::NULL;
        };
        if result.status.is_bad() {
            tracing::error!(path = %display_path(path), status = %result.status, "Browse path not resolvable");
            return NodeIdentifier::NULL;
        }
        let [target] = result.targets.as_slice() else {
            tracing::error!(
                path = %display_path(path),
                targets = result.targets.len(),
                "Expected exactly one browse path target"
            );
            return NodeIdentifier::NULL;
        };

        tracing::debug!(path = %display_path(path), node = %target, "Resolved browse path");
        target.clone()
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_id::ns0;

    #[test]
    fn path_equality_is_structural() {
        let a = vec![
            BrowsePathStep::new(2, "Device", ns0::ORGANIZES),
            BrowsePathStep::new(2, "Recordings", ns0::HAS_COMPONENT),
        ];
        let mut b = a.clone();
        assert_eq!(a, b);
        b[1].reference_type = ns0::ORGANIZES;
        assert_ne!(a, b);
        b.truncate(1);
        assert_ne!(a, b);
    }

    #[test]
    fn path_display() {
        let path = vec![
            BrowsePathStep::new(2, "Device", ns0::ORGANIZES),
            BrowsePathStep::new(2, "Lookup", ns0::HAS_COMPONENT),
        ];
        assert_eq!(display_path(&path), "2:Device/2:Lookup");
    }
}
