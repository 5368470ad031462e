use crate::{
    convert::{from_node_id, from_variant, status, to_node_id, to_variant},
    supervisor::{SessionEntry, SessionSupervisor, SharedSession},
    types::ClientOptions,
};
use async_trait::async_trait;
use ng_recorder_core::{
    BrowseOptions, BrowsePathStep, BrowseReference, BrowseResponse, CallResponse, NodeIdentifier,
    PathResult, QualifiedName, RecorderError, RecorderResult, StatusCode, TranslateResponse,
    UaClient, WireVariant,
};
use opcua::{
    client::Session,
    types::{
        self as ua, BrowseDescription, BrowseDirection, BrowsePath, BrowseResult,
        CallMethodRequest, NodeId, ReadValueId, RelativePath, RelativePathElement,
        TimestampsToReturn,
    },
};
use std::{
    future::Future,
    sync::{atomic::Ordering, Arc, Mutex},
    time::Duration,
};
use tokio::task::JoinHandle;

/// `UaClient` backed by an async-opcua session.
///
/// The session is opened by [`UaClient::connect`]; requests issued before
/// that, or after the connection was lost, fail with `ServiceUnavailable`.
pub struct OpcUaClient {
    options: ClientOptions,
    shared: SharedSession,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl OpcUaClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            shared: Arc::new(SessionEntry::new_empty()),
            event_loop: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire)
    }

    #[inline]
    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.options.request_timeout_ms.max(1))
    }

    #[inline]
    fn session(&self) -> RecorderResult<Arc<Session>> {
        self.shared
            .session
            .load_full()
            .ok_or(RecorderError::ServiceUnavailable)
    }

    /// Run one service request under the configured request timeout.
    async fn request<T, F>(&self, service: &str, fut: F) -> RecorderResult<T>
    where
        F: Future<Output = Result<T, ua::StatusCode>>,
    {
        let timeout = self.request_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(sc)) => Err(RecorderError::Session(format!(
                "OPC UA {service} status: {sc}"
            ))),
            Err(_elapsed) => Err(RecorderError::Timeout(timeout)),
        }
    }

    /// Close the session and stop its event loop.
    pub async fn disconnect(&self) {
        if let Some(session) = self.shared.session.swap(None) {
            session.disable_reconnects();
            let _ = tokio::time::timeout(Duration::from_secs(2), session.disconnect()).await;
        }
        let handle = self.event_loop.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        self.shared.healthy.store(false, Ordering::Release);
    }

    /// Follow continuation points until the server has returned every reference.
    async fn browse_remaining(
        &self,
        session: &Session,
        mut result: BrowseResult,
    ) -> RecorderResult<BrowseResult> {
        let mut references = result.references.take().unwrap_or_default();
        while !result.continuation_point.is_null() {
            let points = [result.continuation_point.clone()];
            let next = self
                .request("browse next", session.browse_next(false, &points))
                .await?;
            let Some(mut next) = next.into_iter().next() else {
                break;
            };
            references.extend(next.references.take().unwrap_or_default());
            result = next;
        }
        result.references = Some(references);
        Ok(result)
    }
}

#[async_trait]
impl UaClient for OpcUaClient {
    async fn connect(&self, url: &str) -> RecorderResult<()> {
        if self.shared.session.load().is_some() {
            return Ok(());
        }
        let handle = SessionSupervisor::new(Arc::clone(&self.shared), self.options.clone())
            .start(url)
            .await?;
        if let Ok(mut slot) = self.event_loop.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
        tracing::info!(url, "OPC UA session activated");
        Ok(())
    }

    async fn call(
        &self,
        object: &NodeIdentifier,
        method: &NodeIdentifier,
        inputs: Vec<WireVariant>,
    ) -> RecorderResult<CallResponse> {
        let session = self.session()?;
        let request = CallMethodRequest {
            object_id: to_node_id(object)?,
            method_id: to_node_id(method)?,
            input_arguments: Some(
                inputs
                    .into_iter()
                    .map(to_variant)
                    .collect::<RecorderResult<Vec<_>>>()?,
            ),
        };
        let result = self.request("call", session.call_one(request)).await?;
        let outputs = result
            .output_arguments
            .unwrap_or_default()
            .into_iter()
            .map(from_variant)
            .collect::<RecorderResult<Vec<_>>>()?;
        Ok(CallResponse {
            status: status(result.status_code),
            outputs,
        })
    }

    async fn browse(
        &self,
        node: &NodeIdentifier,
        options: &BrowseOptions,
    ) -> RecorderResult<BrowseResponse> {
        let session = self.session()?;
        let reference_type_id = match options.reference_type {
            Some(reference_type) => to_node_id(&reference_type.into())?,
            None => NodeId::null(),
        };
        let description = BrowseDescription {
            node_id: to_node_id(node)?,
            browse_direction: BrowseDirection::Forward,
            reference_type_id,
            include_subtypes: options.include_subtypes,
            node_class_mask: 0,
            result_mask: options.result_mask,
        };
        let results = self
            .request(
                "browse",
                session.browse(&[description], options.max_references, None),
            )
            .await?;
        let Some(result) = results.into_iter().next() else {
            return Err(RecorderError::Session(format!(
                "OPC UA browse of {node} returned no result"
            )));
        };
        let result = self.browse_remaining(&session, result).await?;

        let references = result
            .references
            .unwrap_or_default()
            .into_iter()
            .map(|r| BrowseReference {
                reference_type: from_node_id(&r.reference_type_id),
                browse_name: QualifiedName {
                    namespace: r.browse_name.namespace_index,
                    name: r.browse_name.name.as_ref().to_string(),
                },
                target: from_node_id(&r.node_id.node_id),
            })
            .collect();
        Ok(BrowseResponse {
            status: status(result.status_code),
            references,
        })
    }

    async fn translate_path(
        &self,
        start: &NodeIdentifier,
        steps: &[BrowsePathStep],
    ) -> RecorderResult<TranslateResponse> {
        let session = self.session()?;
        let elements = steps
            .iter()
            .map(|step| {
                Ok(RelativePathElement {
                    reference_type_id: to_node_id(&step.reference_type.into())?,
                    is_inverse: false,
                    include_subtypes: true,
                    target_name: ua::QualifiedName::new(step.namespace, step.name.as_str()),
                })
            })
            .collect::<RecorderResult<Vec<_>>>()?;
        let path = BrowsePath {
            starting_node: to_node_id(start)?,
            relative_path: RelativePath {
                elements: Some(elements),
            },
        };
        let results = self
            .request(
                "translate browse paths",
                session.translate_browse_paths_to_node_ids(&[path]),
            )
            .await?;

        Ok(TranslateResponse {
            status: StatusCode::Good,
            results: results
                .into_iter()
                .map(|r| PathResult {
                    status: status(r.status_code),
                    targets: r
                        .targets
                        .unwrap_or_default()
                        .iter()
                        .map(|t| from_node_id(&t.target_id.node_id))
                        .collect(),
                })
                .collect(),
        })
    }

    async fn read_value(&self, node: &NodeIdentifier) -> RecorderResult<WireVariant> {
        let session = self.session()?;
        let to_read = [ReadValueId::new_value(to_node_id(node)?)];
        let values = self
            .request(
                "read",
                session.read(&to_read, TimestampsToReturn::Neither, 0.0),
            )
            .await?;
        let Some(value) = values.into_iter().next() else {
            return Err(RecorderError::NotFound(format!("no value returned for {node}")));
        };
        if let Some(code) = value.status {
            let code = status(code);
            if code.is_bad() {
                return Err(match code {
                    StatusCode::BadNotFound => RecorderError::NotFound(node.to_string()),
                    other => RecorderError::Session(format!("OPC UA read of {node}: {other}")),
                });
            }
        }
        value.value.map_or(Ok(WireVariant::Empty), from_variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_before_connect_are_unavailable() {
        let client = OpcUaClient::new(ClientOptions::default());

        assert!(!client.is_healthy());
        let err = client
            .read_value(&NodeIdentifier::Numeric(2, 1))
            .await
            .unwrap_err();
        assert_eq!(err, RecorderError::ServiceUnavailable);
        let err = client
            .call(
                &NodeIdentifier::Numeric(2, 1),
                &NodeIdentifier::Numeric(2, 2),
                vec![WireVariant::Int32(2)],
            )
            .await
            .unwrap_err();
        assert_eq!(err, RecorderError::ServiceUnavailable);
    }

    #[tokio::test]
    async fn disconnect_without_session_is_harmless() {
        let client = OpcUaClient::new(ClientOptions::default());
        client.disconnect().await;
        assert!(!client.is_healthy());
    }
}
