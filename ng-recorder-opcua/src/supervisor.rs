use crate::types::ClientOptions;
use arc_swap::ArcSwapOption;
use futures::{pin_mut, StreamExt};
use ng_recorder_core::{RecorderError, RecorderResult};
use opcua::{
    client::{
        custom_types::DataTypeTreeBuilder, ClientBuilder, IdentityToken, Session, SessionActivity,
        SessionEventLoop, SessionPollResult,
    },
    crypto::SecurityPolicy as UaSecurityPolicy,
    types::{custom::DynamicTypeLoader, MessageSecurityMode, NodeId},
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use url::Url;

pub(crate) type SharedSession = Arc<SessionEntry>;

/// Shared session entry guarded by ArcSwapOption for lock-free reads on the
/// request path. The event loop task owns the session lifecycle.
pub(crate) struct SessionEntry {
    pub session: ArcSwapOption<Session>,
    pub healthy: AtomicBool,
    pub last_error: std::sync::Mutex<Option<String>>,
}

impl SessionEntry {
    #[inline]
    pub fn new_empty() -> Self {
        Self {
            session: ArcSwapOption::from(None),
            healthy: AtomicBool::new(false),
            last_error: std::sync::Mutex::new(None),
        }
    }

    #[inline]
    fn set_last_error(&self, msg: impl Into<String>) {
        let _ = self.last_error.lock().map(|mut e| *e = Some(msg.into()));
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed(String),
}

pub(crate) struct SessionSupervisor {
    shared: SharedSession,
    options: ClientOptions,
}

impl SessionSupervisor {
    #[inline]
    pub fn new(shared: SharedSession, options: ClientOptions) -> Self {
        Self { shared, options }
    }

    fn build_client(options: &ClientOptions) -> ClientBuilder {
        let builder = ClientBuilder::new()
            .application_name(&options.application_name)
            .application_uri(&options.application_uri)
            .pki_dir(options.pki_dir.as_str())
            .session_retry_limit(0)
            .session_timeout(options.session_timeout)
            .max_failed_keep_alive_count(options.max_failed_keep_alive_count as u64)
            .keep_alive_interval(Duration::from_millis(options.keep_alive_interval as u64));

        if options.needs_app_cert() {
            builder.trust_server_certs(true).create_sample_keypair(true)
        } else {
            // No application certificate is needed for SecurityPolicy=None
            builder
                .trust_server_certs(false)
                .create_sample_keypair(false)
        }
    }

    async fn connect_once(
        options: &ClientOptions,
        url: &str,
    ) -> RecorderResult<(Arc<Session>, SessionEventLoop)> {
        let mut client = Self::build_client(options).client().map_err(|e| {
            RecorderError::Session(format!("OPC UA build client error: {:?}", e))
        })?;

        let identity: IdentityToken = options.auth.clone().try_into()?;

        let url = url.trim();
        let endpoints = client
            .get_server_endpoints_from_url(url)
            .await
            .map_err(|err| {
                RecorderError::Session(format!("OPC UA get endpoints error from {url}: {err}"))
            })?;
        for ep in &endpoints {
            tracing::debug!(
                endpoint_url = %ep.endpoint_url,
                security_policy_uri = %ep.security_policy_uri,
                security_mode = ?ep.security_mode,
                "OPC UA discovered endpoint"
            );
        }

        let desired_policy = UaSecurityPolicy::from(options.security_policy);
        let desired_mode: MessageSecurityMode = options.security_mode.into();
        let mut selected = endpoints
            .into_iter()
            .find(|ep| {
                ep.security_mode == desired_mode
                    && UaSecurityPolicy::from_uri(ep.security_policy_uri.as_ref()) == desired_policy
            })
            .ok_or_else(|| {
                RecorderError::Session(format!(
                    "No OPC UA endpoint matches security policy {:?} and mode {:?} for URL {url}",
                    options.security_policy, options.security_mode
                ))
            })?;

        // The advertised host is often a machine name the client cannot reach;
        // the configured URL is authoritative for transport.
        let original_endpoint_url = selected.endpoint_url.clone();
        if let Some(endpoint_url) = override_endpoint_host(url, selected.endpoint_url.as_ref()) {
            selected.endpoint_url = endpoint_url.into();
        }
        tracing::info!(
            endpoint_url = %selected.endpoint_url,
            original_endpoint_url = %original_endpoint_url,
            security_policy_uri = %selected.security_policy_uri,
            security_mode = ?selected.security_mode,
            "OPC UA selected endpoint for connection"
        );

        client
            .connect_to_endpoint_directly(selected, identity)
            .map_err(|e| RecorderError::Session(format!("OPC UA connect-direct error: {e}")))
    }

    /// Open a session against `url` and wait until it is activated.
    /// The returned task drives the session until it is disconnected.
    pub async fn start(self, url: &str) -> RecorderResult<JoinHandle<()>> {
        let timeout = Duration::from_millis(self.options.request_timeout_ms.max(1));
        let (session, ev) = Self::connect_once(&self.options, url).await?;

        let (state_tx, mut state_rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(run_event_loop(
            Arc::clone(&self.shared),
            Arc::clone(&session),
            ev,
            state_tx,
        ));

        let activated = tokio::time::timeout(timeout, async {
            loop {
                let state = state_rx.borrow_and_update().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Failed(msg) => return Err(RecorderError::Session(msg)),
                    ConnectionState::Disconnected => {
                        return Err(RecorderError::Session(
                            self.shared
                                .last_error()
                                .unwrap_or_else(|| "connection lost".to_string()),
                        ))
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(RecorderError::ServiceUnavailable);
                }
            }
        })
        .await;

        match activated {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                task.abort();
                return Err(e);
            }
            Err(_elapsed) => {
                task.abort();
                return Err(RecorderError::Timeout(timeout));
            }
        }

        if self.options.load_data_types {
            match tokio::time::timeout(timeout, load_data_types(&session)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Loading server data types failed"),
                Err(_elapsed) => tracing::warn!("Loading server data types timed out"),
            }
        }
        Ok(task)
    }
}

/// Drive the OPC UA SessionEventLoop until the stream ends.
/// Updates shared health flags as events arrive.
async fn run_event_loop(
    shared: SharedSession,
    session: Arc<Session>,
    ev: SessionEventLoop,
    state_tx: watch::Sender<ConnectionState>,
) {
    let stream = ev.enter();
    pin_mut!(stream);
    let mut seen_active = false;
    while let Some(item) = stream.next().await {
        match item {
            Ok(SessionPollResult::Reconnected(_) | SessionPollResult::Transport(_)) => {
                shared.healthy.store(true, Ordering::Release);
                if !seen_active {
                    seen_active = true;
                    shared.session.store(Some(Arc::clone(&session)));
                    let _ = state_tx.send(ConnectionState::Connected);
                }
            }
            Ok(SessionPollResult::SessionActivity(act)) => match act {
                SessionActivity::KeepAliveSucceeded => {
                    shared.healthy.store(true, Ordering::Release);
                }
                SessionActivity::KeepAliveFailed(code) => {
                    shared.set_last_error(format!("keepalive failed: {code}"));
                }
            },
            Ok(SessionPollResult::ConnectionLost(code)) => {
                shared.set_last_error(format!("connection lost: {code}"));
                break;
            }
            Ok(_) => {}
            Err(status_code) => {
                let msg = format!("event loop error: {status_code}");
                shared.set_last_error(msg.clone());
                let _ = state_tx.send(ConnectionState::Failed(msg));
                break;
            }
        }
    }
    shared.healthy.store(false, Ordering::Release);
    shared.session.store(None);
    let _ = state_tx.send(ConnectionState::Disconnected);
    tracing::debug!("OPC UA event loop finished");
}

/// Replace the host (and the port, when the configured URL names one) of an
/// advertised endpoint URL with those of the configured URL.
pub(crate) fn override_endpoint_host(configured: &str, advertised: &str) -> Option<String> {
    let (Ok(cfg_uri), Ok(mut ep_uri)) = (Url::parse(configured), Url::parse(advertised)) else {
        return None;
    };
    if let Some(host) = cfg_uri.host_str() {
        if let Err(err) = ep_uri.set_host(Some(host)) {
            tracing::debug!(
                error = ?err,
                "Failed to override OPC UA endpoint host; falling back to server advertised host"
            );
        }
    }
    if let Some(port) = cfg_uri.port() {
        if ep_uri.set_port(Some(port)).is_err() {
            tracing::debug!(
                "Failed to override OPC UA endpoint port; falling back to server advertised port"
            );
        }
    }
    Some(ep_uri.to_string())
}

/// Build the server's structure definitions into a type loader so that
/// device-specific extension objects can be decoded.
async fn load_data_types(session: &Arc<Session>) -> RecorderResult<()> {
    let tree = DataTypeTreeBuilder::new(|id: &NodeId| id.namespace != 0)
        .build(session)
        .await
        .map_err(|e| RecorderError::Session(format!("OPC UA data type tree error: {e}")))?;
    session.add_type_loader(Arc::new(DynamicTypeLoader::new(Arc::new(tree))));
    tracing::debug!("OPC UA server data types loaded");
    Ok(())
}
