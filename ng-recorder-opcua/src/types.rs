use ng_recorder_core::{RecorderError, RecorderResult};
use opcua::{
    client::{IdentityToken, IssuedTokenWrapper, Password},
    crypto::{PrivateKey, X509},
    types::ByteString,
};
use serde::{Deserialize, Serialize};

/// OPC UA client options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Application name
    #[serde(default = "ClientOptions::default_application_name")]
    pub application_name: String,
    /// Application URI
    #[serde(default = "ClientOptions::default_application_uri")]
    pub application_uri: String,
    /// Authentication configuration
    #[serde(default)]
    pub auth: OpcUaAuth,
    /// Security policy
    #[serde(default)]
    pub security_policy: SecurityPolicy,
    /// Security mode
    #[serde(default)]
    pub security_mode: SecurityMode,
    /// Session timeout
    #[serde(default = "ClientOptions::default_session_timeout_ms")]
    pub session_timeout: u32,
    /// Timeout applied to every service request and to session activation
    #[serde(default = "ClientOptions::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Keep alive interval
    #[serde(default = "ClientOptions::default_keep_alive_interval_ms")]
    pub keep_alive_interval: u32,
    /// Maximum number of failed keep alives before the client will be closed.
    #[serde(default = "ClientOptions::default_max_failed_keep_alive_count")]
    pub max_failed_keep_alive_count: u32,
    /// PKI directory used when an application certificate is needed
    #[serde(default = "ClientOptions::default_pki_dir")]
    pub pki_dir: String,
    /// Load the server's structure definitions so device-specific
    /// extension objects can be decoded.
    #[serde(default = "ClientOptions::default_load_data_types")]
    pub load_data_types: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            application_name: Self::default_application_name(),
            application_uri: Self::default_application_uri(),
            auth: OpcUaAuth::default(),
            security_policy: SecurityPolicy::default(),
            security_mode: SecurityMode::default(),
            session_timeout: Self::default_session_timeout_ms(),
            request_timeout_ms: Self::default_request_timeout_ms(),
            keep_alive_interval: Self::default_keep_alive_interval_ms(),
            max_failed_keep_alive_count: Self::default_max_failed_keep_alive_count(),
            pki_dir: Self::default_pki_dir(),
            load_data_types: Self::default_load_data_types(),
        }
    }
}

impl ClientOptions {
    fn default_application_name() -> String {
        "ng-recorder".into()
    }

    fn default_application_uri() -> String {
        "urn:ng-recorder".into()
    }

    fn default_session_timeout_ms() -> u32 {
        30000
    }

    fn default_request_timeout_ms() -> u64 {
        10000
    }

    fn default_keep_alive_interval_ms() -> u32 {
        30000
    }

    fn default_max_failed_keep_alive_count() -> u32 {
        3
    }

    fn default_pki_dir() -> String {
        "./pki".into()
    }

    fn default_load_data_types() -> bool {
        true
    }

    /// Whether an application instance certificate is needed, either for a
    /// secure channel or for X509 user authentication.
    pub fn needs_app_cert(&self) -> bool {
        let requires_secure_channel = !matches!(self.security_policy, SecurityPolicy::None)
            && !matches!(self.security_mode, SecurityMode::None);
        requires_secure_channel || matches!(self.auth, OpcUaAuth::Certificate { .. })
    }
}

/// OPC UA authentication types
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum OpcUaAuth {
    #[default]
    Anonymous,
    UserPassword {
        username: String,
        password: String,
    },
    IssuedToken {
        token: String,
    },
    Certificate {
        private_key: String,
        certificate: String,
    },
}

impl TryFrom<OpcUaAuth> for IdentityToken {
    type Error = RecorderError;

    fn try_from(value: OpcUaAuth) -> RecorderResult<Self> {
        match value {
            OpcUaAuth::Anonymous => Ok(IdentityToken::Anonymous),
            OpcUaAuth::UserPassword { username, password } => {
                Ok(IdentityToken::UserName(username, Password::new(password)))
            }
            OpcUaAuth::IssuedToken { token } => Ok(IdentityToken::IssuedToken(
                IssuedTokenWrapper::new_source(
                    ByteString::from_base64(&token)
                        .ok_or(RecorderError::Configuration("Invalid token".to_string()))?,
                ),
            )),
            OpcUaAuth::Certificate {
                private_key,
                certificate,
            } => Ok(IdentityToken::X509(
                Box::new(
                    X509::from_pem(certificate.as_bytes())
                        .map_err(|e| RecorderError::Configuration(e.to_string()))?,
                ),
                Box::new(
                    PrivateKey::from_pem(private_key.as_bytes())
                        .map_err(|e| RecorderError::Configuration(e.to_string()))?,
                ),
            )),
        }
    }
}

/// OPC UA security policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityPolicy {
    #[default]
    None,
    Basic128Rsa15,
    Basic256,
    Basic256Sha256,
    Aes128Sha256RsaOaep,
    Aes256Sha256RsaPss,
}

impl From<SecurityPolicy> for opcua::crypto::SecurityPolicy {
    fn from(policy: SecurityPolicy) -> Self {
        match policy {
            SecurityPolicy::None => opcua::crypto::SecurityPolicy::None,
            SecurityPolicy::Basic128Rsa15 => opcua::crypto::SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256 => opcua::crypto::SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256 => opcua::crypto::SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep => {
                opcua::crypto::SecurityPolicy::Aes128Sha256RsaOaep
            }
            SecurityPolicy::Aes256Sha256RsaPss => opcua::crypto::SecurityPolicy::Aes256Sha256RsaPss,
        }
    }
}

/// OPC UA security modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

impl From<SecurityMode> for opcua::types::MessageSecurityMode {
    fn from(mode: SecurityMode) -> Self {
        match mode {
            SecurityMode::None => opcua::types::MessageSecurityMode::None,
            SecurityMode::Sign => opcua::types::MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => opcua::types::MessageSecurityMode::SignAndEncrypt,
        }
    }
}
