use anyhow::Context;
use config::{Config, Environment, File};
use ng_recorder_opcua::ClientOptions;
use serde::Deserialize;
use std::{ops::Deref, path::Path, str::FromStr, sync::Arc};
use tracing::Level;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "ng-recorder.toml";
pub const ENV_PREFIX: &str = "NG_RECORDER";

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Load the optional TOML file, then apply `NG_RECORDER__*` environment overrides.
    pub fn new(config_path: &Path) -> anyhow::Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
        Ok(Self(Arc::new(inner)))
    }

    #[cfg(test)]
    fn from_toml(source: &str) -> anyhow::Result<Self> {
        let inner: Inner = Config::builder()
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub client: Client,
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    /// URL scheme of the device endpoint
    #[serde(default = "Client::scheme_default")]
    pub scheme: String,
    #[serde(flatten)]
    pub options: ClientOptions,
}

impl Default for Client {
    fn default() -> Self {
        Client {
            scheme: Client::scheme_default(),
            options: ClientOptions::default(),
        }
    }
}

impl Client {
    pub const DEFAULT_PORT: u16 = 4840;

    fn scheme_default() -> String {
        "opc.tcp".into()
    }

    /// Endpoint URL of the device at `host:port`.
    pub fn endpoint_url(&self, host: &str, port: u16) -> String {
        format!("{}://{}:{}", self.scheme, host, port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(default = "Log::level_default")]
    pub level: String,
    /// Also write a daily rolling log file
    #[serde(default)]
    pub file_enabled: bool,
    #[serde(default = "Log::dir_default")]
    pub dir: String,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: Log::level_default(),
            file_enabled: false,
            dir: Log::dir_default(),
        }
    }
}

impl Log {
    fn level_default() -> String {
        "info".into()
    }

    fn dir_default() -> String {
        "logs".into()
    }

    /// Configured level; unknown names fall back to `INFO`.
    pub fn level(&self) -> Level {
        Level::from_str(self.level.trim()).unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_recorder_opcua::{OpcUaAuth, SecurityMode, SecurityPolicy};

    #[test]
    fn missing_file_yields_defaults() {
        let settings = Settings::new(Path::new("definitely-missing-ng-recorder.toml")).unwrap();
        assert_eq!(settings.client.scheme, "opc.tcp");
        assert_eq!(settings.log.level(), Level::INFO);
        assert!(!settings.log.file_enabled);
        assert_eq!(
            settings.client.endpoint_url("192.168.1.20", Client::DEFAULT_PORT),
            "opc.tcp://192.168.1.20:4840"
        );
    }

    #[test]
    fn toml_sections_are_read() {
        let settings = Settings::from_toml(
            r#"
            [client]
            application_name = "archive-reader"
            request_timeout_ms = 2500
            security_policy = "Basic256Sha256"
            security_mode = "SignAndEncrypt"

            [client.auth]
            kind = "userPassword"
            username = "admin"
            password = "secret"

            [log]
            level = "debug"
            file_enabled = true
            "#,
        )
        .unwrap();

        let options = &settings.client.options;
        assert_eq!(options.application_name, "archive-reader");
        assert_eq!(options.request_timeout_ms, 2500);
        assert_eq!(options.security_policy, SecurityPolicy::Basic256Sha256);
        assert_eq!(options.security_mode, SecurityMode::SignAndEncrypt);
        assert!(matches!(
            &options.auth,
            OpcUaAuth::UserPassword { username, .. } if username == "admin"
        ));
        assert_eq!(options.session_timeout, 30000);
        assert_eq!(settings.log.level(), Level::DEBUG);
        assert!(settings.log.file_enabled);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let log = Log {
            level: "chatty".into(),
            ..Default::default()
        };
        assert_eq!(log.level(), Level::INFO);
    }
}
