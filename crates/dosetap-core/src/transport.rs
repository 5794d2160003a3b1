//! Remote delivery of dose actions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::actions::DoseAction;
use crate::error::{ConfigError, TransportError};

/// Sends one action to the remote.
///
/// Every error is treated as transient by the caller.
#[async_trait]
pub trait DoseTransport: Send + Sync {
    async fn deliver(&self, action: &DoseAction) -> Result<(), TransportError>;
}

/// Remote endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the DoseTap API; `None` keeps everything local.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
        }
    }
}

/// Transport used when no remote is configured; every delivery fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

#[async_trait]
impl DoseTransport for LocalOnly {
    async fn deliver(&self, _action: &DoseAction) -> Result<(), TransportError> {
        Err(TransportError::NotConfigured)
    }
}

/// Posts actions as JSON to `{base_url}/v1/doses`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "remote.base_url".to_string(),
            message,
        };
        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("v1/doses").map_err(|e| invalid(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    /// Build from config; `Ok(None)` when no base URL is set.
    pub fn from_config(config: &RemoteConfig) -> Result<Option<Self>, ConfigError> {
        match config.base_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                Self::new(url, Duration::from_secs(config.timeout_secs)).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl DoseTransport for HttpTransport {
    async fn deliver(&self, action: &DoseAction) -> Result<(), TransportError> {
        let resp = self.client.post(self.endpoint.clone()).json(action).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
