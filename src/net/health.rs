//! Device health client
//!
//! Issues status probes against the device and parses its health
//! payload. Transport and parse failures never propagate as errors
//! past this boundary; callers get a boolean plus optional detail.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Deserialize;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};

/// Health payload reported by the device's `/status` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatus {
    pub wifi_connected: bool,
    #[serde(default)]
    pub sd_initialized: bool,
    #[serde(default)]
    pub recording_active: bool,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub free_heap: u64,
    /// Milliseconds since device boot
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub conversation_history_count: u64,
}

/// Outcome of a single health check
#[derive(Debug)]
pub struct HealthCheck {
    pub reachable: bool,
    pub status: Option<DeviceStatus>,
}

impl HealthCheck {
    fn unreachable() -> Self {
        Self {
            reachable: false,
            status: None,
        }
    }
}

/// HTTP client for device status probes
#[derive(Clone)]
pub struct HealthClient {
    client: reqwest::Client,
    port: u16,
    status_path: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl HealthClient {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            port: network.device_port,
            status_path: network.status_path.clone(),
            request_timeout: network.request_timeout(),
            probe_timeout: network.probe_timeout(),
        })
    }

    fn status_url(&self, addr: Ipv4Addr) -> String {
        format!("http://{}:{}{}", addr, self.port, self.status_path)
    }

    /// Explicit health check with the full (30s default) timeout
    pub async fn check(&self, addr: Ipv4Addr) -> HealthCheck {
        let response = self
            .client
            .get(self.status_url(addr))
            .timeout(self.request_timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(%addr, "Health check transport failure: {}", e);
                return HealthCheck::unreachable();
            }
        };

        if !response.status().is_success() {
            tracing::debug!(%addr, status = %response.status(), "Health check non-2xx");
            return HealthCheck::unreachable();
        }

        match response.json::<DeviceStatus>().await {
            Ok(status) => HealthCheck {
                reachable: true,
                status: Some(status),
            },
            Err(e) => {
                // Malformed payload counts as unreachable, not an error
                tracing::debug!(%addr, "Health payload malformed: {}", e);
                HealthCheck::unreachable()
            }
        }
    }

    /// Short-timeout discovery probe
    ///
    /// Succeeds only when the response is a well-formed JSON payload
    /// carrying the `wifi_connected` field; a bare TCP accept or an
    /// unrelated HTTP service does not match.
    pub async fn probe(&self, addr: Ipv4Addr) -> Option<Ipv4Addr> {
        let response = self
            .client
            .get(self.status_url(addr))
            .timeout(self.probe_timeout)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let body: serde_json::Value = response.json().await.ok()?;
        body.get("wifi_connected").map(|_| addr)
    }
}
