use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::error_chain;

pub const DEFAULT_PROBE_URL: &str = "https://api.ipify.org?format=json";
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// Result of one tunnel probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatus {
    #[serde(rename = "status")]
    pub outcome: Outcome,
    pub message: String,
    pub external_ip: Option<String>,
}

impl TunnelStatus {
    pub fn operational(external_ip: Option<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            message: "Tunnel is operational".to_string(),
            external_ip,
        }
    }

    pub fn failed(detail: impl std::fmt::Display) -> Self {
        Self {
            outcome: Outcome::Error,
            message: format!("Tunnel connection failed: {detail}"),
            external_ip: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[derive(Deserialize)]
struct IpEcho {
    ip: Option<String>,
}

/// Probes the tunnel by asking an "echo my IP" service through it.
///
/// A single GET per call, bounded by a 5 second connect and overall timeout.
/// Failures come back as an `Error` status; nothing is retried.
#[derive(Debug, Clone)]
pub struct TunnelHealthChecker {
    probe_url: String,
    timeout: Duration,
}

impl Default for TunnelHealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_URL)
    }
}

impl TunnelHealthChecker {
    pub fn new(probe_url: impl Into<String>) -> Self {
        Self {
            probe_url: probe_url.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub async fn check_tunnel(&self, config: &ProxyConfig) -> TunnelStatus {
        let proxy_url = config.proxy_url();
        let client = match build_probe_client(&proxy_url, self.timeout) {
            Ok(client) => client,
            Err(e) => {
                warn!(proxy = %proxy_url, error = %error_chain(&e), "tunnel probe client unavailable");
                return TunnelStatus::failed(error_chain(&e));
            }
        };

        let response = match client.get(&self.probe_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(proxy = %proxy_url, error = %error_chain(&e), "tunnel probe failed");
                return TunnelStatus::failed(error_chain(&e));
            }
        };

        // Any HTTP answer proves the tunnel carried the request.
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(proxy = %proxy_url, error = %error_chain(&e), "tunnel probe body unreadable");
                return TunnelStatus::failed(error_chain(&e));
            }
        };
        let external_ip = parse_echoed_ip(&body);
        debug!(proxy = %proxy_url, external_ip = ?external_ip, "tunnel probe succeeded");
        TunnelStatus::operational(external_ip)
    }
}

fn build_probe_client(proxy_url: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let proxy = reqwest::Proxy::all(proxy_url)?;
    reqwest::Client::builder()
        .use_rustls_tls()
        .proxy(proxy)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
}

/// `ip` field of an echo response; `None` for anything that is not JSON with a string `ip`.
pub fn parse_echoed_ip(body: &str) -> Option<String> {
    serde_json::from_str::<IpEcho>(body).ok()?.ip
}
