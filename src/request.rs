use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outbound HTTP request as handed to the routing layer by the HTTP client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub transport: TransportHints,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// True once a tunnel proxy has been attached.
    pub fn is_routed(&self) -> bool {
        self.transport.proxy.is_some()
    }
}

/// Proxy and TLS options the HTTP client must honour for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportHints {
    pub proxy: Option<ProxySettings>,
    pub ca_bundle: Option<PathBuf>,
    pub mode: TransportMode,
    /// Verbose connection logging; diagnostic only.
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
}

impl ProxySettings {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, url_host(&self.host), self.port)
    }
}

/// `host` as it must appear in a URL authority; IPv6 literals get brackets.
pub fn url_host(host: &str) -> Cow<'_, str> {
    if host.parse::<Ipv6Addr>().is_ok() {
        Cow::Owned(format!("[{host}]"))
    } else {
        Cow::Borrowed(host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    /// SOCKS5 with DNS resolved by the proxy
    Socks5h,
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyProtocol::Socks5h => write!(f, "socks5h"),
        }
    }
}

/// Transport selection for the underlying HTTP client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Client picks whatever transport it likes
    #[default]
    Any,
    /// Transport must apply the proxy settings or fail; no direct fallback
    ProxyRequired,
}
