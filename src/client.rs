use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Method};
use tracing::{debug, info, warn};

use crate::augment::RequestAugmenter;
use crate::config::{load_ca_bundle, ConfigStore, ProxyConfig};
use crate::error::{error_chain, ConfigError, DispatchError};
use crate::health::{parse_echoed_ip, DEFAULT_PROBE_URL};
use crate::request::{RequestDescriptor, TransportHints, TransportMode};
use crate::route::should_route;

/// HTTP client middleware that sends selected requests through the tunnel.
///
/// Every call loads a fresh [`ProxyConfig`] snapshot from the store, so saved
/// settings take effect on the next request without restarting anything.
pub struct RoutingClient {
    store: Arc<dyn ConfigStore>,
    augmenter: RequestAugmenter,
    ip_echo_url: String,
}

impl RoutingClient {
    /// Client using the trust bundle configured in `store`.
    pub fn new(store: Arc<dyn ConfigStore>) -> Result<Self, ConfigError> {
        let augmenter = RequestAugmenter::new(load_ca_bundle(store.as_ref())?);
        Ok(Self::with_augmenter(store, augmenter))
    }

    pub fn with_augmenter(store: Arc<dyn ConfigStore>, augmenter: RequestAugmenter) -> Self {
        Self {
            store,
            augmenter,
            ip_echo_url: DEFAULT_PROBE_URL.to_string(),
        }
    }

    /// Endpoint used for the pre-proxy IP lookup logged in debug mode.
    pub fn with_ip_echo_url(mut self, url: impl Into<String>) -> Self {
        self.ip_echo_url = url.into();
        self
    }

    /// Route and augment `req` against the current settings without sending it.
    pub fn prepare(
        &self,
        req: RequestDescriptor,
    ) -> Result<(RequestDescriptor, ProxyConfig), ConfigError> {
        let config = ProxyConfig::load(self.store.as_ref())?;
        let route = should_route(&req.url, &config);
        let req = self.augmenter.augment(req, route, &config);
        Ok((req, config))
    }

    pub async fn execute(&self, req: RequestDescriptor) -> Result<reqwest::Response, DispatchError> {
        let (req, config) = self.prepare(req)?;
        if req.is_routed() {
            debug!(url = %req.url, proxy = %config.proxy_url(), "dispatching through tunnel");
            if config.debug_mode {
                self.log_direct_ip().await;
            }
        }

        let client = build_client(&req.transport)?;
        let request = build_request(&client, &req)?;
        client.execute(request).await.map_err(DispatchError::Request)
    }

    async fn log_direct_ip(&self) {
        let direct = reqwest::Client::builder()
            .use_rustls_tls()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build();
        let lookup = match direct {
            Ok(client) => match client.get(&self.ip_echo_url).send().await {
                Ok(response) => response.text().await.map(|body| parse_echoed_ip(&body)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match lookup {
            Ok(ip) => info!(external_ip = ?ip, "pre-proxy IP"),
            Err(e) => debug!(error = %error_chain(&e), "pre-proxy IP lookup failed"),
        }
    }
}

/// Build a `reqwest` client honouring the transport hints.
///
/// A descriptor that requires the proxy either gets it or fails; it is never
/// sent over a direct connection.
pub fn build_client(hints: &TransportHints) -> Result<reqwest::Client, DispatchError> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .connection_verbose(hints.verbose);

    match &hints.proxy {
        Some(settings) => {
            let url = settings.url();
            let proxy = reqwest::Proxy::all(&url).map_err(|source| DispatchError::ProxyUnavailable {
                proxy: url.clone(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        None if hints.mode == TransportMode::ProxyRequired => {
            return Err(DispatchError::MissingProxy);
        }
        None => {
            builder = builder.no_proxy();
        }
    }

    if let Some(path) = &hints.ca_bundle {
        for cert in load_trust_bundle(path)? {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder.build().map_err(DispatchError::Client)
}

/// Certificates in a PEM bundle. A missing file adds nothing to the built-in roots.
pub fn load_trust_bundle(path: &Path) -> Result<Vec<Certificate>, DispatchError> {
    let pem = match fs::read(path) {
        Ok(pem) => pem,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "trust bundle not found, using built-in roots");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(DispatchError::TrustBundle {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let certs = Certificate::from_pem_bundle(&pem).map_err(|e| DispatchError::TrustBundle {
        path: path.to_path_buf(),
        reason: error_chain(&e),
    })?;
    if certs.is_empty() {
        return Err(DispatchError::TrustBundle {
            path: path.to_path_buf(),
            reason: "no PEM certificates found".to_string(),
        });
    }
    Ok(certs)
}

fn build_request(
    client: &reqwest::Client,
    req: &RequestDescriptor,
) -> Result<reqwest::Request, DispatchError> {
    let method = if req.method.is_empty() {
        Method::GET
    } else {
        Method::from_bytes(req.method.to_ascii_uppercase().as_bytes()).map_err(|e| {
            DispatchError::InvalidHeader {
                name: ":method".to_string(),
                reason: e.to_string(),
            }
        })?
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &req.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| DispatchError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| DispatchError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }

    let mut builder = client.request(method, &req.url).headers(headers);
    if let Some(body) = &req.body {
        builder = builder.body(body.clone());
    }
    builder.build().map_err(DispatchError::Request)
}
