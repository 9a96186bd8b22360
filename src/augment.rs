use std::path::PathBuf;

use tracing::debug;

use crate::config::{ProxyConfig, DEFAULT_CA_BUNDLE};
use crate::request::{ProxyProtocol, ProxySettings, RequestDescriptor, TransportMode};

/// Applies tunnel proxy settings to requests the router selected
#[derive(Debug, Clone)]
pub struct RequestAugmenter {
    ca_bundle: PathBuf,
}

impl Default for RequestAugmenter {
    fn default() -> Self {
        Self::new(DEFAULT_CA_BUNDLE)
    }
}

impl RequestAugmenter {
    pub fn new(ca_bundle: impl Into<PathBuf>) -> Self {
        Self {
            ca_bundle: ca_bundle.into(),
        }
    }

    /// Return `req` with the tunnel applied when `route` is set, untouched otherwise.
    ///
    /// The proxy always points at the configured tunnel over socks5h and the
    /// transport is pinned to one that honours it. A trust bundle the caller
    /// already chose is kept. Headers are never rewritten. Applying this twice
    /// gives the same descriptor as applying it once.
    pub fn augment(
        &self,
        req: RequestDescriptor,
        route: bool,
        config: &ProxyConfig,
    ) -> RequestDescriptor {
        if !route {
            return req;
        }

        let mut req = req;
        let hints = &mut req.transport;
        hints.proxy = Some(ProxySettings {
            host: config.tunnel_host.clone(),
            port: config.tunnel_port,
            protocol: ProxyProtocol::Socks5h,
        });
        if hints.ca_bundle.is_none() {
            hints.ca_bundle = Some(self.ca_bundle.clone());
        }
        hints.mode = TransportMode::ProxyRequired;

        if config.debug_mode {
            hints.verbose = true;
            debug!(
                url = %req.url,
                proxy = %config.proxy_url(),
                hints = ?req.transport,
                "routing request through ssh tunnel"
            );
        }

        req
    }
}
